//! `jamal simulate`: one ride end to end against an in-memory store.

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use jamal_core::{Coordinates, FareSchedule};
use jamal_dispatch::{Month, Period, RideForm, Services};
use jamal_store::MemoryStore;
use tracing::info;

use crate::display;

pub async fn run(fares: FareSchedule) -> anyhow::Result<()> {
    let services = Services::new(Arc::new(MemoryStore::new()), fares);
    let mut events = services.events.subscribe();
    let log_events = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(event = event.name(), ride_id = ?event.ride_id(), "event");
        }
    });

    services.drivers.seed_defaults().await?;
    let destination = services
        .destinations
        .add("Aeroporto de Congonhas", "Av. Washington Luís, s/n")
        .await?;
    let carlos = services.drivers.by_code("1234").await?;
    let carlos_at = Coordinates::new(-23.5614, -46.6559);
    services.drivers.update_location(carlos.id, carlos_at).await?;

    println!("── 1. Cliente solicita corrida");
    let ride = services
        .rides
        .request_ride(RideForm {
            name: "Maria Souza".into(),
            phone: "11987654321".into(),
            street: "Rua Augusta".into(),
            number: "100".into(),
            cep: Some("01305000".into()),
            destination_id: Some(destination.id),
            coordinates: Some(Coordinates::new(-23.5535, -46.6577)),
        })
        .await
        .context("requesting ride")?;
    display::print_ride_card(&ride);

    println!("── 2. Fila do motorista {}", carlos.name);
    let queue = services
        .rides
        .pending_for_driver(carlos_at, &HashSet::new())
        .await?;
    display::print_queue(&queue);
    println!();

    println!("── 3. Motorista aceita");
    let accepted = services.rides.accept(ride.id, &carlos, None).await?;
    display::print_ride_card(&accepted);

    println!("── 4. Motorista chega e finaliza");
    services.rides.notify_arrival(ride.id).await?;
    let finished = services.rides.finish(ride.id).await?;
    display::print_ride_card(&finished);

    println!("── 5. Cliente avalia");
    let rated = services.rides.rate_ride(ride.id, 5, "Ótimo motorista").await?;
    display::print_driver_card(&rated);

    println!("── 6. Fechamento do mês");
    let month = Month::of(Utc::now());
    if let Some(payment) = services
        .finance
        .generate_monthly_payment(carlos.id, month)
        .await?
    {
        display::print_payments(&[payment]);
    }
    println!();

    let report = services.dashboard.report(Period::Week).await?;
    display::print_dashboard(&report, &report.filter_status(None));

    drop(services);
    log_events.abort();
    Ok(())
}
