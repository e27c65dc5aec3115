//! `jamal client ...`: request a ride and follow it.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Subcommand;
use jamal_core::geo::MIN_ARRIVAL_MINUTES;
use jamal_core::{Coordinates, DriverSnapshot, RideId};
use jamal_dispatch::{Alert, DriverService, Notifier, RideForm, TerminalNotifier};
use jamal_sync::{ClientRequest, PollHandle, RideChange, RideWatcher, spawn_poller};
use tokio::sync::Mutex;
use tracing::warn;

use crate::config::App;
use crate::display;

#[derive(Subcommand, Debug)]
pub enum ClientCommand {
    /// List destinations open for booking.
    Destinations,
    /// How many drivers are online right now.
    Drivers,
    /// Ask for a ride.
    Request {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        street: String,
        #[arg(long)]
        number: String,
        #[arg(long)]
        cep: Option<String>,
        /// Destination id, see `jamal client destinations`.
        #[arg(long)]
        destination: i64,
        /// Pickup latitude; geocoded from the address when omitted.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Show the current request.
    Status {
        /// Defaults to the request saved in the session.
        id: Option<RideId>,
    },
    /// Poll the request until it ends.
    Watch { id: Option<RideId> },
    Cancel { id: Option<RideId> },
    /// Rate the driver of a finished ride.
    Rate {
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        stars: u8,
        #[arg(long, default_value = "")]
        comment: String,
        id: Option<RideId>,
    },
}

fn current_ride(app: &App, id: Option<RideId>) -> anyhow::Result<RideId> {
    id.or_else(|| app.session.load().client_request.map(|r| r.id))
        .context("no active request; pass a ride id or run `jamal client request`")
}

pub async fn run(app: &App, cmd: ClientCommand) -> anyhow::Result<()> {
    let rides = &app.services.rides;
    let notifier = TerminalNotifier::stdout(app.session.load().preferences);
    match cmd {
        ClientCommand::Destinations => {
            let list = app.services.destinations.list_active().await?;
            display::print_destinations(&list);
        }
        ClientCommand::Drivers => {
            let online = app.services.drivers.online_count().await?;
            println!("{}", online_banner(online));
        }
        ClientCommand::Request {
            name,
            phone,
            street,
            number,
            cep,
            destination,
            lat,
            lon,
        } => {
            let form = RideForm {
                name,
                phone,
                street,
                number,
                cep,
                destination_id: Some(destination),
                coordinates: lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon)),
            };
            let ride = rides.request_ride(form).await.context("requesting ride")?;
            app.session.update(|s| {
                s.client_request = Some(ClientRequest {
                    id: ride.id,
                    timestamp: ride.timestamp,
                })
            })?;
            notifier.notify(&Alert::ride_requested());
            display::print_ride_card(&ride);
            if let Some(pickup) = ride.client.coordinates
                && let Ok(Some((driver, km))) = rides.nearest_online_driver(pickup).await
            {
                println!("Motorista mais próximo: {} a {km:.1} km.", driver.name);
            }
        }
        ClientCommand::Status { id } => {
            let ride = rides.get(current_ride(app, id)?).await?;
            display::print_ride_card(&ride);
        }
        ClientCommand::Watch { id } => {
            let id = current_ride(app, id)?;
            watch(app, id, Arc::new(notifier)).await?;
        }
        ClientCommand::Cancel { id } => {
            let id = current_ride(app, id)?;
            let ride = rides.cancel(id).await.context("cancelling ride")?;
            forget_request(app, id)?;
            println!("Corrida #{} cancelada.", ride.id);
        }
        ClientCommand::Rate { stars, comment, id } => {
            let id = current_ride(app, id)?;
            let driver = rides.rate_ride(id, stars, &comment).await?;
            forget_request(app, id)?;
            println!(
                "Obrigado! {} agora tem nota {:.1}.",
                driver.name, driver.rating
            );
        }
    }
    Ok(())
}

fn forget_request(app: &App, id: RideId) -> anyhow::Result<()> {
    app.session.update(|s| {
        if s.client_request.as_ref().is_some_and(|r| r.id == id) {
            s.client_request = None;
        }
    })?;
    Ok(())
}

/// Poll one ride, alerting on each change, until it reaches a final state.
async fn watch(app: &App, id: RideId, notifier: Arc<dyn Notifier>) -> anyhow::Result<()> {
    let backend = app.backend.clone();
    let watcher = Arc::new(Mutex::new(RideWatcher::new(id)));
    println!("Acompanhando corrida #{id} (Ctrl-C para sair)...");

    let poller = spawn_poller(app.intervals.ride_status, move || {
        let backend = backend.clone();
        let watcher = watcher.clone();
        let notifier = notifier.clone();
        async move {
            let mut watcher = watcher.lock().await;
            let changes = match watcher.poll(backend.as_ref()).await {
                Ok(changes) => changes,
                Err(e) => {
                    warn!(ride_id = id, error = %e, "status poll failed");
                    return ControlFlow::Continue(());
                }
            };
            let driver_name = watcher
                .current()
                .and_then(|r| r.driver.name.clone())
                .unwrap_or_else(|| "Motorista".into());
            for change in changes {
                announce(notifier.as_ref(), id, &driver_name, &change);
            }
            if watcher.is_done() {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        }
    });

    let _online = spawn_online_counter(
        app.services.drivers.clone(),
        app.intervals.online_count,
        |n| println!("{}", online_banner(n)),
    );

    tokio::select! {
        _ = poller.join() => {}
        _ = tokio::signal::ctrl_c() => println!(),
    }
    Ok(())
}

fn online_banner(online: usize) -> String {
    match online {
        0 => "Nenhum motorista online agora".into(),
        1 => "1 motorista online agora".into(),
        n => format!("{n} motoristas online agora"),
    }
}

/// Hand the online-driver count to `report` every `period`.
fn spawn_online_counter<F>(drivers: DriverService, period: Duration, report: F) -> PollHandle
where
    F: Fn(usize) + Send + Sync + 'static,
{
    let report = Arc::new(report);
    spawn_poller(period, move || {
        let drivers = drivers.clone();
        let report = report.clone();
        async move {
            match drivers.online_count().await {
                Ok(n) => report(n),
                Err(e) => warn!(error = %e, "online count poll failed"),
            }
            ControlFlow::Continue(())
        }
    })
}

fn announce(notifier: &dyn Notifier, id: RideId, driver_name: &str, change: &RideChange) {
    let eta = |s: &DriverSnapshot| s.eta_minutes.unwrap_or(MIN_ARRIVAL_MINUTES);
    match change {
        RideChange::Accepted(driver) => {
            notifier.notify(&Alert::ride_accepted(driver_name, eta(driver)))
        }
        RideChange::Arrived(_) => notifier.notify(&Alert::driver_arrived(driver_name)),
        RideChange::Completed => {
            notifier.notify(&Alert::ride_completed(driver_name));
            println!("Avalie com `jamal client rate --stars N`.");
        }
        RideChange::Refused => println!("Corrida #{id} recusada pelo motorista."),
        RideChange::Cancelled => println!("Corrida #{id} cancelada."),
        RideChange::Vanished => println!("Corrida #{id} não encontrada."),
    }
}
