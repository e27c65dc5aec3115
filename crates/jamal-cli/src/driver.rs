//! `jamal driver ...`: go online, work the queue, run a ride.

use std::collections::HashSet;
use std::ops::ControlFlow;
use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;
use clap::Subcommand;
use jamal_core::geo::{DEFAULT_PICKUP, navigation_url};
use jamal_core::{Coordinates, Driver, RideId};
use jamal_dispatch::{Alert, Notifier, TerminalNotifier};
use jamal_sync::{AcceptedRide, QueueWatcher, spawn_poller};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::config::App;
use crate::display;

#[derive(Subcommand, Debug)]
pub enum DriverCommand {
    /// Sign in with the driver access code.
    Login { code: String },
    Logout,
    Online,
    Offline,
    /// Pending requests, nearest first.
    Queue {
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    Accept {
        id: RideId,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    Refuse { id: RideId },
    /// Tell the client you reached the pickup.
    Arrived { id: Option<RideId> },
    Finish { id: Option<RideId> },
    /// Alert on new requests until interrupted.
    Watch {
        /// Current position, pushed on the location interval.
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
    },
    /// Messages from the office.
    Notifications {
        /// Mark this notification as read.
        #[arg(long)]
        read: Option<String>,
    },
}

async fn signed_in(app: &App) -> anyhow::Result<Driver> {
    let code = app
        .session
        .load()
        .driver_code
        .context("not signed in; run `jamal driver login <code>`")?;
    Ok(app.services.drivers.by_code(&code).await?)
}

fn position(lat: Option<f64>, lon: Option<f64>) -> Option<Coordinates> {
    lat.zip(lon).map(|(lat, lon)| Coordinates::new(lat, lon))
}

fn accepted_ride(app: &App, id: Option<RideId>) -> anyhow::Result<RideId> {
    id.or_else(|| app.session.load().accepted_ride.map(|r| r.ride_id))
        .context("no ride in progress; pass a ride id")
}

pub async fn run(app: &App, cmd: DriverCommand) -> anyhow::Result<()> {
    let drivers = &app.services.drivers;
    let rides = &app.services.rides;
    match cmd {
        DriverCommand::Login { code } => {
            let driver = drivers.by_code(&code).await?;
            app.session
                .update(|s| s.driver_code = Some(driver.code.clone()))?;
            display::print_driver_card(&driver);
        }
        DriverCommand::Logout => {
            app.session.update(|s| {
                s.driver_code = None;
                s.accepted_ride = None;
                s.refused_rides.clear();
            })?;
            println!("Sessão encerrada.");
        }
        DriverCommand::Online => set_online(app, true).await?,
        DriverCommand::Offline => set_online(app, false).await?,
        DriverCommand::Queue { lat, lon } => {
            let driver = signed_in(app).await?;
            let from = position(lat, lon)
                .or_else(|| driver.position())
                .unwrap_or(DEFAULT_PICKUP);
            let refused: HashSet<RideId> =
                app.session.load().refused_rides.into_iter().collect();
            let queue = rides.pending_for_driver(from, &refused).await?;
            display::print_queue(&queue);
        }
        DriverCommand::Accept { id, lat, lon } => {
            let driver = signed_in(app).await?;
            let ride = rides
                .accept(id, &driver, position(lat, lon))
                .await
                .with_context(|| format!("accepting ride {id}"))?;
            app.session.update(|s| {
                s.accepted_ride = Some(AcceptedRide {
                    ride_id: ride.id,
                    driver_id: driver.id,
                    timestamp: Utc::now(),
                })
            })?;
            display::print_ride_card(&ride);
            println!(
                "Navegação: {}",
                navigation_url(ride.client.coordinates, &ride.client.address)
            );
        }
        DriverCommand::Refuse { id } => {
            rides.refuse(id).await?;
            app.session.update(|s| {
                s.refused_rides.insert(id);
            })?;
            println!("Corrida #{id} recusada.");
        }
        DriverCommand::Arrived { id } => {
            let ride = rides.notify_arrival(accepted_ride(app, id)?).await?;
            println!("Cliente {} avisado da chegada.", ride.client.name);
        }
        DriverCommand::Finish { id } => {
            let id = accepted_ride(app, id)?;
            let ride = rides.finish(id).await?;
            app.session.update(|s| {
                if s.accepted_ride.as_ref().is_some_and(|r| r.ride_id == id) {
                    s.accepted_ride = None;
                }
            })?;
            display::print_ride_card(&ride);
        }
        DriverCommand::Watch { lat, lon } => {
            let driver = signed_in(app).await?;
            watch(app, driver, position(lat, lon)).await?;
        }
        DriverCommand::Notifications { read } => {
            let driver = signed_in(app).await?;
            if let Some(id) = read {
                app.services.notifications.mark_read(&id).await?;
            }
            let inbox = app.services.notifications.for_driver(&driver.code).await?;
            display::print_notifications(&inbox);
        }
    }
    Ok(())
}

async fn set_online(app: &App, online: bool) -> anyhow::Result<()> {
    let driver = signed_in(app).await?;
    let driver = app.services.drivers.set_online(driver.id, online).await?;
    println!("{} está {}.", driver.name, driver.status);
    Ok(())
}

/// Alert on requests that appear in the queue, and keep the driver's position fresh.
async fn watch(app: &App, driver: Driver, at: Option<Coordinates>) -> anyhow::Result<()> {
    let notifier: Arc<dyn Notifier> =
        Arc::new(TerminalNotifier::stdout(app.session.load().preferences));
    let session = app.session.clone();
    let rides = app.services.rides.clone();
    let from = at.or_else(|| driver.position()).unwrap_or(DEFAULT_PICKUP);
    let queue = Arc::new(Mutex::new(QueueWatcher::new()));
    println!("{} aguardando solicitações (Ctrl-C para sair)...", driver.name);

    let _queue_poller = spawn_poller(app.intervals.driver_queue, move || {
        let rides = rides.clone();
        let queue = queue.clone();
        let notifier = notifier.clone();
        let refused: HashSet<RideId> = session.load().refused_rides.into_iter().collect();
        async move {
            let pending = match rides.pending_for_driver(from, &refused).await {
                Ok(p) => p,
                Err(e) => {
                    warn!(error = %e, "queue poll failed");
                    return ControlFlow::Continue(());
                }
            };
            let fresh = queue.lock().await.observe(pending.iter().map(|r| &r.request));
            for r in pending.iter().filter(|r| fresh.contains(&r.id())) {
                let dest = r.request.destination.as_deref().unwrap_or("-");
                notifier.notify(&Alert::new_ride_request(&r.request.client.name, dest));
            }
            ControlFlow::Continue(())
        }
    });

    let _location_poller = at.map(|p| {
        let drivers = app.services.drivers.clone();
        let id = driver.id;
        spawn_poller(app.intervals.driver_location, move || {
            let drivers = drivers.clone();
            async move {
                match drivers.update_location(id, p).await {
                    Ok(_) => info!(driver_id = id, "location pushed"),
                    Err(e) => warn!(driver_id = id, error = %e, "location update failed"),
                }
                ControlFlow::Continue(())
            }
        })
    });

    tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
    println!();
    Ok(())
}
