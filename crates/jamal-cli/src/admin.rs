//! `jamal admin ...`: fleet, destinations, reports and payouts.

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use jamal_core::destination::DestinationId;
use jamal_core::payment::PaymentId;
use jamal_core::{DriverId, DriverPatch, NewDriver, PaymentStatus, RideStatus};
use jamal_dispatch::{Month, Period, export_csv};

use crate::config::App;
use crate::display;

#[derive(Subcommand, Debug)]
pub enum AdminCommand {
    /// Authenticate for the next 24 hours.
    Login { password: String },
    Logout,
    #[command(subcommand)]
    Drivers(DriverAdmin),
    #[command(subcommand)]
    Destinations(DestinationAdmin),
    /// Ride statistics for a trailing window.
    Dashboard {
        /// 7, 30, 90 or 365 days.
        #[arg(long, default_value = "7")]
        period: Period,
        /// Only list rides in this status (pendente, aceito, ...).
        #[arg(long)]
        status: Option<RideStatus>,
        /// Print the full report as JSON.
        #[arg(long)]
        json: bool,
    },
    #[command(subcommand)]
    Payments(PaymentAdmin),
    /// Send a message to one driver, or to all of them.
    Notify {
        #[arg(long)]
        title: String,
        #[arg(long)]
        message: String,
        /// Driver access code; omit to broadcast.
        #[arg(long)]
        driver: Option<String>,
    },
    /// Show or change alert preferences.
    Settings {
        /// 0.0 to 1.0.
        #[arg(long)]
        volume: Option<f32>,
        #[arg(long)]
        sounds: Option<bool>,
        #[arg(long)]
        vibration: Option<bool>,
    },
}

#[derive(Subcommand, Debug)]
pub enum DriverAdmin {
    List,
    Show { id: DriverId },
    Add {
        /// Access code; the lowest free 4-digit code when omitted.
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long)]
        vehicle: String,
        #[arg(long)]
        plate: String,
    },
    Update {
        id: DriverId,
        #[arg(long)]
        code: Option<String>,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        phone: Option<String>,
        #[arg(long)]
        vehicle: Option<String>,
        #[arg(long)]
        plate: Option<String>,
    },
    /// Enable or disable a driver account.
    Toggle { id: DriverId },
    Online { id: DriverId },
    Offline { id: DriverId },
    Delete { id: DriverId },
}

#[derive(Subcommand, Debug)]
pub enum DestinationAdmin {
    List,
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        address: String,
    },
    Update {
        id: DestinationId,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        address: Option<String>,
    },
    Toggle { id: DestinationId },
    Delete { id: DestinationId },
}

#[derive(Subcommand, Debug)]
pub enum PaymentAdmin {
    List {
        #[arg(long)]
        driver: Option<DriverId>,
        /// YYYY-MM
        #[arg(long)]
        month: Option<Month>,
    },
    /// Create a statement from a driver's finished rides in a month.
    Generate {
        #[arg(long)]
        driver: DriverId,
        #[arg(long)]
        month: Month,
    },
    /// Move a payment to pendente, processando, pago or cancelado.
    Status {
        id: PaymentId,
        status: PaymentStatus,
        #[arg(long)]
        method: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Write payments as CSV.
    Export {
        #[arg(long)]
        driver: Option<DriverId>,
        #[arg(long)]
        month: Option<Month>,
        /// Output file; stdout when omitted.
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

pub async fn run(app: &App, cmd: AdminCommand) -> anyhow::Result<()> {
    match cmd {
        AdminCommand::Login { password } => {
            app.admin.login(&password)?;
            println!("Acesso liberado por 24 horas.");
            return Ok(());
        }
        AdminCommand::Logout => {
            app.admin.logout()?;
            println!("Sessão de administrador encerrada.");
            return Ok(());
        }
        _ => app.admin.require()?,
    }

    match cmd {
        AdminCommand::Login { .. } | AdminCommand::Logout => {}
        AdminCommand::Drivers(cmd) => drivers(app, cmd).await?,
        AdminCommand::Destinations(cmd) => destinations(app, cmd).await?,
        AdminCommand::Dashboard {
            period,
            status,
            json,
        } => {
            let report = app.services.dashboard.report(period).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                display::print_dashboard(&report, &report.filter_status(status));
            }
        }
        AdminCommand::Payments(cmd) => payments(app, cmd).await?,
        AdminCommand::Notify {
            title,
            message,
            driver,
        } => {
            let n = app
                .services
                .notifications
                .save(&title, &message, driver)
                .await?;
            println!("Notificação {} enviada.", n.id);
        }
        AdminCommand::Settings {
            volume,
            sounds,
            vibration,
        } => {
            let session = app.session.update(|s| {
                if let Some(v) = volume {
                    s.preferences.set_volume(v);
                }
                if let Some(on) = sounds {
                    s.preferences.sounds = on;
                }
                if let Some(on) = vibration {
                    s.preferences.vibration = on;
                }
            })?;
            let p = session.preferences;
            println!("  {:<26} {:.0}%", "volume", p.volume * 100.0);
            println!("  {:<26} {}", "sons", p.sounds);
            println!("  {:<26} {}", "vibração", p.vibration);
            println!(
                "  {:<26} {:.0}%",
                "comissão",
                app.services.finance.fares().commission_rate * 100.0
            );
        }
    }
    Ok(())
}

async fn drivers(app: &App, cmd: DriverAdmin) -> anyhow::Result<()> {
    let service = &app.services.drivers;
    match cmd {
        DriverAdmin::List => display::print_drivers(&service.list().await?),
        DriverAdmin::Show { id } => display::print_driver_card(&service.get(id).await?),
        DriverAdmin::Add {
            code,
            name,
            phone,
            vehicle,
            plate,
        } => {
            let code = match code {
                Some(code) => code,
                None => service.next_free_code().await?,
            };
            let driver = service
                .add(NewDriver::new(code, name, phone, vehicle, plate))
                .await
                .context("adding driver")?;
            display::print_driver_card(&driver);
        }
        DriverAdmin::Update {
            id,
            code,
            name,
            phone,
            vehicle,
            plate,
        } => {
            let patch = DriverPatch {
                code,
                name,
                phone,
                vehicle,
                plate,
                ..Default::default()
            };
            anyhow::ensure!(!patch.is_empty(), "nothing to update");
            display::print_driver_card(&service.update(id, &patch).await?);
        }
        DriverAdmin::Toggle { id } => {
            let d = service.toggle_active(id).await?;
            println!("{} {}.", d.name, if d.active { "ativado" } else { "desativado" });
        }
        DriverAdmin::Online { id } => {
            service.set_online(id, true).await?;
        }
        DriverAdmin::Offline { id } => {
            service.set_online(id, false).await?;
        }
        DriverAdmin::Delete { id } => {
            service.delete(id).await?;
            println!("Motorista {id} removido.");
        }
    }
    Ok(())
}

async fn destinations(app: &App, cmd: DestinationAdmin) -> anyhow::Result<()> {
    let service = &app.services.destinations;
    match cmd {
        DestinationAdmin::List => display::print_destinations(&service.list().await?),
        DestinationAdmin::Add { name, address } => {
            let d = service.add(&name, &address).await?;
            display::print_destinations(&[d]);
        }
        DestinationAdmin::Update { id, name, address } => {
            let d = service
                .update(id, name.as_deref(), address.as_deref())
                .await?;
            display::print_destinations(&[d]);
        }
        DestinationAdmin::Toggle { id } => {
            let d = service.toggle_active(id).await?;
            display::print_destinations(&[d]);
        }
        DestinationAdmin::Delete { id } => {
            service.delete(id).await?;
            println!("Destino {id} removido.");
        }
    }
    Ok(())
}

async fn payments(app: &App, cmd: PaymentAdmin) -> anyhow::Result<()> {
    let finance = &app.services.finance;
    match cmd {
        PaymentAdmin::List { driver, month } => {
            display::print_payments(&finance.list_payments(driver, month).await?);
        }
        PaymentAdmin::Generate { driver, month } => {
            match finance.generate_monthly_payment(driver, month).await? {
                Some(p) => display::print_payments(&[p]),
                None => println!("Nenhuma corrida finalizada em {month}."),
            }
        }
        PaymentAdmin::Status {
            id,
            status,
            method,
            notes,
        } => {
            let p = finance.update_status(id, status, method, notes).await?;
            display::print_payments(&[p]);
        }
        PaymentAdmin::Export { driver, month, out } => {
            let csv = export_csv(&finance.list_payments(driver, month).await?);
            match out {
                Some(path) => {
                    std::fs::write(&path, csv)
                        .with_context(|| format!("writing {}", path.display()))?;
                    println!("Exportado para {}.", path.display());
                }
                None => print!("{csv}"),
            }
        }
    }
    Ok(())
}
