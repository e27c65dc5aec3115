mod admin;
mod client;
mod config;
mod db;
mod display;
mod driver;
mod simulate;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use crate::config::Config;

#[derive(Parser, Debug)]
#[command(version, about = "Jamal Express: ride requests, drivers and fleet administration")]
struct Cli {
    #[command(flatten)]
    config: Config,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Request and follow rides.
    #[command(subcommand)]
    Client(client::ClientCommand),
    /// Work as a driver.
    #[command(subcommand)]
    Driver(driver::DriverCommand),
    /// Fleet, destinations, dashboard and payments.
    #[command(subcommand)]
    Admin(admin::AdminCommand),
    #[command(subcommand)]
    Db(db::DbCommand),
    /// Run one ride through its whole lifecycle in memory.
    Simulate,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!("jamal v{}", env!("CARGO_PKG_VERSION"));

    let cli = Cli::parse();
    match cli.command {
        Command::Simulate => simulate::run(cli.config.fares()?).await,
        Command::Db(db::DbCommand::InitSql) => {
            db::print_init_sql();
            Ok(())
        }
        Command::Db(db::DbCommand::Seed) => db::seed(&cli.config.app().await?).await,
        Command::Client(cmd) => client::run(&cli.config.app().await?, cmd).await,
        Command::Driver(cmd) => driver::run(&cli.config.app().await?, cmd).await,
        Command::Admin(cmd) => admin::run(&cli.config.app().await?, cmd).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_tree_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_admin_commands() {
        let cli = Cli::try_parse_from([
            "jamal", "admin", "payments", "generate", "--driver", "1", "--month", "2026-02",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Admin(admin::AdminCommand::Payments(
                admin::PaymentAdmin::Generate { driver: 1, .. }
            ))
        ));

        let cli = Cli::try_parse_from([
            "jamal", "admin", "dashboard", "--period", "90", "--status", "finalizada",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Admin(admin::AdminCommand::Dashboard { json: false, .. })
        ));

        let cli = Cli::try_parse_from([
            "jamal", "admin", "drivers", "add", "--name", "Joana", "--phone", "11", "--vehicle",
            "Biz", "--plate", "JJJ-0000",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Admin(admin::AdminCommand::Drivers(admin::DriverAdmin::Add {
                code: None,
                ..
            }))
        ));

        assert!(Cli::try_parse_from(["jamal", "admin", "dashboard", "--period", "14"]).is_err());
        assert!(Cli::try_parse_from(["jamal", "client", "rate", "--stars", "6"]).is_err());
    }

    #[test]
    fn negative_coordinates_parse() {
        let cli = Cli::try_parse_from([
            "jamal", "driver", "queue", "--lat", "-23.55", "--lon", "-46.63",
        ])
        .unwrap();
        assert!(matches!(
            cli.command,
            Command::Driver(driver::DriverCommand::Queue { lat: Some(_), lon: Some(_) })
        ));
    }
}
