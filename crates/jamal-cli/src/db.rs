//! `jamal db ...`: schema and demo data.

use clap::Subcommand;
use jamal_core::schema::initialization_sql;

use crate::config::App;

#[derive(Subcommand, Debug)]
pub enum DbCommand {
    /// Print the SQL that creates every table on the hosted backend.
    InitSql,
    /// Insert the demo drivers when the drivers table is empty.
    Seed,
}

pub fn print_init_sql() {
    println!("{}", initialization_sql());
}

pub async fn seed(app: &App) -> anyhow::Result<()> {
    let added = app.services.drivers.seed_defaults().await?;
    if added == 0 {
        println!("Tabela de motoristas já possui registros; nada a fazer.");
    } else {
        println!("{added} motoristas de demonstração inseridos.");
    }
    Ok(())
}
