//! Standalone schema migration runner.
//!
//! Usage: `migration [up|down|fresh|status]` (default `up`). The database URL
//! comes from `APP__DATABASE_URL` or `DATABASE_URL`.

use anyhow::{bail, Context};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use storefront_api::{
    db::{establish_connection_with_config, DbConfig},
    migrator::Migrator,
};

const DEFAULT_DATABASE_URL: &str = "sqlite://storefront.db?mode=rwc";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    storefront_api::config::init_tracing("info", false);

    let database_url = std::env::var("APP__DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string());
    let command = std::env::args().nth(1).unwrap_or_else(|| "up".to_string());

    let db = establish_connection_with_config(&DbConfig {
        url: database_url,
        ..DbConfig::default()
    })
    .await
    .context("failed to connect to database")?;

    match command.as_str() {
        "up" => Migrator::up(&db, None).await?,
        "down" => Migrator::down(&db, Some(1)).await?,
        "fresh" => Migrator::fresh(&db).await?,
        "status" => Migrator::status(&db).await?,
        other => bail!("unknown command '{}', expected up, down, fresh or status", other),
    }

    info!(command = %command, "Migration command finished");
    Ok(())
}
