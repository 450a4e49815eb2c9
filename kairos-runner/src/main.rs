use anyhow::{anyhow, Result};
use diesel::Connection;
use diesel_async::async_connection_wrapper::AsyncConnectionWrapper;
use diesel_async::AsyncPgConnection;
use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};
use kairos_api::fanout;
use kairos_api::ConnectionRegistry;
use kairos_core::{AppContext, Config};
use std::sync::Arc;
use tracing;
use tracing_subscriber;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("../migrations");

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    tracing::info!("Starting Kairos Fitness core service");

    let config = Config::from_env();

    run_migrations(&config.database.url).await?;

    let ctx = AppContext::new(config).await?;
    let registry = Arc::new(ConnectionRegistry::new(
        ctx.config.stream.connection_buffer,
    ));

    tracing::info!("Application context initialized");

    let ctx_clone = ctx.clone();
    let registry_clone = Arc::clone(&registry);
    tokio::spawn(async move {
        if let Err(e) = fanout::run(ctx_clone, registry_clone).await {
            tracing::error!("Fan-out bridge error: {}", e);
        }
    });

    // API server runs in the main task
    kairos_api::run(ctx, registry).await?;

    Ok(())
}

async fn run_migrations(database_url: &str) -> Result<()> {
    let url = database_url.to_string();

    // Diesel's migration harness is synchronous; keep it off the runtime.
    tokio::task::spawn_blocking(move || -> Result<()> {
        let mut conn: AsyncConnectionWrapper<AsyncPgConnection> =
            AsyncConnectionWrapper::establish(&url)
                .map_err(|e| anyhow!("Failed to connect for migrations: {}", e))?;

        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| anyhow!("Failed to run migrations: {}", e))?;

        if !applied.is_empty() {
            tracing::info!("Applied {} pending migration(s)", applied.len());
        }

        Ok(())
    })
    .await??;

    Ok(())
}
