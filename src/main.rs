use anyhow::Result;

use db_probe::acquirer::{ConnectionAcquirer, RetryPolicy};
use db_probe::config::Settings;
use db_probe::error::ProbeError;
use db_probe::mysql::MySqlProbePool;
use db_probe::probe::{MySqlProbeStore, ProbeOutcome, TransactionalProber};
use db_probe::report;
use db_probe::telemetry::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::new();

    // Initialize tracing
    let format = settings
        .as_ref()
        .map(|s| s.logging.format)
        .unwrap_or_default();
    init_tracing(format);

    let result = match settings {
        Ok(settings) => {
            tracing::info!(db = %settings.database.target(), "Configuration loaded");
            run(settings).await
        }
        Err(e) => Err(e),
    };

    // Runtime failures were logged where they happened
    match &result {
        Ok(outcome) => tracing::info!(id = outcome.record.id, "Connectivity probe succeeded"),
        Err(e) if e.is_configuration() => {
            tracing::error!(code = e.code(), error = %e, "Invalid configuration")
        }
        Err(e) => tracing::info!(code = e.code(), "Connectivity probe failed"),
    }
    tracing::info!("Probe run finished");

    result.map(|_| ()).map_err(Into::into)
}

async fn run(settings: Settings) -> Result<ProbeOutcome, ProbeError> {
    let pool = MySqlProbePool::new(&settings.database);
    let pool = ConnectionAcquirer::new(RetryPolicy::default())
        .acquire(pool)
        .await?;

    let outcome = match MySqlProbeStore::new(pool.clone(), &settings.database.table) {
        Ok(store) => {
            TransactionalProber::new(&store)
                .on_latest(report::print_latest)
                .run()
                .await
        }
        Err(e) => Err(e),
    };

    // Close the pool on every path so the process can exit
    pool.close().await;

    let outcome = outcome?;
    report::print_inserted(&outcome.record);
    Ok(outcome)
}
