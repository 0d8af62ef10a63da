//! Bootstraps or upgrades the issuesync schema, then exits.

use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use issuesync_core::Result;
use issuesync_postgres::{ensure_schema, PgConfig, SchemaReport};

fn run() -> Result<SchemaReport> {
    let config = PgConfig::from_env()?;
    let mut client = config.connect()?;
    ensure_schema(&mut client)
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "issuesync_postgres=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run() {
        Ok(report) => {
            match serde_json::to_string(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!(error = %e, "could not encode schema report"),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "schema bootstrap failed");
            ExitCode::FAILURE
        }
    }
}
