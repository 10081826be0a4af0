use anyhow::Result;
use ledger_api::{build_app, LedgerConfig};
use ledger_observability::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("ledger_api");

    let config = LedgerConfig::from_env();
    let app = build_app(&config).await?;

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    tracing::info!(
        bind = %config.bind,
        sqlite = config.database_url.is_some(),
        twilio = config.twilio.is_some(),
        "cash ledger api started"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
