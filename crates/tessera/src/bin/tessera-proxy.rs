//! Runs the Tessera proxy with the echo handler.
//!
//! Usage: `tessera-proxy [config.json]`

use tessera::prelude::*;

#[tokio::main]
async fn main() -> Result<(), TesseraError> {
    let config = match std::env::args().nth(1) {
        Some(path) => ProxyConfig::from_json_file(path)?,
        None => ProxyConfig::default(),
    };
    tessera::telemetry::init(&config.log_filter)?;

    let server = TesseraServer::builder().config(config).build().await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
        })
        .await
}
