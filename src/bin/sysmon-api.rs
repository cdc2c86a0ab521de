//! serves stored samples over http.

use {
    anyhow::Context,
    clap::Parser,
    sysmon::{ApiConfig, api, logging, signal},
    tokio::net::TcpListener,
    tracing::info,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let ApiConfig { db, addr, log } = ApiConfig::parse();
    logging::init(log.format)?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to listen on {addr}"))?;
    info!(%addr, %db, "serving");

    axum::serve(listener, api::router(db))
        .with_graceful_shutdown(signal::shutdown())
        .await
        .context("server failed")?;

    info!("server stopped");
    Ok(())
}
