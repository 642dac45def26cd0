use anyhow::Context;
use engravekit::{api, init_logging, App, DataPaths, BUILD_DATE, VERSION};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    tracing::info!("EngraveKit {} (built {})", VERSION, BUILD_DATE);

    let paths = DataPaths::from_env().context("resolving data directory")?;
    let app = App::start(paths).await?;

    let address = app.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {}", address))?;
    tracing::info!(%address, "HTTP API listening");

    let served = axum::serve(listener, api::router(app.service()))
        .with_graceful_shutdown(shutdown_signal())
        .await;

    app.shutdown().await;
    served.context("HTTP server failed")
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("cannot listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
