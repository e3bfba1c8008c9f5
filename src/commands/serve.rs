use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::{
    api::{self, ApiState},
    config::{ServeArgs, Timing},
    net::{host::SystemControl, inspect::PnetInspector, spoof::PnetSender},
    service::{CutService, Repeater},
};

pub async fn serve(args: ServeArgs, timing: Timing) -> anyhow::Result<()> {
    let service = Arc::new(CutService::new(
        Arc::new(PnetInspector::new(&timing)),
        Arc::new(PnetSender),
        Arc::new(SystemControl),
    ));
    let repeater = Repeater::spawn(service.clone(), timing.repeat_interval());

    let app = api::router(ApiState {
        service: service.clone(),
        log_file: Arc::new(args.log_file.clone()),
    });
    let listener = tokio::net::TcpListener::bind(args.listen)
        .await
        .with_context(|| format!("Failed to bind control API on {}", args.listen))?;
    info!("Listening on http://{}", args.listen);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Control API server error");

    info!("Shutting down");
    repeater.stop().await;
    tokio::task::spawn_blocking(move || service.restore_all())
        .await
        .context("Restoring victims failed")?;
    return served;
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Couldn't listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
}
