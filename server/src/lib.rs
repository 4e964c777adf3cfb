pub mod app_state;
pub mod catalog;
pub mod handlers;
pub mod library;
pub mod routes;
pub mod stream;

use anyhow::Context;
use std::net::SocketAddr;
use tokio::net::TcpListener;

pub use app_state::AppState;
pub use catalog::rescan;
pub use library::Library;

pub async fn run(port: u16, app_state: app_state::SharedState) -> anyhow::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    serve(listener, app_state).await
}

pub async fn serve(listener: TcpListener, app_state: app_state::SharedState) -> anyhow::Result<()> {
    let app = routes::create_router(app_state);
    tracing::info!("Relay listening on {}", listener.local_addr()?);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("relay server stopped")
}
