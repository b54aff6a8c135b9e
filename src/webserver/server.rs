/// Axum server lifecycle: bind, serve, graceful shutdown
///
/// Shutdown is two-phased. When the cancel token fires, every broadcaster
/// runs its drain protocol so open streams receive their goodbye; only then
/// does axum stop accepting and wait for the remaining connections.
use axum::Router;
use futures::future::join_all;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

use crate::config::WebserverConfig;
use crate::errors::{DashError, DashResult};
use crate::logger::{self, LogTag};
use crate::webserver::{routes, state::AppState};

/// Bind the configured address, with a readable error for the usual failures
pub async fn bind(config: &WebserverConfig) -> DashResult<TcpListener> {
    let addr = format!("{}:{}", config.host, config.port);
    logger::debug(LogTag::Webserver, &format!("Binding webserver on {}", addr));

    TcpListener::bind((config.host.as_str(), config.port))
        .await
        .map_err(|e| {
            let message = match e.kind() {
                std::io::ErrorKind::AddrInUse => format!(
                    "Failed to bind to {}: Address already in use\n\
                     \n\
                     Another hostdash instance (or another service) is using this port.\n\
                     Stop it or pick a different one with --port.",
                    addr
                ),
                std::io::ErrorKind::PermissionDenied => format!(
                    "Failed to bind to {}: Permission denied\n\
                     \n\
                     Port {} requires elevated privileges on this system.\n\
                     Consider using a port above 1024 or running with appropriate permissions.",
                    addr, config.port
                ),
                _ => format!("Failed to bind to {}: {}", addr, e),
            };
            DashError::Transport(message)
        })
}

/// Router plus middleware
pub fn build_app(state: Arc<AppState>) -> Router {
    let cors = state.config.webserver.cors_allow_any;
    let app = routes::create_router(state);

    if cors {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

/// Serve until `cancel` fires and every broadcaster has drained
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> DashResult<()> {
    if let Ok(addr) = listener.local_addr() {
        logger::info(
            LogTag::Webserver,
            &format!("Webserver listening on http://{}", addr),
        );
        logger::debug(
            LogTag::Webserver,
            &format!("API endpoints available at http://{}/api", addr),
        );
    }

    let app = build_app(state.clone());
    let deadline = state.config.broadcast.shutdown_deadline();

    let shutdown_signal = async move {
        cancel.cancelled().await;
        logger::debug(
            LogTag::Webserver,
            "Received shutdown signal, draining subscriber sessions...",
        );

        let hubs = state.hubs();
        let reports = join_all(hubs.iter().map(|hub| hub.shutdown(deadline))).await;

        for (hub, report) in hubs.iter().zip(reports) {
            logger::debug(
                LogTag::Webserver,
                &format!(
                    "{}: {} session(s), {} drained, {} forced",
                    hub.name(),
                    report.sessions,
                    report.drained,
                    report.forced
                ),
            );
        }
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal)
        .await?;

    logger::debug(LogTag::Webserver, "Webserver stopped gracefully");
    Ok(())
}
