/// WebSocket transport of a module stream
///
/// `GET /api/<root>/ws?topic=...&since=<seq>`
///
/// The session is opened before the upgrade so an unknown topic is
/// rejected with a plain 400 and the connection is never upgraded.
use axum::extract::{Extension, RawQuery, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::Response;
use std::sync::Arc;

use crate::logger::{self, LogTag};
use crate::webserver::routes::events::StreamRequest;
use crate::webserver::state::{AppState, ModuleKey};
use crate::webserver::utils::error_response;
use crate::webserver::ws::{handle_connection, HealthConfig};

/// GET /api/<root>/ws
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Extension(ModuleKey(root)): Extension<ModuleKey>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let runtime = match state.runtime(&root) {
        Ok(runtime) => runtime,
        Err(e) => {
            logger::error(LogTag::Webserver, &e.to_string());
            return error_response(&e);
        }
    };

    let request = StreamRequest::parse(query.as_deref(), &headers);
    let session = match runtime.hub.subscribe(&request.topics, request.since) {
        Ok(session) => session,
        Err(e) => {
            logger::debug(LogTag::Webserver, &format!("/{}/ws rejected: {}", root, e));
            return error_response(&e);
        }
    };

    logger::debug(
        LogTag::Session,
        &format!(
            "ws session {} on /{} topics={:?} since={:?}",
            session.id(),
            root,
            session.topics(),
            request.since
        ),
    );

    let health = HealthConfig::from(&state.config.webserver);
    ws.on_upgrade(move |socket| handle_connection(socket, session, health))
}
