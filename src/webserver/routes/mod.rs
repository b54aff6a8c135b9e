use crate::webserver::state::{AppState, ModuleKey};
use axum::{routing::get, Extension, Router};
use std::sync::Arc;

pub mod current;
pub mod events;
pub mod modules;
pub mod status;
pub mod ws;

/// Build the router for every mounted runtime
///
/// Routes exist only for runtimes present in `state`, so a disabled module
/// has no endpoints at all.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api_routes(&state))
        .with_state(state)
}

fn api_routes(state: &AppState) -> Router<Arc<AppState>> {
    let mut router = Router::new()
        .route("/health", get(status::health_check))
        .route("/modules", get(modules::list_modules));

    for runtime in state.runtimes() {
        let root = runtime.descriptor.route_root.clone();
        router = router.nest(&format!("/{}", root), module_routes(root));
    }
    router
}

/// Stream and snapshot endpoints of one runtime
fn module_routes(root: String) -> Router<Arc<AppState>> {
    Router::new()
        .route("/events", get(events::events_stream))
        .route("/ws", get(ws::ws_handler))
        .route("/current", get(current::current_snapshot))
        .layer(Extension(ModuleKey(root)))
}
