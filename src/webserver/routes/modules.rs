/// Registered modules with their health and broadcaster counters
use axum::extract::State;
use axum::response::Response;
use serde::Serialize;
use std::sync::Arc;

use crate::broadcast::BroadcastMetricsSnapshot;
use crate::modules::{ModuleHealth, ModuleStatus};
use crate::webserver::state::AppState;
use crate::webserver::utils::success_response;

#[derive(Debug, Serialize)]
pub struct ModuleInfo {
    pub name: String,
    pub route_root: String,
    pub topics: Vec<String>,
    /// Topic a stream gets when none is requested
    pub baseline_topic: Option<String>,
    pub enabled: bool,
    pub health: ModuleHealth,
    pub status: Option<ModuleStatus>,
    pub broadcast: Option<BroadcastMetricsSnapshot>,
}

#[derive(Debug, Serialize)]
pub struct ModulesResponse {
    pub modules: Vec<ModuleInfo>,
    pub system: BroadcastMetricsSnapshot,
}

/// GET /api/modules
pub async fn list_modules(State(state): State<Arc<AppState>>) -> Response {
    let modules = state
        .registry
        .descriptors()
        .map(|descriptor| {
            let runtime = if descriptor.enabled {
                state.runtime(&descriptor.route_root).ok()
            } else {
                None
            };

            match runtime {
                Some(runtime) => {
                    let status = runtime.state.status();
                    ModuleInfo {
                        name: descriptor.name.clone(),
                        route_root: descriptor.route_root.clone(),
                        topics: descriptor.topics.clone(),
                        baseline_topic: descriptor.baseline_topic().map(str::to_string),
                        enabled: true,
                        health: status.health.clone(),
                        status: Some(status),
                        broadcast: Some(runtime.hub.metrics()),
                    }
                }
                None => ModuleInfo {
                    name: descriptor.name.clone(),
                    route_root: descriptor.route_root.clone(),
                    topics: descriptor.topics.clone(),
                    baseline_topic: descriptor.baseline_topic().map(str::to_string),
                    enabled: descriptor.enabled,
                    health: ModuleHealth::Disabled(
                        descriptor
                            .disabled_reason
                            .clone()
                            .unwrap_or_else(|| "not running".to_string()),
                    ),
                    status: None,
                    broadcast: None,
                },
            }
        })
        .collect();

    success_response(ModulesResponse {
        modules,
        system: state.system.hub().metrics(),
    })
}

#[cfg(test)]
mod tests {
    use crate::webserver::routes::create_router;
    use crate::webserver::state::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_modules_listing() {
        let state = test_state().await;
        state.runtime("host").unwrap().hub.publish("host", "cpu", b"1".to_vec());

        let response = create_router(state)
            .oneshot(Request::builder().uri("/api/modules").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let modules = json["modules"].as_array().unwrap();
        assert_eq!(modules.len(), 2);

        assert_eq!(modules[0]["name"], "Host");
        assert_eq!(modules[0]["enabled"], true);
        assert_eq!(modules[0]["baseline_topic"], "host");
        assert_eq!(modules[0]["health"]["status"], "starting");
        assert_eq!(modules[0]["broadcast"]["events_published"], 1);

        assert_eq!(modules[1]["name"], "Docker");
        assert_eq!(modules[1]["enabled"], false);
        assert_eq!(modules[1]["health"]["status"], "disabled");
        assert!(modules[1]["status"].is_null());
    }
}
