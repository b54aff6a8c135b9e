/// Latest known state of a module, independent of the push stream
use axum::extract::{Extension, State};
use axum::response::Response;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::logger::{self, LogTag};
use crate::webserver::state::{AppState, ModuleKey};
use crate::webserver::utils::{error_response, success_response};

#[derive(Debug, Serialize)]
pub struct CurrentResponse {
    pub module: String,
    pub last_success: Option<DateTime<Utc>>,
    pub last_sequence: u64,
    /// Latest payload per sample kind
    pub data: serde_json::Value,
}

/// GET /api/<root>/current
pub async fn current_snapshot(
    State(state): State<Arc<AppState>>,
    Extension(ModuleKey(root)): Extension<ModuleKey>,
) -> Response {
    let runtime = match state.runtime(&root) {
        Ok(runtime) => runtime,
        Err(e) => {
            logger::error(LogTag::Webserver, &e.to_string());
            return error_response(&e);
        }
    };

    success_response(CurrentResponse {
        module: runtime.descriptor.name.clone(),
        last_success: runtime.state.status().last_success,
        last_sequence: runtime.hub.last_sequence(),
        data: runtime.state.snapshot(),
    })
}

#[cfg(test)]
mod tests {
    use crate::modules::Sample;
    use crate::webserver::routes::create_router;
    use crate::webserver::state::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    #[tokio::test]
    async fn test_current_returns_latest_per_kind() {
        let state = test_state().await;
        let runtime = state.runtime("host").unwrap();
        runtime.state.record_success(&[
            Sample::new("host", "cpu", 10u32).unwrap(),
            Sample::new("host", "load", serde_json::json!({"load1": 0.5})).unwrap(),
        ]);
        runtime
            .state
            .record_success(&[Sample::new("host", "cpu", 42u32).unwrap()]);

        let response = create_router(state.clone())
            .oneshot(Request::builder().uri("/api/host/current").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["module"], "Host");
        assert_eq!(json["data"]["cpu"], 42);
        assert_eq!(json["data"]["load"]["load1"], 0.5);
        assert!(json["last_success"].is_string());
    }

    #[tokio::test]
    async fn test_disabled_module_is_not_routed() {
        let state = test_state().await;
        let response = create_router(state)
            .oneshot(
                Request::builder()
                    .uri("/api/virt/docker/current")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
