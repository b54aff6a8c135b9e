/// Server-Sent Events transport
///
/// `GET /api/<root>/events?topic=a&topic=b,c&since=<seq>`
///
/// Topics may be repeated or comma separated; none selects the module's
/// baseline topic. The replay cursor comes from `Last-Event-ID` (sent by
/// browsers on reconnect) or else from `since`. An unknown topic is
/// answered with 400 before any stream is opened.
use axum::extract::{Extension, RawQuery, State};
use axum::http::HeaderMap;
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures::stream::{self, Stream};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use crate::broadcast::{Event, Sequence, Session};
use crate::logger::{self, LogTag};
use crate::webserver::state::{AppState, ModuleKey};
use crate::webserver::utils::error_response;

pub const LAST_EVENT_ID: &str = "last-event-id";

/// Topic filter and replay cursor parsed from one stream request
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamRequest {
    pub topics: Vec<String>,
    pub since: Option<Sequence>,
}

impl StreamRequest {
    /// Malformed cursors are ignored rather than rejected
    pub fn parse(query: Option<&str>, headers: &HeaderMap) -> Self {
        let mut request = StreamRequest::default();
        let mut since_param = None;

        if let Some(query) = query {
            for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
                match key.as_ref() {
                    "topic" => request.topics.extend(
                        value
                            .split(',')
                            .map(str::trim)
                            .filter(|t| !t.is_empty())
                            .map(str::to_string),
                    ),
                    "since" => since_param = value.trim().parse::<Sequence>().ok(),
                    _ => {}
                }
            }
        }

        let last_event_id = headers
            .get(LAST_EVENT_ID)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<Sequence>().ok());

        request.since = last_event_id.or(since_param);
        request
    }
}

/// GET /api/<root>/events
pub async fn events_stream(
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
            logger::debug(
                LogTag::Webserver,
                &format!("/{}/events rejected: {}", root, e),
            );
            return error_response(&e);
        }
    };

    logger::debug(
        LogTag::Session,
        &format!(
            "sse session {} on /{} topics={:?} since={:?}",
            session.id(),
            root,
            session.topics(),
            request.since
        ),
    );

    let keepalive = Duration::from_secs(state.config.webserver.sse_keepalive_secs.max(1));
    Sse::new(session_stream(session))
        .keep_alive(KeepAlive::new().interval(keepalive))
        .into_response()
}

/// Turn a session into an SSE stream that ends after the close event
pub(crate) fn session_stream(
    session: Session,
) -> impl Stream<Item = Result<SseEvent, Infallible>> + Send + 'static {
    stream::unfold(Some(session), |session| async move {
        let session = session?;
        let Some(event) = session.next_event().await else {
            log_session_end(&session);
            return None;
        };

        let sse = to_sse_event(&event);
        if event.is_close() {
            log_session_end(&session);
            Some((Ok(sse), None))
        } else {
            Some((Ok(sse), Some(session)))
        }
    })
}

fn to_sse_event(event: &Event) -> SseEvent {
    // data may not carry '\r'; axum splits it on '\n' into data lines
    let data = event.payload_str().replace('\r', "");
    SseEvent::default()
        .id(event.sequence.to_string())
        .event(sanitize_field(&event.kind))
        .data(data)
}

fn sanitize_field(value: &str) -> String {
    value.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

fn log_session_end(session: &Session) {
    if logger::is_debug_enabled(&LogTag::Broadcast) {
        let m = session.metrics();
        logger::debug(
            LogTag::Broadcast,
            &format!(
                "sse session {} ended (delivered={}, dropped={}, replayed={}, peak_queue={})",
                session.id(),
                m.delivered,
                m.dropped,
                m.replayed,
                m.peak_queue_depth
            ),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webserver::routes::create_router;
    use crate::webserver::state::tests::test_state;
    use axum::body::{to_bytes, Body};
    use axum::http::{HeaderValue, Request, StatusCode};
    use tower::ServiceExt;

    #[test]
    fn test_parse_topics_and_cursor() {
        let mut headers = HeaderMap::new();
        let request = StreamRequest::parse(Some("topic=host&topic=a,%20b&since=12"), &headers);
        assert_eq!(request.topics, vec!["host", "a", "b"]);
        assert_eq!(request.since, Some(12));

        headers.insert(LAST_EVENT_ID, HeaderValue::from_static("40"));
        let request = StreamRequest::parse(Some("since=12"), &headers);
        assert!(request.topics.is_empty());
        assert_eq!(request.since, Some(40));

        let request = StreamRequest::parse(Some("since=abc&topic="), &HeaderMap::new());
        assert_eq!(request, StreamRequest::default());
        assert_eq!(StreamRequest::parse(None, &HeaderMap::new()), StreamRequest::default());
    }

    #[tokio::test]
    async fn test_unknown_topic_is_rejected_before_streaming() {
        let state = test_state().await;
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/host/events?topic=nope")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"]["code"], "unknown_topic");
        assert!(json["error"]["message"].as_str().unwrap().contains("\"host\""));

        assert_eq!(state.runtime("host").unwrap().hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_stream_replays_then_closes_on_shutdown() {
        let state = test_state().await;
        let hub = state.runtime("host").unwrap().hub.clone();
        hub.publish("host", "cpu", b"10".to_vec());
        hub.publish("host-extra", "x", b"skip".to_vec());
        hub.publish("host", "mem", b"{\"used\":1}".to_vec());

        let app = create_router(state.clone());
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/host/events?since=1")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get("content-type").unwrap(),
            "text/event-stream"
        );
        assert_eq!(hub.session_count(), 1);

        let reader = tokio::spawn(async move {
            to_bytes(response.into_body(), usize::MAX).await.unwrap()
        });
        let report = hub.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.forced, 0);

        let body = reader.await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("id: 3\n"));
        assert!(text.contains("event: mem\n"));
        assert!(text.contains("data: {\"used\":1}\n"));
        assert!(!text.contains("event: cpu"));
        assert!(!text.contains("skip"));
        assert!(text.contains("event: close\n"));
        assert!(text.contains("data: bye\n"));
        assert_eq!(hub.session_count(), 0);
    }

    #[tokio::test]
    async fn test_system_events_route_is_mounted() {
        let state = test_state().await;
        let app = create_router(state.clone());

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/systemevents/events")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.system.hub().session_count(), 1);
    }
}
