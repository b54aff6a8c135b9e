/// WebSocket transport for one subscriber session
///
/// Forwards session events as JSON envelopes, answers client pings, and
/// sends heartbeat pings of its own. The loop ends when the session ends
/// (close event delivered, or force-closed), the client disconnects, or the
/// connection goes idle. Dropping the session on exit unsubscribes it.
use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use std::time::Duration;

use crate::broadcast::Session;
use crate::logger::{self, LogTag};

use super::health::{ConnectionHealth, HealthConfig};
use super::message::{ClientMessage, ServerMessage, WsEnvelope, PROTOCOL_VERSION};

/// Normal closure
const CLOSE_NORMAL: u16 = 1000;
/// Server going away
const CLOSE_GOING_AWAY: u16 = 1001;

type WsSink = SplitSink<WebSocket, Message>;

pub async fn handle_connection(socket: WebSocket, session: Session, health_config: HealthConfig) {
    let session_id = session.id();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut health = ConnectionHealth::new(health_config);
    let mut health_tick = tokio::time::interval(Duration::from_secs(1));
    health_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    logger::debug(LogTag::Session, &format!("ws session {} started", session_id));

    loop {
        tokio::select! {
            biased;

            event = session.next_event() => {
                let Some(event) = event else {
                    let _ = close(&mut ws_tx, CLOSE_GOING_AWAY, "session closed").await;
                    break;
                };
                let message = ServerMessage::Data(WsEnvelope::from_event(&event));
                if let Err(e) = send(&mut ws_tx, &message).await {
                    logger::warning(
                        LogTag::Session,
                        &format!("ws session {}: send failed: {}", session_id, e),
                    );
                    break;
                }
                if event.is_close() {
                    let _ = close(&mut ws_tx, CLOSE_NORMAL, "bye").await;
                    break;
                }
            }

            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        health.record_activity();
                        if let Err(e) = handle_client_message(&text, &mut ws_tx, session_id).await {
                            logger::debug(
                                LogTag::Session,
                                &format!("ws session {}: {}", session_id, e),
                            );
                        }
                    }
                    Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {
                        health.record_activity();
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        logger::debug(
                            LogTag::Session,
                            &format!("ws session {}: client closed", session_id),
                        );
                        break;
                    }
                    Some(Err(e)) => {
                        logger::warning(
                            LogTag::Session,
                            &format!("ws session {}: transport error: {}", session_id, e),
                        );
                        break;
                    }
                }
            }

            _ = health_tick.tick() => {
                if health.is_idle() {
                    logger::debug(
                        LogTag::Session,
                        &format!(
                            "ws session {}: idle for {}s, closing",
                            session_id,
                            health.seconds_since_activity()
                        ),
                    );
                    let _ = close(&mut ws_tx, CLOSE_GOING_AWAY, "idle timeout").await;
                    break;
                }
                if health.is_pong_overdue() {
                    logger::debug(LogTag::Session, &format!("ws session {}: pong timeout", session_id));
                    break;
                }
                if health.needs_ping() {
                    if ws_tx.send(Message::Ping(Vec::new())).await.is_err() {
                        break;
                    }
                    health.record_ping();
                }
            }
        }
    }

    if logger::is_debug_enabled(&LogTag::Broadcast) {
        let m = session.metrics();
        logger::debug(
            LogTag::Broadcast,
            &format!(
                "ws session {} ended (delivered={}, dropped={}, peak_queue={})",
                session_id, m.delivered, m.dropped, m.peak_queue_depth
            ),
        );
    }
}

async fn handle_client_message(text: &str, ws_tx: &mut WsSink, session_id: u64) -> Result<(), String> {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            let reply = ServerMessage::Error {
                message: format!("Invalid client message: {}", e),
                code: "invalid_message".to_string(),
            };
            send(ws_tx, &reply).await?;
            return Err(format!("invalid client message: {}", e));
        }
    };

    let reply = match message {
        ClientMessage::Hello { client_id } => {
            logger::debug(
                LogTag::Session,
                &format!("ws session {}: hello from {:?}", session_id, client_id),
            );
            ServerMessage::Ack {
                message: "Hello acknowledged".to_string(),
                context: Some(serde_json::json!({
                    "session_id": session_id,
                    "protocol_version": PROTOCOL_VERSION,
                })),
            }
        }
        ClientMessage::Ping { id } => ServerMessage::Pong { id },
    };
    send(ws_tx, &reply).await
}

async fn send(ws_tx: &mut WsSink, message: &ServerMessage) -> Result<(), String> {
    let json = message
        .to_json()
        .map_err(|e| format!("serialization error: {}", e))?;
    ws_tx
        .send(Message::Text(json))
        .await
        .map_err(|e| format!("send error: {}", e))
}

async fn close(ws_tx: &mut WsSink, code: u16, reason: &'static str) -> Result<(), axum::Error> {
    ws_tx
        .send(Message::Close(Some(CloseFrame {
            code,
            reason: reason.into(),
        })))
        .await
}
