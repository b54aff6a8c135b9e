//! WebSocket transport: wire messages, heartbeat tracking, connection loop

pub mod connection;
pub mod health;
pub mod message;

pub use connection::handle_connection;
pub use health::HealthConfig;
pub use message::{ClientMessage, ServerMessage, WsEnvelope, PROTOCOL_VERSION};
