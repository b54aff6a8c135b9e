//! HTTP surface: SSE and WebSocket streams, JSON snapshots, server lifecycle

pub mod routes;
pub mod server;
pub mod state;
pub mod utils;
pub mod ws;

pub use server::{bind, build_app, serve};
pub use state::{AppState, ModuleKey, ModuleRuntime};
