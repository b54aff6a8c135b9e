//! hostdash: host monitoring dashboard core
//!
//! Pluggable probe modules are polled on a schedule and their samples are
//! fanned out to live dashboard viewers over SSE and WebSocket, with a
//! short replay window for reconnecting clients.

pub mod arguments;
pub mod broadcast;
pub mod config;
pub mod errors;
pub mod logger;
pub mod modules;
pub mod probes;
pub mod run;
pub mod scheduler;
pub mod system_events;
pub mod webserver;
