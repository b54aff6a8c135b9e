//! Event broadcast core
//!
//! Probes publish into a [`Broadcaster`]; every connected viewer holds a
//! [`Session`] that receives the events matching its topics, in publish
//! order, with optional replay of the last few minutes on reconnect.
//!
//! Delivery is at-most-once per session: a session that falls behind by more
//! than its queue capacity loses its oldest undelivered events.

mod broadcaster;
mod event;
mod metrics;
mod replay;
mod session;


pub use broadcaster::{Broadcaster, BroadcasterPhase, ShutdownReport};
pub use event::{Event, Sequence, CLOSE_KIND, CLOSE_PAYLOAD, SHUTDOWN_TOPIC};
pub use metrics::{BroadcastMetricsSnapshot, SessionMetricsSnapshot};
pub use replay::ReplayWindow;
pub use session::{Session, SessionId, SessionState, Subscription};
