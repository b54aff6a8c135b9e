/// Process-wide system event stream served on `/api/systemevents`
///
/// Carries lifecycle notices (which modules started, which were disabled)
/// to every dashboard regardless of which module pages it has open.
use crate::broadcast::{Broadcaster, Sequence};
use crate::config::BroadcastConfig;
use crate::errors::DashResult;
use crate::logger::{self, LogTag};
use serde::Serialize;
use std::sync::Arc;

pub const SYSTEM_TOPIC: &str = "system";
pub const SYSTEM_ROUTE_ROOT: &str = "systemevents";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemEventKind {
    Info,
    Warning,
    Error,
    Message,
}

impl SystemEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SystemEventKind::Info => "systeminfo",
            SystemEventKind::Warning => "systemwarning",
            SystemEventKind::Error => "systemerror",
            SystemEventKind::Message => "systemmessage",
        }
    }
}

#[derive(Debug, Serialize)]
struct SystemPayload<'a> {
    message: &'a str,
}

#[derive(Clone)]
pub struct SystemEvents {
    hub: Arc<Broadcaster>,
}

impl SystemEvents {
    pub fn new(config: &BroadcastConfig) -> DashResult<Self> {
        Ok(Self {
            hub: Broadcaster::new("System", &[SYSTEM_TOPIC], config)?,
        })
    }

    pub fn hub(&self) -> &Arc<Broadcaster> {
        &self.hub
    }

    pub fn publish(&self, kind: SystemEventKind, message: &str) -> Sequence {
        let payload = match serde_json::to_vec(&SystemPayload { message }) {
            Ok(bytes) => bytes,
            Err(e) => {
                logger::error(LogTag::System, &format!("Failed to encode system event: {}", e));
                return 0;
            }
        };
        self.hub.publish(SYSTEM_TOPIC, kind.as_str(), payload)
    }

    pub fn info(&self, message: &str) -> Sequence {
        self.publish(SystemEventKind::Info, message)
    }

    pub fn warning(&self, message: &str) -> Sequence {
        self.publish(SystemEventKind::Warning, message)
    }

    pub fn error(&self, message: &str) -> Sequence {
        self.publish(SystemEventKind::Error, message)
    }

    pub fn message(&self, message: &str) -> Sequence {
        self.publish(SystemEventKind::Message, message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_system_events_on_system_topic() {
        let events = SystemEvents::new(&BroadcastConfig::default()).unwrap();
        let session = events.hub().subscribe::<&str>(&[], None).unwrap();

        events.info("Host enabled");
        events.warning("Docker disabled: probe failed");

        let first = session.next_event().await.unwrap();
        assert_eq!(first.topic, SYSTEM_TOPIC);
        assert_eq!(first.kind, "systeminfo");
        assert_eq!(first.payload_str(), r#"{"message":"Host enabled"}"#);

        let second = session.next_event().await.unwrap();
        assert_eq!(second.kind, "systemwarning");
    }
}
