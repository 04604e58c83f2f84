//! Typed events fanned out to observers.
//!
//! Only `alert` and `integration_status` frames reach observers; heartbeat
//! replies, subscription confirmations and server-side errors are consumed by
//! the dispatcher and logged.

use serde::Serialize;

use crate::frame::{AlertNotice, IntegrationStatus, TAG_ALERT, TAG_INTEGRATION_STATUS};

/// Kind of an event delivered to observers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Alert,
    IntegrationStatus,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Alert => TAG_ALERT,
            Self::IntegrationStatus => TAG_INTEGRATION_STATUS,
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An event delivered to observers as a `(kind, payload)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum ChannelEvent {
    Alert(AlertNotice),
    IntegrationStatus(IntegrationStatus),
}

impl ChannelEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::Alert(_) => EventKind::Alert,
            Self::IntegrationStatus(_) => EventKind::IntegrationStatus,
        }
    }

    pub fn as_alert(&self) -> Option<&AlertNotice> {
        match self {
            Self::Alert(alert) => Some(alert),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_serialization() {
        let event = ChannelEvent::Alert(AlertNotice::new("A1", "Acme", "Malware detected", 8.5));
        assert_eq!(event.kind(), EventKind::Alert);
        assert_eq!(event.kind().to_string(), "alert");

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "alert");
        assert_eq!(json["payload"]["alert_id"], "A1");
    }

    #[test]
    fn test_integration_status_is_not_alert() {
        let event = ChannelEvent::IntegrationStatus(IntegrationStatus::default());
        assert_eq!(event.kind(), EventKind::IntegrationStatus);
        assert!(event.as_alert().is_none());
    }
}
