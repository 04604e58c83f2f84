//! Broadcast hub for the `alerts_stream` group.
//!
//! Every connected socket holds a receiver on one broadcast channel; a
//! publish encodes the frame once and hands it to all of them.

use alert_channel::AlertNotice;
use alert_channel::frame::{TAG_ALERT, TAG_INTEGRATION_STATUS};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::error::Result;

/// Group every client joins.
pub const ALERTS_GROUP: &str = "alerts_stream";

pub const DEFAULT_CHANNEL_CAPACITY: usize = 256;

/// Lifecycle status of a third-party integration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationState {
    Inactive,
    Active,
    Error,
    Testing,
}

impl IntegrationState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Error => "error",
            Self::Testing => "testing",
        }
    }
}

impl std::fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An integration whose status changed.
#[derive(Debug, Clone, PartialEq)]
pub struct IntegrationRef {
    pub id: String,
    pub name: String,
    pub client: String,
}

#[derive(Serialize)]
struct AlertBroadcast<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    alert_id: &'a str,
    client: &'a str,
    severity: Option<&'static str>,
    risk_score: f64,
    title: &'a str,
    alert_type: Option<&'a str>,
    timestamp: DateTime<Utc>,
    source_ip: &'a str,
    destination_ip: &'a str,
}

#[derive(Serialize)]
struct IntegrationStatusBroadcast<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    integration_id: &'a str,
    integration_name: &'a str,
    client: &'a str,
    status: IntegrationState,
    message: &'a str,
    timestamp: DateTime<Utc>,
}

/// Publisher side of the alert stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AlertHub {
    tx: broadcast::Sender<String>,
}

impl Default for AlertHub {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}

impl AlertHub {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn group(&self) -> &'static str {
        ALERTS_GROUP
    }

    /// Join the group. The receiver yields encoded text frames.
    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.tx.subscribe()
    }

    /// Number of sockets currently in the group.
    pub fn client_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Broadcast an `alert` frame. Returns how many clients it was queued for.
    pub fn publish_alert(&self, alert: &AlertNotice) -> Result<usize> {
        let frame = AlertBroadcast {
            kind: TAG_ALERT,
            alert_id: &alert.alert_id,
            client: &alert.client,
            severity: alert.severity.map(|s| s.as_str()),
            risk_score: alert.risk_score,
            title: &alert.title,
            alert_type: alert.alert_type.as_deref(),
            timestamp: alert.timestamp.unwrap_or_else(Utc::now),
            source_ip: &alert.source_ip,
            destination_ip: &alert.destination_ip,
        };
        let delivered = self.broadcast(serde_json::to_string(&frame)?);
        info!(alert_id = %alert.alert_id, clients = delivered, "Alert published");
        Ok(delivered)
    }

    /// Broadcast an `integration_status` frame stamped with the current time.
    pub fn publish_integration_status(
        &self,
        integration: &IntegrationRef,
        status: IntegrationState,
        message: &str,
    ) -> Result<usize> {
        let frame = IntegrationStatusBroadcast {
            kind: TAG_INTEGRATION_STATUS,
            integration_id: &integration.id,
            integration_name: &integration.name,
            client: &integration.client,
            status,
            message,
            timestamp: Utc::now(),
        };
        let delivered = self.broadcast(serde_json::to_string(&frame)?);
        info!(
            integration = %integration.name,
            %status,
            clients = delivered,
            "Integration status published"
        );
        Ok(delivered)
    }

    fn broadcast(&self, text: String) -> usize {
        match self.tx.send(text) {
            Ok(n) => n,
            Err(_) => {
                debug!(group = ALERTS_GROUP, "No clients connected; frame discarded");
                0
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_channel::{InboundFrame, Severity};
    use serde_json::Value;

    fn integration() -> IntegrationRef {
        IntegrationRef {
            id: "7f1c".to_string(),
            name: "Splunk".to_string(),
            client: "Acme".to_string(),
        }
    }

    #[test]
    fn test_publish_without_clients_is_not_an_error() {
        let hub = AlertHub::default();
        let alert = AlertNotice::new("A1", "Acme", "Malware detected", 8.5);
        assert_eq!(hub.publish_alert(&alert).unwrap(), 0);
        assert_eq!(hub.client_count(), 0);
    }

    #[tokio::test]
    async fn test_alert_frame_shape() {
        let hub = AlertHub::default();
        let mut rx = hub.subscribe();
        let alert = AlertNotice::new("A1", "Acme", "Malware detected", 8.5)
            .with_severity(Severity::High)
            .with_alert_type("malware")
            .with_addresses("10.0.0.4", "");

        assert_eq!(hub.publish_alert(&alert).unwrap(), 1);
        let text = rx.recv().await.unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["type"], "alert");
        assert_eq!(value["alert_id"], "A1");
        assert_eq!(value["client"], "Acme");
        assert_eq!(value["severity"], "high");
        assert_eq!(value["risk_score"], 8.5);
        assert_eq!(value["alert_type"], "malware");
        assert_eq!(value["source_ip"], "10.0.0.4");
        assert_eq!(value["destination_ip"], "");
        assert!(value["timestamp"].is_string());

        // Round-trips through the client decoder.
        let InboundFrame::Alert(decoded) = InboundFrame::parse(&text).unwrap() else {
            panic!("expected alert frame");
        };
        assert_eq!(decoded.alert_id, "A1");
        assert_eq!(decoded.severity, Some(Severity::High));
    }

    #[tokio::test]
    async fn test_integration_status_frame_shape() {
        let hub = AlertHub::default();
        let mut rx = hub.subscribe();

        hub.publish_integration_status(&integration(), IntegrationState::Error, "auth failed")
            .unwrap();
        let value: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();

        assert_eq!(value["type"], "integration_status");
        assert_eq!(value["integration_id"], "7f1c");
        assert_eq!(value["integration_name"], "Splunk");
        assert_eq!(value["client"], "Acme");
        assert_eq!(value["status"], "error");
        assert_eq!(value["message"], "auth failed");
        assert!(value["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_every_client_receives_every_frame() {
        let hub = AlertHub::default();
        let mut first = hub.subscribe();
        let mut second = hub.subscribe();
        assert_eq!(hub.client_count(), 2);

        hub.publish_alert(&AlertNotice::new("A1", "Acme", "x", 1.0)).unwrap();
        hub.publish_alert(&AlertNotice::new("A2", "Acme", "x", 2.0)).unwrap();

        for rx in [&mut first, &mut second] {
            assert!(rx.recv().await.unwrap().contains("\"A1\""));
            assert!(rx.recv().await.unwrap().contains("\"A2\""));
        }
    }
}
