//! Synthetic alert traffic for `serve --demo-interval`.

use std::time::Duration;

use alert_channel::{AlertNotice, Severity};
use alert_stream::{AlertHub, IntegrationRef, IntegrationState};
use chrono::Utc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const CLIENTS: &[&str] = &["Acme", "Globex", "Initech", "Umbrella"];

const DETECTIONS: &[(&str, &str)] = &[
    ("malware", "Malware detected on endpoint"),
    ("brute_force", "Repeated failed logins"),
    ("lateral_movement", "Suspicious SMB session"),
    ("exfiltration", "Unusual outbound transfer volume"),
    ("phishing", "Credential harvesting link clicked"),
];

const INTEGRATIONS: &[&str] = &["Splunk", "Wazuh", "CrowdStrike"];

/// Every Nth tick also publishes an integration status change.
const STATUS_EVERY: u64 = 5;

fn pick<T: Copy>(items: &[T]) -> T {
    items[(rand::random::<u64>() % items.len() as u64) as usize]
}

fn severity_for(risk_score: f64) -> Severity {
    match risk_score {
        s if s >= 9.0 => Severity::Critical,
        s if s >= 7.0 => Severity::High,
        s if s >= 4.0 => Severity::Medium,
        _ => Severity::Low,
    }
}

fn random_ip() -> String {
    format!("10.{}.{}.{}", rand::random::<u8>(), rand::random::<u8>(), rand::random::<u8>() | 1)
}

pub fn synthetic_alert(sequence: u64) -> AlertNotice {
    let (alert_type, title) = pick(DETECTIONS);
    let risk_score = (rand::random::<f64>() * 100.0).round() / 10.0;
    AlertNotice::new(format!("DEMO-{sequence:05}"), pick(CLIENTS), title, risk_score)
        .with_severity(severity_for(risk_score))
        .with_alert_type(alert_type)
        .with_timestamp(Utc::now())
        .with_addresses(random_ip(), random_ip())
}

fn synthetic_status(sequence: u64) -> (IntegrationRef, IntegrationState, &'static str) {
    let integration = IntegrationRef {
        id: format!("demo-{}", sequence % INTEGRATIONS.len() as u64),
        name: pick(INTEGRATIONS).to_string(),
        client: pick(CLIENTS).to_string(),
    };
    if rand::random::<f64>() < 0.3 {
        (integration, IntegrationState::Error, "Authentication failed")
    } else {
        (integration, IntegrationState::Active, "Connection healthy")
    }
}

/// Publish synthetic traffic to the hub until cancelled.
pub async fn run(hub: AlertHub, period: Duration, cancel: CancellationToken) {
    info!(interval = ?period, "Demo alert generator started");
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    let mut sequence = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        sequence += 1;

        let alert = synthetic_alert(sequence);
        match hub.publish_alert(&alert) {
            Ok(receivers) => debug!(alert_id = %alert.alert_id, receivers, "Published demo alert"),
            Err(e) => warn!(error = %e, "Failed to publish demo alert"),
        }

        if sequence % STATUS_EVERY == 0 {
            let (integration, state, message) = synthetic_status(sequence);
            if let Err(e) = hub.publish_integration_status(&integration, state, message) {
                warn!(error = %e, "Failed to publish demo integration status");
            }
        }
    }
    info!("Demo alert generator stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(9.5, Severity::Critical)]
    #[case(7.0, Severity::High)]
    #[case(4.2, Severity::Medium)]
    #[case(0.0, Severity::Low)]
    fn test_severity_for(#[case] score: f64, #[case] expected: Severity) {
        assert_eq!(severity_for(score), expected);
    }

    #[test]
    fn test_synthetic_alert_shape() {
        let alert = synthetic_alert(42);
        assert_eq!(alert.alert_id, "DEMO-00042");
        assert!((0.0..=10.0).contains(&alert.risk_score));
        assert_eq!(alert.severity, Some(severity_for(alert.risk_score)));
        assert!(CLIENTS.contains(&alert.client.as_str()));
        assert!(alert.source_ip().is_some());
    }

    #[tokio::test]
    async fn test_run_publishes_until_cancelled() {
        let hub = AlertHub::default();
        let mut rx = hub.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(hub, Duration::from_millis(10), cancel.clone()));

        let frame = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        let value: serde_json::Value = serde_json::from_str(&frame).unwrap();
        assert_eq!(value["type"], "alert");

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }
}
