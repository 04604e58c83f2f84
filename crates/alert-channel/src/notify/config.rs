//! Desktop notification settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::frame::AlertNotice;

/// Default time a notification stays on screen.
pub const DEFAULT_AUTO_DISMISS_SECS: u64 = 10;

/// Route the application opens when a notification is activated.
pub const DEFAULT_ALERTS_ROUTE: &str = "/alerts";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DesktopNotificationConfig {
    pub enabled: bool,
    /// Alerts scoring below this are not surfaced.
    pub min_risk_score: Option<f64>,
    pub auto_dismiss_secs: u64,
    pub alerts_route: String,
}

impl Default for DesktopNotificationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_risk_score: None,
            auto_dismiss_secs: DEFAULT_AUTO_DISMISS_SECS,
            alerts_route: DEFAULT_ALERTS_ROUTE.to_string(),
        }
    }
}

impl DesktopNotificationConfig {
    pub fn auto_dismiss(&self) -> Duration {
        Duration::from_secs(self.auto_dismiss_secs)
    }

    pub fn should_deliver(&self, alert: &AlertNotice) -> bool {
        if !self.enabled {
            return false;
        }
        match self.min_risk_score {
            Some(min) => alert.risk_score >= min,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = DesktopNotificationConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.auto_dismiss(), Duration::from_secs(10));
        assert_eq!(cfg.alerts_route, "/alerts");
    }

    #[test]
    fn test_should_deliver_threshold() {
        let cfg = DesktopNotificationConfig {
            min_risk_score: Some(7.0),
            ..Default::default()
        };
        assert!(cfg.should_deliver(&AlertNotice::new("A1", "Acme", "x", 8.5)));
        assert!(cfg.should_deliver(&AlertNotice::new("A2", "Acme", "x", 7.0)));
        assert!(!cfg.should_deliver(&AlertNotice::new("A3", "Acme", "x", 6.9)));
    }

    #[test]
    fn test_disabled_delivers_nothing() {
        let cfg = DesktopNotificationConfig {
            enabled: false,
            ..Default::default()
        };
        assert!(!cfg.should_deliver(&AlertNotice::new("A1", "Acme", "x", 10.0)));
    }

    #[test]
    fn test_partial_deserialize_uses_defaults() {
        let cfg: DesktopNotificationConfig =
            serde_json::from_str(r#"{"min_risk_score": 5.5}"#).unwrap();
        assert_eq!(cfg.min_risk_score, Some(5.5));
        assert_eq!(cfg.auto_dismiss_secs, DEFAULT_AUTO_DISMISS_SECS);
        assert!(cfg.enabled);
    }
}
