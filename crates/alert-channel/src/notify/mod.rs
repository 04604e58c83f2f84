//! Desktop notification bridge.
//!
//! Surfaces inbound alerts as OS-level notifications behind a permission
//! handshake. The platform side is abstracted by [`DesktopNotifier`] (showing
//! and closing notifications) and [`AppNavigator`] (bringing the application
//! forward when the user clicks one).
//!
//! Notifications are tagged with the alert id, so a repeated delivery of the
//! same alert replaces the visible notification and restarts its auto-dismiss
//! timer instead of stacking a duplicate.

pub mod config;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub use config::DesktopNotificationConfig;

use crate::error::NotifyError;
use crate::frame::AlertNotice;

/// Platform permission state for desktop notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    /// The user has not been asked yet.
    Default,
    Granted,
    Denied,
}

/// A notification ready to be displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct DesktopNotification {
    /// Replacement key; showing a notification with an existing tag replaces it.
    pub tag: String,
    pub title: String,
    pub body: String,
}

impl DesktopNotification {
    pub fn for_alert(alert: &AlertNotice) -> Self {
        let title = match alert.severity {
            Some(severity) => format!("New {} alert: {}", severity, alert.title),
            None => format!("New alert: {}", alert.title),
        };
        let mut body = format!("{} - risk score {:.1}", alert.client, alert.risk_score);
        if let Some(source) = alert.source_ip() {
            body.push_str(&format!(" - from {source}"));
        }

        Self {
            tag: alert.alert_id.clone(),
            title,
            body,
        }
    }
}

/// Platform notification backend.
#[async_trait]
pub trait DesktopNotifier: Send + Sync {
    /// Current permission state, without prompting.
    fn permission(&self) -> Permission;

    /// Prompt the user. Only called while the permission is [`Permission::Default`].
    async fn request_permission(&self) -> Permission;

    /// Display a notification, replacing any visible one with the same tag.
    fn show(&self, notification: &DesktopNotification) -> Result<(), NotifyError>;

    /// Close the notification with this tag, if still visible.
    fn close(&self, tag: &str);
}

/// Hook used when the user activates a notification.
pub trait AppNavigator: Send + Sync {
    /// Bring the application window to the foreground.
    fn focus(&self);

    /// Open the given in-app route.
    fn navigate(&self, route: &str);
}

struct DismissTimer {
    generation: u64,
    handle: JoinHandle<()>,
}

type DismissTimers = Arc<Mutex<HashMap<String, DismissTimer>>>;

/// Converts alerts into desktop notifications.
pub struct NotificationBridge {
    notifier: Arc<dyn DesktopNotifier>,
    navigator: Arc<dyn AppNavigator>,
    config: DesktopNotificationConfig,
    timers: DismissTimers,
    generation: AtomicU64,
    prompted: AtomicBool,
}

impl NotificationBridge {
    pub fn new(
        notifier: Arc<dyn DesktopNotifier>,
        navigator: Arc<dyn AppNavigator>,
        config: DesktopNotificationConfig,
    ) -> Self {
        Self {
            notifier,
            navigator,
            config,
            timers: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
            prompted: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &DesktopNotificationConfig {
        &self.config
    }

    pub fn is_granted(&self) -> bool {
        self.notifier.permission() == Permission::Granted
    }

    /// Make sure notifications may be shown, prompting at most once.
    ///
    /// A previous grant or denial is respected without asking again.
    pub async fn request_permission(&self) -> bool {
        match self.notifier.permission() {
            Permission::Granted => true,
            Permission::Denied => false,
            Permission::Default => {
                if self.prompted.swap(true, Ordering::SeqCst) {
                    debug!("Notification permission already requested");
                    return false;
                }
                let granted = self.notifier.request_permission().await == Permission::Granted;
                info!(granted, "Notification permission requested");
                granted
            }
        }
    }

    /// Show a notification for an inbound alert.
    ///
    /// Returns whether a notification was displayed. Without permission the
    /// alert is silently skipped.
    pub fn on_alert(&self, alert: &AlertNotice) -> bool {
        if !self.config.should_deliver(alert) {
            debug!(alert_id = %alert.alert_id, "Alert filtered from desktop notifications");
            return false;
        }
        if !self.is_granted() {
            debug!(alert_id = %alert.alert_id, "Notification permission not granted");
            return false;
        }

        let notification = DesktopNotification::for_alert(alert);
        if let Err(e) = self.notifier.show(&notification) {
            warn!(alert_id = %alert.alert_id, error = %e, "Failed to show desktop notification");
            return false;
        }
        self.schedule_dismiss(&notification.tag);
        true
    }

    /// Handle a click on a notification: focus the app and open the alerts view.
    pub fn on_activated(&self, tag: &str) {
        debug!(tag, "Desktop notification activated");
        self.navigator.focus();
        self.navigator.navigate(&self.config.alerts_route);
        if let Some(timer) = self.timers.lock().remove(tag) {
            timer.handle.abort();
        }
        self.notifier.close(tag);
    }

    /// Number of notifications waiting for auto-dismissal.
    pub fn pending_dismissals(&self) -> usize {
        self.timers.lock().len()
    }

    fn schedule_dismiss(&self, tag: &str) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(tag, "No async runtime; notification will not auto-dismiss");
            return;
        };

        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let delay = self.config.auto_dismiss();
        let notifier = Arc::clone(&self.notifier);
        let timers = Arc::clone(&self.timers);
        let owned_tag = tag.to_string();

        let mut guard = self.timers.lock();
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            let mut timers = timers.lock();
            // A newer delivery of the same alert owns the notification now.
            if timers.get(&owned_tag).is_some_and(|t| t.generation == generation) {
                timers.remove(&owned_tag);
                notifier.close(&owned_tag);
                debug!(tag = %owned_tag, "Desktop notification auto-dismissed");
            }
        });
        if let Some(previous) = guard.insert(tag.to_string(), DismissTimer { generation, handle }) {
            previous.handle.abort();
        }
    }
}

impl Drop for NotificationBridge {
    fn drop(&mut self) {
        for (_, timer) in self.timers.lock().drain() {
            timer.handle.abort();
        }
    }
}
