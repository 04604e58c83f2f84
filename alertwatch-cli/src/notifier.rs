//! Terminal backend for desktop notifications.

use std::collections::HashSet;
use std::io::Write;

use alert_channel::{AppNavigator, DesktopNotification, DesktopNotifier, NotifyError, Permission};
use async_trait::async_trait;
#[cfg(feature = "colored-output")]
use colored::*;
use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::TerminalSettings;

/// Renders notifications as highlighted lines on a terminal stream.
pub struct TerminalNotifier {
    permission: Mutex<Permission>,
    bell: bool,
    colored: bool,
    visible: Mutex<HashSet<String>>,
    out: Mutex<Box<dyn Write + Send>>,
}

impl TerminalNotifier {
    pub fn new(settings: &TerminalSettings) -> Self {
        Self::with_writer(settings, Box::new(std::io::stderr()))
    }

    pub fn with_writer(settings: &TerminalSettings, out: Box<dyn Write + Send>) -> Self {
        Self {
            permission: Mutex::new(settings.permission),
            bell: settings.bell,
            colored: settings.colored,
            visible: Mutex::new(HashSet::new()),
            out: Mutex::new(out),
        }
    }

    fn render(&self, notification: &DesktopNotification, replaced: bool) -> String {
        let marker = if replaced { "updated" } else { "new" };
        let bell = if self.bell { "\x07" } else { "" };

        #[cfg(feature = "colored-output")]
        if self.colored {
            return format!(
                "{bell}{} {} [{}]\n    {}\n",
                "▶".red().bold(),
                notification.title.bold(),
                marker.yellow(),
                notification.body.cyan()
            );
        }

        format!(
            "{bell}> {} [{}]\n    {}\n",
            notification.title, marker, notification.body
        )
    }
}

#[async_trait]
impl DesktopNotifier for TerminalNotifier {
    fn permission(&self) -> Permission {
        *self.permission.lock()
    }

    async fn request_permission(&self) -> Permission {
        let answer = prompt_permission().await;
        *self.permission.lock() = answer;
        answer
    }

    fn show(&self, notification: &DesktopNotification) -> Result<(), NotifyError> {
        let replaced = !self.visible.lock().insert(notification.tag.clone());
        let text = self.render(notification, replaced);
        let mut out = self.out.lock();
        out.write_all(text.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| NotifyError::backend(e.to_string()))
    }

    fn close(&self, tag: &str) {
        if self.visible.lock().remove(tag) {
            debug!(tag, "Notification dismissed");
        }
    }
}

#[cfg(feature = "interactive")]
async fn prompt_permission() -> Permission {
    use std::io::IsTerminal;

    if !std::io::stdin().is_terminal() {
        return Permission::Default;
    }
    let answer = tokio::task::spawn_blocking(|| {
        inquire::Confirm::new("Show notifications for new alerts?")
            .with_default(true)
            .prompt()
    })
    .await;
    match answer {
        Ok(Ok(true)) => Permission::Granted,
        Ok(Ok(false)) => Permission::Denied,
        _ => Permission::Default,
    }
}

#[cfg(not(feature = "interactive"))]
async fn prompt_permission() -> Permission {
    Permission::Default
}

/// Navigation hook handed to the bridge.
///
/// Terminal notifications have no click event, so `listen` never activates
/// one and these methods only run when an embedder forwards an activation
/// through `NotificationBridge::on_activated`. There is no window to raise;
/// activation logs the alerts route instead.
pub struct TerminalNavigator;

impl AppNavigator for TerminalNavigator {
    fn focus(&self) {
        debug!("Focus requested");
    }

    fn navigate(&self, route: &str) {
        info!(route, "Open the alerts view in the portal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn notifier(buf: &SharedBuf) -> TerminalNotifier {
        let settings = TerminalSettings {
            permission: Permission::Granted,
            bell: false,
            colored: false,
        };
        TerminalNotifier::with_writer(&settings, Box::new(buf.clone()))
    }

    fn notification() -> DesktopNotification {
        DesktopNotification {
            tag: "A1".to_string(),
            title: "New high alert: Malware detected".to_string(),
            body: "Acme - risk score 8.5".to_string(),
        }
    }

    #[test]
    fn test_show_renders_and_marks_replacement() {
        let buf = SharedBuf::default();
        let notifier = notifier(&buf);

        notifier.show(&notification()).unwrap();
        notifier.show(&notification()).unwrap();

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(
            text,
            "> New high alert: Malware detected [new]\n    Acme - risk score 8.5\n\
             > New high alert: Malware detected [updated]\n    Acme - risk score 8.5\n"
        );
    }

    #[test]
    fn test_close_allows_fresh_notification() {
        let buf = SharedBuf::default();
        let notifier = notifier(&buf);

        notifier.show(&notification()).unwrap();
        notifier.close("A1");
        notifier.show(&notification()).unwrap();

        let text = String::from_utf8(buf.0.lock().clone()).unwrap();
        assert_eq!(text.matches("[new]").count(), 2);
    }

    #[test]
    fn test_permission_from_settings() {
        let buf = SharedBuf::default();
        assert_eq!(notifier(&buf).permission(), Permission::Granted);
    }
}
