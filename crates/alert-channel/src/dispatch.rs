//! Routing of inbound frames.

use std::sync::Arc;

use tracing::{debug, info, trace, warn};

use crate::event::ChannelEvent;
use crate::frame::InboundFrame;
use crate::notify::NotificationBridge;
use crate::observer::ObserverRegistry;

/// What happened to one inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Fanned out to observers.
    Delivered { observers: usize, failed: usize },
    /// Consumed by the channel itself (pong, subscribed, error).
    Handled,
    /// Valid frame with an unrecognized tag.
    Unrecognized,
    /// Not a valid frame; dropped.
    Malformed,
}

/// Parses frames and routes them by tag.
pub struct Dispatcher {
    registry: Arc<ObserverRegistry>,
    bridge: Option<Arc<NotificationBridge>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<ObserverRegistry>) -> Self {
        Self {
            registry,
            bridge: None,
        }
    }

    pub fn with_bridge(mut self, bridge: Arc<NotificationBridge>) -> Self {
        self.bridge = Some(bridge);
        self
    }

    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// Handle one text frame received from the socket.
    pub fn handle_text(&self, text: &str) -> Disposition {
        match InboundFrame::parse(text) {
            Ok(frame) => self.dispatch(frame),
            Err(e) => {
                warn!(error = %e, len = text.len(), "Dropping malformed frame");
                Disposition::Malformed
            }
        }
    }

    pub fn dispatch(&self, frame: InboundFrame) -> Disposition {
        match frame {
            InboundFrame::Alert(alert) => {
                debug!(alert_id = %alert.alert_id, client = %alert.client, "Alert received");
                let event = ChannelEvent::Alert(alert);
                let report = self.registry.notify(&event);
                if let (Some(bridge), ChannelEvent::Alert(alert)) = (&self.bridge, &event) {
                    bridge.on_alert(alert);
                }
                Disposition::Delivered {
                    observers: report.delivered,
                    failed: report.failed,
                }
            }
            InboundFrame::IntegrationStatus(status) => {
                debug!(
                    integration = status.integration_name.as_deref().unwrap_or("-"),
                    status = status.status.as_deref().unwrap_or("-"),
                    "Integration status received"
                );
                let report = self.registry.notify(&ChannelEvent::IntegrationStatus(status));
                Disposition::Delivered {
                    observers: report.delivered,
                    failed: report.failed,
                }
            }
            InboundFrame::Pong { timestamp } => {
                trace!(timestamp = timestamp.as_deref().unwrap_or("-"), "Pong received");
                Disposition::Handled
            }
            InboundFrame::Subscribed { message } => {
                info!(message = message.as_deref().unwrap_or(""), "Subscription confirmed");
                Disposition::Handled
            }
            InboundFrame::Error { message } => {
                warn!(%message, "Server reported an error");
                Disposition::Handled
            }
            InboundFrame::Unknown { tag, .. } => {
                warn!(%tag, "Unrecognized frame type");
                Disposition::Unrecognized
            }
        }
    }
}
