//! Client for the real-time alert notification channel.
//!
//! An [`AlertChannel`] keeps one WebSocket connection to the portal's alert
//! stream, decodes inbound frames and fans `alert` / `integration_status`
//! events out to registered [`Observer`]s. Alerts can additionally be
//! surfaced as desktop notifications through a [`NotificationBridge`].
//!
//! ```no_run
//! use std::sync::Arc;
//! use alert_channel::{AlertChannel, ChannelConfig, ChannelEvent, ObserverResult};
//!
//! # async fn run() -> alert_channel::Result<()> {
//! let channel = AlertChannel::new(ChannelConfig::from_env())?;
//! channel.subscribe(Arc::new(|event: &ChannelEvent| -> ObserverResult {
//!     println!("{}", event.kind());
//!     Ok(())
//! }));
//! channel.connect();
//! let _heartbeat = channel.start_ping();
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod channel;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod frame;
pub mod notify;
pub mod observer;

pub use auth::AccessToken;
pub use channel::{AlertChannel, ConnectionState, PingHandle};
pub use config::ChannelConfig;
pub use dispatch::{Dispatcher, Disposition};
pub use error::{ChannelError, FrameError, NotifyError, Result};
pub use event::{ChannelEvent, EventKind};
pub use frame::{AlertNotice, InboundFrame, IntegrationStatus, OutboundFrame, Severity};
pub use notify::{
    AppNavigator, DesktopNotification, DesktopNotificationConfig, DesktopNotifier,
    NotificationBridge, Permission,
};
pub use observer::{DeliveryReport, Observer, ObserverError, ObserverId, ObserverRegistry, ObserverResult};
