//! The alert notification channel.
//!
//! One [`AlertChannel`] owns at most one WebSocket connection. The socket, the
//! reconnect counter and the retry timer belong to a single driver task; the
//! public operations only touch shared state or enqueue frames for it, so
//! none of them block.
//!
//! Reconnection uses a fixed delay and a bounded budget: after a failed or
//! lost connection the driver retries while fewer than
//! `max_reconnect_attempts` consecutive retries have been made, and stops for
//! good once the budget is spent. A successful open resets the budget.
//! [`AlertChannel::connect`] after the driver stopped starts over.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::auth::AccessToken;
use crate::config::{ChannelConfig, saturating_millis};
use crate::dispatch::Dispatcher;
use crate::error::Result;
use crate::frame::OutboundFrame;
use crate::notify::NotificationBridge;
use crate::observer::{Observer, ObserverId, ObserverRegistry};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connectivity of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutable lifecycle data, guarded by one lock.
struct Control {
    /// Identifies the driver allowed to mutate shared state. Bumped by
    /// `connect` and `disconnect`, so a detached driver becomes inert.
    generation: u64,
    running: bool,
    /// Parent of the driver and heartbeat tokens; replaced on disconnect.
    epoch: CancellationToken,
    /// Present only while connected.
    outbound: Option<mpsc::UnboundedSender<Message>>,
}

struct Shared {
    config: ChannelConfig,
    endpoint: Url,
    token: Option<AccessToken>,
    state: watch::Sender<ConnectionState>,
    attempts: AtomicU32,
    registry: Arc<ObserverRegistry>,
    dispatcher: Dispatcher,
    control: Mutex<Control>,
}

impl Shared {
    /// Run `f` only if `generation` still owns the channel.
    fn update<R>(&self, generation: u64, f: impl FnOnce(&mut Control) -> R) -> Option<R> {
        let mut control = self.control.lock();
        if control.generation == generation {
            Some(f(&mut control))
        } else {
            None
        }
    }

    /// Queue a frame if connected. Returns whether it was queued.
    fn try_send(&self, frame: &OutboundFrame) -> bool {
        let control = self.control.lock();
        let Some(tx) = control.outbound.as_ref() else {
            return false;
        };
        if *self.state.borrow() != ConnectionState::Connected {
            return false;
        }
        match frame.to_text() {
            Ok(text) => tx.send(Message::text(text)).is_ok(),
            Err(e) => {
                warn!(kind = frame.kind(), error = %e, "Failed to encode outbound frame");
                false
            }
        }
    }
}

/// Handle to a heartbeat loop started by [`AlertChannel::start_ping`].
///
/// Dropping the handle leaves the loop running; call [`PingHandle::stop`] or
/// disconnect the channel to end it.
#[derive(Debug)]
pub struct PingHandle {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl PingHandle {
    /// Stop the heartbeat and wait for the loop to exit.
    pub async fn stop(self) {
        self.token.cancel();
        let _ = self.handle.await;
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

/// Client side of the real-time alert channel.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct AlertChannel {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for AlertChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertChannel")
            .field("url", &self.shared.config.url)
            .field("state", &self.state())
            .field("reconnect_attempts", &self.reconnect_attempts())
            .finish()
    }
}

impl AlertChannel {
    /// Create a disconnected channel.
    ///
    /// Fails if the endpoint is not a `ws`/`wss` URL or the access token
    /// cannot be decoded.
    pub fn new(config: ChannelConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// Create a disconnected channel that also surfaces alerts as desktop
    /// notifications.
    pub fn with_bridge(config: ChannelConfig, bridge: Arc<NotificationBridge>) -> Result<Self> {
        Self::build(config, Some(bridge))
    }

    fn build(config: ChannelConfig, bridge: Option<Arc<NotificationBridge>>) -> Result<Self> {
        let endpoint = config.endpoint()?;
        let token = config
            .access_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .map(AccessToken::parse)
            .transpose()?;

        let registry = Arc::new(ObserverRegistry::new());
        let mut dispatcher = Dispatcher::new(Arc::clone(&registry));
        if let Some(bridge) = bridge {
            dispatcher = dispatcher.with_bridge(bridge);
        }
        let (state, _) = watch::channel(ConnectionState::Disconnected);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                endpoint,
                token,
                state,
                attempts: AtomicU32::new(0),
                registry,
                dispatcher,
                control: Mutex::new(Control {
                    generation: 0,
                    running: false,
                    epoch: CancellationToken::new(),
                    outbound: None,
                }),
            }),
        })
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.shared.config
    }

    pub fn state(&self) -> ConnectionState {
        *self.shared.state.borrow()
    }

    /// Receiver notified on every state transition.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state.subscribe()
    }

    /// Consecutive reconnect attempts since the last successful open.
    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.attempts.load(Ordering::SeqCst)
    }

    /// Whether a driver is connecting, connected or waiting to retry.
    pub fn is_running(&self) -> bool {
        self.shared.control.lock().running
    }

    pub fn observer_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Open the connection in the background.
    ///
    /// Ignored while a driver is already active. After the driver gave up or
    /// was disconnected, starts over with a fresh reconnect budget.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn connect(&self) {
        let mut control = self.shared.control.lock();
        if control.running {
            debug!(state = %self.state(), "Connect ignored; channel already active");
            return;
        }

        control.generation += 1;
        control.running = true;
        let generation = control.generation;
        let cancel = control.epoch.child_token();
        self.shared.attempts.store(0, Ordering::SeqCst);
        self.shared.state.send_replace(ConnectionState::Connecting);
        drop(control);

        info!(url = %self.shared.config.url, "Connecting to alert channel");
        tokio::spawn(drive(Arc::clone(&self.shared), generation, cancel));
    }

    /// Close the connection and stop all background work.
    ///
    /// Sends a close frame if a socket is open, cancels a pending reconnect
    /// and every heartbeat loop, and removes all observers. The channel does
    /// not reconnect until [`AlertChannel::connect`] is called again.
    pub fn disconnect(&self) {
        let mut control = self.shared.control.lock();
        control.generation += 1;
        control.running = false;
        control.outbound = None;
        control.epoch.cancel();
        control.epoch = CancellationToken::new();
        self.shared.state.send_replace(ConnectionState::Disconnected);
        drop(control);

        let removed = self.shared.registry.clear();
        info!(observers_removed = removed, "Disconnected from alert channel");
    }

    /// Send a frame to the server.
    ///
    /// Only delivered while connected; otherwise the frame is dropped with a
    /// warning.
    pub fn send(&self, frame: &OutboundFrame) {
        if !self.shared.try_send(frame) {
            warn!(kind = frame.kind(), state = %self.state(), "Channel not connected; frame dropped");
        }
    }

    /// Register an observer for `alert` and `integration_status` events.
    ///
    /// Also asks the server to subscribe this connection when connected.
    pub fn subscribe(&self, observer: Arc<dyn Observer>) -> ObserverId {
        let id = self.shared.registry.subscribe(observer);
        if !self.shared.try_send(&OutboundFrame::subscribe()) {
            trace!(%id, "Subscribe frame not sent; channel not connected");
        }
        id
    }

    /// Remove an observer. No event dispatched after this returns reaches it.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.shared.registry.unsubscribe(id)
    }

    /// Start a heartbeat sending `ping` every `ping_interval` while connected.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn start_ping(&self) -> PingHandle {
        let token = self.shared.control.lock().epoch.child_token();
        let period = self.shared.config.ping_interval();
        let shared = Arc::clone(&self.shared);
        let loop_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = loop_token.cancelled() => break,
                    _ = ticker.tick() => {
                        if shared.try_send(&OutboundFrame::ping()) {
                            trace!("Heartbeat sent");
                        } else {
                            trace!("Heartbeat skipped; channel not connected");
                        }
                    }
                }
            }
            debug!("Heartbeat stopped");
        });

        PingHandle { token, handle }
    }
}

enum SessionEnd {
    Cancelled,
    Lost,
}

async fn drive(shared: Arc<Shared>, generation: u64, cancel: CancellationToken) {
    let max_attempts = shared.config.max_reconnect_attempts;
    let delay = shared.config.reconnect_delay();

    loop {
        shared.update(generation, |_| {
            shared.state.send_replace(ConnectionState::Connecting);
        });

        let opened = tokio::select! {
            _ = cancel.cancelled() => break,
            result = open(&shared) => result,
        };

        match opened {
            Ok(socket) => {
                let (tx, rx) = mpsc::unbounded_channel();
                let installed = shared.update(generation, |control| {
                    shared.attempts.store(0, Ordering::SeqCst);
                    control.outbound = Some(tx.clone());
                    shared.state.send_replace(ConnectionState::Connected);
                });
                if installed.is_none() {
                    break;
                }
                info!(url = %shared.config.url, "Alert channel connected");

                match OutboundFrame::ping().to_text() {
                    Ok(text) => {
                        let _ = tx.send(Message::text(text));
                    }
                    Err(e) => warn!(error = %e, "Failed to encode initial ping"),
                }
                drop(tx);

                let end = run_session(&shared, socket, rx, &cancel).await;
                shared.update(generation, |control| {
                    control.outbound = None;
                    shared.state.send_replace(ConnectionState::Disconnected);
                });
                if matches!(end, SessionEnd::Cancelled) {
                    break;
                }
            }
            Err(e) if !e.is_retryable() => {
                error!(error = %e, "Cannot connect to alert channel; not retrying");
                break;
            }
            Err(e) => {
                warn!(error = %e, "Failed to connect to alert channel");
                shared.update(generation, |_| {
                    shared.state.send_replace(ConnectionState::Disconnected);
                });
            }
        }

        let attempt = shared.attempts.load(Ordering::SeqCst);
        if attempt >= max_attempts {
            error!(
                attempts = attempt,
                "Alert channel reconnect attempts exhausted; giving up"
            );
            break;
        }
        let attempt = attempt + 1;
        shared.update(generation, |_| shared.attempts.store(attempt, Ordering::SeqCst));
        info!(
            attempt,
            max_attempts,
            delay_ms = saturating_millis(delay),
            "Reconnecting to alert channel"
        );

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    shared.update(generation, |control| {
        control.running = false;
        control.outbound = None;
        shared.state.send_replace(ConnectionState::Disconnected);
    });
    debug!(generation, "Alert channel driver stopped");
}

/// One connection attempt. The token is checked first so an expired one
/// never reaches the server.
async fn open(shared: &Shared) -> Result<Socket> {
    if let Some(token) = &shared.token {
        token.ensure_valid()?;
    }
    let (socket, _) = connect_async(shared.endpoint.as_str()).await?;
    Ok(socket)
}

async fn run_session(
    shared: &Shared,
    socket: Socket,
    mut outbound: mpsc::UnboundedReceiver<Message>,
    cancel: &CancellationToken,
) -> SessionEnd {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    debug!(error = %e, "Error closing alert channel socket");
                }
                return SessionEnd::Cancelled;
            }

            Some(message) = outbound.recv() => {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "Failed to write to alert channel");
                    return SessionEnd::Lost;
                }
            }

            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    shared.dispatcher.handle_text(text.as_str());
                }
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => {
                        shared.dispatcher.handle_text(text);
                    }
                    Err(_) => warn!(len = bytes.len(), "Dropping non-UTF-8 binary frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(?frame, "Alert channel closed by server");
                    return SessionEnd::Lost;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Alert channel connection error");
                    return SessionEnd::Lost;
                }
                None => {
                    warn!("Alert channel stream ended");
                    return SessionEnd::Lost;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ChannelError;
    use crate::event::ChannelEvent;
    use crate::observer::ObserverResult;

    #[test]
    fn test_new_rejects_bad_endpoint() {
        assert!(AlertChannel::new(ChannelConfig::new("https://example.com/ws")).is_err());
        assert!(AlertChannel::new(ChannelConfig::new("ws://")).is_err());
    }

    #[test]
    fn test_new_rejects_malformed_token() {
        let config = ChannelConfig::default().with_access_token("not-a-jwt");
        assert!(matches!(
            AlertChannel::new(config),
            Err(ChannelError::MalformedToken(_))
        ));
    }

    #[test]
    fn test_initial_state() {
        let channel = AlertChannel::new(ChannelConfig::default()).unwrap();
        assert_eq!(channel.state(), ConnectionState::Disconnected);
        assert_eq!(channel.reconnect_attempts(), 0);
        assert!(!channel.is_running());
    }

    #[test]
    fn test_send_while_disconnected_is_noop() {
        let channel = AlertChannel::new(ChannelConfig::default()).unwrap();
        channel.send(&OutboundFrame::ping());
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_disconnect_clears_observers() {
        let channel = AlertChannel::new(ChannelConfig::default()).unwrap();
        let noop = |_: &ChannelEvent| -> ObserverResult { Ok(()) };
        channel.subscribe(Arc::new(noop));
        channel.subscribe(Arc::new(noop));
        assert_eq!(channel.observer_count(), 2);

        channel.disconnect();
        assert_eq!(channel.observer_count(), 0);
        assert_eq!(channel.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Connecting.to_string(), "connecting");
        assert_eq!(
            serde_json::to_value(ConnectionState::Connected).unwrap(),
            "connected"
        );
    }

    #[tokio::test]
    async fn test_ping_handle_stops() {
        let channel = AlertChannel::new(ChannelConfig::default()).unwrap();
        let ping = channel.start_ping();
        assert!(ping.is_active());
        ping.stop().await;
    }

    #[tokio::test]
    async fn test_disconnect_cancels_ping() {
        let channel = AlertChannel::new(ChannelConfig::default()).unwrap();
        let ping = channel.start_ping();
        channel.disconnect();
        assert!(!ping.is_active());
    }
}
