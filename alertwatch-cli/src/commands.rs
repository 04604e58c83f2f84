use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alert_channel::{
    AlertChannel, ConnectionState, DesktopNotifier, NotificationBridge, Permission,
};
use alert_stream::AlertStreamServer;
use tracing::{debug, info, warn};

use crate::{
    cli::OutputFormat,
    config::AppConfig,
    demo,
    error::{AppError, Result},
    notifier::{TerminalNavigator, TerminalNotifier},
    output::OutputManager,
};

/// Token lifetime printed for demo clients when the server requires auth.
const DEMO_TOKEN_TTL_SECS: u64 = 3600;

pub struct CommandExecutor {
    config: AppConfig,
    config_path: Option<PathBuf>,
}

impl CommandExecutor {
    pub fn new(config: AppConfig, config_path: Option<PathBuf>) -> Self {
        Self {
            config,
            config_path,
        }
    }

    /// Connect, print events and surface alerts until interrupted or the
    /// channel gives up reconnecting.
    pub async fn listen(
        &self,
        url: Option<String>,
        token: Option<String>,
        no_notify: bool,
        output: OutputFormat,
    ) -> Result<()> {
        let mut channel_config = self.config.channel.clone();
        if let Some(url) = url {
            channel_config.url = url;
        }
        if token.is_some() {
            channel_config.access_token = token;
        }

        let channel = if no_notify || !self.config.notifications.enabled {
            debug!("Desktop notifications disabled");
            AlertChannel::new(channel_config)?
        } else {
            AlertChannel::with_bridge(channel_config, self.notification_bridge().await)?
        };

        let printer = OutputManager::new(self.config.terminal.colored, output);
        channel.subscribe(printer.observer());

        let mut changes = channel.state_changes();
        channel.connect();
        let ping = channel.start_ping();

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Received Ctrl+C, disconnecting");
                    break Ok(());
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        break Ok(());
                    }
                    let state = *changes.borrow_and_update();
                    info!(%state, "Connection state changed");
                    if state == ConnectionState::Disconnected && !channel.is_running() {
                        break Err(AppError::ChannelStopped {
                            url: channel.config().url.clone(),
                            attempts: channel.reconnect_attempts(),
                        });
                    }
                }
            }
        };

        ping.stop().await;
        channel.disconnect();
        result
    }

    async fn notification_bridge(&self) -> Arc<NotificationBridge> {
        let notifier = Arc::new(TerminalNotifier::new(&self.config.terminal));
        let bridge = Arc::new(NotificationBridge::new(
            notifier.clone(),
            Arc::new(TerminalNavigator),
            self.config.notifications.clone(),
        ));

        let before = notifier.permission();
        bridge.request_permission().await;
        let after = notifier.permission();
        if before == Permission::Default && after != Permission::Default {
            if let Err(e) = AppConfig::remember_permission(self.config_path.as_deref(), after) {
                warn!(error = %e, "Could not store notification permission");
            }
        }
        bridge
    }

    /// Run the streaming server, optionally feeding it synthetic alerts.
    pub async fn serve(
        &self,
        bind: Option<String>,
        demo_interval: Option<u64>,
        jwt_secret: Option<String>,
    ) -> Result<()> {
        let mut server_config = self.config.server.clone();
        if let Some(bind) = bind {
            let addr: SocketAddr = bind
                .parse()
                .map_err(|e| AppError::config(format!("invalid bind address '{bind}': {e}")))?;
            server_config.bind_address = addr.ip().to_string();
            server_config.port = addr.port();
        }
        if jwt_secret.is_some() {
            server_config.jwt_secret = jwt_secret;
        }

        let server = Arc::new(AlertStreamServer::new(server_config));

        let demo_task = match demo_interval {
            Some(0) => return Err(AppError::config("--demo-interval must be at least 1 second")),
            Some(secs) => {
                if let Some(validator) = server.validator() {
                    match validator.issue("alertwatch-demo", DEMO_TOKEN_TTL_SECS) {
                        Ok(token) => info!(token = %token, "Demo client token"),
                        Err(e) => warn!(error = %e, "Could not issue a demo token"),
                    }
                }
                Some(tokio::spawn(demo::run(
                    server.hub(),
                    Duration::from_secs(secs),
                    server.cancel_token().child_token(),
                )))
            }
            None => None,
        };

        let signal_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, shutting down");
                    server.shutdown();
                }
            })
        };

        let result = server.run().await;
        signal_task.abort();
        server.shutdown();
        if let Some(task) = demo_task {
            let _ = task.await;
        }
        Ok(result?)
    }
}
