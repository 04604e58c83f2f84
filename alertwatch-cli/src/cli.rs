use clap::{Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "alertwatch")]
#[command(about = "Terminal client and demo server for the SOC real-time alert channel")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Connect to an alert channel and print incoming events
    Listen {
        /// WebSocket endpoint (ws:// or wss://)
        #[arg(short, long)]
        url: Option<String>,

        /// Bearer token sent with the connection
        #[arg(short, long, env = "ALERTS_TOKEN", hide_env_values = true)]
        token: Option<String>,

        /// Do not raise desktop notifications for alerts
        #[arg(long)]
        no_notify: bool,

        /// Output format for events
        #[arg(short, long, value_enum, default_value_t = OutputFormat::Pretty)]
        output: OutputFormat,
    },

    /// Run the alert streaming server
    Serve {
        /// Address to bind, e.g. 127.0.0.1:8000
        #[arg(short, long)]
        bind: Option<String>,

        /// Publish a synthetic alert every SECS seconds
        #[arg(long, value_name = "SECS")]
        demo_interval: Option<u64>,

        /// Require clients to present an HS256 token signed with this secret
        #[arg(long, env = "ALERTS_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
    },

    /// Manage configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,

        /// Reset configuration to defaults
        #[arg(long)]
        reset: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Pretty,
    /// One JSON object per line
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Text,
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_listen() {
        let args = Args::try_parse_from([
            "alertwatch",
            "listen",
            "--url",
            "wss://soc.example.com/ws/alerts/",
            "--output",
            "json",
            "--no-notify",
            "-v",
        ])
        .unwrap();
        assert!(args.verbose);
        match args.command {
            Commands::Listen {
                url,
                no_notify,
                output,
                ..
            } => {
                assert_eq!(url.as_deref(), Some("wss://soc.example.com/ws/alerts/"));
                assert!(no_notify);
                assert_eq!(output, OutputFormat::Json);
            }
            _ => panic!("expected listen"),
        }
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["alertwatch", "-v", "-q", "config", "--show"]).is_err());
    }
}
