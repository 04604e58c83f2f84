mod cli;
mod commands;
mod config;
mod demo;
mod error;
mod notifier;
mod output;

use crate::{
    cli::{Args, Commands, LogFormat},
    commands::CommandExecutor,
    config::AppConfig,
    error::{AppError, Result},
};
use clap::Parser;
#[cfg(feature = "colored-output")]
use colored::*;
use std::process;
use tracing::{Level, error};
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() {
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!("Application error: {}", e);
        #[cfg(feature = "colored-output")]
        {
            eprintln!("{} {}", "Error:".red().bold(), e);
        }
        #[cfg(not(feature = "colored-output"))]
        {
            eprintln!("Error: {}", e);
        }
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    init_logging(args.verbose, args.quiet, args.log_format)?;
    #[cfg(feature = "rustls-tls")]
    install_rustls_provider();

    match args.command {
        Commands::Listen {
            url,
            token,
            no_notify,
            output,
        } => {
            let config = AppConfig::load(args.config.as_deref())?;
            CommandExecutor::new(config, args.config)
                .listen(url, token, no_notify, output)
                .await?;
        }

        Commands::Serve {
            bind,
            demo_interval,
            jwt_secret,
        } => {
            let config = AppConfig::load(args.config.as_deref())?;
            CommandExecutor::new(config, args.config)
                .serve(bind, demo_interval, jwt_secret)
                .await?;
        }

        Commands::Completions { shell } => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Args::command();
            let bin_name = cmd.get_name().to_string();
            generate(shell, &mut cmd, bin_name, &mut std::io::stdout());
        }

        Commands::Config { show, reset } => {
            if reset {
                let path = AppConfig::reset(args.config.as_deref())?;
                println!("✓ Configuration reset to defaults ({})", path.display());
            } else if show {
                let config = AppConfig::load(args.config.as_deref())?;
                println!("{}", config.show()?);
            } else {
                println!(
                    "Use --show to display current configuration or --reset to reset to defaults"
                );
            }
        }
    }

    Ok(())
}

fn init_logging(verbose: bool, quiet: bool, format: LogFormat) -> Result<()> {
    let filter = if quiet {
        EnvFilter::new("error")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env().add_directive(Level::INFO.into())
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(false)
                    .with_level(verbose),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
    };
    result.map_err(|e| AppError::Logging(e.to_string()))
}

#[cfg(feature = "rustls-tls")]
fn install_rustls_provider() {
    static PROVIDER_INSTALLED: std::sync::OnceLock<()> = std::sync::OnceLock::new();
    PROVIDER_INSTALLED.get_or_init(|| {
        if let Err(e) = rustls::crypto::aws_lc_rs::default_provider().install_default() {
            tracing::debug!(existing_provider = ?e, "rustls CryptoProvider already installed");
        }
    });
}
