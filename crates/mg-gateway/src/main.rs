//! mg-gateway: Facebook Messenger Gateway Main Binary
//!
//! Usage:
//!   mg-gateway                  - Start the webhook server
//!   mg-gateway --config <path>  - Start with an explicit config file
//!   mg-gateway --help           - Show help

mod bot;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use mg_core::{Config, DEFAULT_CONFIG_FILE};
use mg_facebook::MessengerWebhookAdapter;
use tracing_subscriber::EnvFilter;

use crate::bot::EchoBot;

/// Run mode
#[derive(Debug, PartialEq)]
enum RunMode {
    /// Webhook server mode
    Server { config_path: Option<PathBuf> },
    /// Show help
    Help,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1))?;

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("mg-gateway {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Server { config_path } => config_path,
    };

    // Load .env file
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .init();

    let config = Config::load(config_path.as_deref()).context("Config error")?;

    tracing::info!("Starting mg-gateway...");
    tracing::info!("Channel: {}", config.facebook.channel_name);
    tracing::info!("Send API: {}", config.facebook.messages_url());
    if config.facebook.verify_signature {
        tracing::info!("Payload signature verification enabled");
    }

    run_server(config).await
}

/// Parse command line arguments (without the program name)
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => match args.next() {
                Some(path) => config_path = Some(PathBuf::from(path)),
                None => bail!("--config requires a path"),
            },
            other => bail!("Unknown argument: {} (see --help)", other),
        }
    }

    Ok(RunMode::Server { config_path })
}

/// Print help message
fn print_help() {
    println!("mg-gateway - Facebook Messenger Gateway");
    println!();
    println!("Usage:");
    println!("  mg-gateway                  Start the webhook server");
    println!("  mg-gateway --config <path>  Load settings from <path>");
    println!("  mg-gateway --help           Show this help message");
    println!("  mg-gateway --version        Show version");
    println!();
    println!("Without --config, ./{} is used when present.", DEFAULT_CONFIG_FILE);
    println!();
    println!("Environment Variables:");
    println!("  FACEBOOK_VALIDATION_TOKEN   Webhook handshake token (required)");
    println!("  FACEBOOK_PAGE_ACCESS_TOKEN  Page access token (required)");
    println!("  FACEBOOK_APP_SECRET         App secret (required for signature checks)");
    println!("  FACEBOOK_WEBHOOK_PATH       Webhook route (default: /webhook)");
    println!("  FACEBOOK_SEND_API_PATH      Push-send route (default: disabled)");
    println!("  FACEBOOK_GRAPH_API_URL      Graph API base URL (default: https://graph.facebook.com)");
    println!("  FACEBOOK_GRAPH_API_VERSION  Graph API version (default: v2.6)");
    println!("  FACEBOOK_VERIFY_SIGNATURE   Check X-Hub-Signature-256 (default: false)");
    println!("  BOT_CHANNEL_NAME            Channel name passed to the bot (default: FacebookMessenger)");
    println!("  SERVER_HOST                 Bind host (default: 0.0.0.0)");
    println!("  SERVER_PORT                 Bind port (default: 3000)");
}

/// Run the webhook server until Ctrl+C
async fn run_server(config: Config) -> anyhow::Result<()> {
    let adapter = MessengerWebhookAdapter::new(config.facebook, Arc::new(EchoBot))
        .context("Failed to create Messenger adapter")?;

    tracing::info!("Press Ctrl+C to exit");

    adapter
        .serve(&config.server.bind_addr(), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            tracing::info!("Shutting down...");
        })
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_default_is_server_mode() {
        let mode = parse_args(args(&[])).unwrap();
        assert_eq!(mode, RunMode::Server { config_path: None });
    }

    #[test]
    fn test_config_flag() {
        let mode = parse_args(args(&["--config", "/etc/mg.toml"])).unwrap();
        assert_eq!(
            mode,
            RunMode::Server {
                config_path: Some(PathBuf::from("/etc/mg.toml"))
            }
        );
    }

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse_args(args(&["--help"])).unwrap(), RunMode::Help);
        assert_eq!(parse_args(args(&["-h"])).unwrap(), RunMode::Help);
        assert_eq!(parse_args(args(&["--version"])).unwrap(), RunMode::Version);
        assert_eq!(
            parse_args(args(&["--config", "a.toml", "-v"])).unwrap(),
            RunMode::Version
        );
    }

    #[test]
    fn test_bad_arguments() {
        assert!(parse_args(args(&["--config"])).is_err());
        assert!(parse_args(args(&["--cli"])).is_err());
    }
}
