//! claude-proxy: transparent HTTP reverse proxy for the Anthropic API
//!
//! Forwards `/api/anthropic/*` to a single upstream, relays streaming
//! responses as they arrive, and pushes ntfy alerts when the upstream fails.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use claude_proxy::{config::AppConfig, run_server, Notifier};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "claude-proxy")]
#[command(version)]
#[command(about = "Transparent HTTP reverse proxy for the Anthropic API")]
#[command(long_about = "
claude-proxy forwards every request under /api/anthropic/ to one upstream
API host and relays the response, streaming or not. Upstream failures and
interrupted streams raise an ntfy push notification.

Configuration comes from an optional YAML file, then the BASE_URL,
NTFY_TOPIC and NTFY_SERVER environment variables, then CLI flags.

Example usage:
  claude-proxy run
  BASE_URL=https://api.anthropic.com NTFY_TOPIC=my-alerts claude-proxy run --port 8080
  claude-proxy test-notify \"hello from claude-proxy\"
")]
struct Cli {
    /// Optional YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Set logging level (trace, debug, info, warn, error)
    #[arg(long, global = true, value_name = "LEVEL")]
    log_level: Option<LogLevel>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the proxy server
    Run {
        /// Override listen port
        #[arg(short, long)]
        port: Option<u16>,
        /// Override listen address
        #[arg(long)]
        host: Option<String>,
        /// Override upstream base URL (e.g., "https://api.anthropic.com")
        #[arg(long)]
        base_url: Option<String>,
    },

    /// Validate configuration and print the effective settings
    CheckConfig,

    /// Send a test notification through the configured ntfy topic
    TestNotify {
        /// Message body
        #[arg(default_value = "claude-proxy test notification")]
        message: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level_filter = if let Some(level) = cli.log_level {
        level.to_string()
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
            .to_string()
    };

    let subscriber =
        tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::new(&level_filter));
    match cli.log_format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }

    match cli.command {
        Commands::Run {
            port,
            host,
            base_url,
        } => {
            let mut config = load_config_or_exit(cli.config.as_ref());

            // Apply CLI overrides
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(url) = base_url {
                config.upstream.url = url;
                config.validate()?;
            }

            run_server(config).await?;
        }
        Commands::CheckConfig => {
            check_config(cli.config.as_ref());
        }
        Commands::TestNotify { message } => {
            test_notify(cli.config.as_ref(), message).await;
        }
    }

    Ok(())
}

/// Print the effective configuration
fn check_config(config_path: Option<&PathBuf>) {
    let config = load_config_or_exit(config_path);

    println!("✓ Configuration is valid\n");
    println!("Server:");
    println!("  Listen: {}:{}", config.server.host, config.server.port);
    println!("  Max body: {} bytes", config.server.max_body_bytes);
    println!("\nUpstream:");
    println!("  URL: {}", config.upstream.base_url());
    println!("  TLS: {}", if config.upstream.is_tls() { "enabled" } else { "disabled" });
    println!(
        "  Buffered timeouts: connect {}s / total {}s",
        config.upstream.buffered.connect_seconds, config.upstream.buffered.total_seconds
    );
    println!(
        "  Streaming timeouts: connect {}s / total {}s",
        config.upstream.streaming.connect_seconds, config.upstream.streaming.total_seconds
    );
    println!("\nNotifications:");
    match config.notify.endpoint() {
        Some(endpoint) => {
            println!("  ntfy: {}", endpoint);
            println!("  Priority: {}", config.notify.priority);
        }
        None => println!("  ntfy: disabled"),
    }
}

/// Deliver one notification and report the outcome
async fn test_notify(config_path: Option<&PathBuf>, message: String) {
    let config = load_config_or_exit(config_path);

    let Some(endpoint) = config.notify.endpoint() else {
        eprintln!("✗ No ntfy topic configured. Set NTFY_TOPIC or notify.topic in the config file.");
        std::process::exit(1);
    };

    println!("Sending test notification to {}", endpoint);
    // Failures are only visible in the log output
    Notifier::from_config(&config.notify).notify(message).await;
    println!("Done. Check the log output above for delivery errors.");
}

/// Load configuration or exit with error
fn load_config_or_exit(config_path: Option<&PathBuf>) -> AppConfig {
    match AppConfig::load(config_path.map(PathBuf::as_path)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    }
}
