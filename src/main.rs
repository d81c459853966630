//! API Mock Server - CLI Entry Point

use anyhow::Result;
use apimock::{ConfigLayer, MockServer, MockServerConfig};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(
    name = "apimock",
    about = "Mock HTTP API server - canned responses from files on disk",
    version
)]
struct Args {
    /// Path to configuration file (JSON or YAML)
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Port to listen on (overridden by the config file)
    #[arg(short, long)]
    port: Option<u16>,

    /// Only log errors
    #[arg(short, long)]
    quiet: bool,

    /// URL of a real service receiving requests that are not mocked
    #[arg(short = 'f', long = "proxy", value_name = "URL")]
    proxy_url: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'L', long, default_value = "info")]
    log_level: Level,

    /// Print default configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Validate configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("{}", serde_json::to_string_pretty(&MockServerConfig::default())?);
        return Ok(());
    }

    let options = ConfigLayer {
        port: args.port,
        quiet: args.quiet.then_some(true),
        proxy_url: args.proxy_url.clone(),
        ..Default::default()
    };

    // Load configuration
    let config_exists = args.config.exists();
    let config = if config_exists {
        MockServerConfig::load(&args.config, &options)?
    } else if args.validate {
        anyhow::bail!("Configuration file not found: {:?}", args.config);
    } else {
        MockServerConfig::from_layers(&options, &ConfigLayer::default())
            .with_env(|name| std::env::var(name).ok())
    };

    // Initialize logging
    let level = if config.quiet { Level::ERROR } else { args.log_level };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if config_exists {
        info!(path = %args.config.display(), "Loaded configuration");
    } else {
        warn!(path = %args.config.display(), "Configuration file not found, no routes defined");
    }

    // Validate and exit if requested
    if args.validate {
        config.validate()?;
        println!(
            "Configuration is valid ({} web services defined)",
            config.web_services.len()
        );
        return Ok(());
    }

    let mut server = MockServer::new(config)?;
    if config_exists {
        server = server.with_config_file(args.config.clone(), options);
    }
    let server = Arc::new(server);

    tokio::select! {
        result = server.run() => result?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    Ok(())
}
