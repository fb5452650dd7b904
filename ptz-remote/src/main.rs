//! PTZ Remote
//!
//! Web remote for a VISCA PTZ camera, with optional control of an OBS
//! streaming session and a VLC player. Serves the control UI and a small
//! JSON API over HTTP.

mod api;
mod camera;
mod config;
mod controller;
mod error;
mod player;
mod protocol;
mod server;
mod streaming;
mod utils;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::{error, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;

/// PTZ Remote - browser control for a VISCA camera, OBS and VLC
#[derive(Parser, Debug)]
#[command(name = "ptz-remote")]
#[command(about = "Web remote control for VISCA PTZ cameras")]
#[command(version)]
struct Args {
    /// Config file (default: config/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port, overrides server.port
    #[arg(short, long)]
    port: Option<u16>,

    /// Run in background (no banner, no console logging)
    #[arg(long)]
    background: bool,

    /// Load the config, print a summary and exit
    #[arg(long)]
    check_config: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(log_level: &str) {
    if std::env::var_os("RUST_LOG").is_some() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_target(false)
            .compact()
            .init();
        return;
    }

    let level = match log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .compact()
        .init();
}

fn print_summary(config: &AppConfig, path: &std::path::Path) {
    let camera = &config.camera;
    let enabled = |on: bool| if on { "enabled" } else { "disabled" };

    println!();
    println!("========================================================");
    println!("  PTZ Remote v{}", env!("CARGO_PKG_VERSION"));
    println!("========================================================");
    println!("  Config:    {}", path.display());
    println!("  HTTP:      http://{}:{}", config.server.bind, config.server.port);
    println!("  UI files:  {}", config.server.public_dir.display());
    println!(
        "  Camera:    {}:{} via {} (address {}, {:?} framing)",
        camera.ip,
        camera.port,
        camera.protocol.as_str().to_uppercase(),
        camera.address,
        camera.framing
    );
    println!(
        "  OBS:       {} ({})",
        enabled(config.streaming.enabled),
        config.streaming.url()
    );
    println!(
        "  VLC:       {} ({}:{})",
        enabled(config.player.enabled),
        config.player.host,
        config.player.port
    );
    println!("  Presets:   {}", config.presets.len());
    println!("========================================================");
    println!();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    if !args.background {
        init_logging(&args.log_level);
    }

    let path = config::resolve_config_path(args.config);
    let mut config = AppConfig::load(&path)
        .with_context(|| format!("Could not load configuration from {}", path.display()))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    if args.check_config {
        print_summary(&config, &path);
        return Ok(());
    }

    if !args.background {
        print_summary(&config, &path);
    }

    if let Err(e) = server::run(config).await {
        error!("Server error: {:#}", e);
        return Err(e);
    }

    Ok(())
}
