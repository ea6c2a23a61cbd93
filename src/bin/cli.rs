use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use soundcloud_gateway as lib;
use std::path::PathBuf;
use tracing::subscriber as tracing_subscriber_global;
use tracing_log::LogTracer;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use lib::config::Config;
use lib::soundcloud::SoundCloudClient;

#[derive(Parser)]
#[command(name = "soundcloud-gateway", version)]
struct Cli {
    /// Path to config TOML
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show one track
    Track {
        id: String,
        /// Resolve the playable stream URL instead of a soundcloud: URI
        #[arg(long)]
        stream: bool,
    },
    /// Search tracks
    Search { query: String },
    /// Resolve a soundcloud.com URL to tracks
    Resolve { url: String },
    /// Liked tracks of the authenticated user (or --user)
    Likes {
        #[arg(long)]
        user: Option<String>,
    },
    /// Tracks from the activity feed
    Feed,
    /// Sets of the authenticated user (or --user)
    Sets {
        #[arg(long)]
        user: Option<String>,
    },
    /// Editorial selections
    Selections {
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Discover a fresh public client id and print it
    ClientId,
    /// Validate config file and exit
    ConfigValidate,
}

/// `--config`, then `$XDG_CONFIG_HOME/soundcloud-gateway/config.toml` when
/// it exists.
fn resolve_config_path(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    if let Some(p) = explicit {
        return Some(p.clone());
    }
    dirs::config_dir()
        .map(|d| d.join("soundcloud-gateway").join("config.toml"))
        .filter(|p| p.exists())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_ref());

    if let Commands::ConfigValidate = cli.command {
        let path = config_path.context("no config file found")?;
        match Config::from_path(&path) {
            Ok(_) => println!("OK"),
            Err(e) => {
                eprintln!("Config validation failed: {}", e);
                std::process::exit(2);
            }
        }
        return Ok(());
    }

    let cfg = match &config_path {
        Some(path) => Config::from_path(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => Config::default(),
    };

    // Bridge `log` records from the api layer into tracing, then log to
    // stderr (stdout carries the JSON output) and, with log_dir set, a
    // daily-rotated file.
    let _ = LogTracer::init();
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let (file_layer, _guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "soundcloud-gateway.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (Some(fmt::layer().with_writer(non_blocking)), Some(guard))
        }
        None => (None, None),
    };
    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing_subscriber_global::set_global_default(subscriber)
        .context("failed to set global tracing subscriber")?;

    let client = SoundCloudClient::new(&cfg)?;
    match cli.command {
        Commands::Track { id, stream } => {
            print_json(&client.get_parsed_track(&id, stream).await)?;
        }
        Commands::Search { query } => print_json(&client.search(&query).await)?,
        Commands::Resolve { url } => print_json(&client.resolve_url(&url).await)?,
        Commands::Likes { user } => {
            print_json(&client.get_user_favorites(user.as_deref()).await)?;
        }
        Commands::Feed => print_json(&client.get_user_stream().await)?,
        Commands::Sets { user } => {
            print_json(&client.get_user_sets(user.as_deref()).await)?;
        }
        Commands::Selections { limit } => print_json(&client.get_selections(limit).await)?,
        Commands::ClientId => match client.public_session().update_public_client_id().await {
            Some(id) => println!("{}", id),
            None => {
                eprintln!("Failed to obtain public client id");
                std::process::exit(1);
            }
        },
        Commands::ConfigValidate => {}
    }
    Ok(())
}
