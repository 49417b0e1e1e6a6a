use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{value_parser, Arg, Command};
use filedb::{config::ServerConfig, engine::Engine, server::serve};
use tracing_subscriber::{fmt, EnvFilter};

/// Main entry point for the filedb server.
///
/// This function:
/// 1. Parses command-line arguments and the optional JSON config file
/// 2. Initializes structured logging with tracing
/// 3. Opens the database root, bootstrapping the system tables if needed
/// 4. Serves clients on a single-threaded runtime
///
/// # Arguments
/// - `--data DIR`: database root (default: databases)
/// - `--listen ADDR`: TCP address to bind to (default: 0.0.0.0:1122)
/// - `--config FILE`: JSON file with `ServerConfig` fields
/// - `--max-connections N`: open connection limit (default: 63)
/// - `--write-timeout-ms MS`: time allowed for writing one reply (default: 10000)
/// - `--log-level FILTER`: tracing filter when RUST_LOG is unset
///
/// Flags override values from the config file.
///
/// # Example Usage
/// ```bash
/// cargo run -- --data ./databases --listen 127.0.0.1:1122
/// ```
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = Command::new("filedb-server")
        .about("File-backed multi-client database server")
        .arg(Arg::new("data")
            .long("data")
            .value_name("DIR")
            .value_parser(value_parser!(PathBuf))
            .help("Database root directory"))
        .arg(Arg::new("listen")
            .long("listen")
            .value_name("ADDR")
            .help("Listen address for the frame protocol"))
        .arg(Arg::new("config")
            .long("config")
            .value_name("FILE")
            .value_parser(value_parser!(PathBuf))
            .help("JSON configuration file"))
        .arg(Arg::new("max-connections")
            .long("max-connections")
            .value_name("N")
            .value_parser(value_parser!(usize))
            .help("Maximum number of open client connections"))
        .arg(Arg::new("write-timeout-ms")
            .long("write-timeout-ms")
            .value_name("MS")
            .value_parser(value_parser!(u64))
            .help("Drop a client whose reply is not written within this time"))
        .arg(Arg::new("log-level")
            .long("log-level")
            .value_name("FILTER")
            .help("Log filter used when RUST_LOG is unset"))
        .get_matches();

    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(data) = matches.get_one::<PathBuf>("data") {
        config.data_dir = data.clone();
    }
    if let Some(listen) = matches.get_one::<String>("listen") {
        config.listen = listen.clone();
    }
    if let Some(max) = matches.get_one::<usize>("max-connections") {
        config.max_connections = *max;
    }
    if let Some(ms) = matches.get_one::<u64>("write-timeout-ms") {
        config.write_timeout_ms = *ms;
    }
    if let Some(level) = matches.get_one::<String>("log-level") {
        config.log_level = level.clone();
    }

    // Initialize structured logging
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    let engine = Engine::open(&config.data_dir)
        .with_context(|| format!("opening database root {}", config.data_dir.display()))?;

    serve(engine, &config).await
}
