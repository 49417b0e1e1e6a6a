//! Server configuration.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Runtime settings of the server process.
///
/// Loaded from an optional JSON file; command line flags given to the
/// binary override individual fields afterwards. Missing fields take their
/// defaults.
///
/// ```json
/// { "listen": "127.0.0.1:1122", "data_dir": "/var/lib/filedb", "max_connections": 16 }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address the listener binds to.
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Database root; bootstrapped on first start.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Connections accepted at the same time. Further clients are closed
    /// right after accept.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// How long one reply may take to write before the client is dropped.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// `tracing` filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_listen() -> String {
    "0.0.0.0:1122".to_string()
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("databases")
}

fn default_max_connections() -> usize {
    63
}

fn default_write_timeout_ms() -> u64 {
    10_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            data_dir: default_data_dir(),
            max_connections: default_max_connections(),
            write_timeout_ms: default_write_timeout_ms(),
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let config = serde_json::from_str(&content)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_fields_take_defaults() {
        let config: ServerConfig = serde_json::from_str(r#"{"max_connections": 4}"#).unwrap();
        assert_eq!(config.max_connections, 4);
        assert_eq!(config.listen, "0.0.0.0:1122");
        assert_eq!(config.data_dir, PathBuf::from("databases"));
        assert_eq!(config.log_level, "info");
        assert_eq!(config.write_timeout_ms, 10_000);
    }

    #[test]
    fn load_reads_file_and_reports_bad_json() {
        let tmp = TempDir::new().unwrap();
        let good = tmp.path().join("server.json");
        std::fs::write(&good, r#"{"listen": "127.0.0.1:9000", "data_dir": "/srv/db"}"#).unwrap();
        let config = ServerConfig::load(&good).unwrap();
        assert_eq!(config.listen, "127.0.0.1:9000");
        assert_eq!(config.data_dir, PathBuf::from("/srv/db"));
        assert_eq!(config.max_connections, 63);

        let bad = tmp.path().join("bad.json");
        std::fs::write(&bad, "{ listen = 1 }").unwrap();
        assert!(ServerConfig::load(&bad).is_err());
        assert!(ServerConfig::load(&tmp.path().join("missing.json")).is_err());
    }
}
