use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::library::ScanOptions;
use crate::reconcile::TachideskConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    /// Remote metadata provider. Reconciliation is disabled when absent.
    #[serde(default)]
    pub provider: Option<TachideskConfig>,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8008
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("tankobon.db")
}

/// Library scanning configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LibraryConfig {
    /// Root directory laid out as `<root>/<source>/<manga>/<chapter>.cbz`.
    #[serde(default = "default_library_root")]
    pub root: PathBuf,
    /// Seconds between periodic scans (default: 12 hours).
    #[serde(default = "default_scan_interval")]
    pub scan_interval_secs: u64,
    /// Run a scan (and a full reconciliation) right after startup.
    #[serde(default = "default_true")]
    pub scan_on_startup: bool,
    /// Open every archive to count its pages instead of assuming one.
    #[serde(default)]
    pub deep_scan: bool,
    /// Re-process manga that are already cataloged.
    #[serde(default)]
    pub rescan_manga: bool,
    /// Replace chapters that are already cataloged.
    #[serde(default)]
    pub rescan_chapters: bool,
    /// Wait for spawned reconciliations before a scan reports completion.
    #[serde(default = "default_true")]
    pub await_reconciliation: bool,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            root: default_library_root(),
            scan_interval_secs: default_scan_interval(),
            scan_on_startup: true,
            deep_scan: false,
            rescan_manga: false,
            rescan_chapters: false,
            await_reconciliation: true,
        }
    }
}

impl LibraryConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            rescan_manga: self.rescan_manga,
            rescan_chapters: self.rescan_chapters,
            deep_scan: self.deep_scan,
            await_reconciliation: self.await_reconciliation,
        }
    }
}

fn default_library_root() -> PathBuf {
    PathBuf::from("./mangas")
}

fn default_scan_interval() -> u64 {
    12 * 60 * 60
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.server.port, 8008);
        assert_eq!(config.server.host.to_string(), "0.0.0.0");
        assert_eq!(config.database.path.to_str().unwrap(), "tankobon.db");
        assert_eq!(config.library.root.to_str().unwrap(), "./mangas");
        assert_eq!(config.library.scan_interval_secs, 43_200);
        assert!(config.library.scan_on_startup);
        assert!(!config.library.deep_scan);
        assert!(config.provider.is_none());
    }

    #[test]
    fn test_deserialize_library_flags() {
        let toml = r#"
[library]
root = "/srv/manga"
deep_scan = true
rescan_manga = true
await_reconciliation = false
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let options = config.library.scan_options();
        assert!(options.deep_scan);
        assert!(options.rescan_manga);
        assert!(!options.rescan_chapters);
        assert!(!options.await_reconciliation);
        assert_eq!(config.library.root.to_str().unwrap(), "/srv/manga");
    }

    #[test]
    fn test_deserialize_with_provider_config() {
        let toml = r#"
[provider]
url = "http://tachidesk:4567/api/graphql"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        let provider = config.provider.as_ref().unwrap();
        assert_eq!(provider.url, "http://tachidesk:4567/api/graphql");
        assert_eq!(provider.timeout_secs, 30); // default
        assert_eq!(provider.max_attempts, 20); // default
        assert!(provider.in_library_only);
    }

    #[test]
    fn test_scan_interval_duration() {
        let library = LibraryConfig {
            scan_interval_secs: 90,
            ..Default::default()
        };
        assert_eq!(library.scan_interval(), Duration::from_secs(90));
    }
}
