// SPDX-License-Identifier: MIT

//! Daemon configuration: a `toml` file on disk, overridable by `INFERD_*`
//! environment variables at startup.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

fn default_root_dir() -> PathBuf {
    PathBuf::from("/var/lib/inferd")
}

fn default_bind_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap_or_else(|_| ([127, 0, 0, 1], 8080).into())
}

fn default_queue_capacity() -> usize {
    1000
}

fn default_worker_count() -> usize {
    16
}

fn default_cache_hold_time_secs() -> u64 {
    60
}

/// The `inferd.toml` shape. Every field has a default, so an empty or
/// missing config file is a valid configuration — only `INFERD_*`
/// overrides or an explicit file narrow it further.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub root_dir: PathBuf,
    pub bind_addr: SocketAddr,
    pub queue_capacity: usize,
    pub worker_count: usize,
    pub cache_hold_time_secs: u64,
    pub remote_index_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            root_dir: default_root_dir(),
            bind_addr: default_bind_addr(),
            queue_capacity: default_queue_capacity(),
            worker_count: default_worker_count(),
            cache_hold_time_secs: default_cache_hold_time_secs(),
            remote_index_url: None,
        }
    }
}

impl Config {
    pub fn cache_hold_time(&self) -> Duration {
        Duration::from_secs(self.cache_hold_time_secs)
    }

    /// Load the config file at `path` if it exists (an absent file is not an
    /// error — the daemon falls back to defaults), then apply `INFERD_*`
    /// environment overrides on top.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read(path.to_path_buf(), e))?;
            toml::from_str(&text).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?
        } else {
            Config::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("INFERD_ROOT_DIR") {
            self.root_dir = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("INFERD_BIND_ADDR") {
            if let Ok(addr) = v.parse() {
                self.bind_addr = addr;
            } else {
                tracing::warn!(value = %v, "ignoring unparsable INFERD_BIND_ADDR");
            }
        }
        if let Some(n) = env_parsed::<usize>("INFERD_QUEUE_CAPACITY") {
            self.queue_capacity = n;
        }
        if let Some(n) = env_parsed::<usize>("INFERD_WORKER_COUNT") {
            self.worker_count = n;
        }
        if let Some(n) = env_parsed::<u64>("INFERD_CACHE_HOLD_TIME_SECS") {
            self.cache_hold_time_secs = n;
        }
        if let Ok(v) = std::env::var("INFERD_REMOTE_INDEX_URL") {
            self.remote_index_url = Some(v);
        }
    }
}

fn env_parsed<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config file {0}: {1}")]
    Read(PathBuf, std::io::Error),
    #[error("parsing config file {0}: {1}")]
    Parse(PathBuf, toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/inferd.toml")).expect("load");
        assert_eq!(config.worker_count, 16);
        assert_eq!(config.queue_capacity, 1000);
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("inferd.toml");
        std::fs::write(&path, "worker_count = 4\nqueue_capacity = 50\n").expect("write");
        let config = Config::load(&path).expect("load");
        assert_eq!(config.worker_count, 4);
        assert_eq!(config.queue_capacity, 50);
    }

    #[test]
    #[serial_test::serial]
    fn env_override_wins_over_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("inferd.toml");
        std::fs::write(&path, "worker_count = 4\n").expect("write");
        std::env::set_var("INFERD_WORKER_COUNT", "9");
        let config = Config::load(&path).expect("load");
        std::env::remove_var("INFERD_WORKER_COUNT");
        assert_eq!(config.worker_count, 9);
    }
}
