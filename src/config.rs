// Copyright 2026 Daniel Pelikan
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Beacon configuration.
//!
//! Read from `config.toml` in the user's config directory. A missing file
//! yields the defaults, which run without a backend (demo mode).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Configuration directory under the user's config dir.
const CONFIG_DIR_NAME: &str = "attendance-beacon";

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub beacon: BeaconConfig,
}

/// Attendance backend settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Base URL of the backend API, e.g. `https://example.edu/api`.
    /// Without one every session runs in demo mode.
    pub base_url: Option<String>,
    /// Per-request timeout (connect, write and read).
    pub timeout_secs: u64,
    /// Pending OTP log records; further records are dropped.
    pub log_queue_capacity: usize,
    /// Concurrent OTP log requests.
    pub max_in_flight: usize,
}

impl RegistryConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout_secs: 30,
            log_queue_capacity: 64,
            max_in_flight: 4,
        }
    }
}

/// Radio-side settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeaconConfig {
    /// Advertised local name. Defaults to the host name.
    pub local_name: Option<String>,
    /// Interval of the background OTP sweep, 0 disables it.
    pub sweep_interval_secs: u64,
}

impl BeaconConfig {
    pub fn sweep_interval(&self) -> Option<Duration> {
        (self.sweep_interval_secs > 0).then(|| Duration::from_secs(self.sweep_interval_secs))
    }

    /// Local name to advertise.
    pub fn resolved_local_name(&self) -> String {
        self.local_name.clone().unwrap_or_else(|| {
            format!("Attendance-{}", gethostname::gethostname().to_string_lossy())
        })
    }
}

impl Default for BeaconConfig {
    fn default() -> Self {
        Self {
            local_name: None,
            sweep_interval_secs: 10,
        }
    }
}

impl Config {
    /// Default config file location.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Load from `path`, or from the default location when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path.map(Path::to_path_buf).or_else(Self::default_path) {
            Some(p) => p,
            None => {
                debug!("No config directory, using defaults");
                return Ok(Self::default());
            }
        };

        if !path.exists() {
            debug!("Config file {:?} doesn't exist, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;

        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.clone(),
            source,
        })?;

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.registry.base_url.is_none());
        assert_eq!(config.registry.timeout(), Duration::from_secs(30));
        assert_eq!(config.beacon.sweep_interval(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::load(Some(&temp_dir.path().join("nope.toml"))).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_partial_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[registry]
base_url = "https://example.edu/api"
timeout_secs = 5

[beacon]
sweep_interval_secs = 0
"#,
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(
            config.registry.base_url.as_deref(),
            Some("https://example.edu/api")
        );
        assert_eq!(config.registry.timeout_secs, 5);
        assert_eq!(config.registry.log_queue_capacity, 64);
        assert_eq!(config.beacon.sweep_interval(), None);
    }

    #[test]
    fn test_invalid_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "registry = 3").unwrap();

        assert!(matches!(
            Config::load(Some(&path)),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_explicit_local_name() {
        let beacon = BeaconConfig {
            local_name: Some("Room A101".into()),
            ..Default::default()
        };
        assert_eq!(beacon.resolved_local_name(), "Room A101");
    }
}
