use crate::index::types::IndexConfig;
use crate::search::engine::SearchConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

const APP_NAME: &str = "logcrawl";
const CONFIG_FILE: &str = "config.json";

/// Environment variables that override the config file
pub const ENV_READ_BLOCK_BYTES: &str = "LOGCRAWL_READ_BLOCK_BYTES";
pub const ENV_READ_RETRIES: &str = "LOGCRAWL_READ_RETRIES";
pub const ENV_SEARCH_CHUNK_LINES: &str = "LOGCRAWL_SEARCH_CHUNK_LINES";
pub const ENV_FOLLOW_POLL_MS: &str = "LOGCRAWL_FOLLOW_POLL_MS";

/// Application configuration stored in the app data directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Bytes read per indexing block
    #[serde(default = "default_read_block_bytes")]
    pub read_block_bytes: usize,

    /// Extra attempts for a failed read
    #[serde(default = "default_read_retries")]
    pub read_retries: u32,

    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Lines per unit of parallel search work
    #[serde(default = "default_search_chunk_lines")]
    pub search_chunk_lines: usize,

    /// How often follow mode checks the file
    #[serde(default = "default_follow_poll_ms")]
    pub follow_poll_ms: u64,

    /// Decoded lines kept by a reader
    #[serde(default = "default_line_cache_size")]
    pub line_cache_size: usize,
}

fn default_read_block_bytes() -> usize {
    1024 * 1024
}

fn default_read_retries() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    50
}

fn default_search_chunk_lines() -> usize {
    5000
}

fn default_follow_poll_ms() -> u64 {
    500
}

fn default_line_cache_size() -> usize {
    256
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            read_block_bytes: default_read_block_bytes(),
            read_retries: default_read_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            search_chunk_lines: default_search_chunk_lines(),
            follow_poll_ms: default_follow_poll_ms(),
            line_cache_size: default_line_cache_size(),
        }
    }
}

impl AppConfig {
    /// Load config from the app data directory, then apply environment
    /// overrides. A missing file means defaults.
    pub fn load() -> Result<Self> {
        let config_path = get_config_path()?;

        let mut config = if config_path.exists() {
            let content = fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", config_path.display()))?
        } else {
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply overrides looked up by variable name
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(value) = lookup(ENV_READ_BLOCK_BYTES) {
            self.read_block_bytes = parse_var(ENV_READ_BLOCK_BYTES, &value)?;
        }
        if let Some(value) = lookup(ENV_READ_RETRIES) {
            self.read_retries = parse_var(ENV_READ_RETRIES, &value)?;
        }
        if let Some(value) = lookup(ENV_SEARCH_CHUNK_LINES) {
            self.search_chunk_lines = parse_var(ENV_SEARCH_CHUNK_LINES, &value)?;
        }
        if let Some(value) = lookup(ENV_FOLLOW_POLL_MS) {
            self.follow_poll_ms = parse_var(ENV_FOLLOW_POLL_MS, &value)?;
        }
        Ok(())
    }

    pub fn index_config(&self) -> IndexConfig {
        IndexConfig {
            read_block_bytes: self.read_block_bytes,
            read_retries: self.read_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            chunk_lines: self.search_chunk_lines.max(1),
            read_retries: self.read_retries,
            retry_delay_ms: self.retry_delay_ms,
        }
    }

    pub fn follow_interval(&self) -> Duration {
        Duration::from_millis(self.follow_poll_ms.max(1))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value {value:?} for {name}"))
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let app_dir = get_app_data_dir()?;
    Ok(app_dir.join(CONFIG_FILE))
}

/// Get the application data directory
pub fn get_app_data_dir() -> Result<PathBuf> {
    let base = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|h| h.join("Library").join("Application Support"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
    } else {
        // Linux/Unix: use XDG_DATA_HOME or ~/.local/share
        dirs::data_dir()
    };

    let base = base.context("Could not determine app data directory")?;
    let app_dir = base.join(APP_NAME);

    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.read_block_bytes, 1024 * 1024);
        assert_eq!(config.read_retries, 3);
        assert_eq!(config.search_chunk_lines, 5000);
        assert_eq!(config.follow_poll_ms, 500);
        assert_eq!(config.line_cache_size, 256);
    }

    #[test]
    fn test_app_config_partial_json() {
        // Should use defaults for missing fields
        let json = r#"{"search_chunk_lines": 100}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.search_chunk_lines, 100);
        assert_eq!(config.read_retries, 3);
    }

    #[test]
    fn test_app_config_empty_json() {
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config: AppConfig = serde_json::from_str(r#"{"follow_poll_ms": 900}"#).unwrap();
        config
            .apply_overrides(env(&[(ENV_FOLLOW_POLL_MS, "20"), (ENV_READ_RETRIES, " 7 ")]))
            .unwrap();

        assert_eq!(config.follow_poll_ms, 20);
        assert_eq!(config.read_retries, 7);
        assert_eq!(config.read_block_bytes, 1024 * 1024);
    }

    #[test]
    fn test_bad_override_is_an_error() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_SEARCH_CHUNK_LINES, "lots")]))
            .unwrap_err();
        assert!(err.to_string().contains(ENV_SEARCH_CHUNK_LINES));
    }

    #[test]
    fn test_derived_configs() {
        let config = AppConfig {
            search_chunk_lines: 0,
            read_retries: 1,
            ..AppConfig::default()
        };
        assert_eq!(config.search_config().chunk_lines, 1);
        assert_eq!(config.search_config().read_retries, 1);
        assert_eq!(config.index_config().read_retries, 1);
        assert_eq!(config.follow_interval(), Duration::from_millis(500));
    }
}
