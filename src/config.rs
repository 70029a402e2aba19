use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "https://swapi.dev/api/";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub reachability: ReachabilityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Per-request transport timeout
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
  /// When false, nothing is persisted and offline mode serves an empty list
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Database file (defaults to $XDG_DATA_HOME/swbrowse/cache.db)
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      path: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  /// Quiet period after the last keystroke before a search is issued
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

impl SearchConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReachabilityConfig {
  #[serde(default = "default_probe_interval_secs")]
  pub probe_interval_secs: u64,
}

impl Default for ReachabilityConfig {
  fn default() -> Self {
    Self {
      probe_interval_secs: default_probe_interval_secs(),
    }
  }
}

fn default_base_url() -> String {
  DEFAULT_BASE_URL.to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_true() -> bool {
  true
}

fn default_debounce_ms() -> u64 {
  700
}

fn default_probe_interval_secs() -> u64 {
  15
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./swbrowse.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/swbrowse/config.yaml
  ///
  /// Without a config file the defaults are used. `SWBROWSE_BASE_URL`
  /// overrides the API base URL either way.
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };

    config.with_env_overrides().validate()
  }

  fn validate(self) -> Result<Self> {
    if self.reachability.probe_interval_secs == 0 {
      return Err(eyre!("reachability.probe_interval_secs must be at least 1"));
    }
    if self.api.timeout_secs == 0 {
      return Err(eyre!("api.timeout_secs must be at least 1"));
    }
    Ok(self)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("swbrowse.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("swbrowse").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> Result<Self, serde_yaml::Error> {
    // An empty file deserializes to unit, not an empty mapping
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }
    serde_yaml::from_str(contents)
  }

  fn with_env_overrides(mut self) -> Self {
    if let Ok(url) = std::env::var("SWBROWSE_BASE_URL") {
      if !url.trim().is_empty() {
        self.api.base_url = url;
      }
    }
    self
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_empty_config_uses_defaults() {
    let config = Config::parse("").unwrap();
    assert_eq!(config.api.base_url, DEFAULT_BASE_URL);
    assert_eq!(config.api.timeout_secs, 30);
    assert!(config.cache.enabled);
    assert!(config.cache.path.is_none());
    assert_eq!(config.search.debounce(), Duration::from_millis(700));
  }

  #[test]
  fn test_partial_config_keeps_other_defaults() {
    let yaml = r#"
api:
  base_url: http://localhost:8080/api/
cache:
  enabled: false
search:
  debounce_ms: 0
"#;
    let config = Config::parse(yaml).unwrap();
    assert_eq!(config.api.base_url, "http://localhost:8080/api/");
    assert_eq!(config.api.timeout_secs, 30);
    assert!(!config.cache.enabled);
    assert_eq!(config.search.debounce_ms, 0);
    assert_eq!(config.reachability.probe_interval_secs, 15);
  }

  #[test]
  fn test_load_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swbrowse.yaml");
    std::fs::write(&path, "cache:\n  path: /tmp/swbrowse-test.db\n").unwrap();

    let config = Config::load_from_path(&path).unwrap();
    assert_eq!(
      config.cache.path.as_deref(),
      Some(Path::new("/tmp/swbrowse-test.db"))
    );
  }

  #[test]
  fn test_zero_check_interval_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("swbrowse.yaml");
    std::fs::write(&path, "reachability:\n  probe_interval_secs: 0\n").unwrap();

    let err = Config::load(Some(path.as_path())).unwrap_err();
    assert!(err.to_string().contains("probe_interval_secs"));
  }

  #[test]
  fn test_zero_timeout_is_rejected() {
    let config = Config::parse("api:\n  timeout_secs: 0\n").unwrap();
    assert!(config.validate().is_err());
  }

  #[test]
  fn test_missing_explicit_path_is_an_error() {
    let err = Config::load(Some(Path::new("/nonexistent/swbrowse.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }
}
