use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
  /// Hosted table to mirror into; local-only when absent
  pub remote: Option<RemoteConfig>,
  #[serde(default)]
  pub local: LocalConfig,
  #[serde(default)]
  pub admin: AdminConfig,
  #[serde(default)]
  pub sync: SyncConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RemoteConfig {
  /// Project base url, e.g. https://xyz.supabase.co
  pub url: String,
  #[serde(default = "default_table")]
  pub table: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl RemoteConfig {
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      url: url.into(),
      table: default_table(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfig {
  /// Where the cache, session and log live (defaults to the platform data dir)
  pub data_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdminConfig {
  pub username: String,
  /// Hex-encoded SHA-256 of the admin password
  pub password_sha256: Option<String>,
}

impl Default for AdminConfig {
  fn default() -> Self {
    Self {
      username: "admin".to_string(),
      password_sha256: None,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
}

impl Default for SyncConfig {
  fn default() -> Self {
    Self {
      interval_secs: default_interval_secs(),
    }
  }
}

fn default_table() -> String {
  "service_requests".to_string()
}

fn default_timeout_secs() -> u64 {
  10
}

fn default_interval_secs() -> u64 {
  30
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./intake.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/intake/config.yaml
  ///
  /// Without a file the defaults apply and requests stay on this device
  /// unless INTAKE_REMOTE_URL (or SUPABASE_URL) names a remote.
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

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => Config::default(),
    };
    config.apply_remote_url(Self::get_remote_url());
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    let local = PathBuf::from("intake.yaml");
    if local.exists() {
      return Some(local);
    }

    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("intake").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    // An empty file is a valid, all-defaults config
    if contents.trim().is_empty() {
      return Ok(Config::default());
    }

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }

  /// Fill in the remote from the environment when the file has none.
  fn apply_remote_url(&mut self, url: Option<String>) {
    if self.remote.is_some() {
      return;
    }
    if let Some(url) = url.filter(|u| !u.trim().is_empty()) {
      self.remote = Some(RemoteConfig::new(url.trim()));
    }
  }

  /// Directory for the cache, session file and log.
  pub fn data_dir(&self) -> Result<PathBuf> {
    if let Some(dir) = &self.local.data_dir {
      return Ok(dir.clone());
    }
    dirs::data_dir()
      .map(|d| d.join("intake"))
      .ok_or_else(|| eyre!("Could not determine a data directory. Set local.data_dir in the config."))
  }

  fn get_remote_url() -> Option<String> {
    std::env::var("INTAKE_REMOTE_URL")
      .or_else(|_| std::env::var("SUPABASE_URL"))
      .ok()
  }

  /// Get the remote API key from environment variables.
  ///
  /// Checks INTAKE_REMOTE_KEY first, then SUPABASE_ANON_KEY as fallback.
  pub fn get_remote_key() -> Result<String> {
    std::env::var("INTAKE_REMOTE_KEY")
      .or_else(|_| std::env::var("SUPABASE_ANON_KEY"))
      .map_err(|_| {
        eyre!("Remote API key not found. Set INTAKE_REMOTE_KEY or SUPABASE_ANON_KEY environment variable.")
      })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::io::Write;
  use tempfile::NamedTempFile;

  fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
  }

  #[test]
  fn test_full_config() {
    let file = write_config(
      r#"
remote:
  url: https://studio.supabase.co
  table: requests_v2
local:
  data_dir: /tmp/intake-test
admin:
  username: owner
  password_sha256: abc123
sync:
  interval_secs: 5
"#,
    );
    let config = Config::load_from_path(file.path()).unwrap();

    let remote = config.remote.unwrap();
    assert_eq!(remote.url, "https://studio.supabase.co");
    assert_eq!(remote.table, "requests_v2");
    assert_eq!(remote.timeout_secs, 10);
    assert_eq!(config.local.data_dir, Some(PathBuf::from("/tmp/intake-test")));
    assert_eq!(config.admin.username, "owner");
    assert_eq!(config.admin.password_sha256.as_deref(), Some("abc123"));
    assert_eq!(config.sync.interval_secs, 5);
  }

  #[test]
  fn test_defaults() {
    let file = write_config("remote:\n  url: https://x.supabase.co\n");
    let config = Config::load_from_path(file.path()).unwrap();

    assert_eq!(config.remote.unwrap().table, "service_requests");
    assert_eq!(config.admin.username, "admin");
    assert!(config.admin.password_sha256.is_none());
    assert_eq!(config.sync.interval_secs, 30);
    assert!(config.local.data_dir.is_none());

    let empty = write_config("");
    let config = Config::load_from_path(empty.path()).unwrap();
    assert!(config.remote.is_none());
  }

  #[test]
  fn test_unknown_section_is_rejected() {
    let file = write_config("database:\n  url: https://x\n");
    let err = Config::load_from_path(file.path()).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config file"));
  }

  #[test]
  fn test_missing_explicit_path() {
    let err = Config::load(Some(Path::new("/nonexistent/intake.yaml"))).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
  }

  #[test]
  fn test_remote_url_from_environment_only_fills_gaps() {
    let mut config = Config::default();
    config.apply_remote_url(Some(" https://env.supabase.co ".into()));
    assert_eq!(config.remote.as_ref().unwrap().url, "https://env.supabase.co");

    config.apply_remote_url(Some("https://other.supabase.co".into()));
    assert_eq!(config.remote.as_ref().unwrap().url, "https://env.supabase.co");

    let mut blank = Config::default();
    blank.apply_remote_url(Some("  ".into()));
    assert!(blank.remote.is_none());
  }

  #[test]
  fn test_explicit_data_dir() {
    let config = Config {
      local: LocalConfig {
        data_dir: Some(PathBuf::from("/srv/intake")),
      },
      ..Config::default()
    };
    assert_eq!(config.data_dir().unwrap(), PathBuf::from("/srv/intake"));
  }
}
