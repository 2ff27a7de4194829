//! Admin login for the board commands.
//!
//! A gate against accidental edits, not a security boundary: the session is
//! a plain file in the data directory that lasts until `logout`.

use color_eyre::{eyre::eyre, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::AdminConfig;

const SESSION_FILE: &str = "session";

/// Hex-encoded SHA-256 of a password, the form kept in the config.
pub fn hash_password(password: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(password.as_bytes());
  hex::encode(hasher.finalize())
}

pub struct Session {
  path: PathBuf,
}

impl Session {
  pub fn new(data_dir: &Path) -> Self {
    Self {
      path: data_dir.join(SESSION_FILE),
    }
  }

  /// Check the credentials and persist the session.
  pub fn login(&self, admin: &AdminConfig, username: &str, password: &str) -> Result<()> {
    let expected = admin.password_sha256.as_deref().ok_or_else(|| {
      eyre!("No admin password configured. Set admin.password_sha256 in the config.")
    })?;

    let password_ok = hash_password(password).eq_ignore_ascii_case(expected.trim());
    if username.trim() != admin.username || !password_ok {
      return Err(eyre!("Invalid username or password"));
    }

    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory {}: {}", parent.display(), e))?;
    }
    std::fs::write(&self.path, &admin.username)
      .map_err(|e| eyre!("Failed to write session file {}: {}", self.path.display(), e))?;

    info!(user = %admin.username, "Admin logged in");
    Ok(())
  }

  /// Forget the session. Logging out twice is fine.
  pub fn logout(&self) -> Result<()> {
    match std::fs::remove_file(&self.path) {
      Ok(()) => {
        info!("Admin logged out");
        Ok(())
      }
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
      Err(e) => Err(eyre!("Failed to remove session file {}: {}", self.path.display(), e)),
    }
  }

  /// Logged-in user, if any.
  pub fn current_user(&self) -> Option<String> {
    let user = std::fs::read_to_string(&self.path).ok()?;
    let user = user.trim();
    (!user.is_empty()).then(|| user.to_string())
  }

  pub fn require_admin(&self) -> Result<String> {
    self
      .current_user()
      .ok_or_else(|| eyre!("Admin login required. Run `intake login` first."))
  }
}
