use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

/// Failures reported by the remote store.
///
/// `TableMissing` means the project was never set up and callers show
/// setup instructions; everything else is treated as transient.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
  #[error("remote table '{table}' does not exist")]
  TableMissing { table: String },

  #[error("permission denied by remote store: {0}")]
  PermissionDenied(String),

  #[error("remote store unreachable: {0}")]
  Network(String),

  #[error("remote store error: {0}")]
  Unknown(String),
}

/// Error body returned by PostgREST.
#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
  code: Option<String>,
  message: Option<String>,
}

impl RemoteError {
  pub fn is_table_missing(&self) -> bool {
    matches!(self, RemoteError::TableMissing { .. })
  }

  /// Classify a non-success HTTP response.
  pub(crate) fn from_response(table: &str, status: StatusCode, body: &str) -> Self {
    let api: ApiErrorBody = serde_json::from_str(body).unwrap_or_default();
    let message = api.message.unwrap_or_else(|| body.trim().to_string());

    // 42P01: undefined_table; PGRST205: table not in the schema cache.
    // The message is only consulted when the body carries no code.
    let table_missing = match api.code.as_deref() {
      Some(code) => code == "42P01" || code == "PGRST205",
      None => message.contains("does not exist") || message.contains("Could not find the table"),
    };
    let code = api.code.as_deref().unwrap_or_default();

    if table_missing {
      return RemoteError::TableMissing {
        table: table.to_string(),
      };
    }

    if code == "42501" || status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
      return RemoteError::PermissionDenied(message);
    }

    RemoteError::Unknown(format!("HTTP {}: {}", status.as_u16(), message))
  }

  /// Classify a transport-level failure.
  pub(crate) fn from_transport(err: reqwest::Error) -> Self {
    if err.is_decode() {
      RemoteError::Unknown(format!("Failed to decode response: {}", err))
    } else {
      RemoteError::Network(err.to_string())
    }
  }
}
