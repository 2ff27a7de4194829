//! Service request domain types and access codes.

mod types;

pub use types::{
  now_millis, NewRequest, RequestStatus, ServiceCategory, ServiceRequest, ValidationError,
  PREDEFINED_TAGS,
};

/// Normalize a client access code: trimmed and upper-cased.
/// Returns None for blank input.
pub fn normalize_access_code(code: &str) -> Option<String> {
  let code = code.trim();
  if code.is_empty() {
    None
  } else {
    Some(code.to_uppercase())
  }
}

/// Generate an access code for a client, e.g. `ANA-4F09C2`.
///
/// The prefix is up to three letters of the client name; the suffix comes
/// from a random UUID. Codes are lookup keys, not credentials.
pub fn generate_access_code(client_name: &str) -> String {
  let prefix: String = client_name
    .chars()
    .filter(|c| c.is_ascii_alphabetic())
    .take(3)
    .collect::<String>()
    .to_uppercase();
  let prefix = if prefix.is_empty() {
    "CLI".to_string()
  } else {
    prefix
  };

  let suffix = uuid::Uuid::new_v4().simple().to_string()[..6].to_uppercase();
  format!("{}-{}", prefix, suffix)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_normalize_access_code() {
    assert_eq!(normalize_access_code("  ana-4f09c2 "), Some("ANA-4F09C2".into()));
    assert_eq!(normalize_access_code("   "), None);
  }

  #[test]
  fn test_generate_access_code_shape() {
    let code = generate_access_code("Ana Souza");
    assert!(code.starts_with("ANA-"));
    assert_eq!(code.len(), 10);
    assert_eq!(normalize_access_code(&code).as_deref(), Some(code.as_str()));

    assert!(generate_access_code("42").starts_with("CLI-"));
  }
}
