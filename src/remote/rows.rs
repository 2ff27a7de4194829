//! Row shape of the remote `service_requests` table.
//!
//! Columns are snake_case. `created_at` is written as epoch milliseconds;
//! on read, ISO-8601 strings and numeric strings are accepted as well.

use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

use crate::requests::{RequestStatus, ServiceCategory, ServiceRequest};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestRow {
  pub id: String,
  #[serde(deserialize_with = "deserialize_timestamp")]
  pub created_at: i64,
  #[serde(default, deserialize_with = "null_as_default")]
  pub client_name: String,
  #[serde(default, deserialize_with = "null_as_default")]
  pub client_email: String,
  pub service_type: ServiceCategory,
  #[serde(default, deserialize_with = "null_as_default")]
  pub description: String,
  pub status: RequestStatus,
  #[serde(default, deserialize_with = "null_as_default")]
  pub tags: Vec<String>,
  #[serde(default)]
  pub budget: Option<String>,
  #[serde(default)]
  pub reference_file_name: Option<String>,
  #[serde(default)]
  pub client_access_code: Option<String>,
}

impl From<&ServiceRequest> for RequestRow {
  fn from(r: &ServiceRequest) -> Self {
    RequestRow {
      id: r.id.clone(),
      created_at: r.created_at,
      client_name: r.client_name.clone(),
      client_email: r.client_email.clone(),
      service_type: r.service_type,
      description: r.description.clone(),
      status: r.status,
      tags: r.tags.clone(),
      budget: r.budget.clone(),
      reference_file_name: r.reference_file_name.clone(),
      client_access_code: r.client_access_code.clone(),
    }
  }
}

impl From<RequestRow> for ServiceRequest {
  fn from(row: RequestRow) -> Self {
    ServiceRequest {
      id: row.id,
      client_name: row.client_name,
      client_email: row.client_email,
      service_type: row.service_type,
      description: row.description,
      status: row.status,
      tags: row.tags,
      budget: row.budget,
      reference_file_name: row.reference_file_name,
      client_access_code: row.client_access_code,
      created_at: row.created_at,
    }
  }
}

/// Decode rows one by one, skipping the ones that don't fit.
pub fn decode_rows(values: Vec<serde_json::Value>) -> Vec<ServiceRequest> {
  values
    .into_iter()
    .filter_map(|value| {
      let id = value
        .get("id")
        .and_then(|v| v.as_str())
        .unwrap_or("<no id>")
        .to_string();
      match serde_json::from_value::<RequestRow>(value) {
        Ok(row) => Some(row.into()),
        Err(e) => {
          warn!(id = %id, error = %e, "Skipping malformed remote row");
          None
        }
      }
    })
    .collect()
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
  D: Deserializer<'de>,
  T: Default + Deserialize<'de>,
{
  Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WireTimestamp {
  Millis(i64),
  Float(f64),
  Text(String),
}

fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
  D: Deserializer<'de>,
{
  match WireTimestamp::deserialize(deserializer)? {
    WireTimestamp::Millis(ms) => Ok(ms),
    WireTimestamp::Float(ms) => Ok(ms as i64),
    WireTimestamp::Text(s) => parse_timestamp(&s)
      .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", s))),
  }
}

/// Parse epoch milliseconds from a numeric or ISO-8601 string.
fn parse_timestamp(s: &str) -> Option<i64> {
  let s = s.trim();
  if let Ok(ms) = s.parse::<i64>() {
    return Some(ms);
  }
  if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
    return Some(dt.timestamp_millis());
  }
  // Postgres without offset, e.g. "2024-03-01T10:00:00.123"
  ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
    .iter()
    .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    .map(|dt| dt.and_utc().timestamp_millis())
}
