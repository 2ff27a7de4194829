//! Plain-text rendering of requests: kanban columns, tables and details.

use chrono::{Local, TimeZone};
use std::fmt::Write;

use crate::requests::{RequestStatus, ServiceRequest, PREDEFINED_TAGS};

const SHORT_ID_LEN: usize = 8;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max_len: usize) -> String {
  if s.chars().count() <= max_len {
    s.to_string()
  } else {
    let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
    format!("{}...", kept)
  }
}

pub fn short_id(id: &str) -> &str {
  match id.char_indices().nth(SHORT_ID_LEN) {
    Some((idx, _)) => &id[..idx],
    None => id,
  }
}

fn format_date(millis: i64) -> String {
  match Local.timestamp_millis_opt(millis).single() {
    Some(dt) => dt.format("%Y-%m-%d").to_string(),
    None => "-".to_string(),
  }
}

fn card(out: &mut String, record: &ServiceRequest) {
  let _ = write!(
    out,
    "  {:<8}  {:<24}  {:<17}  {}",
    short_id(&record.id),
    truncate(&record.client_name, 24),
    record.service_type.label(),
    format_date(record.created_at),
  );
  if let Some(budget) = &record.budget {
    let _ = write!(out, "  {}", budget);
  }
  if !record.tags.is_empty() {
    let _ = write!(out, "  [{}]", record.tags.join(", "));
  }
  out.push('\n');
}

/// Kanban board: one section per status, in workflow order.
pub fn render_board(records: &[ServiceRequest]) -> String {
  let mut out = String::new();
  for (i, status) in RequestStatus::ALL.iter().enumerate() {
    let column: Vec<&ServiceRequest> = records.iter().filter(|r| r.status == *status).collect();
    if i > 0 {
      out.push('\n');
    }
    let _ = writeln!(out, "== {} ({}) ==", status.label(), column.len());
    if column.is_empty() {
      out.push_str("  (empty)\n");
    }
    for record in column {
      card(&mut out, record);
    }
  }
  out
}

/// One line per request, newest first as given.
pub fn render_table(records: &[ServiceRequest]) -> String {
  if records.is_empty() {
    return "No requests.\n".to_string();
  }
  let mut out = String::new();
  for record in records {
    let _ = write!(out, "{:<11} ", record.status.label());
    card(&mut out, record);
  }
  out
}

/// Everything about one request.
pub fn render_detail(record: &ServiceRequest) -> String {
  let mut out = String::new();
  let _ = writeln!(out, "Id:          {}", record.id);
  let _ = writeln!(out, "Client:      {} <{}>", record.client_name, record.client_email);
  let _ = writeln!(out, "Service:     {}", record.service_type);
  let _ = writeln!(out, "Status:      {}", record.status);
  let _ = writeln!(out, "Created:     {}", format_date(record.created_at));
  if let Some(budget) = &record.budget {
    let _ = writeln!(out, "Budget:      {}", budget);
  }
  if !record.tags.is_empty() {
    let _ = writeln!(out, "Tags:        {}", record.tags.join(", "));
  }
  let unused: Vec<&str> = PREDEFINED_TAGS
    .iter()
    .copied()
    .filter(|t| !record.tags.iter().any(|have| have == t))
    .collect();
  if !unused.is_empty() {
    let _ = writeln!(out, "Quick tags:  {}", unused.join(", "));
  }
  if let Some(file) = &record.reference_file_name {
    let _ = writeln!(out, "Reference:   {}", file);
  }
  if let Some(code) = &record.client_access_code {
    let _ = writeln!(out, "Access code: {}", code);
  }
  let _ = writeln!(out, "\n{}", record.description);
  out
}

/// Client-facing view: status and service only, no contact details.
pub fn render_status(records: &[ServiceRequest]) -> String {
  if records.is_empty() {
    return "No requests found for this access code.\n".to_string();
  }
  let mut out = String::new();
  for record in records {
    let _ = writeln!(
      out,
      "{}  {:<17}  {:<11}  {}",
      format_date(record.created_at),
      record.service_type.label(),
      record.status.label(),
      truncate(record.description.lines().next().unwrap_or(""), 40),
    );
  }
  out
}
