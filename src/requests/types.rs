use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// A client request tracked from intake to delivery.
///
/// The serialized form is camelCase, matching the JSON array the browser
/// front end kept in local storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRequest {
  pub id: String,
  pub client_name: String,
  pub client_email: String,
  pub service_type: ServiceCategory,
  pub description: String,
  pub status: RequestStatus,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub budget: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub reference_file_name: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub client_access_code: Option<String>,
  /// Epoch milliseconds
  pub created_at: i64,
}

impl ServiceRequest {
  /// Toggle a tag, keeping insertion order.
  pub fn toggle_tag(&mut self, tag: &str) {
    let tag = tag.trim();
    if tag.is_empty() {
      return;
    }
    if let Some(pos) = self.tags.iter().position(|t| t == tag) {
      self.tags.remove(pos);
    } else {
      self.tags.push(tag.to_string());
    }
  }
}

/// Progress of a request through the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum RequestStatus {
  #[serde(alias = "Pendente")]
  #[value(alias = "pendente")]
  Pending,
  #[serde(alias = "Em Produção")]
  #[value(name = "in-progress", alias = "em-producao")]
  InProgress,
  #[serde(alias = "Finalizado")]
  #[value(alias = "finalizado")]
  Completed,
}

impl RequestStatus {
  /// Board columns, left to right.
  pub const ALL: [RequestStatus; 3] = [
    RequestStatus::Pending,
    RequestStatus::InProgress,
    RequestStatus::Completed,
  ];

  /// Next column to the right, if any.
  pub fn next(self) -> Option<Self> {
    match self {
      Self::Pending => Some(Self::InProgress),
      Self::InProgress => Some(Self::Completed),
      Self::Completed => None,
    }
  }

  /// Previous column to the left, if any.
  pub fn previous(self) -> Option<Self> {
    match self {
      Self::Pending => None,
      Self::InProgress => Some(Self::Pending),
      Self::Completed => Some(Self::InProgress),
    }
  }

  /// Column title on the board
  pub fn label(self) -> &'static str {
    match self {
      Self::Pending => "Pending",
      Self::InProgress => "In Progress",
      Self::Completed => "Completed",
    }
  }

  /// Value stored in the remote `status` column.
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Pending => "Pending",
      Self::InProgress => "InProgress",
      Self::Completed => "Completed",
    }
  }
}

impl fmt::Display for RequestStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Services offered by the studio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum ServiceCategory {
  #[serde(rename = "Custom Wear", alias = "Custom Wear (Oversized, T-shirt, Hoodies)")]
  CustomWear,
  #[serde(rename = "Event Identity", alias = "Identidade de Eventos")]
  EventIdentity,
  #[serde(rename = "Graphic Materials", alias = "Materiais Gráficos")]
  GraphicMaterials,
  #[serde(rename = "Web Design", alias = "Sites e Páginas Web")]
  WebDesign,
  #[serde(rename = "Social Media", alias = "Gestão de Redes Sociais")]
  SocialMedia,
  #[serde(rename = "Creative Packs", alias = "Pacotes de Criativos")]
  CreativePacks,
  #[serde(rename = "Others", alias = "Outros / Projetos Especiais")]
  Others,
}

impl ServiceCategory {
  pub fn label(self) -> &'static str {
    match self {
      Self::CustomWear => "Custom Wear",
      Self::EventIdentity => "Event Identity",
      Self::GraphicMaterials => "Graphic Materials",
      Self::WebDesign => "Web Design",
      Self::SocialMedia => "Social Media",
      Self::CreativePacks => "Creative Packs",
      Self::Others => "Others",
    }
  }
}

impl fmt::Display for ServiceCategory {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

/// Tags offered by the board for quoting progress.
pub const PREDEFINED_TAGS: &[&str] = &["Quote Pending", "Quote Sent", "Quote Approved"];

/// Intake form validation failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
  #[error("{0} is required")]
  MissingField(&'static str),
}

/// Fields collected by the intake form before an id and timestamp exist.
#[derive(Debug, Clone)]
pub struct NewRequest {
  pub client_name: String,
  pub client_email: String,
  pub service_type: ServiceCategory,
  pub description: String,
  pub tags: Vec<String>,
  pub budget: Option<String>,
  pub reference_file_name: Option<String>,
  pub client_access_code: Option<String>,
}

impl NewRequest {
  pub fn new(
    client_name: impl Into<String>,
    client_email: impl Into<String>,
    service_type: ServiceCategory,
    description: impl Into<String>,
  ) -> Self {
    Self {
      client_name: client_name.into(),
      client_email: client_email.into(),
      service_type,
      description: description.into(),
      tags: Vec::new(),
      budget: None,
      reference_file_name: None,
      client_access_code: None,
    }
  }

  /// Required-field checks. Email and budget formats are not validated.
  pub fn validate(&self) -> Result<(), ValidationError> {
    if self.client_name.trim().is_empty() {
      return Err(ValidationError::MissingField("name"));
    }
    if self.client_email.trim().is_empty() {
      return Err(ValidationError::MissingField("email"));
    }
    if self.description.trim().is_empty() {
      return Err(ValidationError::MissingField("description"));
    }
    Ok(())
  }

  /// Build a pending request with a fresh id and the current time.
  pub fn into_request(self) -> ServiceRequest {
    let mut request = ServiceRequest {
      id: uuid::Uuid::new_v4().to_string(),
      client_name: self.client_name.trim().to_string(),
      client_email: self.client_email.trim().to_string(),
      service_type: self.service_type,
      description: self.description,
      status: RequestStatus::Pending,
      tags: Vec::new(),
      budget: self.budget.filter(|b| !b.trim().is_empty()),
      reference_file_name: self.reference_file_name,
      client_access_code: self
        .client_access_code
        .as_deref()
        .and_then(super::normalize_access_code),
      created_at: now_millis(),
    };
    for tag in &self.tags {
      if !request.tags.iter().any(|t| t == tag.trim()) {
        request.toggle_tag(tag);
      }
    }
    request
  }
}

/// Current time as epoch milliseconds.
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}
