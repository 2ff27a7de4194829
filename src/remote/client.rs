use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde_json::{json, Value};
use std::time::Duration;
use url::Url;

use super::error::RemoteError;
use super::rows::{decode_rows, RequestRow};
use super::RemoteStore;
use crate::config::{Config, RemoteConfig};
use crate::requests::{RequestStatus, ServiceRequest};

/// Client for a PostgREST table (as exposed by Supabase).
#[derive(Clone)]
pub struct PostgrestStore {
  http: reqwest::Client,
  endpoint: Url,
  table: String,
  api_key: String,
}

impl PostgrestStore {
  pub fn new(base_url: &str, table: &str, api_key: String, timeout: Duration) -> Result<Self> {
    let endpoint = Url::parse(&format!(
      "{}/rest/v1/{}",
      base_url.trim_end_matches('/'),
      table
    ))
    .map_err(|e| eyre!("Invalid remote url {}: {}", base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(timeout)
      .user_agent(concat!("intake/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      endpoint,
      table: table.to_string(),
      api_key,
    })
  }

  pub fn from_config(remote: &RemoteConfig) -> Result<Self> {
    let api_key = Config::get_remote_key()?;
    Self::new(
      &remote.url,
      &remote.table,
      api_key,
      Duration::from_secs(remote.timeout_secs),
    )
  }

  fn request(&self, method: Method, query: &[(&str, &str)]) -> RequestBuilder {
    let mut url = self.endpoint.clone();
    if !query.is_empty() {
      url.query_pairs_mut().extend_pairs(query);
    }
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(&self.api_key)
  }

  async fn send(&self, builder: RequestBuilder) -> Result<Response, RemoteError> {
    let response = builder.send().await.map_err(RemoteError::from_transport)?;
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(RemoteError::from_response(&self.table, status, &body))
  }

  async fn fetch(&self, query: &[(&str, &str)]) -> Result<Vec<ServiceRequest>, RemoteError> {
    let response = self.send(self.request(Method::GET, query)).await?;
    let values: Vec<Value> = response
      .json()
      .await
      .map_err(RemoteError::from_transport)?;
    Ok(decode_rows(values))
  }
}

#[async_trait]
impl RemoteStore for PostgrestStore {
  async fn list_all(&self) -> Result<Vec<ServiceRequest>, RemoteError> {
    self
      .fetch(&[("select", "*"), ("order", "created_at.desc")])
      .await
  }

  async fn list_by_access_code(&self, code: &str) -> Result<Vec<ServiceRequest>, RemoteError> {
    let filter = format!("eq.{}", code);
    self
      .fetch(&[
        ("select", "*"),
        ("client_access_code", filter.as_str()),
        ("order", "created_at.desc"),
      ])
      .await
  }

  async fn insert(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    let builder = self
      .request(Method::POST, &[])
      .header("Prefer", "return=minimal")
      .json(&[RequestRow::from(record)]);
    self.send(builder).await?;
    Ok(())
  }

  async fn update(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    let filter = format!("eq.{}", record.id);
    let builder = self
      .request(Method::PATCH, &[("id", filter.as_str())])
      .header("Prefer", "return=minimal")
      .json(&RequestRow::from(record));
    self.send(builder).await?;
    Ok(())
  }

  async fn upsert(&self, record: &ServiceRequest) -> Result<(), RemoteError> {
    let builder = self
      .request(Method::POST, &[("on_conflict", "id")])
      .header("Prefer", "resolution=merge-duplicates,return=minimal")
      .json(&[RequestRow::from(record)]);
    self.send(builder).await?;
    Ok(())
  }

  async fn set_status(&self, id: &str, status: RequestStatus) -> Result<(), RemoteError> {
    let filter = format!("eq.{}", id);
    let builder = self
      .request(Method::PATCH, &[("id", filter.as_str())])
      .header("Prefer", "return=minimal")
      .json(&json!({ "status": status.as_str() }));
    self.send(builder).await?;
    Ok(())
  }

  async fn delete(&self, id: &str) -> Result<(), RemoteError> {
    let filter = format!("eq.{}", id);
    self
      .send(self.request(Method::DELETE, &[("id", filter.as_str())]))
      .await?;
    Ok(())
  }

  async fn probe(&self) -> Result<(), RemoteError> {
    self
      .send(self.request(Method::GET, &[("select", "id"), ("limit", "1")]))
      .await?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::requests::{NewRequest, ServiceCategory};
  use wiremock::matchers::{body_json, header, header_exists, method, path, query_param};
  use wiremock::{Mock, MockServer, ResponseTemplate};

  const TABLE_PATH: &str = "/rest/v1/service_requests";

  fn store(server: &MockServer) -> PostgrestStore {
    PostgrestStore::new(
      &server.uri(),
      "service_requests",
      "anon-key".into(),
      Duration::from_secs(5),
    )
    .unwrap()
  }

  fn row_json(id: &str, created_at: i64, code: &str) -> Value {
    json!({
      "id": id,
      "created_at": created_at,
      "client_name": "Ana",
      "client_email": "ana@example.com",
      "service_type": "Web Design",
      "description": "portfolio",
      "status": "Pending",
      "tags": ["Quote Sent"],
      "budget": null,
      "reference_file_name": null,
      "client_access_code": code
    })
  }

  #[tokio::test]
  async fn test_list_all_orders_and_authenticates() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(TABLE_PATH))
      .and(query_param("order", "created_at.desc"))
      .and(header("apikey", "anon-key"))
      .and(header("authorization", "Bearer anon-key"))
      .respond_with(
        ResponseTemplate::new(200)
          .set_body_json(json!([row_json("b", 20, "ANA-1"), row_json("a", 10, "ANA-1")])),
      )
      .mount(&server)
      .await;

    let rows = store(&server).list_all().await.unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].id, "b");
    assert_eq!(rows[0].tags, vec!["Quote Sent"]);
  }

  #[tokio::test]
  async fn test_list_by_access_code_filters_on_column() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(TABLE_PATH))
      .and(query_param("client_access_code", "eq.ANA-1"))
      .respond_with(ResponseTemplate::new(200).set_body_json(json!([row_json("a", 10, "ANA-1")])))
      .mount(&server)
      .await;

    let rows = store(&server).list_by_access_code("ANA-1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].client_access_code.as_deref(), Some("ANA-1"));
  }

  #[tokio::test]
  async fn test_missing_table_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
      .and(path(TABLE_PATH))
      .respond_with(ResponseTemplate::new(404).set_body_json(json!({
        "code": "42P01",
        "message": "relation \"public.service_requests\" does not exist"
      })))
      .mount(&server)
      .await;

    let err = store(&server).probe().await.unwrap_err();
    assert!(err.is_table_missing());
  }

  #[tokio::test]
  async fn test_insert_posts_snake_case_row() {
    let server = MockServer::start().await;
    let mut record =
      NewRequest::new("Ana", "ana@example.com", ServiceCategory::CustomWear, "logo").into_request();
    record.created_at = 1_000;

    Mock::given(method("POST"))
      .and(path(TABLE_PATH))
      .and(body_json(json!([{
        "id": record.id,
        "created_at": 1_000,
        "client_name": "Ana",
        "client_email": "ana@example.com",
        "service_type": "Custom Wear",
        "description": "logo",
        "status": "Pending",
        "tags": [],
        "budget": null,
        "reference_file_name": null,
        "client_access_code": null
      }])))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    store(&server).insert(&record).await.unwrap();
  }

  #[tokio::test]
  async fn test_set_status_and_delete_target_one_row() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
      .and(path(TABLE_PATH))
      .and(query_param("id", "eq.r1"))
      .and(body_json(json!({ "status": "Completed" })))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;
    Mock::given(method("DELETE"))
      .and(path(TABLE_PATH))
      .and(query_param("id", "eq.r1"))
      .respond_with(ResponseTemplate::new(204))
      .expect(1)
      .mount(&server)
      .await;

    let store = store(&server);
    store
      .set_status("r1", RequestStatus::Completed)
      .await
      .unwrap();
    store.delete("r1").await.unwrap();
  }

  #[tokio::test]
  async fn test_upsert_merges_on_id() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
      .and(path(TABLE_PATH))
      .and(query_param("on_conflict", "id"))
      .and(header_exists("prefer"))
      .respond_with(ResponseTemplate::new(201))
      .expect(1)
      .mount(&server)
      .await;

    let record =
      NewRequest::new("Ana", "ana@example.com", ServiceCategory::Others, "x").into_request();
    store(&server).upsert(&record).await.unwrap();
  }

  #[tokio::test]
  async fn test_unreachable_server_is_network_error() {
    let store = PostgrestStore::new(
      "http://127.0.0.1:9",
      "service_requests",
      "k".into(),
      Duration::from_secs(2),
    )
    .unwrap();
    let err = store.list_all().await.unwrap_err();
    assert!(matches!(err, RemoteError::Network(_)));
  }
}
