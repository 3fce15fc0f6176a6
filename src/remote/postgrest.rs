//! Supabase / PostgREST client for the debts table.

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result as EyreResult};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::{RemoteStore, SelectQuery, DEBTS_TABLE};
use crate::config::PostgrestConfig;
use crate::debts::{Debt, DebtInsert, DebtPatch};
use crate::error::{Error, Result};

/// PostgREST error body
#[derive(Debug, Deserialize)]
struct ApiError {
  message: String,
}

#[derive(Clone)]
pub struct PostgrestStore {
  http: reqwest::Client,
  table_url: Url,
  api_key: String,
  access_token: Option<String>,
}

impl PostgrestStore {
  pub fn new(config: &PostgrestConfig, api_key: String, access_token: Option<String>) -> EyreResult<Self> {
    let base = Url::parse(&config.url)
      .map_err(|e| eyre!("Invalid PostgREST url {}: {}", config.url, e))?;
    let table_url = base
      .join(&format!("rest/v1/{}", DEBTS_TABLE))
      .map_err(|e| eyre!("Invalid PostgREST url {}: {}", config.url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .gzip(true)
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      table_url,
      api_key,
      access_token,
    })
  }

  /// Request against the table with auth headers and `filters` as query pairs.
  fn request(&self, method: Method, filters: &[(&str, String)]) -> RequestBuilder {
    let mut url = self.table_url.clone();
    if !filters.is_empty() {
      let mut pairs = url.query_pairs_mut();
      for (name, value) in filters {
        pairs.append_pair(name, value);
      }
    }
    let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(bearer)
      .header("Prefer", "return=representation")
  }

  async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T> {
    let response = request.send().await?;
    Ok(Self::check(response).await?.json::<T>().await?)
  }

  async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
      return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ApiError>(&body)
      .map(|e| e.message)
      .unwrap_or(body);
    Err(Error::Rejected {
      status: status.as_u16(),
      message,
    })
  }
}

fn eq(value: &str) -> String {
  format!("eq.{}", value)
}

fn scope(id: &str, owner_id: &str) -> [(&'static str, String); 2] {
  [("id", eq(id)), ("user_id", eq(owner_id))]
}

#[async_trait]
impl RemoteStore for PostgrestStore {
  async fn select(&self, query: &SelectQuery) -> Result<Vec<Debt>> {
    let direction = if query.ascending { "asc" } else { "desc" };
    let filters = [
      ("select", "*".to_string()),
      ("user_id", eq(&query.owner_id)),
      ("order", format!("{}.{}", query.order_by.column(), direction)),
    ];
    let rows: Vec<Debt> = self.send(self.request(Method::GET, &filters)).await?;
    debug!("selected {} debts", rows.len());
    Ok(rows)
  }

  async fn insert(&self, row: &DebtInsert) -> Result<Debt> {
    let request = self.request(Method::POST, &[]).json(row);
    let rows: Vec<Debt> = self.send(request).await?;
    rows.into_iter().next().ok_or_else(|| Error::Rejected {
      status: 0,
      message: "insert returned no row".to_string(),
    })
  }

  async fn update(&self, id: &str, owner_id: &str, patch: &DebtPatch) -> Result<Option<Debt>> {
    let request = self
      .request(Method::PATCH, &scope(id, owner_id))
      .json(patch);
    let rows: Vec<Debt> = self.send(request).await?;
    Ok(rows.into_iter().next())
  }

  async fn delete(&self, id: &str, owner_id: &str) -> Result<u64> {
    let request = self.request(Method::DELETE, &scope(id, owner_id));
    let rows: Vec<Debt> = self.send(request).await?;
    Ok(rows.len() as u64)
  }
}
