use std::future::Future;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use reqwest::header::ACCEPT;
use serde::de::DeserializeOwned;
use tracing::debug;
use url::Url;

use crate::config::ApiConfig;

use super::api_types::{ApiFilm, ApiPlanet, ApiSearchResponse};
use super::error::ApiError;
use super::identity::identity;
use super::types::{Film, Planet, SearchPage};

/// Remote operations the sync layer depends on.
///
/// Dropping a returned future cancels the underlying request.
pub trait RemoteSource: Send + Sync + 'static {
  /// Fetch one page of characters matching `query` (all characters if `None`).
  fn search_characters(
    &self,
    query: Option<&str>,
    page: u32,
  ) -> impl Future<Output = Result<SearchPage, ApiError>> + Send;

  /// Fetch the planet behind a planet URL.
  fn fetch_planet(&self, url: &str) -> impl Future<Output = Result<Planet, ApiError>> + Send;

  /// Fetch the film behind a film URL.
  fn fetch_film(&self, url: &str) -> impl Future<Output = Result<Film, ApiError>> + Send;
}

/// HTTP client for the character database
#[derive(Clone)]
pub struct SwapiClient {
  http: reqwest::Client,
  base_url: Url,
}

impl SwapiClient {
  pub fn new(config: &ApiConfig) -> Result<Self> {
    // Url::join drops the last path segment unless it ends with a slash
    let raw = if config.base_url.ends_with('/') {
      config.base_url.clone()
    } else {
      format!("{}/", config.base_url)
    };

    let base_url =
      Url::parse(&raw).map_err(|e| eyre!("Invalid API base URL {}: {}", config.base_url, e))?;

    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { http, base_url })
  }

  pub fn base_url(&self) -> &Url {
    &self.base_url
  }

  fn endpoint(&self, path: &str) -> Result<Url, ApiError> {
    self
      .base_url
      .join(path)
      .map_err(|e| ApiError::Unknown(format!("Invalid request path {}: {}", path, e)))
  }

  async fn get<T: DeserializeOwned>(
    &self,
    url: Url,
    query: &[(&str, String)],
  ) -> Result<T, ApiError> {
    debug!(%url, ?query, "GET");

    let response = self
      .http
      .get(url)
      .query(query)
      .header(ACCEPT, "application/json")
      .send()
      .await?
      .error_for_status()?;

    Ok(response.json::<T>().await?)
  }
}

impl RemoteSource for SwapiClient {
  fn search_characters(
    &self,
    query: Option<&str>,
    page: u32,
  ) -> impl Future<Output = Result<SearchPage, ApiError>> + Send {
    async move {
      let url = self.endpoint("people/")?;
      let params = [
        ("search", query.unwrap_or_default().to_string()),
        ("page", page.to_string()),
      ];
      let response: ApiSearchResponse = self.get(url, &params).await?;
      Ok(response.into())
    }
  }

  fn fetch_planet(&self, url: &str) -> impl Future<Output = Result<Planet, ApiError>> + Send {
    async move {
      let url = self.endpoint(&format!("planets/{}/", identity(url)))?;
      let planet: ApiPlanet = self.get(url, &[]).await?;
      Ok(planet.into())
    }
  }

  fn fetch_film(&self, url: &str) -> impl Future<Output = Result<Film, ApiError>> + Send {
    async move {
      let url = self.endpoint(&format!("films/{}/", identity(url)))?;
      let film: ApiFilm = self.get(url, &[]).await?;
      Ok(film.into())
    }
  }
}
