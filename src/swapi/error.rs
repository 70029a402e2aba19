use thiserror::Error;

/// Failures surfaced by the remote client.
///
/// Callers branch on the variant: a homeworld failure aborts an aggregate,
/// a film failure is reported and skipped, a search failure is published
/// while the accumulated list is kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
  #[error("Not found")]
  NotFound,
  #[error("Server error")]
  InternalServerError,
  #[error("No Internet")]
  NoInternet,
  #[error("{0}")]
  Unknown(String),
}

impl ApiError {
  /// Map an HTTP status code onto the taxonomy, if it has a dedicated variant.
  pub fn from_status(status: reqwest::StatusCode) -> Option<Self> {
    match status.as_u16() {
      404 => Some(Self::NotFound),
      500 => Some(Self::InternalServerError),
      _ => None,
    }
  }
}

impl From<reqwest::Error> for ApiError {
  fn from(err: reqwest::Error) -> Self {
    if let Some(mapped) = err.status().and_then(Self::from_status) {
      return mapped;
    }
    if err.is_connect() {
      return Self::NoInternet;
    }
    Self::Unknown(err.to_string())
  }
}
