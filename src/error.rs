use thiserror::Error;

/// Error kinds surfaced by the preference and sync engine.
///
/// `Validation` aborts the operation with no state change. `Storage` is
/// logged by callers and degrades to in-memory operation. The two remote
/// kinds are transient notifications; `RemoteNotFound` on a push triggers
/// the one-shot recreate path in `remote::push_with_recovery`.
#[derive(Debug, Error)]
pub enum DeckError {
  #[error("{0}")]
  Validation(String),
  #[error("storage error: {0}")]
  Storage(String),
  #[error("remote store unavailable: {0}")]
  RemoteUnavailable(String),
  #[error("remote blob not found: {0}")]
  RemoteNotFound(String),
}

impl From<rusqlite::Error> for DeckError {
  fn from(error: rusqlite::Error) -> Self {
    DeckError::Storage(error.to_string())
  }
}

impl From<serde_json::Error> for DeckError {
  fn from(error: serde_json::Error) -> Self {
    DeckError::Storage(error.to_string())
  }
}
