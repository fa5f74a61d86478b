use std::time::Duration;

use parking_lot::Mutex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE, LOCATION};
use reqwest::StatusCode;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::error::DeckError;
use crate::prefs::PreferenceStore;

pub const JSONBLOB_API_URL: &str = "https://jsonblob.com/api/jsonBlob";
const REMOTE_TIMEOUT_SECONDS: u64 = 30;

/// The remote JSON-blob service: an unauthenticated, public object store
/// used only as a cross-device bookmark for preferences.
pub trait RemoteStore: Send + Sync {
  /// Upload a fresh snapshot, returning the new blob id.
  fn create(&self, snapshot: &Value) -> Result<String, DeckError>;
  /// Overwrite the blob with the full snapshot (never a patch).
  fn update(&self, blob_id: &str, snapshot: &Value) -> Result<(), DeckError>;
  /// Download the blob's snapshot.
  fn fetch(&self, blob_id: &str) -> Result<Value, DeckError>;
}

pub struct JsonBlobStore {
  client: Client,
  base_url: String,
}

impl JsonBlobStore {
  pub fn new() -> Result<Self, DeckError> {
    Self::with_base_url(JSONBLOB_API_URL)
  }

  pub fn with_base_url(base_url: &str) -> Result<Self, DeckError> {
    let client = Client::builder()
      .timeout(Duration::from_secs(REMOTE_TIMEOUT_SECONDS))
      .build()
      .map_err(|e| DeckError::RemoteUnavailable(e.to_string()))?;
    Ok(JsonBlobStore { client, base_url: base_url.trim_end_matches('/').to_string() })
  }

  fn blob_url(&self, blob_id: &str) -> String {
    format!("{}/{}", self.base_url, blob_id)
  }
}

impl RemoteStore for JsonBlobStore {
  fn create(&self, snapshot: &Value) -> Result<String, DeckError> {
    let response = self
      .client
      .post(&self.base_url)
      .header(CONTENT_TYPE, "application/json")
      .header(ACCEPT, "application/json")
      .json(snapshot)
      .send()
      .map_err(|e| DeckError::RemoteUnavailable(e.to_string()))?;
    if !response.status().is_success() {
      return Err(DeckError::RemoteUnavailable(format!(
        "create failed with status {}",
        response.status()
      )));
    }
    // The blob id is the trailing segment of the Location header.
    let blob_id = response
      .headers()
      .get(LOCATION)
      .and_then(|value| value.to_str().ok())
      .and_then(|location| location.rsplit('/').next())
      .map(str::to_string)
      .filter(|id| !id.is_empty());
    blob_id.ok_or_else(|| {
      DeckError::RemoteUnavailable("create response carried no Location header".to_string())
    })
  }

  fn update(&self, blob_id: &str, snapshot: &Value) -> Result<(), DeckError> {
    let response = self
      .client
      .put(self.blob_url(blob_id))
      .header(CONTENT_TYPE, "application/json")
      .header(ACCEPT, "application/json")
      .json(snapshot)
      .send()
      .map_err(|e| DeckError::RemoteUnavailable(e.to_string()))?;
    match response.status() {
      StatusCode::NOT_FOUND => Err(DeckError::RemoteNotFound(blob_id.to_string())),
      status if status.is_success() => Ok(()),
      status => Err(DeckError::RemoteUnavailable(format!("update failed with status {}", status))),
    }
  }

  fn fetch(&self, blob_id: &str) -> Result<Value, DeckError> {
    let response = self
      .client
      .get(self.blob_url(blob_id))
      .header(ACCEPT, "application/json")
      .send()
      .map_err(|e| DeckError::RemoteUnavailable(e.to_string()))?;
    match response.status() {
      StatusCode::NOT_FOUND => Err(DeckError::RemoteNotFound(blob_id.to_string())),
      status if status.is_success() => {
        response.json::<Value>().map_err(|e| DeckError::RemoteUnavailable(e.to_string()))
      }
      status => Err(DeckError::RemoteUnavailable(format!("fetch failed with status {}", status))),
    }
  }
}

/// Hex sha256 of a serialized snapshot, used to skip pushes when nothing
/// changed since the last successful one.
pub fn snapshot_hash(snapshot: &Value) -> String {
  let mut hasher = Sha256::new();
  hasher.update(snapshot.to_string().as_bytes());
  format!("{:x}", hasher.finalize())
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
  /// Remote sync disabled or no blob id yet; nothing was sent.
  Skipped,
  Pushed(String),
  /// The blob had expired; a replacement was created under a new id.
  Recreated(String),
}

/// Push the current preferences to the remote blob.
///
/// On `RemoteNotFound` the stored blob id is cleared and a replacement is
/// created once with the same snapshot; a failing create propagates instead
/// of retrying, so two consecutive 404s cannot loop.
pub fn push_with_recovery(
  store: &Mutex<PreferenceStore>,
  remote: &dyn RemoteStore,
) -> Result<PushOutcome, DeckError> {
  let (snapshot, blob_id) = {
    let guard = store.lock();
    let remote_sync = &guard.prefs().remote_sync;
    if !remote_sync.enabled {
      return Ok(PushOutcome::Skipped);
    }
    let Some(blob_id) = remote_sync.blob_id.clone() else {
      return Ok(PushOutcome::Skipped);
    };
    (guard.prefs().to_value(), blob_id)
  };

  match remote.update(&blob_id, &snapshot) {
    Ok(()) => Ok(PushOutcome::Pushed(blob_id)),
    Err(DeckError::RemoteNotFound(_)) => {
      log::warn!("remote blob {} expired, creating a replacement", blob_id);
      {
        let mut guard = store.lock();
        guard.set_remote_blob(None);
        guard.save();
      }
      let new_id = remote.create(&snapshot)?;
      let mut guard = store.lock();
      guard.set_remote_blob(Some(new_id.clone()));
      guard.save();
      Ok(PushOutcome::Recreated(new_id))
    }
    Err(error) => Err(error),
  }
}

/// Fetch a remote snapshot and overlay it onto the current preferences,
/// adopting the blob id for future pushes. Field-by-field merge, same rules
/// as local load; unknown remote fields are preserved.
pub fn pull_and_adopt(
  store: &Mutex<PreferenceStore>,
  remote: &dyn RemoteStore,
  blob_id: &str,
) -> Result<(), DeckError> {
  let snapshot = remote.fetch(blob_id)?;
  let mut guard = store.lock();
  guard.overlay(&snapshot);
  guard.set_remote_blob(Some(blob_id.to_string()));
  guard.set_remote_enabled(true);
  guard.save();
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicUsize, Ordering};

  struct ScriptedStore {
    update_result: fn(&str) -> Result<(), DeckError>,
    create_result: fn() -> Result<String, DeckError>,
    update_calls: AtomicUsize,
    create_calls: AtomicUsize,
  }

  impl ScriptedStore {
    fn new(
      update_result: fn(&str) -> Result<(), DeckError>,
      create_result: fn() -> Result<String, DeckError>,
    ) -> Self {
      ScriptedStore {
        update_result,
        create_result,
        update_calls: AtomicUsize::new(0),
        create_calls: AtomicUsize::new(0),
      }
    }
  }

  impl RemoteStore for ScriptedStore {
    fn create(&self, _snapshot: &Value) -> Result<String, DeckError> {
      self.create_calls.fetch_add(1, Ordering::SeqCst);
      (self.create_result)()
    }

    fn update(&self, blob_id: &str, _snapshot: &Value) -> Result<(), DeckError> {
      self.update_calls.fetch_add(1, Ordering::SeqCst);
      (self.update_result)(blob_id)
    }

    fn fetch(&self, _blob_id: &str) -> Result<Value, DeckError> {
      Ok(json!({ "cardColor": "#abcdef" }))
    }
  }

  fn synced_store(blob_id: Option<&str>) -> (tempfile::TempDir, Mutex<PreferenceStore>) {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut store = PreferenceStore::open(dir.path().join("mediadeck.db"));
    store.set_remote_enabled(true);
    store.set_remote_blob(blob_id.map(str::to_string));
    (dir, Mutex::new(store))
  }

  #[test]
  fn push_is_skipped_without_enabled_sync_or_blob_id() {
    let remote = ScriptedStore::new(|_| Ok(()), || Ok("new".to_string()));
    let (_dir, store) = synced_store(None);
    assert_eq!(push_with_recovery(&store, &remote).expect("push"), PushOutcome::Skipped);
    store.lock().set_remote_enabled(false);
    assert_eq!(push_with_recovery(&store, &remote).expect("push"), PushOutcome::Skipped);
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn successful_push_reports_the_targeted_blob() {
    let remote = ScriptedStore::new(|_| Ok(()), || Ok("unused".to_string()));
    let (_dir, store) = synced_store(Some("abc"));
    let outcome = push_with_recovery(&store, &remote).expect("push");
    assert_eq!(outcome, PushOutcome::Pushed("abc".to_string()));
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(remote.create_calls.load(Ordering::SeqCst), 0);
  }

  #[test]
  fn not_found_push_recreates_exactly_once_and_adopts_the_new_id() {
    let remote = ScriptedStore::new(
      |id| Err(DeckError::RemoteNotFound(id.to_string())),
      || Ok("fresh-blob".to_string()),
    );
    let (_dir, store) = synced_store(Some("abc"));
    let outcome = push_with_recovery(&store, &remote).expect("push");
    assert_eq!(outcome, PushOutcome::Recreated("fresh-blob".to_string()));
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(remote.create_calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.lock().prefs().remote_sync.blob_id.as_deref(), Some("fresh-blob"));
  }

  #[test]
  fn failed_recreate_propagates_without_looping() {
    let remote = ScriptedStore::new(
      |id| Err(DeckError::RemoteNotFound(id.to_string())),
      || Err(DeckError::RemoteUnavailable("create down".to_string())),
    );
    let (_dir, store) = synced_store(Some("abc"));
    let result = push_with_recovery(&store, &remote);
    assert!(matches!(result, Err(DeckError::RemoteUnavailable(_))));
    assert_eq!(remote.update_calls.load(Ordering::SeqCst), 1);
    assert_eq!(remote.create_calls.load(Ordering::SeqCst), 1);
    // The dangling id was cleared so the next save can start clean.
    assert_eq!(store.lock().prefs().remote_sync.blob_id, None);
  }

  #[test]
  fn pull_overlays_and_adopts_the_blob() {
    let remote = ScriptedStore::new(|_| Ok(()), || Ok("unused".to_string()));
    let (_dir, store) = synced_store(None);
    store.lock().set_remote_enabled(false);
    pull_and_adopt(&store, &remote, "shared-id").expect("pull");
    let guard = store.lock();
    assert_eq!(guard.prefs().card_color, "#abcdef");
    assert!(guard.prefs().remote_sync.enabled);
    assert_eq!(guard.prefs().remote_sync.blob_id.as_deref(), Some("shared-id"));
  }

  #[test]
  fn snapshot_hash_tracks_content_changes() {
    let base = json!({ "cardColor": "#111111" });
    assert_eq!(snapshot_hash(&base), snapshot_hash(&base.clone()));
    assert_ne!(snapshot_hash(&base), snapshot_hash(&json!({ "cardColor": "#222222" })));
  }
}
