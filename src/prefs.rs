use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::catalog::Category;
use crate::error::DeckError;

const MIGRATION_SQL_0001: &str = include_str!("../migrations/0001_initial.sql");

/// Key holding the full serialized Preferences JSON.
pub const STORE_KEY: &str = "mediadeck_preferences";
/// Legacy key written by older builds; read-only fallback for filter state.
pub const LEGACY_STORE_KEY: &str = "userPreferences";

pub(crate) fn now_iso() -> String {
  Utc::now().to_rfc3339()
}

/// A user-authored link entry. Created via `add_custom_link`, removed by id
/// or index, never mutated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomLink {
  pub title: String,
  #[serde(default)]
  pub description: Option<String>,
  pub url: String,
  #[serde(default)]
  pub logo_url: Option<String>,
  #[serde(default)]
  pub category: Option<Category>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RemoteSyncPrefs {
  pub enabled: bool,
  pub blob_id: Option<String>,
}

/// The single persisted preference aggregate.
///
/// `cardVisibility` and `cardOrder` are partial maps: a missing entry means
/// visible / sourceOrder. An empty `countryFilters` is the distinguished
/// "no country restriction" state. `extra` keeps unknown fields from newer
/// clients round-trip safe.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Preferences {
  pub card_color: String,
  pub custom_links: Vec<CustomLink>,
  pub card_visibility: BTreeMap<String, bool>,
  pub card_order: BTreeMap<String, i64>,
  pub category_filters: BTreeSet<Category>,
  pub country_filters: BTreeSet<String>,
  pub remote_sync: RemoteSyncPrefs,
  #[serde(flatten)]
  pub extra: serde_json::Map<String, Value>,
}

impl Default for Preferences {
  fn default() -> Self {
    Preferences {
      card_color: "#1f1f1f".to_string(),
      custom_links: Vec::new(),
      card_visibility: BTreeMap::new(),
      card_order: BTreeMap::new(),
      category_filters: [Category::Paid, Category::Free, Category::Social].into_iter().collect(),
      country_filters: BTreeSet::new(),
      remote_sync: RemoteSyncPrefs::default(),
      extra: serde_json::Map::new(),
    }
  }
}

fn apply_field<T: DeserializeOwned>(key: &str, raw: &Value, setter: impl FnOnce(T)) {
  match serde_json::from_value::<T>(raw.clone()) {
    Ok(parsed) => setter(parsed),
    Err(error) => log::warn!("ignoring malformed preference field '{}': {}", key, error),
  }
}

impl Preferences {
  /// Overlay the present, well-formed fields of `value` onto `self`.
  ///
  /// This is the one canonical merge used for local load, remote pull and
  /// settings import: absent fields stay untouched, a malformed field is
  /// skipped with a warning, unrecognized keys land in `extra`. Legacy field
  /// spellings from older builds are accepted alongside the canonical ones.
  pub fn overlay_value(&mut self, value: &Value) {
    let Some(map) = value.as_object() else {
      log::warn!("preference payload is not a JSON object, keeping current state");
      return;
    };
    for (key, raw) in map {
      match key.as_str() {
        "cardColor" | "selectedColor" => {
          apply_field::<String>(key, raw, |color| self.card_color = color)
        }
        "customLinks" => apply_field::<Vec<CustomLink>>(key, raw, |links| self.custom_links = links),
        "cardVisibility" | "visibilitySettings" | "cardsVisibility" => {
          apply_field::<BTreeMap<String, bool>>(key, raw, |map| self.card_visibility = map)
        }
        "cardOrder" => {
          apply_field::<BTreeMap<String, i64>>(key, raw, |map| self.card_order = map)
        }
        "categoryFilters" => {
          apply_field::<BTreeSet<Category>>(key, raw, |set| self.category_filters = set)
        }
        "countryFilters" => {
          apply_field::<BTreeSet<String>>(key, raw, |set| self.country_filters = set)
        }
        "remoteSync" => {
          apply_field::<RemoteSyncPrefs>(key, raw, |remote| self.remote_sync = remote)
        }
        "jsonBlobEnabled" => {
          apply_field::<bool>(key, raw, |enabled| self.remote_sync.enabled = enabled)
        }
        "jsonBlobId" => {
          if let Some(id) = raw.as_str().map(str::trim).filter(|id| !id.is_empty()) {
            self.remote_sync.blob_id = Some(id.to_string());
          }
        }
        _ => {
          self.extra.insert(key.clone(), raw.clone());
        }
      }
    }
  }

  pub fn to_value(&self) -> Value {
    serde_json::to_value(self).unwrap_or(Value::Null)
  }
}

/// Filter-only record written by older builds under the legacy key.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyFilterRecord {
  #[serde(default)]
  active_category_filters: Vec<String>,
  #[serde(default)]
  active_country_filters: Vec<String>,
}

fn init_database(db_path: &Path) -> Result<(), DeckError> {
  if let Some(parent) = db_path.parent() {
    fs::create_dir_all(parent).map_err(|e| DeckError::Storage(e.to_string()))?;
  }
  let connection = Connection::open(db_path)?;
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  connection.execute_batch(MIGRATION_SQL_0001)?;
  Ok(())
}

fn open_database(db_path: &Path) -> Result<Connection, DeckError> {
  let connection = Connection::open(db_path)?;
  connection.execute_batch("PRAGMA foreign_keys = ON;")?;
  Ok(connection)
}

/// Single source of truth for user-controlled state. Mediates between the
/// in-memory `Preferences` object and the local key-value store; remote
/// mirroring is orchestrated by the composition root.
///
/// All local-storage failures are caught and logged; the store keeps working
/// in memory so the dashboard always renders.
pub struct PreferenceStore {
  db_path: PathBuf,
  prefs: Preferences,
}

impl PreferenceStore {
  /// Open the store at `db_path`, initialize the schema and load whatever
  /// is persisted there onto the defaults. Never fails; storage trouble
  /// degrades to defaults.
  pub fn open(db_path: PathBuf) -> Self {
    if let Err(error) = init_database(&db_path) {
      log::warn!("preference database init failed, running in-memory only: {}", error);
    }
    let mut store = PreferenceStore { db_path, prefs: Preferences::default() };
    store.load();
    store
  }

  pub fn prefs(&self) -> &Preferences {
    &self.prefs
  }

  fn read_key(&self, key: &str) -> Result<Option<String>, DeckError> {
    let connection = open_database(&self.db_path)?;
    let value = connection
      .query_row(
        "SELECT value FROM local_store WHERE key = ?1 LIMIT 1",
        params![key],
        |row| row.get(0),
      )
      .optional()?;
    Ok(value)
  }

  fn write_key(&self, key: &str, value: &str) -> Result<(), DeckError> {
    let connection = open_database(&self.db_path)?;
    connection.execute(
      "INSERT INTO local_store (key, value, updated_at)
       VALUES (?1, ?2, ?3)
       ON CONFLICT(key) DO UPDATE SET
         value = excluded.value,
         updated_at = excluded.updated_at",
      params![key, value, now_iso()],
    )?;
    Ok(())
  }

  fn delete_key(&self, key: &str) -> Result<(), DeckError> {
    let connection = open_database(&self.db_path)?;
    connection.execute("DELETE FROM local_store WHERE key = ?1", params![key])?;
    Ok(())
  }

  /// Reload preferences from local storage, field-by-field onto defaults.
  /// Malformed stored JSON falls back entirely to defaults; nothing
  /// propagates to the caller.
  pub fn load(&mut self) {
    let mut prefs = Preferences::default();
    let mut saw_filters = false;

    match self.read_key(STORE_KEY) {
      Ok(Some(raw)) => match serde_json::from_str::<Value>(&raw) {
        Ok(value) => {
          if let Some(map) = value.as_object() {
            saw_filters = map.contains_key("categoryFilters") || map.contains_key("countryFilters");
          }
          prefs.overlay_value(&value);
        }
        Err(error) => log::warn!("stored preferences are not valid JSON, using defaults: {}", error),
      },
      Ok(None) => {}
      Err(error) => log::warn!("could not read stored preferences: {}", error),
    }

    // Older builds kept filter state under a second, simplified key.
    if !saw_filters {
      if let Ok(Some(raw)) = self.read_key(LEGACY_STORE_KEY) {
        match serde_json::from_str::<LegacyFilterRecord>(&raw) {
          Ok(legacy) => {
            if !legacy.active_category_filters.is_empty() {
              prefs.category_filters =
                legacy.active_category_filters.iter().filter_map(|tag| Category::parse(tag)).collect();
            }
            if !legacy.active_country_filters.is_empty() {
              prefs.country_filters = legacy
                .active_country_filters
                .iter()
                .map(|tag| tag.trim().to_lowercase())
                .filter(|tag| !tag.is_empty())
                .collect();
            }
          }
          Err(error) => log::warn!("ignoring malformed legacy preference record: {}", error),
        }
      }
    }

    self.prefs = prefs;
  }

  fn try_save(&self) -> Result<(), DeckError> {
    let serialized = serde_json::to_string(&self.prefs)?;
    self.write_key(STORE_KEY, &serialized)
  }

  /// Persist the current preferences synchronously. Storage failures are
  /// logged and swallowed: the session keeps working in memory.
  pub fn save(&self) {
    if let Err(error) = self.try_save() {
      log::warn!("could not persist preferences, continuing in-memory: {}", error);
    }
  }

  /// Drop all persisted state and return to defaults.
  pub fn reset(&mut self) {
    for key in [STORE_KEY, LEGACY_STORE_KEY] {
      if let Err(error) = self.delete_key(key) {
        log::warn!("could not clear stored key '{}': {}", key, error);
      }
    }
    self.prefs = Preferences::default();
  }

  pub fn set_card_color(&mut self, color: &str) -> Result<(), DeckError> {
    let color = color.trim();
    if !color.starts_with('#') || color.len() < 4 {
      return Err(DeckError::Validation(format!("'{}' is not a valid card color", color)));
    }
    self.prefs.card_color = color.to_string();
    Ok(())
  }

  /// Idempotent; always records an explicit boolean even though an absent
  /// entry and `true` render the same.
  pub fn set_card_visibility(&mut self, card_id: &str, visible: bool) {
    self.prefs.card_visibility.insert(card_id.to_string(), visible);
  }

  /// Assign ranks 0..n-1 to `ordered_ids`. This is a partial overlay: ids
  /// absent from the sequence keep whatever rank they had before.
  pub fn set_card_order(&mut self, ordered_ids: &[String]) {
    for (rank, card_id) in ordered_ids.iter().enumerate() {
      self.prefs.card_order.insert(card_id.clone(), rank as i64);
    }
  }

  pub fn add_custom_link(&mut self, link: CustomLink) -> Result<(), DeckError> {
    let title = link.title.trim().to_string();
    let url = link.url.trim().to_string();
    if title.is_empty() || url.is_empty() {
      return Err(DeckError::Validation("Title and URL are required.".to_string()));
    }
    if !url.starts_with("http://") && !url.starts_with("https://") {
      return Err(DeckError::Validation("URL must start with http:// or https://.".to_string()));
    }
    self.prefs.custom_links.push(CustomLink {
      title,
      description: link.description.map(|d| d.trim().to_string()).filter(|d| !d.is_empty()),
      url,
      logo_url: link.logo_url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()),
      category: link.category,
    });
    Ok(())
  }

  /// Remove by synthetic card id (`custom-<n>`) or bare index. Unknown or
  /// out-of-range references are a no-op, not an error. Later custom ids
  /// shift down by one, matching the id scheme of `catalog::custom_card`,
  /// and their order and visibility entries move with them.
  pub fn remove_custom_link(&mut self, reference: &str) {
    let reference = reference.trim();
    let Some(index) = reference
      .strip_prefix("custom-")
      .unwrap_or(reference)
      .parse::<usize>()
      .ok()
    else {
      return;
    };
    if index >= self.prefs.custom_links.len() {
      return;
    }
    self.prefs.custom_links.remove(index);
    self.prefs.card_visibility.remove(&format!("custom-{}", index));
    self.prefs.card_order.remove(&format!("custom-{}", index));
    for later in index + 1..=self.prefs.custom_links.len() {
      let old_id = format!("custom-{}", later);
      let new_id = format!("custom-{}", later - 1);
      if let Some(visible) = self.prefs.card_visibility.remove(&old_id) {
        self.prefs.card_visibility.insert(new_id.clone(), visible);
      }
      if let Some(rank) = self.prefs.card_order.remove(&old_id) {
        self.prefs.card_order.insert(new_id, rank);
      }
    }
  }

  /// Replace both filter sets atomically.
  pub fn set_filters(&mut self, categories: BTreeSet<Category>, countries: BTreeSet<String>) {
    self.prefs.category_filters = categories;
    self.prefs.country_filters = countries;
  }

  pub fn set_remote_enabled(&mut self, enabled: bool) {
    self.prefs.remote_sync.enabled = enabled;
  }

  pub fn set_remote_blob(&mut self, blob_id: Option<String>) {
    self.prefs.remote_sync.blob_id = blob_id.map(|id| id.trim().to_string()).filter(|id| !id.is_empty());
  }

  /// Overlay an external snapshot (remote pull or settings import) onto the
  /// current state, same merge rules as local load.
  pub fn overlay(&mut self, value: &Value) {
    self.prefs.overlay_value(value);
  }
}
