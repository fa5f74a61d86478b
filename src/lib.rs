use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tauri::{Emitter, Manager, State};

mod catalog;
mod editor;
mod error;
mod filter;
mod prefs;
mod remote;

use catalog::Category;
use editor::EditSession;
use error::DeckError;
use filter::RenderEntry;
use prefs::{now_iso, CustomLink, PreferenceStore, Preferences};
use remote::{JsonBlobStore, PushOutcome, RemoteStore};

struct AppState {
  store: Arc<Mutex<PreferenceStore>>,
  remote: Arc<JsonBlobStore>,
  session: Mutex<Option<EditSession>>,
  last_pushed_hash: Arc<Mutex<Option<String>>>,
  last_synced_at: Arc<Mutex<Option<String>>>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct DashboardDto {
  card_color: String,
  cards: Vec<RenderEntry>,
  visible_count: usize,
  density: String,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct ManageEntryDto {
  id: String,
  title: String,
  logo_url: Option<String>,
  is_custom: bool,
  visible: bool,
  selected: bool,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct RemoteStatusDto {
  enabled: bool,
  blob_id: Option<String>,
  last_synced_at: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddLinkInput {
  title: String,
  url: String,
  #[serde(default)]
  description: Option<String>,
  #[serde(default)]
  logo_url: Option<String>,
  #[serde(default)]
  category: Option<String>,
}

#[derive(Serialize, Clone)]
#[serde(rename_all = "camelCase")]
struct SyncNotice {
  message: String,
  severity: String,
}

fn notify(app: &tauri::AppHandle, message: String, severity: &str) {
  let notice = SyncNotice { message, severity: severity.to_string() };
  if let Err(error) = app.emit("remote-sync", notice) {
    log::warn!("could not emit sync notice: {}", error);
  }
}

fn dashboard_dto(prefs: &Preferences) -> DashboardDto {
  let plan = filter::dashboard_plan(prefs);
  // Grid density bucket consumed by the frontend layout.
  let density = match plan.visible_count {
    0..=4 => "few",
    5..=12 => "many",
    _ => "all",
  };
  DashboardDto {
    card_color: prefs.card_color.clone(),
    cards: plan.entries,
    visible_count: plan.visible_count,
    density: density.to_string(),
  }
}

fn manage_entries_dto(session: &EditSession, prefs: &Preferences) -> Vec<ManageEntryDto> {
  let cards = catalog::merged_cards(&prefs.custom_links);
  session
    .entries()
    .iter()
    .map(|entry| {
      let card = cards.iter().find(|card| card.id == entry.id);
      ManageEntryDto {
        id: entry.id.clone(),
        title: card.map(|card| card.title.clone()).unwrap_or_else(|| entry.id.clone()),
        logo_url: card.and_then(|card| card.logo_url.clone()),
        is_custom: entry.id.starts_with("custom-"),
        visible: entry.visible,
        selected: entry.selected,
      }
    })
    .collect()
}

fn remote_status_dto(state: &AppState) -> RemoteStatusDto {
  let store = state.store.lock();
  RemoteStatusDto {
    enabled: store.prefs().remote_sync.enabled,
    blob_id: store.prefs().remote_sync.blob_id.clone(),
    last_synced_at: state.last_synced_at.lock().clone(),
  }
}

fn current_dashboard(state: &AppState) -> DashboardDto {
  dashboard_dto(state.store.lock().prefs())
}

/// Save locally, then fire-and-forget a remote push when sync is enabled.
/// The local save never waits on, or fails because of, the remote side.
fn persist_and_sync(app: &tauri::AppHandle, state: &AppState) {
  let snapshot = {
    let store = state.store.lock();
    store.save();
    let remote_sync = &store.prefs().remote_sync;
    if !remote_sync.enabled || remote_sync.blob_id.is_none() {
      return;
    }
    store.prefs().to_value()
  };

  let hash = remote::snapshot_hash(&snapshot);
  if state.last_pushed_hash.lock().as_deref() == Some(hash.as_str()) {
    return;
  }

  let store = state.store.clone();
  let remote_store = state.remote.clone();
  let last_pushed = state.last_pushed_hash.clone();
  let last_synced = state.last_synced_at.clone();
  let app = app.clone();
  std::thread::spawn(move || match remote::push_with_recovery(&store, remote_store.as_ref()) {
    Ok(PushOutcome::Skipped) => {}
    Ok(PushOutcome::Pushed(_)) => {
      *last_pushed.lock() = Some(hash);
      *last_synced.lock() = Some(now_iso());
    }
    Ok(PushOutcome::Recreated(blob_id)) => {
      *last_pushed.lock() = Some(hash);
      *last_synced.lock() = Some(now_iso());
      notify(
        &app,
        format!("The remote copy had expired; a new one was created ({}). Update your bookmark.", blob_id),
        "info",
      );
    }
    Err(error) => {
      log::warn!("remote push failed: {}", error);
      notify(&app, format!("Could not update the remote copy: {}", error), "error");
    }
  });
}

#[tauri::command]
fn get_dashboard(state: State<'_, AppState>) -> Result<DashboardDto, String> {
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn set_card_color(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  color: String,
) -> Result<DashboardDto, String> {
  state.store.lock().set_card_color(&color).map_err(|e| e.to_string())?;
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn set_card_visibility(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  card_id: String,
  visible: bool,
) -> Result<DashboardDto, String> {
  state.store.lock().set_card_visibility(&card_id, visible);
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn set_filters(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  categories: Vec<String>,
  countries: Vec<String>,
) -> Result<DashboardDto, String> {
  let categories = categories
    .iter()
    .filter_map(|tag| {
      let parsed = Category::parse(tag);
      if parsed.is_none() {
        log::warn!("ignoring unknown category filter '{}'", tag);
      }
      parsed
    })
    .collect();
  let countries = countries
    .iter()
    .map(|tag| tag.trim().to_lowercase())
    .filter(|tag| !tag.is_empty())
    .collect();
  state.store.lock().set_filters(categories, countries);
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn add_custom_link(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  input: AddLinkInput,
) -> Result<DashboardDto, String> {
  let link = CustomLink {
    title: input.title,
    description: input.description,
    url: input.url,
    logo_url: input.logo_url,
    category: input.category.as_deref().and_then(Category::parse),
  };
  state.store.lock().add_custom_link(link).map_err(|e| e.to_string())?;
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn remove_custom_link(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  card_id: String,
) -> Result<DashboardDto, String> {
  state.store.lock().remove_custom_link(&card_id);
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn begin_manage_cards(state: State<'_, AppState>) -> Result<Vec<ManageEntryDto>, String> {
  let prefs = state.store.lock().prefs().clone();
  let session = EditSession::begin(&prefs);
  let entries = manage_entries_dto(&session, &prefs);
  *state.session.lock() = Some(session);
  Ok(entries)
}

fn with_session(
  state: &AppState,
  operation: impl FnOnce(&mut EditSession),
) -> Result<Vec<ManageEntryDto>, String> {
  let prefs = state.store.lock().prefs().clone();
  let mut guard = state.session.lock();
  let session = guard.as_mut().ok_or_else(|| "No manage-cards session is active.".to_string())?;
  operation(session);
  Ok(manage_entries_dto(session, &prefs))
}

#[tauri::command]
fn manage_reorder(
  state: State<'_, AppState>,
  dragged_id: String,
  target_id: String,
  before_target: bool,
) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.reorder(&dragged_id, &target_id, before_target))
}

#[tauri::command]
fn manage_set_visible(
  state: State<'_, AppState>,
  card_id: String,
  visible: bool,
) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.set_visible(&card_id, visible))
}

#[tauri::command]
fn manage_set_selected(
  state: State<'_, AppState>,
  card_id: String,
  selected: bool,
) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.set_selected(&card_id, selected))
}

#[tauri::command]
fn manage_select_all(state: State<'_, AppState>) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.select_all())
}

#[tauri::command]
fn manage_clear_selection(state: State<'_, AppState>) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.clear_selection())
}

#[tauri::command]
fn manage_set_selected_visible(
  state: State<'_, AppState>,
  visible: bool,
) -> Result<Vec<ManageEntryDto>, String> {
  with_session(&state, |session| session.set_selected_visible(visible))
}

#[tauri::command]
fn commit_manage_cards(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
) -> Result<DashboardDto, String> {
  let session = state
    .session
    .lock()
    .take()
    .ok_or_else(|| "No manage-cards session is active.".to_string())?;
  session.commit(&mut state.store.lock());
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn cancel_manage_cards(state: State<'_, AppState>) -> Result<(), String> {
  state.session.lock().take();
  Ok(())
}

#[tauri::command]
fn enable_remote_sync(
  state: State<'_, AppState>,
  enabled: bool,
) -> Result<RemoteStatusDto, String> {
  if !enabled {
    let mut store = state.store.lock();
    store.set_remote_enabled(false);
    store.save();
    drop(store);
    return Ok(remote_status_dto(&state));
  }

  let needs_blob = {
    let mut store = state.store.lock();
    store.set_remote_enabled(true);
    store.prefs().remote_sync.blob_id.is_none()
  };
  if needs_blob {
    let snapshot = state.store.lock().prefs().to_value();
    match state.remote.create(&snapshot) {
      Ok(blob_id) => {
        let mut store = state.store.lock();
        store.set_remote_blob(Some(blob_id));
        store.save();
        drop(store);
        *state.last_pushed_hash.lock() = Some(remote::snapshot_hash(&snapshot));
        *state.last_synced_at.lock() = Some(now_iso());
      }
      Err(error) => {
        // The app stays usable without remote sync.
        let mut store = state.store.lock();
        store.set_remote_enabled(false);
        store.save();
        return Err(error.to_string());
      }
    }
  } else {
    state.store.lock().save();
  }
  Ok(remote_status_dto(&state))
}

#[tauri::command]
fn load_remote_blob(
  state: State<'_, AppState>,
  blob_id: String,
) -> Result<DashboardDto, String> {
  let blob_id = blob_id.trim().to_string();
  if blob_id.is_empty() {
    return Err(DeckError::Validation("A blob id is required.".to_string()).to_string());
  }
  remote::pull_and_adopt(&state.store, state.remote.as_ref(), &blob_id).map_err(|e| e.to_string())?;
  // The local state now mirrors the remote blob; no push-back is needed.
  *state.last_pushed_hash.lock() = Some(remote::snapshot_hash(&state.store.lock().prefs().to_value()));
  *state.last_synced_at.lock() = Some(now_iso());
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn get_remote_status(state: State<'_, AppState>) -> Result<RemoteStatusDto, String> {
  Ok(remote_status_dto(&state))
}

#[tauri::command]
fn export_settings(state: State<'_, AppState>) -> Result<String, String> {
  serde_json::to_string_pretty(state.store.lock().prefs()).map_err(|e| e.to_string())
}

#[tauri::command]
fn import_settings(
  app: tauri::AppHandle,
  state: State<'_, AppState>,
  settings: String,
) -> Result<DashboardDto, String> {
  let value: serde_json::Value = serde_json::from_str(&settings)
    .map_err(|_| DeckError::Validation("Imported settings are not valid JSON.".to_string()).to_string())?;
  state.store.lock().overlay(&value);
  persist_and_sync(&app, &state);
  Ok(current_dashboard(&state))
}

#[tauri::command]
fn reset_preferences(state: State<'_, AppState>) -> Result<DashboardDto, String> {
  state.store.lock().reset();
  *state.session.lock() = None;
  *state.last_pushed_hash.lock() = None;
  *state.last_synced_at.lock() = None;
  Ok(current_dashboard(&state))
}

#[cfg_attr(mobile, tauri::mobile_entry_point)]
pub fn run() {
  tauri::Builder::default()
    .setup(|app| {
      if cfg!(debug_assertions) {
        app.handle().plugin(
          tauri_plugin_log::Builder::default()
            .level(log::LevelFilter::Info)
            .build(),
        )?;
      }

      let app_data_dir = app.path().app_data_dir()?;
      let store = Arc::new(Mutex::new(PreferenceStore::open(app_data_dir.join("mediadeck.db"))));
      let remote = Arc::new(
        JsonBlobStore::new()
          .map_err(|error| std::io::Error::new(std::io::ErrorKind::Other, error.to_string()))?,
      );
      let last_pushed_hash = Arc::new(Mutex::new(None));
      let last_synced_at = Arc::new(Mutex::new(None));
      app.manage(AppState {
        store: store.clone(),
        remote: remote.clone(),
        session: Mutex::new(None),
        last_pushed_hash: last_pushed_hash.clone(),
        last_synced_at: last_synced_at.clone(),
      });

      // Stored prefs may already point at a remote blob; refresh from it in
      // the background without holding up the window.
      let stored_blob = {
        let guard = store.lock();
        let remote_sync = &guard.prefs().remote_sync;
        if remote_sync.enabled { remote_sync.blob_id.clone() } else { None }
      };
      if let Some(blob_id) = stored_blob {
        let app_handle = app.handle().clone();
        std::thread::spawn(move || {
          match remote::pull_and_adopt(&store, remote.as_ref(), &blob_id) {
            Ok(()) => {
              *last_pushed_hash.lock() = Some(remote::snapshot_hash(&store.lock().prefs().to_value()));
              *last_synced_at.lock() = Some(now_iso());
              notify(&app_handle, "Preferences were refreshed from the remote copy.".to_string(), "info");
            }
            Err(error) => {
              log::warn!("startup remote pull failed: {}", error);
              notify(&app_handle, format!("Could not load the remote copy: {}", error), "warning");
            }
          }
        });
      }
      Ok(())
    })
    .invoke_handler(tauri::generate_handler![
      get_dashboard,
      set_card_color,
      set_card_visibility,
      set_filters,
      add_custom_link,
      remove_custom_link,
      begin_manage_cards,
      manage_reorder,
      manage_set_visible,
      manage_set_selected,
      manage_select_all,
      manage_clear_selection,
      manage_set_selected_visible,
      commit_manage_cards,
      cancel_manage_cards,
      enable_remote_sync,
      load_remote_blob,
      get_remote_status,
      export_settings,
      import_settings,
      reset_preferences
    ])
    .run(tauri::generate_context!())
    .expect("error while running tauri application");
}
