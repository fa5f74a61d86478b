use crate::catalog;
use crate::prefs::{PreferenceStore, Preferences};

#[derive(Debug, Clone, PartialEq)]
pub struct EditEntry {
  pub id: String,
  pub visible: bool,
  pub selected: bool,
}

/// Working copy for a manage-cards session. Edits stay local to the session
/// until `commit` writes them to the store in one batch; dropping the
/// session discards everything.
#[derive(Debug, Clone)]
pub struct EditSession {
  entries: Vec<EditEntry>,
}

impl EditSession {
  /// Snapshot the current effective order and explicit visibility of every
  /// card (filter state is not part of the session; only explicit hides
  /// show up as unchecked).
  pub fn begin(prefs: &Preferences) -> EditSession {
    let mut cards = catalog::merged_cards(&prefs.custom_links);
    cards.sort_by_key(|card| prefs.card_order.get(&card.id).copied().unwrap_or(card.source_order));
    let entries = cards
      .into_iter()
      .map(|card| EditEntry {
        visible: prefs.card_visibility.get(&card.id) != Some(&false),
        id: card.id,
        selected: false,
      })
      .collect();
    EditSession { entries }
  }

  pub fn entries(&self) -> &[EditEntry] {
    &self.entries
  }

  fn index_of(&self, id: &str) -> Option<usize> {
    self.entries.iter().position(|entry| entry.id == id)
  }

  /// Move `dragged_id` immediately before or after `target_id`. When the
  /// dragged entry is selected, every selected entry moves with it and they
  /// end up contiguous, keeping their relative order. Unknown ids and drops
  /// onto another selected entry are no-ops; session inputs are untrusted.
  pub fn reorder(&mut self, dragged_id: &str, target_id: &str, before_target: bool) {
    if dragged_id == target_id {
      return;
    }
    let Some(dragged_index) = self.index_of(dragged_id) else {
      return;
    };
    let Some(target_index) = self.index_of(target_id) else {
      return;
    };
    let group_move = self.entries[dragged_index].selected;
    if group_move && self.entries[target_index].selected {
      return;
    }

    let (moved, mut rest): (Vec<EditEntry>, Vec<EditEntry>) = self
      .entries
      .drain(..)
      .partition(|entry| if group_move { entry.selected } else { entry.id == dragged_id });

    let anchor = rest
      .iter()
      .position(|entry| entry.id == target_id)
      .map(|index| if before_target { index } else { index + 1 })
      .unwrap_or(rest.len());
    rest.splice(anchor..anchor, moved);
    self.entries = rest;
  }

  pub fn set_visible(&mut self, id: &str, visible: bool) {
    if let Some(index) = self.index_of(id) {
      self.entries[index].visible = visible;
    }
  }

  pub fn set_selected(&mut self, id: &str, selected: bool) {
    if let Some(index) = self.index_of(id) {
      self.entries[index].selected = selected;
    }
  }

  pub fn select_all(&mut self) {
    for entry in &mut self.entries {
      entry.selected = true;
    }
  }

  pub fn clear_selection(&mut self) {
    for entry in &mut self.entries {
      entry.selected = false;
    }
  }

  /// Bulk show/hide for the current selection.
  pub fn set_selected_visible(&mut self, visible: bool) {
    for entry in &mut self.entries {
      if entry.selected {
        entry.visible = visible;
      }
    }
  }

  /// Write the whole working copy to the store in one batch. Only ids
  /// present in the session are touched, so entries for any card missing
  /// from the working copy survive untouched. The caller performs the
  /// single save.
  pub fn commit(self, store: &mut PreferenceStore) {
    let ordered_ids: Vec<String> = self.entries.iter().map(|entry| entry.id.clone()).collect();
    store.set_card_order(&ordered_ids);
    for entry in &self.entries {
      store.set_card_visibility(&entry.id, entry.visible);
    }
  }
}
