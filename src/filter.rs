use serde::Serialize;

use crate::catalog::{self, Card, Category};
use crate::prefs::Preferences;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderEntry {
  #[serde(flatten)]
  pub card: Card,
  pub visible: bool,
}

/// Ordered card list with per-card visible flags. Hidden cards stay in the
/// list so the presentation layer can keep them in the DOM.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderPlan {
  pub entries: Vec<RenderEntry>,
  pub visible_count: usize,
}

fn effective_order(card: &Card, prefs: &Preferences) -> i64 {
  prefs.card_order.get(&card.id).copied().unwrap_or(card.source_order)
}

fn is_visible(card: &Card, prefs: &Preferences) -> bool {
  if prefs.card_visibility.get(&card.id) == Some(&false) {
    return false;
  }
  // Private cards bypass the category filter but not the country filter.
  let category_ok =
    card.category == Category::Private || prefs.category_filters.contains(&card.category);
  let country_ok = prefs.country_filters.is_empty() || prefs.country_filters.contains(&card.country);
  category_ok && country_ok
}

/// Derive the rendered card list from a card set and preferences.
///
/// Deterministic and side-effect free: ordering uses the per-card effective
/// rank (order override, else sourceOrder) with a stable sort, so equal
/// ranks keep catalog iteration order.
pub fn render_plan(mut cards: Vec<Card>, prefs: &Preferences) -> RenderPlan {
  cards.sort_by_key(|card| effective_order(card, prefs));
  let entries: Vec<RenderEntry> = cards
    .into_iter()
    .map(|card| {
      let visible = is_visible(&card, prefs);
      RenderEntry { card, visible }
    })
    .collect();
  let visible_count = entries.iter().filter(|entry| entry.visible).count();
  RenderPlan { entries, visible_count }
}

/// Render plan for the default catalog merged with the user's custom links.
pub fn dashboard_plan(prefs: &Preferences) -> RenderPlan {
  render_plan(catalog::merged_cards(&prefs.custom_links), prefs)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeSet;

  fn test_card(id: &str, category: Category, source_order: i64) -> Card {
    Card {
      id: id.to_string(),
      title: id.to_uppercase(),
      description: String::new(),
      url: format!("https://{}.example", id),
      logo_url: None,
      category,
      country: "intl".to_string(),
      brand_color: None,
      source_order,
    }
  }

  fn abc_catalog() -> Vec<Card> {
    vec![
      test_card("a", Category::Paid, 1),
      test_card("b", Category::Free, 2),
      test_card("c", Category::Private, 3),
    ]
  }

  fn ids(plan: &RenderPlan) -> Vec<&str> {
    plan.entries.iter().map(|entry| entry.card.id.as_str()).collect()
  }

  fn flags(plan: &RenderPlan) -> Vec<bool> {
    plan.entries.iter().map(|entry| entry.visible).collect()
  }

  #[test]
  fn category_filter_hides_without_removing() {
    let mut prefs = Preferences::default();
    prefs.category_filters = [Category::Free].into_iter().collect();
    let plan = render_plan(abc_catalog(), &prefs);
    assert_eq!(ids(&plan), vec!["a", "b", "c"]);
    assert_eq!(flags(&plan), vec![false, true, true]);
    assert_eq!(plan.visible_count, 2);
  }

  #[test]
  fn order_override_applies_with_visibility_unchanged() {
    let mut prefs = Preferences::default();
    prefs.category_filters = [Category::Free].into_iter().collect();
    for (rank, id) in ["c", "a", "b"].iter().enumerate() {
      prefs.card_order.insert(id.to_string(), rank as i64);
    }
    let plan = render_plan(abc_catalog(), &prefs);
    assert_eq!(ids(&plan), vec!["c", "a", "b"]);
    assert_eq!(flags(&plan), vec![true, false, true]);
  }

  #[test]
  fn output_is_deterministic_across_calls() {
    let mut prefs = Preferences::default();
    prefs.card_order.insert("b".to_string(), 0);
    prefs.card_visibility.insert("a".to_string(), false);
    let first = render_plan(abc_catalog(), &prefs);
    let second = render_plan(abc_catalog(), &prefs);
    assert_eq!(first, second);
  }

  #[test]
  fn private_cards_ignore_category_filters_entirely() {
    let mut prefs = Preferences::default();
    prefs.category_filters = BTreeSet::new();
    let plan = render_plan(abc_catalog(), &prefs);
    assert_eq!(flags(&plan), vec![false, false, true]);
  }

  #[test]
  fn explicit_visibility_false_hides_private_cards_too() {
    let mut prefs = Preferences::default();
    prefs.card_visibility.insert("c".to_string(), false);
    let plan = render_plan(abc_catalog(), &prefs);
    assert_eq!(flags(&plan), vec![true, true, false]);
  }

  #[test]
  fn empty_country_filter_means_show_all() {
    let mut cards = abc_catalog();
    cards[0].country = "us".to_string();
    cards[1].country = "uk".to_string();
    let prefs = Preferences::default();
    assert!(prefs.country_filters.is_empty());
    let plan = render_plan(cards, &prefs);
    assert_eq!(flags(&plan), vec![true, true, true]);
  }

  #[test]
  fn country_filter_applies_to_private_cards() {
    let mut cards = abc_catalog();
    cards[2].country = "de".to_string();
    let mut prefs = Preferences::default();
    prefs.country_filters = ["us".to_string()].into_iter().collect();
    let plan = render_plan(cards, &prefs);
    // a and b are intl and filtered out by country; the private card does
    // not get a country exemption.
    assert_eq!(flags(&plan), vec![false, false, false]);
    assert_eq!(plan.visible_count, 0);
  }

  #[test]
  fn equal_ranks_keep_catalog_iteration_order() {
    let cards = vec![
      test_card("x", Category::Free, 5),
      test_card("y", Category::Free, 5),
      test_card("z", Category::Free, 1),
    ];
    let plan = render_plan(cards, &Preferences::default());
    assert_eq!(ids(&plan), vec!["z", "x", "y"]);
  }

  #[test]
  fn custom_links_sort_after_defaults_by_default() {
    let mut prefs = Preferences::default();
    prefs.custom_links.push(crate::prefs::CustomLink {
      title: "Mine".to_string(),
      description: None,
      url: "https://mine.example".to_string(),
      logo_url: None,
      category: None,
    });
    let plan = dashboard_plan(&prefs);
    let last = plan.entries.last().expect("entries");
    assert_eq!(last.card.id, "custom-0");
    assert!(last.visible);
  }
}
