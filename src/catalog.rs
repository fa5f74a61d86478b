use std::sync::OnceLock;

use serde::{Deserialize, Serialize};

use crate::prefs::CustomLink;

/// Rank offset for cards synthesized from custom links, so they sort after
/// every default card unless the user reorders them explicitly.
pub const CUSTOM_ORDER_BASE: i64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
  Paid,
  Free,
  Social,
  Private,
}

impl Category {
  pub fn parse(value: &str) -> Option<Category> {
    match value.trim().to_lowercase().as_str() {
      "paid" => Some(Category::Paid),
      "free" => Some(Category::Free),
      "social" => Some(Category::Social),
      "private" => Some(Category::Private),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      Category::Paid => "paid",
      Category::Free => "free",
      Category::Social => "social",
      Category::Private => "private",
    }
  }
}

/// A renderable dashboard entry, either from the default catalog or
/// synthesized from a user custom link (id `custom-<index>`).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
  pub id: String,
  pub title: String,
  pub description: String,
  pub url: String,
  pub logo_url: Option<String>,
  pub category: Category,
  pub country: String,
  pub brand_color: Option<String>,
  pub source_order: i64,
}

fn card(
  id: &str,
  title: &str,
  description: &str,
  url: &str,
  category: Category,
  country: &str,
  brand_color: Option<&str>,
  source_order: i64,
) -> Card {
  Card {
    id: id.to_string(),
    title: title.to_string(),
    description: description.to_string(),
    url: url.to_string(),
    logo_url: None,
    category,
    country: country.to_string(),
    brand_color: brand_color.map(|color| color.to_string()),
    source_order,
  }
}

/// The static default catalog. Ids are stable across sessions; sourceOrder
/// is the tie-break default ordering.
pub fn default_cards() -> &'static [Card] {
  static CARDS: OnceLock<Vec<Card>> = OnceLock::new();
  CARDS.get_or_init(|| {
    vec![
      card(
        "netflix",
        "Netflix",
        "Movies and series on demand",
        "https://www.netflix.com",
        Category::Paid,
        "intl",
        Some("#E50914"),
        1,
      ),
      card(
        "youtube",
        "YouTube",
        "Free videos, music and live streams",
        "https://www.youtube.com",
        Category::Free,
        "intl",
        Some("#FF0000"),
        2,
      ),
      card(
        "disney-plus",
        "Disney+",
        "Disney, Pixar, Marvel and Star Wars",
        "https://www.disneyplus.com",
        Category::Paid,
        "intl",
        Some("#113CCF"),
        3,
      ),
      card(
        "prime-video",
        "Prime Video",
        "Amazon originals and rentals",
        "https://www.primevideo.com",
        Category::Paid,
        "intl",
        Some("#00A8E1"),
        4,
      ),
      card(
        "apple-tv",
        "Apple TV+",
        "Apple original series and films",
        "https://tv.apple.com",
        Category::Paid,
        "intl",
        Some("#333333"),
        5,
      ),
      card(
        "hulu",
        "Hulu",
        "Current-season TV and originals",
        "https://www.hulu.com",
        Category::Paid,
        "us",
        Some("#1CE783"),
        6,
      ),
      card(
        "peacock",
        "Peacock",
        "NBC shows, films and live sport",
        "https://www.peacocktv.com",
        Category::Free,
        "us",
        Some("#000000"),
        7,
      ),
      card(
        "bbc-iplayer",
        "BBC iPlayer",
        "BBC live TV and catch-up",
        "https://www.bbc.co.uk/iplayer",
        Category::Free,
        "uk",
        Some("#FF4E98"),
        8,
      ),
      card(
        "zdf",
        "ZDF Mediathek",
        "German public broadcaster on demand",
        "https://www.zdf.de",
        Category::Free,
        "de",
        Some("#FA7D19"),
        9,
      ),
      card(
        "arte",
        "ARTE",
        "European culture channel, free",
        "https://www.arte.tv",
        Category::Free,
        "fr",
        Some("#FA481C"),
        10,
      ),
      card(
        "raiplay",
        "RaiPlay",
        "Italian public TV on demand",
        "https://www.raiplay.it",
        Category::Free,
        "it",
        Some("#0059AC"),
        11,
      ),
      card(
        "rtve",
        "RTVE Play",
        "Spanish public TV on demand",
        "https://www.rtve.es/play",
        Category::Free,
        "es",
        Some("#E50695"),
        12,
      ),
      card(
        "twitch",
        "Twitch",
        "Live game and creative streams",
        "https://www.twitch.tv",
        Category::Social,
        "intl",
        Some("#9146FF"),
        13,
      ),
      card(
        "plex",
        "Plex",
        "Free movies, TV and personal media",
        "https://www.plex.tv",
        Category::Free,
        "intl",
        Some("#E5A00D"),
        14,
      ),
    ]
  })
}

/// Synthesize a card from a custom link. Custom cards default to the
/// `private` category and the `intl` country.
pub fn custom_card(index: usize, link: &CustomLink) -> Card {
  Card {
    id: format!("custom-{}", index),
    title: link.title.clone(),
    description: link
      .description
      .clone()
      .filter(|text| !text.is_empty())
      .unwrap_or_else(|| "Custom link".to_string()),
    url: link.url.clone(),
    logo_url: link.logo_url.clone().filter(|url| !url.is_empty()),
    category: link.category.unwrap_or(Category::Private),
    country: "intl".to_string(),
    brand_color: None,
    source_order: CUSTOM_ORDER_BASE + index as i64,
  }
}

/// Default catalog merged with cards synthesized from custom links, in
/// catalog iteration order (defaults first, then customs by index).
pub fn merged_cards(custom_links: &[CustomLink]) -> Vec<Card> {
  let mut cards: Vec<Card> = default_cards().to_vec();
  for (index, link) in custom_links.iter().enumerate() {
    cards.push(custom_card(index, link));
  }
  cards
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_catalog_ids_are_unique() {
    let mut ids: Vec<&str> = default_cards().iter().map(|card| card.id.as_str()).collect();
    ids.sort();
    let before = ids.len();
    ids.dedup();
    assert_eq!(before, ids.len());
  }

  #[test]
  fn merged_ids_stay_unique_with_custom_links() {
    let links = vec![
      CustomLink {
        title: "Tesla Waves".to_string(),
        description: None,
        url: "https://teslawaves.example".to_string(),
        logo_url: None,
        category: None,
      },
      CustomLink {
        title: "Radio".to_string(),
        description: Some("Web radio".to_string()),
        url: "http://radio.example".to_string(),
        logo_url: None,
        category: Some(Category::Free),
      },
    ];
    let cards = merged_cards(&links);
    let mut ids: Vec<&str> = cards.iter().map(|card| card.id.as_str()).collect();
    ids.sort();
    let before = ids.len();
    ids.dedup();
    assert_eq!(before, ids.len());
    assert_eq!(cards.len(), default_cards().len() + 2);
  }

  #[test]
  fn custom_cards_default_to_private_and_sort_after_defaults() {
    let link = CustomLink {
      title: "My Site".to_string(),
      description: None,
      url: "https://example.com".to_string(),
      logo_url: None,
      category: None,
    };
    let synthesized = custom_card(3, &link);
    assert_eq!(synthesized.id, "custom-3");
    assert_eq!(synthesized.category, Category::Private);
    assert_eq!(synthesized.country, "intl");
    assert_eq!(synthesized.source_order, CUSTOM_ORDER_BASE + 3);
    assert!(default_cards().iter().all(|card| card.source_order < synthesized.source_order));
  }

  #[test]
  fn category_parse_round_trips() {
    for category in [Category::Paid, Category::Free, Category::Social, Category::Private] {
      assert_eq!(Category::parse(category.as_str()), Some(category));
    }
    assert_eq!(Category::parse("Paid "), Some(Category::Paid));
    assert_eq!(Category::parse("unknown"), None);
  }
}
