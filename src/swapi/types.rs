use chrono::{DateTime, Utc};

use super::identity::identity;

/// A character as returned by a search or detail fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Character {
  pub url: String,
  pub name: String,
  pub birth_year: String,
  pub gender: String,
  pub hair_color: String,
  pub eye_color: String,
  pub skin_color: String,
  pub height: String,
  pub mass: String,
  /// Planet URL
  pub homeworld: String,
  /// Film URLs, in the order the server listed them
  pub films: Vec<String>,
}

impl Character {
  /// Cache key derived from the character URL
  pub fn id(&self) -> String {
    identity(&self.url)
  }
}

/// Homeworld of a character
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Planet {
  pub name: String,
  pub rotation_period: String,
  pub orbital_period: String,
  pub diameter: String,
  pub gravity: String,
  pub climate: String,
  pub terrain: String,
  pub surface_water: String,
  pub population: String,
}

/// Film a character appears in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Film {
  pub title: String,
  pub episode_id: i64,
  pub opening_crawl: String,
  pub director: String,
  pub producer: String,
  pub release_date: String,
}

impl Film {
  /// Films without a positive episode number are excluded from aggregates.
  pub fn is_valid(&self) -> bool {
    self.episode_id > 0
  }
}

/// One page of search results
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchPage {
  pub count: u64,
  pub next: Option<String>,
  pub previous: Option<String>,
  pub characters: Vec<Character>,
}

/// A character as held by the cache, with whatever has been resolved so far
#[derive(Debug, Clone, PartialEq)]
pub struct CachedCharacter {
  pub id: String,
  pub character: Character,
  pub homeworld: Option<Planet>,
  pub films: Vec<Film>,
  pub cached_at: DateTime<Utc>,
}

impl CachedCharacter {
  /// Whether the homeworld and at least one film have been attached
  pub fn is_complete(&self) -> bool {
    self.homeworld.is_some() && !self.films.is_empty()
  }
}
