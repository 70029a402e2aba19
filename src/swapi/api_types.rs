//! Serde-deserializable types matching the character database responses.
//!
//! These types are separate from domain types so missing or malformed
//! fields can be defaulted at the boundary while domain types stay plain.

use serde::Deserialize;

use super::types::{Character, Film, Planet, SearchPage};

// ============================================================================
// People
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiCharacter {
  #[serde(default)]
  pub url: String,
  #[serde(default)]
  pub name: String,
  #[serde(default)]
  pub birth_year: String,
  #[serde(default)]
  pub gender: String,
  #[serde(default)]
  pub hair_color: String,
  #[serde(default)]
  pub eye_color: String,
  #[serde(default)]
  pub skin_color: String,
  #[serde(default)]
  pub height: String,
  #[serde(default)]
  pub mass: String,
  #[serde(default)]
  pub homeworld: String,
  #[serde(default)]
  pub films: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApiSearchResponse {
  #[serde(default)]
  pub count: u64,
  pub next: Option<String>,
  pub previous: Option<String>,
  #[serde(default)]
  pub results: Vec<ApiCharacter>,
}

// ============================================================================
// Planets and films
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPlanet {
  pub name: String,
  #[serde(default)]
  pub rotation_period: String,
  #[serde(default)]
  pub orbital_period: String,
  #[serde(default)]
  pub diameter: String,
  #[serde(default)]
  pub gravity: String,
  #[serde(default)]
  pub climate: String,
  #[serde(default)]
  pub terrain: String,
  #[serde(default)]
  pub surface_water: String,
  #[serde(default)]
  pub population: String,
}

#[derive(Debug, Deserialize)]
pub struct ApiFilm {
  pub title: String,
  #[serde(default)]
  pub episode_id: i64,
  #[serde(default)]
  pub opening_crawl: String,
  #[serde(default)]
  pub director: String,
  #[serde(default)]
  pub producer: String,
  #[serde(default)]
  pub release_date: String,
}

// ============================================================================
// Conversions to domain types
// ============================================================================

impl From<ApiCharacter> for Character {
  fn from(c: ApiCharacter) -> Self {
    Character {
      url: c.url,
      name: c.name,
      birth_year: c.birth_year,
      gender: c.gender,
      hair_color: c.hair_color,
      eye_color: c.eye_color,
      skin_color: c.skin_color,
      height: c.height,
      mass: c.mass,
      homeworld: c.homeworld,
      films: c.films,
    }
  }
}

impl From<ApiSearchResponse> for SearchPage {
  fn from(resp: ApiSearchResponse) -> Self {
    SearchPage {
      count: resp.count,
      next: resp.next,
      previous: resp.previous,
      characters: resp.results.into_iter().map(Character::from).collect(),
    }
  }
}

impl From<ApiPlanet> for Planet {
  fn from(p: ApiPlanet) -> Self {
    Planet {
      name: p.name,
      rotation_period: p.rotation_period,
      orbital_period: p.orbital_period,
      diameter: p.diameter,
      gravity: p.gravity,
      climate: p.climate,
      terrain: p.terrain,
      surface_water: p.surface_water,
      population: p.population,
    }
  }
}

impl From<ApiFilm> for Film {
  fn from(f: ApiFilm) -> Self {
    Film {
      title: f.title,
      episode_id: f.episode_id,
      opening_crawl: f.opening_crawl,
      director: f.director,
      producer: f.producer,
      release_date: f.release_date,
    }
  }
}
