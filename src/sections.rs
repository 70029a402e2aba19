//! Display sections handed to the rendering layer.

use crate::swapi::{CachedCharacter, Character, Film, Planet};

pub const DESCRIPTION: &str = "Description";
pub const HOMEWORLD: &str = "Homeworld";
pub const FILMS: &str = "Films";

/// A named group of (label, value) rows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplaySection {
  pub title: String,
  pub rows: Vec<(String, String)>,
}

impl DisplaySection {
  fn new(title: &str, rows: Vec<(&str, &str)>) -> Self {
    Self {
      title: title.to_string(),
      rows: rows
        .into_iter()
        .map(|(label, value)| (label.to_string(), value.to_string()))
        .collect(),
    }
  }
}

pub fn description_section(character: &Character) -> DisplaySection {
  DisplaySection::new(
    DESCRIPTION,
    vec![
      ("Birth year", character.birth_year.as_str()),
      ("Gender", character.gender.as_str()),
      ("Hair color", character.hair_color.as_str()),
      ("Eye color", character.eye_color.as_str()),
      ("Skin color", character.skin_color.as_str()),
      ("Height", character.height.as_str()),
      ("Weight", character.mass.as_str()),
    ],
  )
}

pub fn homeworld_section(planet: &Planet) -> DisplaySection {
  DisplaySection::new(
    HOMEWORLD,
    vec![
      ("Planet", planet.name.as_str()),
      ("Rotation period", planet.rotation_period.as_str()),
      ("Orbital period", planet.orbital_period.as_str()),
      ("Diameter", planet.diameter.as_str()),
      ("Gravity", planet.gravity.as_str()),
      ("Climate", planet.climate.as_str()),
      ("Terrain", planet.terrain.as_str()),
      ("Surface water", planet.surface_water.as_str()),
      ("Population", planet.population.as_str()),
    ],
  )
}

/// Append a film title to the Films section, creating the section at the
/// end of the list on first use.
pub fn push_film(sections: &mut Vec<DisplaySection>, film: &Film) {
  let row = (film.title.clone(), String::new());
  match sections.iter_mut().find(|s| s.title == FILMS) {
    Some(section) => section.rows.push(row),
    None => sections.push(DisplaySection {
      title: FILMS.to_string(),
      rows: vec![row],
    }),
  }
}

/// Rebuild the full section list from what the cache holds.
pub fn cached_sections(cached: &CachedCharacter) -> Vec<DisplaySection> {
  let mut sections = vec![description_section(&cached.character)];
  if let Some(planet) = &cached.homeworld {
    sections.push(homeworld_section(planet));
  }
  for film in &cached.films {
    push_film(&mut sections, film);
  }
  sections
}
