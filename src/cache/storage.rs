//! Character store trait and SQLite implementation.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::warn;

use crate::swapi::{CachedCharacter, Character, Film, Planet};

/// Trait for character cache backends.
///
/// Every mutation is atomic: a reader sees either the state before the
/// call or the state after it.
pub trait CharacterStore: Send + Sync {
  /// Insert or update a character's own fields, keeping anything attached.
  fn upsert_bare(&self, character: &Character) -> Result<()>;

  /// Set the homeworld of a cached character.
  ///
  /// Returns false (and writes nothing) if the character is not cached.
  fn attach_homeworld(&self, id: &str, planet: &Planet) -> Result<bool>;

  /// Append a film to a cached character.
  ///
  /// Returns false (and writes nothing) if the character is not cached.
  fn attach_film(&self, id: &str, film: &Film) -> Result<bool>;

  /// Look up a character by identity.
  fn find(&self, id: &str) -> Result<Option<CachedCharacter>>;

  /// All cached characters with a non-empty identity, in insertion order.
  fn all_valid(&self) -> Result<Vec<CachedCharacter>>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStore;

impl CharacterStore for NoopStore {
  fn upsert_bare(&self, _character: &Character) -> Result<()> {
    Ok(()) // Discard
  }

  fn attach_homeworld(&self, _id: &str, _planet: &Planet) -> Result<bool> {
    Ok(false) // Never present
  }

  fn attach_film(&self, _id: &str, _film: &Film) -> Result<bool> {
    Ok(false) // Never present
  }

  fn find(&self, _id: &str) -> Result<Option<CachedCharacter>> {
    Ok(None) // Always miss
  }

  fn all_valid(&self) -> Result<Vec<CachedCharacter>> {
    Ok(Vec::new())
  }
}

/// SQLite-based character store.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

impl SqliteStore {
  /// Open or create the store at the given path.
  pub fn open_at(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a store that lives only as long as the returned value.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory cache database: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("swbrowse").join("cache.db"))
  }

  /// Run database migrations for cache tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for cache tables.
const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS characters (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL,
    name TEXT NOT NULL,
    birth_year TEXT NOT NULL,
    gender TEXT NOT NULL,
    hair_color TEXT NOT NULL,
    eye_color TEXT NOT NULL,
    skin_color TEXT NOT NULL,
    height TEXT NOT NULL,
    mass TEXT NOT NULL,
    homeworld_url TEXT NOT NULL,
    -- JSON array of film URLs
    film_urls TEXT NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Homeworld embedded per character
CREATE TABLE IF NOT EXISTS planets (
    character_id TEXT PRIMARY KEY REFERENCES characters(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    rotation_period TEXT NOT NULL,
    orbital_period TEXT NOT NULL,
    diameter TEXT NOT NULL,
    gravity TEXT NOT NULL,
    climate TEXT NOT NULL,
    terrain TEXT NOT NULL,
    surface_water TEXT NOT NULL,
    population TEXT NOT NULL
);

-- Films owned by a character, in attachment order
CREATE TABLE IF NOT EXISTS films (
    character_id TEXT NOT NULL REFERENCES characters(id) ON DELETE CASCADE,
    position INTEGER NOT NULL,
    title TEXT NOT NULL,
    episode_id INTEGER NOT NULL,
    opening_crawl TEXT NOT NULL,
    director TEXT NOT NULL,
    producer TEXT NOT NULL,
    release_date TEXT NOT NULL,
    PRIMARY KEY (character_id, position),
    UNIQUE (character_id, title)
);
"#;

impl CharacterStore for SqliteStore {
  fn upsert_bare(&self, character: &Character) -> Result<()> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let film_urls = serde_json::to_string(&character.films)
      .map_err(|e| eyre!("Failed to serialize film references: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    tx.execute(
      "INSERT INTO characters (id, url, name, birth_year, gender, hair_color, eye_color,
                               skin_color, height, mass, homeworld_url, film_urls, cached_at)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, datetime('now'))
       ON CONFLICT(id) DO UPDATE SET
         url = excluded.url,
         name = excluded.name,
         birth_year = excluded.birth_year,
         gender = excluded.gender,
         hair_color = excluded.hair_color,
         eye_color = excluded.eye_color,
         skin_color = excluded.skin_color,
         height = excluded.height,
         mass = excluded.mass,
         homeworld_url = excluded.homeworld_url,
         film_urls = excluded.film_urls,
         cached_at = excluded.cached_at",
      params![
        character.id(),
        character.url,
        character.name,
        character.birth_year,
        character.gender,
        character.hair_color,
        character.eye_color,
        character.skin_color,
        character.height,
        character.mass,
        character.homeworld,
        film_urls,
      ],
    )
    .map_err(|e| eyre!("Failed to store character: {}", e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(())
  }

  fn attach_homeworld(&self, id: &str, planet: &Planet) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    if !character_exists(&tx, id)? {
      return Ok(false);
    }

    tx.execute(
      "INSERT OR REPLACE INTO planets (character_id, name, rotation_period, orbital_period,
                                       diameter, gravity, climate, terrain, surface_water, population)
       VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
      params![
        id,
        planet.name,
        planet.rotation_period,
        planet.orbital_period,
        planet.diameter,
        planet.gravity,
        planet.climate,
        planet.terrain,
        planet.surface_water,
        planet.population,
      ],
    )
    .map_err(|e| eyre!("Failed to store homeworld for {}: {}", id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(true)
  }

  fn attach_film(&self, id: &str, film: &Film) -> Result<bool> {
    let mut conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let tx = conn
      .transaction()
      .map_err(|e| eyre!("Failed to begin transaction: {}", e))?;

    if !character_exists(&tx, id)? {
      return Ok(false);
    }

    // A title already attached to this character is left as is
    tx.execute(
      "INSERT OR IGNORE INTO films (character_id, position, title, episode_id, opening_crawl,
                                    director, producer, release_date)
       VALUES (?1,
               (SELECT COALESCE(MAX(position), -1) + 1 FROM films WHERE character_id = ?1),
               ?2, ?3, ?4, ?5, ?6, ?7)",
      params![
        id,
        film.title,
        film.episode_id,
        film.opening_crawl,
        film.director,
        film.producer,
        film.release_date,
      ],
    )
    .map_err(|e| eyre!("Failed to store film for {}: {}", id, e))?;

    tx.commit()
      .map_err(|e| eyre!("Failed to commit transaction: {}", e))?;

    Ok(true)
  }

  fn find(&self, id: &str) -> Result<Option<CachedCharacter>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    load_character(&conn, id)
  }

  fn all_valid(&self) -> Result<Vec<CachedCharacter>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let mut stmt = conn
      .prepare("SELECT id FROM characters WHERE id != '' ORDER BY rowid")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let ids: Vec<String> = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to query characters: {}", e))?
      .filter_map(|r| match r {
        Ok(id) => Some(id),
        Err(e) => {
          warn!("Skipping unreadable character id: {}", e);
          None
        }
      })
      .collect();

    // A corrupt entry is skipped rather than hiding the rest of the cache
    let mut characters = Vec::with_capacity(ids.len());
    for id in ids {
      match load_character(&conn, &id) {
        Ok(Some(cached)) => characters.push(cached),
        Ok(None) => {}
        Err(e) => warn!(%id, "Skipping unreadable cached character: {}", e),
      }
    }

    Ok(characters)
  }
}

fn character_exists(tx: &Transaction<'_>, id: &str) -> Result<bool> {
  let found = tx
    .query_row(
      "SELECT 1 FROM characters WHERE id = ?",
      params![id],
      |_| Ok(()),
    )
    .optional()
    .map_err(|e| eyre!("Failed to look up character {}: {}", id, e))?;

  Ok(found.is_some())
}

/// Row shape of the characters table, before the JSON and date columns are decoded
struct CharacterRow {
  character: Character,
  film_urls: String,
  cached_at: String,
}

fn load_character(conn: &Connection, id: &str) -> Result<Option<CachedCharacter>> {
  let row = conn
    .query_row(
      "SELECT url, name, birth_year, gender, hair_color, eye_color, skin_color,
              height, mass, homeworld_url, film_urls, cached_at
       FROM characters WHERE id = ?",
      params![id],
      |row| {
        Ok(CharacterRow {
          character: Character {
            url: row.get(0)?,
            name: row.get(1)?,
            birth_year: row.get(2)?,
            gender: row.get(3)?,
            hair_color: row.get(4)?,
            eye_color: row.get(5)?,
            skin_color: row.get(6)?,
            height: row.get(7)?,
            mass: row.get(8)?,
            homeworld: row.get(9)?,
            films: Vec::new(),
          },
          film_urls: row.get(10)?,
          cached_at: row.get(11)?,
        })
      },
    )
    .optional()
    .map_err(|e| eyre!("Failed to load character {}: {}", id, e))?;

  let Some(CharacterRow {
    mut character,
    film_urls,
    cached_at,
  }) = row
  else {
    return Ok(None);
  };

  // A corrupt reference list shouldn't hide the rest of the record
  character.films = serde_json::from_str(&film_urls).unwrap_or_default();

  let homeworld = conn
    .query_row(
      "SELECT name, rotation_period, orbital_period, diameter, gravity, climate,
              terrain, surface_water, population
       FROM planets WHERE character_id = ?",
      params![id],
      |row| {
        Ok(Planet {
          name: row.get(0)?,
          rotation_period: row.get(1)?,
          orbital_period: row.get(2)?,
          diameter: row.get(3)?,
          gravity: row.get(4)?,
          climate: row.get(5)?,
          terrain: row.get(6)?,
          surface_water: row.get(7)?,
          population: row.get(8)?,
        })
      },
    )
    .optional()
    .map_err(|e| eyre!("Failed to load homeworld for {}: {}", id, e))?;

  let mut stmt = conn
    .prepare(
      "SELECT title, episode_id, opening_crawl, director, producer, release_date
       FROM films WHERE character_id = ? ORDER BY position",
    )
    .map_err(|e| eyre!("Failed to prepare film query: {}", e))?;

  let films: Vec<Film> = stmt
    .query_map(params![id], |row| {
      Ok(Film {
        title: row.get(0)?,
        episode_id: row.get(1)?,
        opening_crawl: row.get(2)?,
        director: row.get(3)?,
        producer: row.get(4)?,
        release_date: row.get(5)?,
      })
    })
    .map_err(|e| eyre!("Failed to query films for {}: {}", id, e))?
    .filter_map(|r| match r {
      Ok(film) => Some(film),
      Err(e) => {
        warn!(%id, "Skipping unreadable cached film: {}", e);
        None
      }
    })
    .collect();

  Ok(Some(CachedCharacter {
    id: id.to_string(),
    character,
    homeworld,
    films,
    cached_at: parse_datetime(&cached_at)?,
  }))
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
