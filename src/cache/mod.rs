//! Local cache for characters and the homeworlds and films resolved for them.
//!
//! Characters are keyed by their identity. A character is stored bare as
//! soon as it is fetched and is enriched as its homeworld and films
//! arrive. Nothing is ever evicted.

mod storage;
mod traits;

use color_eyre::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::CacheConfig;

pub use storage::{CharacterStore, NoopStore, SqliteStore};
pub use traits::{CacheResult, CacheSource};

/// Store handle shared between the orchestrator and aggregate builders.
pub type SharedStore = Arc<dyn CharacterStore>;

/// Open the store selected by configuration.
pub fn open_store(config: &CacheConfig) -> Result<SharedStore> {
  if !config.enabled {
    info!("Cache disabled by configuration");
    return Ok(Arc::new(NoopStore));
  }

  let path = match &config.path {
    Some(path) => path.clone(),
    None => SqliteStore::default_path()?,
  };
  info!(path = %path.display(), "Opening cache");

  Ok(Arc::new(SqliteStore::open_at(&path)?))
}
