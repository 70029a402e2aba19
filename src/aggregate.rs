//! Builds a character's detail view by resolving its homeworld and films.
//!
//! The homeworld is fetched first; only once it arrives are the films
//! fetched, all at once. Each resolved piece is written to the cache before
//! the updated section list is emitted, so a consumer that reads the cache
//! after an event sees the write.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::SharedStore;
use crate::sections::{
  cached_sections, description_section, homeworld_section, push_film, DisplaySection,
};
use crate::swapi::{ApiError, Character, RemoteSource};

/// Events emitted while an aggregate resolves
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateEvent {
  /// The full, revised section list
  Sections(Vec<DisplaySection>),
  /// A film resolved with a non-positive episode number and was left out
  FilmSkipped { url: String, episode_id: i64 },
  /// A film could not be fetched; the other films carry on
  FilmFailed { url: String, error: ApiError },
  /// The homeworld could not be fetched; nothing further is emitted
  Failed(ApiError),
  /// Every film outcome has been observed
  Completed,
}

/// Starts aggregate builds against a remote and the cache.
pub struct AggregateBuilder<C: RemoteSource> {
  client: Arc<C>,
  store: SharedStore,
  reachability: watch::Receiver<bool>,
}

impl<C: RemoteSource> AggregateBuilder<C> {
  pub fn new(client: Arc<C>, store: SharedStore, reachability: watch::Receiver<bool>) -> Self {
    Self {
      client,
      store,
      reachability,
    }
  }

  /// Start resolving `character` in the background.
  pub fn build(&self, character: Character) -> Aggregate {
    let (tx, rx) = mpsc::unbounded_channel();
    let (loading_tx, loading_rx) = watch::channel(false);
    let online = *self.reachability.borrow();

    let job = Job {
      client: Arc::clone(&self.client),
      store: Arc::clone(&self.store),
      online,
      tx,
      loading_tx,
    };
    let task = tokio::spawn(job.run(character));

    Aggregate {
      events: rx,
      loading: loading_rx,
      task,
    }
  }
}

/// Handle to a running aggregate build.
///
/// Dropping the handle aborts the build and any requests it has in flight.
pub struct Aggregate {
  events: mpsc::UnboundedReceiver<AggregateEvent>,
  loading: watch::Receiver<bool>,
  task: JoinHandle<()>,
}

impl Aggregate {
  /// Receive the next event; `None` once the build has finished.
  pub async fn next(&mut self) -> Option<AggregateEvent> {
    self.events.recv().await
  }

  /// Whether the build still has network work outstanding.
  pub fn loading(&self) -> watch::Receiver<bool> {
    self.loading.clone()
  }

  pub fn cancel(&self) {
    self.task.abort();
  }
}

impl Drop for Aggregate {
  fn drop(&mut self) {
    self.task.abort();
  }
}

struct Job<C> {
  client: Arc<C>,
  store: SharedStore,
  online: bool,
  tx: mpsc::UnboundedSender<AggregateEvent>,
  loading_tx: watch::Sender<bool>,
}

impl<C: RemoteSource> Job<C> {
  fn emit(&self, event: AggregateEvent) {
    // Ignore send errors - the handle may have been dropped
    let _ = self.tx.send(event);
  }

  fn finish(&self, event: AggregateEvent) {
    self.loading_tx.send_replace(false);
    self.emit(event);
  }

  async fn run(self, character: Character) {
    let id = character.id();

    let cached = self.store.find(&id).unwrap_or_else(|e| {
      warn!(%id, "Failed to read cached character: {}", e);
      None
    });

    if let Some(cached) = cached {
      if cached.is_complete() || !self.online {
        info!(%id, online = self.online, "Serving character detail from cache");
        self.emit(AggregateEvent::Sections(cached_sections(&cached)));
        self.finish(AggregateEvent::Completed);
        return;
      }
    }

    if let Err(e) = self.store.upsert_bare(&character) {
      warn!(%id, "Failed to cache character: {}", e);
    }

    let mut sections = vec![description_section(&character)];
    self.emit(AggregateEvent::Sections(sections.clone()));
    self.loading_tx.send_replace(true);

    let planet = match self.client.fetch_planet(&character.homeworld).await {
      Ok(planet) => planet,
      Err(error) => {
        warn!(%id, homeworld = %character.homeworld, "Homeworld fetch failed: {}", error);
        self.finish(AggregateEvent::Failed(error));
        return;
      }
    };

    if let Err(e) = self.store.attach_homeworld(&id, &planet) {
      warn!(%id, "Failed to cache homeworld: {}", e);
    }
    sections.push(homeworld_section(&planet));
    self.emit(AggregateEvent::Sections(sections.clone()));

    let client = self.client.as_ref();
    let mut pending: FuturesUnordered<_> = character
      .films
      .iter()
      .map(|url| async move { (url, client.fetch_film(url).await) })
      .collect();

    debug!(%id, films = pending.len(), "Fetching films");

    while let Some((url, outcome)) = pending.next().await {
      match outcome {
        Ok(film) if film.is_valid() => {
          if let Err(e) = self.store.attach_film(&id, &film) {
            warn!(%id, title = %film.title, "Failed to cache film: {}", e);
          }
          push_film(&mut sections, &film);
          self.emit(AggregateEvent::Sections(sections.clone()));
        }
        Ok(film) => {
          debug!(%id, %url, episode_id = film.episode_id, "Skipping film without an episode");
          self.emit(AggregateEvent::FilmSkipped {
            url: url.clone(),
            episode_id: film.episode_id,
          });
        }
        Err(error) => {
          warn!(%id, %url, "Film fetch failed: {}", error);
          self.emit(AggregateEvent::FilmFailed {
            url: url.clone(),
            error,
          });
        }
      }
    }

    self.finish(AggregateEvent::Completed);
  }
}
