use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{CacheResult, SharedStore};
use crate::swapi::{ApiError, Character, RemoteSource, SearchPage};

use super::{CharacterList, Phase};

const ERROR_CAPACITY: usize = 16;

/// Point-in-time view of the session's pagination state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
  pub query: String,
  pub page: u32,
  pub loaded: usize,
  pub has_more: bool,
  pub loading: bool,
  pub online: bool,
}

struct SessionState {
  query: String,
  page: u32,
  characters: Vec<Character>,
  /// Whether the last received page carried a `next` token
  has_more: bool,
  /// Bumped whenever in-flight work is superseded
  generation: u64,
  loading: bool,
  online: bool,
  /// A search was requested (or interrupted) while offline
  pending_search: bool,
  in_flight: Option<JoinHandle<()>>,
  debounce_ticket: u64,
  debounce: Option<JoinHandle<()>>,
}

impl SessionState {
  fn new(online: bool) -> Self {
    Self {
      query: String::new(),
      page: 1,
      characters: Vec::new(),
      has_more: false,
      generation: 0,
      loading: false,
      online,
      pending_search: false,
      in_flight: None,
      debounce_ticket: 0,
      debounce: None,
    }
  }

  fn cancel_debounce(&mut self) {
    self.debounce_ticket += 1;
    if let Some(handle) = self.debounce.take() {
      handle.abort();
    }
  }
}

struct Shared<C> {
  client: Arc<C>,
  store: SharedStore,
  debounce: Duration,
  state: Mutex<SessionState>,
  list: watch::Sender<CharacterList>,
  loading: watch::Sender<bool>,
  phase: watch::Sender<Phase>,
  errors: broadcast::Sender<ApiError>,
}

/// Paginated character search over the remote, with a cache fallback.
///
/// Must be created inside a Tokio runtime. Dropping the session aborts its
/// in-flight search and the reachability watcher.
pub struct SearchSession<C: RemoteSource> {
  shared: Arc<Shared<C>>,
  watcher: JoinHandle<()>,
}

impl<C: RemoteSource> SearchSession<C> {
  pub fn new(
    client: Arc<C>,
    store: SharedStore,
    mut reachability: watch::Receiver<bool>,
    debounce: Duration,
  ) -> Self {
    let online = *reachability.borrow_and_update();
    let (list, _) = watch::channel(CharacterList::default());
    let (loading, _) = watch::channel(false);
    let (phase, _) = watch::channel(Phase::Idle);
    let (errors, _) = broadcast::channel(ERROR_CAPACITY);

    let shared = Arc::new(Shared {
      client,
      store,
      debounce,
      state: Mutex::new(SessionState::new(online)),
      list,
      loading,
      phase,
      errors,
    });

    if !online {
      shared.serve_offline();
    }

    let watcher = tokio::spawn({
      let shared = Arc::clone(&shared);
      async move {
        while reachability.changed().await.is_ok() {
          let online = *reachability.borrow_and_update();
          shared.observe_reachability(online);
        }
      }
    });

    Self { shared, watcher }
  }

  pub fn subscribe_list(&self) -> watch::Receiver<CharacterList> {
    self.shared.list.subscribe()
  }

  pub fn subscribe_loading(&self) -> watch::Receiver<bool> {
    self.shared.loading.subscribe()
  }

  pub fn subscribe_phase(&self) -> watch::Receiver<Phase> {
    self.shared.phase.subscribe()
  }

  pub fn subscribe_errors(&self) -> broadcast::Receiver<ApiError> {
    self.shared.errors.subscribe()
  }

  pub fn snapshot(&self) -> SessionSnapshot {
    let state = self.shared.lock();
    SessionSnapshot {
      query: state.query.clone(),
      page: state.page,
      loaded: state.characters.len(),
      has_more: state.has_more,
      loading: state.loading,
      online: state.online,
    }
  }

  /// Search immediately, discarding the accumulated list.
  pub fn search(&self, query: Option<&str>) {
    let mut state = self.shared.lock();
    state.cancel_debounce();
    self
      .shared
      .begin_search(&mut state, query.unwrap_or_default().to_string());
  }

  /// Record typed text. The search is issued once the text has been stable
  /// for the debounce period.
  pub fn query_changed(&self, text: &str) {
    let mut state = self.shared.lock();
    state.cancel_debounce();
    let ticket = state.debounce_ticket;

    let shared = Arc::clone(&self.shared);
    let text = text.to_string();
    state.debounce = Some(tokio::spawn(async move {
      tokio::time::sleep(shared.debounce).await;
      let mut state = shared.lock();
      if state.debounce_ticket != ticket {
        return;
      }
      state.debounce = None;
      shared.begin_search(&mut state, text);
    }));
  }

  /// Request the next page of the current query. Returns false when the
  /// request is ignored: offline, already loading, or no further pages.
  pub fn load_next_page(&self) -> bool {
    let mut state = self.shared.lock();
    if !state.online || state.loading || !state.has_more {
      debug!(
        online = state.online,
        loading = state.loading,
        has_more = state.has_more,
        "Ignoring next page request"
      );
      return false;
    }

    state.page += 1;
    self.shared.issue(&mut state);
    true
  }
}

impl<C: RemoteSource> Drop for SearchSession<C> {
  fn drop(&mut self) {
    self.watcher.abort();
    let mut state = self.shared.lock();
    state.cancel_debounce();
    if let Some(handle) = state.in_flight.take() {
      handle.abort();
    }
  }
}

impl<C: RemoteSource> Shared<C> {
  fn lock(&self) -> MutexGuard<'_, SessionState> {
    self.state.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn begin_search(self: &Arc<Self>, state: &mut SessionState, query: String) {
    info!(%query, "Search");
    state.query = query;
    state.page = 1;
    state.characters.clear();
    state.has_more = false;

    if !state.online {
      debug!("Offline, deferring search until reachable");
      state.pending_search = true;
      return;
    }

    self.list.send_replace(CacheResult::from_network(Vec::new()));
    self.issue(state);
  }

  /// Send the request for the state's current query and page, superseding
  /// anything in flight.
  fn issue(self: &Arc<Self>, state: &mut SessionState) {
    if let Some(handle) = state.in_flight.take() {
      handle.abort();
    }
    state.generation += 1;
    state.loading = true;
    self.loading.send_replace(true);
    self.phase.send_replace(Phase::Loading);

    let generation = state.generation;
    let page = state.page;
    let query = state.query.clone();
    let shared = Arc::clone(self);

    state.in_flight = Some(tokio::spawn(async move {
      let search = Some(query.as_str()).filter(|q| !q.is_empty());
      let result = shared.client.search_characters(search, page).await;
      shared.apply(generation, page, result);
    }));
  }

  fn apply(&self, generation: u64, page: u32, result: Result<SearchPage, ApiError>) {
    let mut state = self.lock();
    if state.generation != generation {
      debug!(
        generation,
        current = state.generation,
        "Discarding superseded search result"
      );
      return;
    }

    state.in_flight = None;
    state.loading = false;
    self.loading.send_replace(false);

    match result {
      Ok(received) => {
        for character in &received.characters {
          if let Err(e) = self.store.upsert_bare(character) {
            warn!(url = %character.url, "Failed to cache character: {}", e);
          }
        }

        state.has_more = received.next.is_some();
        if page == 1 {
          state.characters = received.characters;
        } else {
          state.characters.extend(received.characters);
        }
        debug!(page, total = state.characters.len(), "Search page applied");

        self
          .list
          .send_replace(CacheResult::from_network(state.characters.clone()));
        self.phase.send_replace(Phase::Loaded);
      }
      Err(error) => {
        warn!(query = %state.query, page, "Search failed: {}", error);
        if page > 1 {
          state.page = page - 1;
        }
        self.phase.send_replace(Phase::Failed(error.clone()));
        // No subscribers is fine
        let _ = self.errors.send(error);
      }
    }
  }

  fn observe_reachability(self: &Arc<Self>, online: bool) {
    let mut state = self.lock();
    let was_online = state.online;
    state.online = online;

    if !online {
      if let Some(handle) = state.in_flight.take() {
        handle.abort();
        if state.page > 1 {
          state.page -= 1;
        } else {
          state.pending_search = true;
        }
      }
      state.generation += 1;
      if state.loading {
        state.loading = false;
        self.loading.send_replace(false);
      }
      drop(state);
      self.serve_offline();
      return;
    }

    if was_online {
      return;
    }

    if std::mem::take(&mut state.pending_search) {
      let query = state.query.clone();
      self.begin_search(&mut state, query);
    } else {
      self
        .list
        .send_replace(CacheResult::from_network(state.characters.clone()));
    }
  }

  /// Publish every cached character, ignoring the query.
  fn serve_offline(&self) {
    let characters: Vec<Character> = match self.store.all_valid() {
      Ok(cached) => cached.into_iter().map(|c| c.character).collect(),
      Err(e) => {
        warn!("Failed to read cache: {}", e);
        Vec::new()
      }
    };
    info!(count = characters.len(), "Offline, serving cached characters");

    self.list.send_replace(CacheResult::offline(characters));
    self.phase.send_replace(Phase::Loaded);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheSource, CharacterStore, SqliteStore};
  use crate::test_support::{character, page, FakeRemote};

  const WAIT: Duration = Duration::from_secs(2);

  struct Harness {
    session: SearchSession<FakeRemote>,
    remote: Arc<FakeRemote>,
    store: Arc<SqliteStore>,
    reachability: watch::Sender<bool>,
  }

  fn harness(remote: FakeRemote, online: bool) -> Harness {
    harness_with_store(remote, online, SqliteStore::open_in_memory().unwrap())
  }

  fn harness_with_store(remote: FakeRemote, online: bool, store: SqliteStore) -> Harness {
    let remote = Arc::new(remote);
    let store = Arc::new(store);
    let (reachability, rx) = watch::channel(online);
    let session = SearchSession::new(
      Arc::clone(&remote),
      store.clone(),
      rx,
      Duration::from_millis(50),
    );
    Harness {
      session,
      remote,
      store,
      reachability,
    }
  }

  async fn settle(session: &SearchSession<FakeRemote>) -> Phase {
    let mut phase = session.subscribe_phase();
    let settled = tokio::time::timeout(WAIT, phase.wait_for(Phase::is_settled))
      .await
      .unwrap()
      .unwrap()
      .clone();
    settled
  }

  async fn wait_for_calls(remote: &FakeRemote, calls: usize) {
    tokio::time::timeout(WAIT, async {
      while remote.search_calls() < calls {
        tokio::time::sleep(Duration::from_millis(1)).await;
      }
    })
    .await
    .unwrap();
  }

  fn names(session: &SearchSession<FakeRemote>) -> Vec<String> {
    let list = session.subscribe_list();
    let names = list.borrow().data.iter().map(|c| c.name.clone()).collect();
    names
  }

  #[tokio::test]
  async fn test_next_page_appends_and_new_search_replaces() {
    let remote = FakeRemote::new()
      .with_page(
        "",
        1,
        page(vec![character(1, "Luke", 0), character(2, "C-3PO", 0)], true),
      )
      .with_page("", 2, page(vec![character(3, "R2-D2", 0)], false));
    let h = harness(remote, true);

    h.session.search(None);
    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Luke", "C-3PO"]);

    assert!(h.session.load_next_page());
    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Luke", "C-3PO", "R2-D2"]);
    assert_eq!(h.session.snapshot().page, 2);

    h.session.search(None);
    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Luke", "C-3PO"]);
    assert_eq!(h.session.snapshot().page, 1);
  }

  #[tokio::test]
  async fn test_phase_starts_idle_and_rests_after_result() {
    let remote = FakeRemote::new()
      .with_page("", 1, page(vec![character(1, "Luke", 0)], true))
      .with_page("", 2, page(vec![character(2, "C-3PO", 0)], false));
    let h = harness(remote, true);
    let phase = h.session.subscribe_phase();
    assert_eq!(*phase.borrow(), Phase::Idle);

    h.session.search(None);
    assert_eq!(*phase.borrow(), Phase::Loading);
    assert_eq!(settle(&h.session).await, Phase::Loaded);

    // A settled phase accepts the next request like an idle one
    assert!(!h.session.snapshot().loading);
    assert!(h.session.load_next_page());
    assert_eq!(*phase.borrow(), Phase::Loading);
    assert_eq!(settle(&h.session).await, Phase::Loaded);
  }

  #[tokio::test]
  async fn test_next_page_ignored_without_next_token() {
    let remote = FakeRemote::new().with_page("", 1, page(vec![character(1, "Luke", 0)], false));
    let h = harness(remote, true);

    h.session.search(None);
    settle(&h.session).await;

    assert!(!h.session.load_next_page());
    assert_eq!(h.remote.search_calls(), 1);
  }

  #[tokio::test]
  async fn test_next_page_ignored_while_loading() {
    let remote = FakeRemote::new().with_page_after(
      "",
      1,
      page(vec![character(1, "Luke", 0)], true),
      Duration::from_millis(100),
    );
    let h = harness(remote, true);

    h.session.search(None);
    assert!(*h.session.subscribe_loading().borrow());
    assert!(!h.session.load_next_page());

    settle(&h.session).await;
    assert!(!*h.session.subscribe_loading().borrow());
    assert_eq!(h.remote.search_calls(), 1);
  }

  #[tokio::test]
  async fn test_offline_serves_all_valid_regardless_of_query() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_bare(&character(1, "Luke", 0)).unwrap();
    store.upsert_bare(&character(4, "Vader", 0)).unwrap();
    let mut nameless = character(9, "Nobody", 0);
    nameless.url = String::new();
    store.upsert_bare(&nameless).unwrap();

    let h = harness_with_store(FakeRemote::new(), false, store);

    let list = h.session.subscribe_list().borrow().clone();
    assert_eq!(list.source, CacheSource::Offline);
    assert_eq!(names(&h.session), ["Luke", "Vader"]);

    h.session.search(Some("luke"));
    assert!(!h.session.load_next_page());
    assert_eq!(names(&h.session), ["Luke", "Vader"]);
    assert_eq!(h.remote.search_calls(), 0);
  }

  #[tokio::test]
  async fn test_latest_request_wins() {
    let remote = FakeRemote::new()
      .with_page_after(
        "a",
        1,
        page(vec![character(1, "Anakin", 0)], false),
        Duration::from_millis(150),
      )
      .with_page_after(
        "b",
        1,
        page(vec![character(2, "Boba", 0)], false),
        Duration::from_millis(10),
      );
    let h = harness(remote, true);

    h.session.search(Some("a"));
    wait_for_calls(&h.remote, 1).await;
    h.session.search(Some("b"));
    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Boba"]);

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(names(&h.session), ["Boba"]);
    assert!(h.store.find("1").unwrap().is_none());
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
  async fn test_superseded_result_arriving_late_is_discarded() {
    // The first answer cannot be aborted once its request is underway
    let remote = FakeRemote::new()
      .with_page_blocking(
        "a",
        1,
        page(vec![character(1, "Anakin", 0)], false),
        Duration::from_millis(200),
      )
      .with_page("b", 1, page(vec![character(2, "Boba", 0)], false));
    let h = harness(remote, true);

    h.session.search(Some("a"));
    wait_for_calls(&h.remote, 1).await;
    h.session.search(Some("b"));
    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Boba"]);

    tokio::time::sleep(Duration::from_millis(350)).await;
    assert_eq!(h.remote.search_calls(), 2);
    assert_eq!(names(&h.session), ["Boba"]);
    assert_eq!(h.session.snapshot().query, "b");
    assert_eq!(*h.session.subscribe_phase().borrow(), Phase::Loaded);
    assert!(h.store.find("1").unwrap().is_none());
  }

  #[tokio::test]
  async fn test_failure_keeps_list_and_reports_error() {
    let remote = FakeRemote::new()
      .with_page("", 1, page(vec![character(1, "Luke", 0)], true))
      .with_page_error("", 2, ApiError::InternalServerError);
    let h = harness(remote, true);
    let mut errors = h.session.subscribe_errors();

    h.session.search(None);
    settle(&h.session).await;
    assert!(h.session.load_next_page());

    assert_eq!(
      settle(&h.session).await,
      Phase::Failed(ApiError::InternalServerError)
    );
    assert_eq!(errors.recv().await.unwrap(), ApiError::InternalServerError);
    assert_eq!(names(&h.session), ["Luke"]);

    let snapshot = h.session.snapshot();
    assert!(!snapshot.loading);
    assert_eq!(snapshot.page, 1);
    assert!(snapshot.has_more);
  }

  #[tokio::test]
  async fn test_typed_text_is_debounced() {
    let remote = FakeRemote::new().with_page("luke", 1, page(vec![character(1, "Luke", 0)], false));
    let h = harness(remote, true);

    for text in ["l", "lu", "luk", "luke"] {
      h.session.query_changed(text);
    }
    assert_eq!(h.remote.search_calls(), 0);

    assert_eq!(settle(&h.session).await, Phase::Loaded);
    assert_eq!(names(&h.session), ["Luke"]);
    assert_eq!(h.remote.search_calls(), 1);
    assert_eq!(h.session.snapshot().query, "luke");
  }

  #[tokio::test]
  async fn test_explicit_search_cancels_pending_debounce() {
    let remote = FakeRemote::new().with_page("leia", 1, page(vec![character(5, "Leia", 0)], false));
    let h = harness(remote, true);

    h.session.query_changed("lu");
    h.session.search(Some("leia"));
    settle(&h.session).await;

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(h.remote.search_calls(), 1);
    assert_eq!(names(&h.session), ["Leia"]);
  }

  #[tokio::test]
  async fn test_received_characters_are_cached_bare() {
    let remote = FakeRemote::new().with_page("", 1, page(vec![character(1, "Luke", 2)], false));
    let h = harness(remote, true);

    h.session.search(None);
    settle(&h.session).await;

    let cached = h.store.find("1").unwrap().unwrap();
    assert_eq!(cached.character.name, "Luke");
    assert!(cached.homeworld.is_none());
    assert!(cached.films.is_empty());
  }

  #[tokio::test]
  async fn test_reachability_flip_switches_source() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.upsert_bare(&character(9, "Yoda", 0)).unwrap();
    let remote = FakeRemote::new().with_page("", 1, page(vec![character(1, "Luke", 0)], false));
    let h = harness_with_store(remote, true, store);

    h.session.search(None);
    settle(&h.session).await;
    assert_eq!(names(&h.session), ["Luke"]);

    let mut list = h.session.subscribe_list();
    h.reachability.send_replace(false);
    tokio::time::timeout(WAIT, list.wait_for(|l| l.is_offline()))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(names(&h.session), ["Yoda", "Luke"]);

    h.reachability.send_replace(true);
    tokio::time::timeout(WAIT, list.wait_for(|l| !l.is_offline()))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(names(&h.session), ["Luke"]);
    assert_eq!(h.remote.search_calls(), 1);
  }

  #[tokio::test]
  async fn test_search_interrupted_by_outage_resumes_when_online() {
    let remote = FakeRemote::new().with_page_after(
      "",
      1,
      page(vec![character(1, "Luke", 0)], false),
      Duration::from_millis(200),
    );
    let h = harness(remote, true);
    let mut list = h.session.subscribe_list();

    h.session.search(None);
    wait_for_calls(&h.remote, 1).await;
    h.reachability.send_replace(false);
    tokio::time::timeout(WAIT, list.wait_for(|l| l.is_offline()))
      .await
      .unwrap()
      .unwrap();
    assert!(!*h.session.subscribe_loading().borrow());

    h.reachability.send_replace(true);
    tokio::time::timeout(WAIT, list.wait_for(|l| !l.is_offline() && !l.data.is_empty()))
      .await
      .unwrap()
      .unwrap();
    assert_eq!(names(&h.session), ["Luke"]);
    assert_eq!(h.remote.search_calls(), 2);
  }
}
