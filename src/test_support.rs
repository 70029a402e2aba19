//! Fixtures and a scripted remote shared by the unit tests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::swapi::{ApiError, Character, Film, Planet, RemoteSource, SearchPage};

pub fn character(n: u32, name: &str, film_count: u32) -> Character {
  Character {
    url: format!("https://swapi.test/api/people/{}/", n),
    name: name.to_string(),
    birth_year: "19BBY".to_string(),
    gender: "male".to_string(),
    hair_color: "blond".to_string(),
    eye_color: "blue".to_string(),
    skin_color: "fair".to_string(),
    height: "172".to_string(),
    mass: "77".to_string(),
    homeworld: format!("https://swapi.test/api/planets/{}/", n),
    films: (1..=film_count).map(film_url).collect(),
  }
}

pub fn film_url(n: u32) -> String {
  format!("https://swapi.test/api/films/{}/", n)
}

pub fn film(title: &str, episode_id: i64) -> Film {
  Film {
    title: title.to_string(),
    episode_id,
    opening_crawl: "It is a period of civil war.".to_string(),
    director: "George Lucas".to_string(),
    producer: "Gary Kurtz".to_string(),
    release_date: "1977-05-25".to_string(),
  }
}

pub fn planet(name: &str) -> Planet {
  Planet {
    name: name.to_string(),
    rotation_period: "23".to_string(),
    orbital_period: "304".to_string(),
    diameter: "10465".to_string(),
    gravity: "1 standard".to_string(),
    climate: "arid".to_string(),
    terrain: "desert".to_string(),
    surface_water: "1".to_string(),
    population: "200000".to_string(),
  }
}

pub fn page(characters: Vec<Character>, has_next: bool) -> SearchPage {
  SearchPage {
    count: characters.len() as u64,
    next: has_next.then(|| "next".to_string()),
    previous: None,
    characters,
  }
}

#[derive(Clone)]
struct Scripted<T> {
  result: Result<T, ApiError>,
  delay: Duration,
  /// Hold the worker thread for `delay` instead of yielding, so the answer
  /// arrives even if the caller's task is aborted meanwhile
  blocking: bool,
}

impl<T> Scripted<T> {
  fn new(result: Result<T, ApiError>, delay: Duration) -> Self {
    Self {
      result,
      delay,
      blocking: false,
    }
  }

  async fn resolve(self) -> Result<T, ApiError> {
    if self.blocking {
      std::thread::sleep(self.delay);
    } else if !self.delay.is_zero() {
      tokio::time::sleep(self.delay).await;
    }
    self.result
  }
}

/// Remote that answers from a fixed script. Anything unscripted is `NotFound`.
#[derive(Default)]
pub struct FakeRemote {
  pages: HashMap<(String, u32), Scripted<SearchPage>>,
  planets: HashMap<String, Scripted<Planet>>,
  films: HashMap<String, Scripted<Film>>,
  search_calls: AtomicUsize,
  fetch_calls: AtomicUsize,
}

impl FakeRemote {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_page(self, query: &str, number: u32, result: SearchPage) -> Self {
    self.with_page_after(query, number, result, Duration::ZERO)
  }

  pub fn with_page_after(
    mut self,
    query: &str,
    number: u32,
    result: SearchPage,
    delay: Duration,
  ) -> Self {
    self
      .pages
      .insert((query.to_string(), number), Scripted::new(Ok(result), delay));
    self
  }

  /// Answer `query` after blocking the polling thread for `delay`.
  pub fn with_page_blocking(
    mut self,
    query: &str,
    number: u32,
    result: SearchPage,
    delay: Duration,
  ) -> Self {
    let mut scripted = Scripted::new(Ok(result), delay);
    scripted.blocking = true;
    self.pages.insert((query.to_string(), number), scripted);
    self
  }

  pub fn with_page_error(mut self, query: &str, number: u32, error: ApiError) -> Self {
    self.pages.insert(
      (query.to_string(), number),
      Scripted::new(Err(error), Duration::ZERO),
    );
    self
  }

  pub fn with_planet(mut self, url: &str, result: Result<Planet, ApiError>) -> Self {
    self
      .planets
      .insert(url.to_string(), Scripted::new(result, Duration::ZERO));
    self
  }

  pub fn with_film(self, url: &str, result: Result<Film, ApiError>) -> Self {
    self.with_film_after(url, result, Duration::ZERO)
  }

  pub fn with_film_after(
    mut self,
    url: &str,
    result: Result<Film, ApiError>,
    delay: Duration,
  ) -> Self {
    self
      .films
      .insert(url.to_string(), Scripted::new(result, delay));
    self
  }

  pub fn search_calls(&self) -> usize {
    self.search_calls.load(Ordering::SeqCst)
  }

  pub fn fetch_calls(&self) -> usize {
    self.fetch_calls.load(Ordering::SeqCst)
  }
}

fn lookup<T: Clone>(scripts: &HashMap<String, Scripted<T>>, key: &str) -> Scripted<T> {
  scripts
    .get(key)
    .cloned()
    .unwrap_or_else(|| Scripted::new(Err(ApiError::NotFound), Duration::ZERO))
}

impl RemoteSource for FakeRemote {
  fn search_characters(
    &self,
    query: Option<&str>,
    page: u32,
  ) -> impl Future<Output = Result<SearchPage, ApiError>> + Send {
    self.search_calls.fetch_add(1, Ordering::SeqCst);
    let key = (query.unwrap_or_default().to_string(), page);
    let scripted = self
      .pages
      .get(&key)
      .cloned()
      .unwrap_or_else(|| Scripted::new(Err(ApiError::NotFound), Duration::ZERO));
    scripted.resolve()
  }

  fn fetch_planet(&self, url: &str) -> impl Future<Output = Result<Planet, ApiError>> + Send {
    self.fetch_calls.fetch_add(1, Ordering::SeqCst);
    lookup(&self.planets, url).resolve()
  }

  fn fetch_film(&self, url: &str) -> impl Future<Output = Result<Film, ApiError>> + Send {
    self.fetch_calls.fetch_add(1, Ordering::SeqCst);
    lookup(&self.films, url).resolve()
  }
}
