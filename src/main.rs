use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use swbrowse::aggregate::{AggregateBuilder, AggregateEvent};
use swbrowse::cache::{self, SharedStore};
use swbrowse::config::Config;
use swbrowse::logging;
use swbrowse::reachability::{self, Reachability};
use swbrowse::sections::DisplaySection;
use swbrowse::swapi::SwapiClient;
use swbrowse::sync::{Phase, SearchSession};

#[derive(Parser, Debug)]
#[command(name = "swbrowse")]
#[command(about = "Browse the Star Wars character database, with an offline cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/swbrowse/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Treat the network as unreachable and serve from the cache
  #[arg(long)]
  offline: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Search characters by name
  Search {
    /// Text to search for (all characters when omitted)
    query: Option<String>,

    /// Number of result pages to load
    #[arg(long, default_value_t = 1)]
    pages: u32,
  },
  /// Show a cached character with its homeworld and films
  Show {
    /// Character identity, as printed by `search`
    id: String,
  },
  /// List every cached character
  Cached,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _log_guard = logging::init(&logging::default_log_dir()?)?;

  let client = Arc::new(SwapiClient::new(&config.api)?);
  let store = cache::open_store(&config.cache)?;

  let online = if args.offline {
    false
  } else {
    let http = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.api.timeout_secs))
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;
    reachability::probe(&http, client.base_url()).await
  };
  info!(online, "Starting");

  let reachability = Reachability::new(online);
  let _probe = if args.offline {
    None
  } else {
    Some(reachability.spawn_probe(
      client.base_url().clone(),
      Duration::from_secs(config.reachability.probe_interval_secs),
      Duration::from_secs(config.api.timeout_secs),
    )?)
  };

  match args.command {
    Command::Search { query, pages } => {
      let session = SearchSession::new(
        client,
        store,
        reachability.subscribe(),
        config.search.debounce(),
      );
      run_search(&session, query.as_deref(), pages).await
    }
    Command::Show { id } => run_show(client, store, &reachability, &id).await,
    Command::Cached => run_cached(&store),
  }
}

async fn run_search(
  session: &SearchSession<SwapiClient>,
  query: Option<&str>,
  pages: u32,
) -> Result<()> {
  let mut phase = session.subscribe_phase();
  session.search(query);

  for page in 1..=pages.max(1) {
    if page > 1 && !session.load_next_page() {
      debug!(page, "No further pages");
      break;
    }
    let settled = phase
      .wait_for(Phase::is_settled)
      .await
      .map_err(|e| eyre!("Search session closed: {}", e))?
      .clone();
    if let Phase::Failed(error) = settled {
      return Err(eyre!("Search failed: {}", error));
    }
  }

  let list = session.subscribe_list().borrow().clone();
  if list.is_offline() {
    eprintln!("Network unreachable, showing cached characters");
  }
  for character in &list.data {
    println!("{:>4}  {}", character.id(), character.name);
  }
  if session.snapshot().has_more {
    eprintln!("More results available, use --pages to load them");
  }

  Ok(())
}

async fn run_show(
  client: Arc<SwapiClient>,
  store: SharedStore,
  reachability: &Reachability,
  id: &str,
) -> Result<()> {
  let character = store
    .find(id)?
    .map(|cached| cached.character)
    .ok_or_else(|| eyre!("Character {} is not cached, find it with `search` first", id))?;

  let builder = AggregateBuilder::new(client, store, reachability.subscribe());
  let mut aggregate = builder.build(character);

  let mut sections = Vec::new();
  while let Some(event) = aggregate.next().await {
    match event {
      AggregateEvent::Sections(latest) => sections = latest,
      AggregateEvent::FilmSkipped { url, episode_id } => {
        debug!(%url, episode_id, "Film skipped");
      }
      AggregateEvent::FilmFailed { url, error } => {
        eprintln!("Film {} unavailable: {}", url, error);
      }
      AggregateEvent::Failed(error) => {
        print_sections(&sections);
        return Err(eyre!("Failed to load homeworld: {}", error));
      }
      AggregateEvent::Completed => break,
    }
  }

  print_sections(&sections);
  Ok(())
}

fn run_cached(store: &SharedStore) -> Result<()> {
  for cached in store.all_valid()? {
    let homeworld = cached
      .homeworld
      .as_ref()
      .map(|p| p.name.as_str())
      .unwrap_or("-");
    println!(
      "{:>4}  {:<24} {:<16} {} film(s)",
      cached.id,
      cached.character.name,
      homeworld,
      cached.films.len()
    );
  }
  Ok(())
}

fn print_sections(sections: &[DisplaySection]) {
  for section in sections {
    println!("== {} ==", section.title);
    for (label, value) in &section.rows {
      if value.is_empty() {
        println!("  {}", label);
      } else {
        println!("  {}: {}", label, value);
      }
    }
  }
}
