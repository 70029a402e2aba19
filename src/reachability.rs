//! Network reachability, published as a replaying boolean.

use std::sync::Arc;
use std::time::Duration;

use color_eyre::{eyre::eyre, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};
use url::Url;

/// Shared reachability flag. New subscribers observe the current value first.
#[derive(Clone)]
pub struct Reachability {
  tx: Arc<watch::Sender<bool>>,
}

impl Reachability {
  pub fn new(online: bool) -> Self {
    let (tx, _) = watch::channel(online);
    Self { tx: Arc::new(tx) }
  }

  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.tx.subscribe()
  }

  pub fn is_online(&self) -> bool {
    *self.tx.borrow()
  }

  /// Publish a new value. Subscribers are only woken on a change.
  pub fn set(&self, online: bool) {
    let changed = self.tx.send_if_modified(|current| {
      if *current == online {
        false
      } else {
        *current = online;
        true
      }
    });
    if changed {
      info!(online, "Reachability changed");
    }
  }

  /// Probe `url` every `interval` and publish the outcome.
  pub fn spawn_probe(&self, url: Url, interval: Duration, timeout: Duration) -> Result<JoinHandle<()>> {
    if interval.is_zero() {
      return Err(eyre!("Probe interval must be non-zero"));
    }
    let http = reqwest::Client::builder()
      .timeout(timeout)
      .build()
      .map_err(|e| eyre!("Failed to create probe client: {}", e))?;
    let this = self.clone();

    Ok(tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let online = probe(&http, &url).await;
        debug!(%url, online, "Reachability probe");
        this.set(online);
      }
    }))
  }
}

/// Whether `url` answered at all. Any HTTP status counts as reachable.
pub async fn probe(http: &reqwest::Client, url: &Url) -> bool {
  match http.head(url.clone()).send().await {
    Ok(_) => true,
    Err(e) => {
      debug!(%url, "Probe failed: {}", e);
      false
    }
  }
}
