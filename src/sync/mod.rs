//! Search session: decides per request whether to ask the network or the
//! cache, owns pagination, and publishes the merged character list.
//!
//! Outputs are push-updated. List, loading flag and phase are `watch`
//! channels, so a new subscriber sees the latest value first. Errors are
//! events on a `broadcast` channel.

mod session;

use crate::cache::CacheResult;
use crate::swapi::{ApiError, Character};

pub use session::{SearchSession, SessionSnapshot};

/// Published character list, tagged with where it came from
pub type CharacterList = CacheResult<Vec<Character>>;

/// Where the session is in its request cycle
#[derive(Debug, Clone, PartialEq)]
pub enum Phase {
  /// Nothing requested yet
  Idle,
  Loading,
  Loaded,
  /// The last request failed; the list keeps what it had
  Failed(ApiError),
}

impl Phase {
  pub fn is_settled(&self) -> bool {
    matches!(self, Phase::Loaded | Phase::Failed(_))
  }
}
