//! Remote access to the character database: wire types, identity
//! derivation, the HTTP client and its error taxonomy.

pub mod api_types;
pub mod client;
pub mod error;
pub mod identity;
pub mod types;

pub use client::{RemoteSource, SwapiClient};
pub use error::ApiError;
pub use identity::identity;
pub use types::{CachedCharacter, Character, Film, Planet, SearchPage};
