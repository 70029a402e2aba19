//! Character database browser core: paginated search, nested reference
//! resolution, and an offline cache.

pub mod aggregate;
pub mod cache;
pub mod config;
pub mod logging;
pub mod reachability;
pub mod sections;
pub mod swapi;
pub mod sync;

#[cfg(test)]
mod test_support;
