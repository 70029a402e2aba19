//! Stable identifiers derived from resource URLs.

/// Derive the identity of a resource from its wire URL.
///
/// The URL is split on `/`, empty segments are dropped, and the last
/// remaining segment is the identity. A URL with no segments at all is
/// returned unchanged.
pub fn identity(url: &str) -> String {
  url
    .split('/')
    .filter(|segment| !segment.is_empty())
    .last()
    .unwrap_or(url)
    .to_string()
}
