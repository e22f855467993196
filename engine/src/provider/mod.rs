//! Provider collaborator: where tracks come from and where playlists live.
//!
//! Steps only ever see `&dyn Provider`. Two implementations ship with the
//! crate:
//!
//! - [`SpotifyProvider`] - the Spotify Web API over `reqwest`
//! - [`MemoryProvider`] - a local JSON catalog, also used by tests

pub mod memory;
pub mod spotify;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::error::{ProviderError, ProviderResult};
use crate::models::{PlaylistDetails, Track, TrackCollection};

pub use memory::{Catalog, MemoryProvider, ProviderCall};
pub use spotify::SpotifyProvider;

/// Remote retrieval and mutation of track collections.
///
/// Locators are passed through as written in the pipeline definition;
/// implementations resolve them with [`parse_locator`].
#[async_trait]
pub trait Provider: Send + Sync {
    async fn get_album_tracks(&self, album: &str) -> ProviderResult<TrackCollection>;

    /// The saved tracks of the authenticated user.
    async fn get_library_tracks(&self) -> ProviderResult<TrackCollection>;

    async fn get_playlist_tracks(&self, playlist: &str) -> ProviderResult<TrackCollection>;

    /// Replace the whole contents of a playlist, in order.
    async fn replace_tracks_in_playlist(&self, playlist: &str, tracks: &[Track]) -> ProviderResult<()>;

    /// Apply the present fields of `details`.
    async fn update_playlist_details(&self, playlist: &str, details: &PlaylistDetails) -> ProviderResult<()>;
}

/// What a locator is expected to name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LocatorKind {
    Album,
    Playlist,
    Track,
}

impl LocatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocatorKind::Album => "album",
            LocatorKind::Playlist => "playlist",
            LocatorKind::Track => "track",
        }
    }
}

impl fmt::Display for LocatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static BARE_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9]+$").expect("valid id pattern"));

/// Resolve a bare id, `spotify:<kind>:<id>` URI or
/// `https://open.spotify.com/<kind>/<id>` URL to the bare id.
pub fn parse_locator(kind: LocatorKind, locator: &str) -> ProviderResult<String> {
    let invalid = || ProviderError::InvalidLocator {
        kind: kind.to_string(),
        locator: locator.to_string(),
    };
    let trimmed = locator.trim();

    let id = if trimmed.starts_with("spotify:") {
        // Legacy playlist URIs carry a user segment: spotify:user:<u>:playlist:<id>
        let parts: Vec<&str> = trimmed.split(':').collect();
        match parts.as_slice() {
            [.., k, id] if *k == kind.as_str() => *id,
            _ => return Err(invalid()),
        }
    } else if let Some((_, path)) = trimmed.split_once("open.spotify.com/") {
        let path = path.split(|c| c == '?' || c == '#').next().unwrap_or_default();
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let position = segments
            .iter()
            .position(|s| *s == kind.as_str())
            .ok_or_else(invalid)?;
        segments.get(position + 1).copied().ok_or_else(invalid)?
    } else {
        trimmed
    };

    if BARE_ID.is_match(id) {
        Ok(id.to_string())
    } else {
        Err(invalid())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_locator_forms() {
        let id = "37i9dQZF1DXcBWIGoYBM5M";
        for locator in [
            id.to_string(),
            format!("spotify:playlist:{}", id),
            format!("spotify:user:someone:playlist:{}", id),
            format!("https://open.spotify.com/playlist/{}", id),
            format!("https://open.spotify.com/playlist/{}?si=abc123", id),
            format!("https://open.spotify.com/intl-de/playlist/{}", id),
            format!("  {}  ", id),
        ] {
            assert_eq!(parse_locator(LocatorKind::Playlist, &locator).unwrap(), id, "{}", locator);
        }
    }

    #[test]
    fn test_parse_locator_rejects_wrong_kind() {
        assert!(parse_locator(LocatorKind::Album, "spotify:playlist:abc").is_err());
        assert!(parse_locator(LocatorKind::Album, "https://open.spotify.com/playlist/abc").is_err());
        assert!(parse_locator(LocatorKind::Album, "not an id").is_err());
        assert!(parse_locator(LocatorKind::Album, "").is_err());

        let err = parse_locator(LocatorKind::Album, "spotify:track:abc").unwrap_err();
        assert_eq!(err.to_string(), "invalid album locator: spotify:track:abc");
    }
}
