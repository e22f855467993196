//! In-memory provider backed by a JSON catalog.
//!
//! Catalog file layout (keys are bare ids):
//!
//! ```json
//! {
//!   "albums":    { "<albumId>":    [ <Track>, ... ] },
//!   "playlists": { "<playlistId>": [ <Track>, ... ] },
//!   "library":   [ <Track>, ... ]
//! }
//! ```
//!
//! Mutations are applied to the catalog and recorded as [`ProviderCall`]s.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;

use super::{parse_locator, LocatorKind, Provider};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{PlaylistDetails, Track, TrackCollection};

/// Albums, playlists and the saved library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub albums: HashMap<String, Vec<Track>>,
    #[serde(default)]
    pub playlists: HashMap<String, Vec<Track>>,
    #[serde(default)]
    pub library: Vec<Track>,
}

/// A mutation received by a [`MemoryProvider`].
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderCall {
    ReplaceTracks { playlist: String, uris: Vec<String> },
    UpdateDetails { playlist: String, details: PlaylistDetails },
}

/// Provider serving a [`Catalog`] from memory.
#[derive(Debug, Default)]
pub struct MemoryProvider {
    catalog: RwLock<Catalog>,
    calls: RwLock<Vec<ProviderCall>>,
}

impl MemoryProvider {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog: RwLock::new(catalog),
            calls: RwLock::new(Vec::new()),
        }
    }

    /// Load a catalog JSON file.
    pub async fn from_file(path: impl AsRef<Path>) -> ProviderResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        let catalog: Catalog = serde_json::from_str(&content)?;
        Ok(Self::new(catalog))
    }

    pub fn with_album(mut self, id: &str, tracks: Vec<Track>) -> Self {
        self.catalog.get_mut().albums.insert(id.to_string(), tracks);
        self
    }

    pub fn with_playlist(mut self, id: &str, tracks: Vec<Track>) -> Self {
        self.catalog.get_mut().playlists.insert(id.to_string(), tracks);
        self
    }

    pub fn with_library(mut self, tracks: Vec<Track>) -> Self {
        self.catalog.get_mut().library = tracks;
        self
    }

    /// Mutations received so far, oldest first.
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.calls.read().await.clone()
    }

    /// Current catalog contents.
    pub async fn catalog(&self) -> Catalog {
        self.catalog.read().await.clone()
    }
}

fn not_found(kind: LocatorKind, id: &str) -> ProviderError {
    ProviderError::NotFound {
        kind: kind.to_string(),
        id: id.to_string(),
    }
}

#[async_trait]
impl Provider for MemoryProvider {
    async fn get_album_tracks(&self, album: &str) -> ProviderResult<TrackCollection> {
        let id = parse_locator(LocatorKind::Album, album)?;
        self.catalog
            .read()
            .await
            .albums
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(LocatorKind::Album, &id))
    }

    async fn get_library_tracks(&self) -> ProviderResult<TrackCollection> {
        Ok(self.catalog.read().await.library.clone())
    }

    async fn get_playlist_tracks(&self, playlist: &str) -> ProviderResult<TrackCollection> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        self.catalog
            .read()
            .await
            .playlists
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(LocatorKind::Playlist, &id))
    }

    async fn replace_tracks_in_playlist(&self, playlist: &str, tracks: &[Track]) -> ProviderResult<()> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        {
            let mut catalog = self.catalog.write().await;
            let contents = catalog
                .playlists
                .get_mut(&id)
                .ok_or_else(|| not_found(LocatorKind::Playlist, &id))?;
            *contents = tracks.to_vec();
        }

        self.calls.write().await.push(ProviderCall::ReplaceTracks {
            playlist: id,
            uris: tracks.iter().map(|t| t.uri.clone()).collect(),
        });
        Ok(())
    }

    async fn update_playlist_details(&self, playlist: &str, details: &PlaylistDetails) -> ProviderResult<()> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        if !self.catalog.read().await.playlists.contains_key(&id) {
            return Err(not_found(LocatorKind::Playlist, &id));
        }

        self.calls.write().await.push(ProviderCall::UpdateDetails {
            playlist: id,
            details: details.clone(),
        });
        Ok(())
    }
}
