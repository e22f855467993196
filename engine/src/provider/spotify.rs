//! Spotify Web API provider.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use trackflow::provider::{Provider, SpotifyProvider};
//!
//! // SPOTIFY_ACCESS_TOKEN from the environment or .env
//! let spotify = SpotifyProvider::from_env()?;
//! let liked = spotify.get_library_tracks().await?;
//! ```
//!
//! Album endpoints return simplified tracks, so album tracks are re-fetched
//! as full track objects. Genres live on artists and are looked up for the
//! first artist of every track.

use async_trait::async_trait;
use chrono::Datelike;
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::env;
use std::time::Duration;

use super::{parse_locator, LocatorKind, Provider};
use crate::api::logs::{log_info, log_warning};
use crate::error::{ProviderError, ProviderResult};
use crate::models::{PlaylistDetails, Track, TrackCollection};
use crate::transform::filter::parse_date;

const DEFAULT_API_BASE: &str = "https://api.spotify.com";
const TOKEN_VAR: &str = "SPOTIFY_ACCESS_TOKEN";
const API_BASE_VAR: &str = "SPOTIFY_API_BASE";

/// Ids per `/v1/tracks` and `/v1/artists` request.
const LOOKUP_BATCH: usize = 50;

/// Uris per playlist write.
const WRITE_CHUNK: usize = 100;

/// Retries for 429 and 5xx responses.
const MAX_RETRIES: u32 = 3;

/// Base delay when the server sends no Retry-After.
const RETRY_DELAY_MS: u64 = 1000;

/// Spotify Web API client.
#[derive(Clone)]
pub struct SpotifyProvider {
    client: reqwest::Client,
    token: String,
    api_base: String,
}

#[derive(Debug, Deserialize)]
struct RawTrack {
    id: String,
    name: String,
    track_number: i64,
    uri: String,
    #[serde(default)]
    popularity: i64,
    duration_ms: i64,
    #[serde(default)]
    explicit: bool,
    album: RawAlbum,
    artists: Vec<RawArtist>,
}

#[derive(Debug, Deserialize)]
struct RawAlbum {
    id: String,
    name: String,
    uri: String,
    release_date: String,
    #[serde(default)]
    release_date_precision: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawArtist {
    id: String,
    name: String,
    uri: String,
}

impl SpotifyProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Create a provider from `SPOTIFY_ACCESS_TOKEN` (and optional `SPOTIFY_API_BASE`).
    pub fn from_env() -> ProviderResult<Self> {
        let _ = dotenvy::dotenv();

        let token = env::var(TOKEN_VAR).map_err(|_| ProviderError::MissingToken(TOKEN_VAR.to_string()))?;
        let provider = Self::new(token);
        Ok(match env::var(API_BASE_VAR) {
            Ok(base) if !base.trim().is_empty() => provider.with_api_base(&base),
            _ => provider,
        })
    }

    /// Point at another API root (tests, proxies).
    pub fn with_api_base(mut self, base: &str) -> Self {
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    /// Send a request, retrying rate limits and server errors.
    async fn send(&self, method: Method, url: &str, body: Option<&Value>) -> ProviderResult<reqwest::Response> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let mut request = self.client.request(method.clone(), url).bearer_auth(&self.token);
            if let Some(body) = body {
                request = request.json(body);
            }

            let response = request
                .send()
                .await
                .map_err(|e| ProviderError::Http(e.to_string()))?;
            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            let retryable = status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error();
            if retryable && attempt <= MAX_RETRIES {
                let delay = retry_after(&response)
                    .unwrap_or_else(|| Duration::from_millis(RETRY_DELAY_MS * attempt as u64));
                log_warning(format!(
                    "Spotify answered {} for {} {}, retrying in {}ms ({}/{})",
                    status.as_u16(),
                    method,
                    url,
                    delay.as_millis(),
                    attempt,
                    MAX_RETRIES
                ));
                tokio::time::sleep(delay).await;
                continue;
            }

            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
    }

    async fn get_json(&self, url: &str) -> ProviderResult<Value> {
        self.send(Method::GET, url, None)
            .await?
            .json::<Value>()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))
    }

    /// Collect `items` across every page, following `next`.
    async fn paginate(&self, first: String) -> ProviderResult<Vec<Value>> {
        let mut items = Vec::new();
        let mut next = Some(first);

        while let Some(url) = next {
            let page = self.get_json(&url).await?;
            if let Some(page_items) = page.get("items").and_then(Value::as_array) {
                items.extend(page_items.iter().cloned());
            }
            next = page.get("next").and_then(Value::as_str).map(String::from);
        }

        Ok(items)
    }

    /// Full track objects for `ids`, in order.
    async fn full_tracks(&self, ids: &[String]) -> ProviderResult<Vec<Value>> {
        let mut tracks = Vec::with_capacity(ids.len());
        for batch in ids.chunks(LOOKUP_BATCH) {
            let url = self.url(&format!("/v1/tracks?ids={}", batch.join(",")));
            let response = self.get_json(&url).await?;
            if let Some(found) = response.get("tracks").and_then(Value::as_array) {
                tracks.extend(found.iter().filter(|t| !t.is_null()).cloned());
            }
        }
        Ok(tracks)
    }

    /// Genres per artist id.
    async fn artist_genres(&self, ids: &[String]) -> ProviderResult<HashMap<String, Vec<String>>> {
        let mut genres = HashMap::new();
        for batch in ids.chunks(LOOKUP_BATCH) {
            let url = self.url(&format!("/v1/artists?ids={}", batch.join(",")));
            let response = self.get_json(&url).await?;
            for artist in response.get("artists").and_then(Value::as_array).into_iter().flatten() {
                let Some(id) = artist.get("id").and_then(Value::as_str) else {
                    continue;
                };
                let names = artist
                    .get("genres")
                    .and_then(Value::as_array)
                    .map(|g| g.iter().filter_map(Value::as_str).map(String::from).collect())
                    .unwrap_or_default();
                genres.insert(id.to_string(), names);
            }
        }
        Ok(genres)
    }

    /// Normalize full track objects, enriching genres from their first artist.
    async fn normalize_all(&self, raw: Vec<Value>) -> ProviderResult<TrackCollection> {
        let parsed = raw
            .into_iter()
            .map(|v| serde_json::from_value::<RawTrack>(v).map_err(|e| ProviderError::Decode(e.to_string())))
            .collect::<ProviderResult<Vec<_>>>()?;

        let mut artist_ids: Vec<String> = Vec::new();
        for track in &parsed {
            if let Some(artist) = track.artists.first() {
                if !artist_ids.contains(&artist.id) {
                    artist_ids.push(artist.id.clone());
                }
            }
        }
        let genres = self.artist_genres(&artist_ids).await?;

        parsed.into_iter().map(|raw| normalize_track(raw, &genres)).collect()
    }
}

fn retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Playable full track objects out of saved-track or playlist-item wrappers.
fn unwrap_items(items: Vec<Value>) -> Vec<Value> {
    items
        .into_iter()
        .filter_map(|mut item| match item.get_mut("track").map(Value::take) {
            Some(track) if !track.is_null() => Some(track),
            _ => None,
        })
        .filter(|track| {
            !track.get("is_local").and_then(Value::as_bool).unwrap_or(false)
                && track.get("id").map_or(false, |id| !id.is_null())
        })
        .collect()
}

fn normalize_track(raw: RawTrack, genres: &HashMap<String, Vec<String>>) -> ProviderResult<Track> {
    let artist = raw
        .artists
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Decode(format!("track {} has no artists", raw.id)))?;

    // Precision "year" gives "1997", "month" gives "1997-05"; both parse to the first day.
    let release_date = parse_date(&raw.album.release_date).ok_or_else(|| {
        ProviderError::Decode(format!(
            "track {}: invalid release date {:?} (precision {})",
            raw.id,
            raw.album.release_date,
            raw.album.release_date_precision.as_deref().unwrap_or("day")
        ))
    })?;

    Ok(Track {
        genre: genres.get(&artist.id).cloned().unwrap_or_default(),
        release_year: i64::from(release_date.year()),
        release_date,
        id: raw.id,
        name: raw.name,
        track_number: raw.track_number,
        album: raw.album.name,
        album_id: raw.album.id,
        album_uri: raw.album.uri,
        artist: artist.name,
        artist_id: artist.id,
        artist_uri: artist.uri,
        uri: raw.uri,
        popularity: raw.popularity,
        duration: raw.duration_ms,
        explicit: raw.explicit,
    })
}

#[async_trait]
impl Provider for SpotifyProvider {
    async fn get_album_tracks(&self, album: &str) -> ProviderResult<TrackCollection> {
        let id = parse_locator(LocatorKind::Album, album)?;
        log_info(format!("Fetching album {}", id));

        let simplified = self
            .paginate(self.url(&format!("/v1/albums/{}/tracks?limit={}", id, LOOKUP_BATCH)))
            .await?;
        let ids: Vec<String> = simplified
            .iter()
            .filter_map(|t| t.get("id").and_then(Value::as_str).map(String::from))
            .collect();

        let full = self.full_tracks(&ids).await?;
        self.normalize_all(full).await
    }

    async fn get_library_tracks(&self) -> ProviderResult<TrackCollection> {
        log_info("Fetching saved library tracks");
        let items = self
            .paginate(self.url(&format!("/v1/me/tracks?limit={}", LOOKUP_BATCH)))
            .await?;
        self.normalize_all(unwrap_items(items)).await
    }

    async fn get_playlist_tracks(&self, playlist: &str) -> ProviderResult<TrackCollection> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        log_info(format!("Fetching playlist {}", id));

        let items = self
            .paginate(self.url(&format!("/v1/playlists/{}/tracks?limit={}", id, WRITE_CHUNK)))
            .await?;
        self.normalize_all(unwrap_items(items)).await
    }

    async fn replace_tracks_in_playlist(&self, playlist: &str, tracks: &[Track]) -> ProviderResult<()> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        let url = self.url(&format!("/v1/playlists/{}/tracks", id));
        let uris: Vec<&str> = tracks.iter().map(|t| t.uri.as_str()).collect();

        // PUT replaces with at most one chunk; the rest is appended.
        let mut chunks = uris.chunks(WRITE_CHUNK);
        let first = chunks.next().unwrap_or(&[]);
        self.send(Method::PUT, &url, Some(&json!({ "uris": first }))).await?;
        for chunk in chunks {
            self.send(Method::POST, &url, Some(&json!({ "uris": chunk }))).await?;
        }

        log_info(format!("Replaced playlist {} with {} tracks", id, uris.len()));
        Ok(())
    }

    async fn update_playlist_details(&self, playlist: &str, details: &PlaylistDetails) -> ProviderResult<()> {
        let id = parse_locator(LocatorKind::Playlist, playlist)?;
        if details.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_value(details)?;
        self.send(Method::PUT, &self.url(&format!("/v1/playlists/{}", id)), Some(&body))
            .await?;
        Ok(())
    }
}
