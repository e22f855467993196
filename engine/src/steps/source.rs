//! Source steps: fetch a collection from the provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{locator_schema, parse_config, ConfigSchema, Step, StepEnv};
use crate::api::logs::log_info_indent;
use crate::error::{StepError, StepResult};
use crate::models::TrackCollection;

#[derive(Debug, Deserialize)]
struct AlbumConfig {
    album: String,
}

#[derive(Debug, Deserialize)]
struct PlaylistConfig {
    playlist: String,
}

fn fetched(what: &str, tracks: TrackCollection) -> StepResult<Option<TrackCollection>> {
    log_info_indent(format!("Fetched {} tracks from {}", tracks.len(), what), 1);
    Ok(Some(tracks))
}

/// `get_album_tracks`: every track of one album.
pub struct GetAlbumTracks;

#[async_trait]
impl Step for GetAlbumTracks {
    fn id(&self) -> &'static str {
        "get_album_tracks"
    }

    fn description(&self) -> &'static str {
        "Fetch every track of an album"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required("album", locator_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: AlbumConfig = parse_config(config)?;
        let tracks = env
            .provider
            .get_album_tracks(&config.album)
            .await
            .map_err(StepError::FetchAlbum)?;
        fetched(&format!("album {}", config.album), tracks)
    }
}

/// `get_library_tracks`: the user's saved tracks.
pub struct GetLibraryTracks;

#[async_trait]
impl Step for GetLibraryTracks {
    fn id(&self) -> &'static str {
        "get_library_tracks"
    }

    fn description(&self) -> &'static str {
        "Fetch the saved tracks of the current user"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
    }

    async fn execute(&self, _config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let tracks = env
            .provider
            .get_library_tracks()
            .await
            .map_err(StepError::FetchLibrary)?;
        fetched("the library", tracks)
    }
}

/// `get_playlist_tracks`: the current contents of a playlist.
pub struct GetPlaylistTracks;

#[async_trait]
impl Step for GetPlaylistTracks {
    fn id(&self) -> &'static str {
        "get_playlist_tracks"
    }

    fn description(&self) -> &'static str {
        "Fetch every track of a playlist"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required("playlist", locator_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: PlaylistConfig = parse_config(config)?;
        let tracks = env
            .provider
            .get_playlist_tracks(&config.playlist)
            .await
            .map_err(StepError::FetchPlaylist)?;
        fetched(&format!("playlist {}", config.playlist), tracks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;
    use crate::provider::MemoryProvider;
    use crate::sink::MemorySink;
    use crate::transform::pipeline::PipelineContext;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use serde_json::json;

    async fn run(step: &dyn Step, config: Value, provider: &MemoryProvider) -> StepResult<Option<TrackCollection>> {
        let context = PipelineContext::new();
        let sink = MemorySink::new();
        let mut rng = StdRng::seed_from_u64(1);
        let mut env = StepEnv {
            context: &context,
            provider,
            sink: &sink,
            rng: &mut rng,
            now: Utc::now(),
        };
        step.execute(&config, &mut env).await
    }

    #[tokio::test]
    async fn test_sources_fetch_from_provider() {
        let provider = MemoryProvider::default()
            .with_album("alb1", vec![track("a"), track("b")])
            .with_playlist("pl1", vec![track("c")])
            .with_library(vec![track("d"), track("e"), track("f")]);

        let album = run(&GetAlbumTracks, json!({ "type": "get_album_tracks", "album": "alb1" }), &provider)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(album.len(), 2);

        let playlist = run(&GetPlaylistTracks, json!({ "playlist": "spotify:playlist:pl1" }), &provider)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(playlist[0].id, "c");

        let library = run(&GetLibraryTracks, json!({}), &provider).await.unwrap().unwrap();
        assert_eq!(library.len(), 3);
    }

    #[tokio::test]
    async fn test_provider_failures_carry_prefix() {
        let provider = MemoryProvider::default();
        let err = run(&GetPlaylistTracks, json!({ "playlist": "missing" }), &provider)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::FetchPlaylist(_)));
        assert_eq!(
            err.to_string(),
            "an error occurred fetching playlist tracks: playlist not found: missing"
        );
    }
}
