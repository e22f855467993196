//! Output steps: terminal steps that write to the sink or the provider.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{locator_schema, parse_config, track_source_schema, ConfigSchema, Step, StepEnv};
use crate::api::logs::log_success_indent;
use crate::error::{StepError, StepResult};
use crate::models::{PlaylistDetails, TrackCollection, TrackField};
use crate::transform::collection::{export_payload, ExportFormat};
use crate::transform::grouper::field_name_schema;
use crate::transform::template::render_template;

#[derive(Debug, Deserialize)]
struct ExportConfig {
    tracks: String,
    fields: Vec<TrackField>,
    filename: String,
    #[serde(default)]
    format: ExportFormat,
}

#[derive(Debug, Deserialize)]
struct ReplaceConfig {
    playlist: String,
    tracks: String,
}

#[derive(Debug, Deserialize)]
struct DetailsConfig {
    playlist: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    public: Option<bool>,
    #[serde(default)]
    collaborative: Option<bool>,
}

/// `export`: write selected fields of a collection through the sink.
pub struct Export;

#[async_trait]
impl Step for Export {
    fn id(&self) -> &'static str {
        "export"
    }

    fn description(&self) -> &'static str {
        "Write selected track fields to a JSON or CSV file"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("tracks", track_source_schema())
            .required(
                "fields",
                json!({ "type": "array", "minItems": 1, "items": field_name_schema() }),
            )
            .required("filename", json!({ "type": "string", "minLength": 1 }))
            .optional("format", json!({ "enum": ["json", "csv"] }))
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: ExportConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;
        let filename = render_template(&config.filename, env.now)?;
        let payload = export_payload(tracks, &config.fields, config.format)?;

        env.sink
            .write(&filename, &payload)
            .await
            .map_err(StepError::Write)?;
        log_success_indent(format!("Exported {} tracks to {}", tracks.len(), filename), 1);
        Ok(None)
    }
}

/// `replace_playlist_tracks`: overwrite a playlist with a collection.
pub struct ReplacePlaylistTracks;

#[async_trait]
impl Step for ReplacePlaylistTracks {
    fn id(&self) -> &'static str {
        "replace_playlist_tracks"
    }

    fn description(&self) -> &'static str {
        "Replace the contents of a playlist with a collection"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("playlist", locator_schema())
            .required("tracks", track_source_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: ReplaceConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;

        env.provider
            .replace_tracks_in_playlist(&config.playlist, tracks)
            .await
            .map_err(StepError::ReplaceTracks)?;
        log_success_indent(format!("Playlist {} now holds {} tracks", config.playlist, tracks.len()), 1);
        Ok(None)
    }
}

/// `update_playlist_details`: change name, description or visibility.
pub struct UpdatePlaylistDetails;

#[async_trait]
impl Step for UpdatePlaylistDetails {
    fn id(&self) -> &'static str {
        "update_playlist_details"
    }

    fn description(&self) -> &'static str {
        "Update the name, description or visibility of a playlist"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("playlist", locator_schema())
            .optional("name", json!({ "type": "string", "minLength": 1 }))
            .optional("description", json!({ "type": "string" }))
            .optional("public", json!({ "type": "boolean" }))
            .optional("collaborative", json!({ "type": "boolean" }))
            .requires_any(&["name", "description", "public", "collaborative"])
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: DetailsConfig = parse_config(config)?;
        let details = PlaylistDetails {
            name: config.name.map(|n| render_template(&n, env.now)).transpose()?,
            description: config
                .description
                .map(|d| render_template(&d, env.now))
                .transpose()?,
            public: config.public,
            collaborative: config.collaborative,
        };

        env.provider
            .update_playlist_details(&config.playlist, &details)
            .await
            .map_err(StepError::UpdateDetails)?;
        log_success_indent(format!("Updated details of playlist {}", config.playlist), 1);
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fixtures::track;
    use crate::provider::{MemoryProvider, ProviderCall};
    use crate::sink::MemorySink;
    use crate::transform::pipeline::PipelineContext;
    use chrono::{DateTime, TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap()
    }

    async fn run(
        step: &dyn Step,
        config: Value,
        provider: &MemoryProvider,
        sink: &MemorySink,
    ) -> StepResult<Option<TrackCollection>> {
        let mut context = PipelineContext::new();
        context.insert("picked", vec![track("a"), track("b")]);
        let mut rng = StdRng::seed_from_u64(0);
        let mut env = StepEnv {
            context: &context,
            provider,
            sink,
            rng: &mut rng,
            now: now(),
        };
        step.execute(&config, &mut env).await
    }

    #[tokio::test]
    async fn test_export_renders_filename_and_writes_csv() {
        let provider = MemoryProvider::default();
        let sink = MemorySink::new();
        let out = run(
            &Export,
            json!({
                "tracks": "picked",
                "fields": ["id", "popularity"],
                "filename": "picked-{{date}}.csv",
                "format": "csv"
            }),
            &provider,
            &sink,
        )
        .await
        .unwrap();
        assert!(out.is_none());

        let payload = sink.get("picked-2024-01-15.csv").await.unwrap();
        assert_eq!(String::from_utf8(payload).unwrap(), "id,popularity\na,50\nb,50\n");
    }

    #[tokio::test]
    async fn test_export_defaults_to_json() {
        let provider = MemoryProvider::default();
        let sink = MemorySink::new();
        run(
            &Export,
            json!({ "tracks": "picked", "fields": ["name"], "filename": "out.json" }),
            &provider,
            &sink,
        )
        .await
        .unwrap();

        let rows: Value = serde_json::from_slice(&sink.get("out.json").await.unwrap()).unwrap();
        assert_eq!(rows, json!([{ "name": "Song a" }, { "name": "Song b" }]));
    }

    #[tokio::test]
    async fn test_export_write_failure_is_prefixed() {
        let provider = MemoryProvider::default();
        let sink = MemorySink::new();
        let err = run(
            &Export,
            json!({ "tracks": "picked", "fields": ["name"], "filename": "../up.json" }),
            &provider,
            &sink,
        )
        .await
        .unwrap_err();
        assert!(err.to_string().starts_with("an error occurred writing export: "));
    }

    #[tokio::test]
    async fn test_replace_and_update_playlist() {
        let provider = MemoryProvider::default().with_playlist("pl1", vec![]);
        let sink = MemorySink::new();

        run(
            &ReplacePlaylistTracks,
            json!({ "playlist": "pl1", "tracks": "picked" }),
            &provider,
            &sink,
        )
        .await
        .unwrap();
        run(
            &UpdatePlaylistDetails,
            json!({ "playlist": "pl1", "name": "Mix {{date \"%B %Y\"}}", "public": false }),
            &provider,
            &sink,
        )
        .await
        .unwrap();

        assert_eq!(
            provider.calls().await,
            vec![
                ProviderCall::ReplaceTracks {
                    playlist: "pl1".into(),
                    uris: vec!["spotify:track:a".into(), "spotify:track:b".into()],
                },
                ProviderCall::UpdateDetails {
                    playlist: "pl1".into(),
                    details: PlaylistDetails {
                        name: Some("Mix January 2024".into()),
                        description: None,
                        public: Some(false),
                        collaborative: None,
                    },
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_replace_failure_is_prefixed() {
        let provider = MemoryProvider::default();
        let sink = MemorySink::new();
        let err = run(
            &ReplacePlaylistTracks,
            json!({ "playlist": "gone", "tracks": "picked" }),
            &provider,
            &sink,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StepError::ReplaceTracks(_)));
        assert!(err.to_string().starts_with("an error occurred replacing playlist tracks: "));
    }
}
