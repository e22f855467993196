//! Transform steps: derive a new collection from earlier ones.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_config, track_source_schema, ConfigSchema, Step, StepEnv};
use crate::api::logs::log_info_indent;
use crate::error::StepResult;
use crate::models::{TrackCollection, TrackField};
use crate::transform::collection::{dedupe, merge, shuffle};
use crate::transform::filter::{filter_schema, CompiledFilter, FilterExpression};
use crate::transform::grouper::{field_name_schema, order_collection, sort_spec_schema, SortSpec};

#[derive(Debug, Deserialize)]
struct SourceConfig {
    tracks: String,
}

#[derive(Debug, Deserialize)]
struct FilterConfig {
    tracks: String,
    filter: FilterExpression,
}

#[derive(Debug, Deserialize)]
struct SortConfig {
    tracks: String,
    sort: SortSpec,
    #[serde(default)]
    group_by: Option<TrackField>,
    #[serde(default)]
    sort_group: Option<SortSpec>,
}

#[derive(Debug, Deserialize)]
struct MergeConfig {
    tracks: Vec<String>,
}

/// `filter`: keep the tracks matching a filter expression.
pub struct Filter;

#[async_trait]
impl Step for Filter {
    fn id(&self) -> &'static str {
        "filter"
    }

    fn description(&self) -> &'static str {
        "Keep the tracks matching a filter expression"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("tracks", track_source_schema())
            .required("filter", filter_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: FilterConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;
        let kept = CompiledFilter::compile(&config.filter)?.apply(tracks);
        log_info_indent(format!("Kept {} of {} tracks", kept.len(), tracks.len()), 1);
        Ok(Some(kept))
    }
}

/// `sort`: multi-key sort, optionally grouped.
pub struct Sort;

#[async_trait]
impl Step for Sort {
    fn id(&self) -> &'static str {
        "sort"
    }

    fn description(&self) -> &'static str {
        "Sort tracks by one or more fields, optionally within groups"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new()
            .required("tracks", track_source_schema())
            .required("sort", sort_spec_schema())
            .optional("group_by", field_name_schema())
            .optional("sort_group", sort_spec_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: SortConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;
        Ok(Some(order_collection(
            tracks,
            &config.sort,
            config.group_by,
            config.sort_group.as_ref(),
        )))
    }
}

/// `dedupe`: drop repeated uris, keeping the first.
pub struct Dedupe;

#[async_trait]
impl Step for Dedupe {
    fn id(&self) -> &'static str {
        "dedupe"
    }

    fn description(&self) -> &'static str {
        "Remove repeated tracks, keeping the first occurrence of each uri"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required("tracks", track_source_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: SourceConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;
        let unique = dedupe(tracks);
        let removed = tracks.len() - unique.len();
        if removed > 0 {
            log_info_indent(format!("Removed {} duplicate tracks", removed), 1);
        }
        Ok(Some(unique))
    }
}

/// `merge`: concatenate collections in the listed order.
pub struct Merge;

#[async_trait]
impl Step for Merge {
    fn id(&self) -> &'static str {
        "merge"
    }

    fn description(&self) -> &'static str {
        "Concatenate several collections in order"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required(
            "tracks",
            json!({ "type": "array", "minItems": 1, "items": track_source_schema() }),
        )
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: MergeConfig = parse_config(config)?;
        let sources = config
            .tracks
            .iter()
            .map(|key| env.tracks(key))
            .collect::<StepResult<Vec<_>>>()?;
        Ok(Some(merge(sources)))
    }
}

/// `shuffle`: random permutation from the run's random source.
pub struct Shuffle;

#[async_trait]
impl Step for Shuffle {
    fn id(&self) -> &'static str {
        "shuffle"
    }

    fn description(&self) -> &'static str {
        "Shuffle tracks into a random order"
    }

    fn config_schema(&self) -> ConfigSchema {
        ConfigSchema::new().required("tracks", track_source_schema())
    }

    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
        let config: SourceConfig = parse_config(config)?;
        let tracks = env.tracks(&config.tracks)?;
        Ok(Some(shuffle(tracks, &mut *env.rng)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepError;
    use crate::models::fixtures::track;
    use crate::models::Track;
    use crate::provider::MemoryProvider;
    use crate::sink::MemorySink;
    use crate::transform::pipeline::PipelineContext;
    use chrono::Utc;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    async fn run(step: &dyn Step, config: Value, context: &PipelineContext, seed: u64) -> StepResult<Option<TrackCollection>> {
        let provider = MemoryProvider::default();
        let sink = MemorySink::new();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut env = StepEnv {
            context,
            provider: &provider,
            sink: &sink,
            rng: &mut rng,
            now: Utc::now(),
        };
        step.execute(&config, &mut env).await
    }

    fn ids(tracks: &[Track]) -> Vec<&str> {
        tracks.iter().map(|t| t.id.as_str()).collect()
    }

    fn context() -> PipelineContext {
        let mut popular = track("a");
        popular.popularity = 90;
        let mut context = PipelineContext::new();
        context.insert("all", vec![popular, track("b"), track("c")]);
        context.insert("more", vec![track("c"), track("d")]);
        context
    }

    #[tokio::test]
    async fn test_filter_step() {
        let out = run(
            &Filter,
            json!({ "type": "filter", "tracks": "all", "filter": { "popularity": ">=60" } }),
            &context(),
            0,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(ids(&out), vec!["a"]);
    }

    #[tokio::test]
    async fn test_filter_step_rejects_malformed_shorthand() {
        let err = run(
            &Filter,
            json!({ "tracks": "all", "filter": { "popularity": "=>5" } }),
            &context(),
            0,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, StepError::Filter(_)));
    }

    #[tokio::test]
    async fn test_unknown_source_is_invalid_track_source() {
        let err = run(&Dedupe, json!({ "tracks": "liked" }), &context(), 0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid track source"));
        assert!(err.to_string().contains("liked"));
    }

    #[tokio::test]
    async fn test_merge_then_dedupe() {
        let merged = run(&Merge, json!({ "tracks": ["all", "more"] }), &context(), 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&merged), vec!["a", "b", "c", "c", "d"]);

        let mut ctx = context();
        ctx.insert("merged", merged);
        let unique = run(&Dedupe, json!({ "tracks": "merged" }), &ctx, 0)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids(&unique), vec!["a", "b", "c", "d"]);
    }

    #[tokio::test]
    async fn test_merge_requires_every_source() {
        let err = run(&Merge, json!({ "tracks": ["all", "nope"] }), &context(), 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StepError::InvalidTrackSource { ref key } if key == "nope"));
    }

    #[tokio::test]
    async fn test_sort_step_with_groups() {
        let mut ctx = PipelineContext::new();
        let tracks: Vec<Track> = [("x", "beta", 2), ("y", "alpha", 1), ("z", "beta", 1)]
            .iter()
            .map(|(id, album, n)| {
                let mut t = track(id);
                t.album = album.to_string();
                t.track_number = *n;
                t
            })
            .collect();
        ctx.insert("all", tracks);

        let out = run(
            &Sort,
            json!({
                "tracks": "all",
                "sort": { "trackNumber": "asc" },
                "group_by": "album",
                "sort_group": { "album": "asc" }
            }),
            &ctx,
            0,
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(ids(&out), vec!["y", "z", "x"]);
    }

    #[tokio::test]
    async fn test_shuffle_is_reproducible_with_seed() {
        let mut ctx = PipelineContext::new();
        ctx.insert("all", (0..25).map(|i| track(&i.to_string())).collect());

        let first = run(&Shuffle, json!({ "tracks": "all" }), &ctx, 42).await.unwrap().unwrap();
        let second = run(&Shuffle, json!({ "tracks": "all" }), &ctx, 42).await.unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.len(), 25);
    }
}
