//! Step descriptors and the registry the engine dispatches through.
//!
//! A step is self-describing: it names its `type` discriminant, declares its
//! config fields as JSON Schema rules, and executes against the pipeline
//! context. Neither the validator nor the executor knows any concrete step;
//! both only see a [`StepRegistry`].
//!
//! Built-in steps:
//!
//! - sources: `get_album_tracks`, `get_library_tracks`, `get_playlist_tracks`
//! - transforms: `filter`, `sort`, `dedupe`, `merge`, `shuffle`
//! - outputs: `export`, `replace_playlist_tracks`, `update_playlist_details`

pub mod output;
pub mod source;
pub mod transform;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::{StepError, StepResult};
use crate::models::{Track, TrackCollection};
use crate::provider::Provider;
use crate::sink::Sink;
use crate::transform::pipeline::PipelineContext;

pub use output::{Export, ReplacePlaylistTracks, UpdatePlaylistDetails};
pub use source::{GetAlbumTracks, GetLibraryTracks, GetPlaylistTracks};
pub use transform::{Dedupe, Filter, Merge, Shuffle, Sort};

// =============================================================================
// Config Schema
// =============================================================================

/// One declared config field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldRule {
    pub name: &'static str,
    pub required: bool,
    pub schema: Value,
}

/// The config fields a step accepts. Anything else is rejected.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConfigSchema {
    fields: Vec<FieldRule>,
    /// At least one of these must be present, when non-empty.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    any_of: Vec<&'static str>,
}

impl ConfigSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn required(self, name: &'static str, schema: Value) -> Self {
        self.field(name, true, schema)
    }

    pub fn optional(self, name: &'static str, schema: Value) -> Self {
        self.field(name, false, schema)
    }

    /// Require at least one of `names` to be present.
    pub fn requires_any(mut self, names: &[&'static str]) -> Self {
        self.any_of = names.to_vec();
        self
    }

    fn field(mut self, name: &'static str, required: bool, schema: Value) -> Self {
        self.fields.retain(|f| f.name != name);
        self.fields.push(FieldRule { name, required, schema });
        self
    }

    pub fn fields(&self) -> &[FieldRule] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&FieldRule> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn required_names(&self) -> Vec<&'static str> {
        self.fields.iter().filter(|f| f.required).map(|f| f.name).collect()
    }

    pub fn any_of(&self) -> &[&'static str] {
        &self.any_of
    }

    /// Field name to rule, in declaration order.
    pub fn properties(&self) -> Map<String, Value> {
        self.fields
            .iter()
            .map(|f| (f.name.to_string(), f.schema.clone()))
            .collect()
    }
}

/// Schema for a reference to an earlier step's output.
pub fn track_source_schema() -> Value {
    json!({ "type": "string", "minLength": 1 })
}

/// Schema for an album or playlist locator.
pub fn locator_schema() -> Value {
    json!({ "type": "string", "minLength": 1 })
}

// =============================================================================
// Step
// =============================================================================

/// Everything a step may touch while it runs.
pub struct StepEnv<'a> {
    /// Outputs of the steps that already ran.
    pub context: &'a PipelineContext,
    pub provider: &'a dyn Provider,
    pub sink: &'a dyn Sink,
    pub rng: &'a mut (dyn RngCore + Send),
    /// Fixed for the whole run.
    pub now: DateTime<Utc>,
}

impl<'a> StepEnv<'a> {
    /// The collection stored under `key`, or an invalid track source error.
    pub fn tracks(&self, key: &str) -> StepResult<&'a [Track]> {
        self.context.require(key)
    }
}

/// A self-describing pipeline operation.
#[async_trait]
pub trait Step: Send + Sync {
    /// Value of the `type` field selecting this step.
    fn id(&self) -> &'static str;

    fn description(&self) -> &'static str;

    fn config_schema(&self) -> ConfigSchema;

    /// Run against a config that already passed validation.
    ///
    /// Returns the produced collection, or `None` for terminal steps.
    async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>>;
}

/// Deserialize a step's config into its typed form.
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> StepResult<T> {
    serde_json::from_value(config.clone()).map_err(StepError::Config)
}

// =============================================================================
// Registry
// =============================================================================

/// Discovery view of a registered step.
#[derive(Debug, Clone, Serialize)]
pub struct StepInfo {
    pub id: &'static str,
    pub description: &'static str,
    pub config: ConfigSchema,
}

/// Ordered set of installed steps, looked up by id.
#[derive(Default)]
pub struct StepRegistry {
    steps: Vec<Box<dyn Step>>,
}

impl StepRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in step.
    pub fn builtin() -> Self {
        Self::new()
            .with(GetAlbumTracks)
            .with(GetLibraryTracks)
            .with(GetPlaylistTracks)
            .with(Filter)
            .with(Sort)
            .with(Dedupe)
            .with(Merge)
            .with(Shuffle)
            .with(Export)
            .with(ReplacePlaylistTracks)
            .with(UpdatePlaylistDetails)
    }

    pub fn with(mut self, step: impl Step + 'static) -> Self {
        self.register(Box::new(step));
        self
    }

    /// Install a step; one with the same id is replaced in place.
    pub fn register(&mut self, step: Box<dyn Step>) {
        match self.steps.iter().position(|s| s.id() == step.id()) {
            Some(index) => self.steps[index] = step,
            None => self.steps.push(step),
        }
    }

    pub fn get(&self, id: &str) -> Option<&dyn Step> {
        self.steps.iter().find(|s| s.id() == id).map(|s| s.as_ref())
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.id()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Step> {
        self.steps.iter().map(|s| s.as_ref())
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn describe(&self) -> Vec<StepInfo> {
        self.iter()
            .map(|s| StepInfo {
                id: s.id(),
                description: s.description(),
                config: s.config_schema(),
            })
            .collect()
    }
}

impl std::fmt::Debug for StepRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nothing;

    #[async_trait]
    impl Step for Nothing {
        fn id(&self) -> &'static str {
            "dedupe"
        }

        fn description(&self) -> &'static str {
            "Does nothing"
        }

        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new()
        }

        async fn execute(&self, _config: &Value, _env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
            Ok(None)
        }
    }

    #[test]
    fn test_builtin_ids_in_order() {
        let registry = StepRegistry::builtin();
        assert_eq!(
            registry.ids(),
            vec![
                "get_album_tracks",
                "get_library_tracks",
                "get_playlist_tracks",
                "filter",
                "sort",
                "dedupe",
                "merge",
                "shuffle",
                "export",
                "replace_playlist_tracks",
                "update_playlist_details",
            ]
        );
        assert!(registry.get("filter").is_some());
        assert!(registry.get("unknown").is_none());
    }

    #[test]
    fn test_register_replaces_same_id_in_place() {
        let registry = StepRegistry::builtin().with(Nothing);
        assert_eq!(registry.len(), 11);
        assert_eq!(registry.ids()[5], "dedupe");
        assert_eq!(registry.get("dedupe").unwrap().description(), "Does nothing");
    }

    #[test]
    fn test_config_schema_builder() {
        let schema = ConfigSchema::new()
            .required("tracks", track_source_schema())
            .optional("format", json!({ "enum": ["json", "csv"] }))
            .required("tracks", json!({ "type": "string" }));

        assert_eq!(schema.fields().len(), 2);
        assert_eq!(schema.required_names(), vec!["tracks"]);
        let keys: Vec<String> = schema.properties().keys().cloned().collect();
        assert_eq!(keys, vec!["format", "tracks"]);
    }
}
