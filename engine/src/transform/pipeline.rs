//! Pipeline executor: run validated step definitions in declaration order.
//!
//! # Example
//!
//! ```rust,ignore
//! use trackflow::{run_pipeline, Executor, FileSink, SpotifyProvider, StepRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let document = trackflow::parser::load_pipeline("weekly.yaml")?;
//!     let provider = SpotifyProvider::from_env()?;
//!     let sink = FileSink::new("out");
//!     let registry = StepRegistry::builtin();
//!
//!     let mut executor = Executor::new(&provider, &sink).with_seed(7);
//!     let report = run_pipeline(&document, &registry, &mut executor).await?;
//!     println!("{} steps in run {}", report.steps.len(), report.run_id);
//!     Ok(())
//! }
//! ```
//!
//! Each step sees the outputs of every step before it, keyed by step key.
//! The first failing step aborts the run; what was produced until then stays
//! readable through [`Executor::context`].

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::time::Instant;
use uuid::Uuid;

use crate::api::logs::{log_error, log_info, log_success};
use crate::error::{ConfigErrors, PipelineError, PipelineResult, StepError, StepResult, Violation, ViolationKind};
use crate::models::{Track, TrackCollection};
use crate::provider::Provider;
use crate::sink::Sink;
use crate::steps::{StepEnv, StepRegistry};
use crate::validation::PipelineValidator;

// =============================================================================
// Definition
// =============================================================================

/// A pipeline document: a name and its steps keyed by step key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineDefinition {
    pub name: String,
    /// Step key to step config, in declaration order.
    pub steps: Map<String, Value>,
}

impl PipelineDefinition {
    pub fn from_value(document: Value) -> Result<Self, ConfigErrors> {
        serde_json::from_value(document).map_err(|e| {
            ConfigErrors(vec![Violation::new("", ViolationKind::InvalidDocument, e.to_string())])
        })
    }

    /// The `type` of a step config.
    pub fn step_type(config: &Value) -> &str {
        config.get("type").and_then(Value::as_str).unwrap_or_default()
    }
}

// =============================================================================
// Context
// =============================================================================

/// Collections produced so far in a run, by step key.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineContext {
    collections: HashMap<String, TrackCollection>,
}

impl PipelineContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&[Track]> {
        self.collections.get(key).map(Vec::as_slice)
    }

    /// Like [`get`](Self::get), but a missing key is an invalid track source.
    pub fn require(&self, key: &str) -> StepResult<&[Track]> {
        self.get(key).ok_or_else(|| StepError::InvalidTrackSource { key: key.to_string() })
    }

    /// Store a step's output, replacing any earlier value under `key`.
    pub fn insert(&mut self, key: impl Into<String>, tracks: TrackCollection) {
        self.collections.insert(key.into(), tracks);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.collections.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.collections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collections.is_empty()
    }
}

// =============================================================================
// Report
// =============================================================================

/// Outcome of one step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepSummary {
    pub key: String,
    #[serde(rename = "type")]
    pub step_type: String,
    /// Track count of the produced collection; `None` for terminal steps.
    pub produced: Option<usize>,
    pub elapsed_ms: u64,
}

/// Outcome of a successful run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub steps: Vec<StepSummary>,
}

impl RunReport {
    pub fn step(&self, key: &str) -> Option<&StepSummary> {
        self.steps.iter().find(|s| s.key == key)
    }
}

// =============================================================================
// Executor
// =============================================================================

/// Runs definitions against one provider and one sink.
pub struct Executor<'a> {
    provider: &'a dyn Provider,
    sink: &'a dyn Sink,
    rng: StdRng,
    now: Option<DateTime<Utc>>,
    context: PipelineContext,
}

impl<'a> Executor<'a> {
    pub fn new(provider: &'a dyn Provider, sink: &'a dyn Sink) -> Self {
        Self {
            provider,
            sink,
            rng: StdRng::from_entropy(),
            now: None,
            context: PipelineContext::new(),
        }
    }

    /// Use this random source for shuffling.
    pub fn with_rng(mut self, rng: StdRng) -> Self {
        self.rng = rng;
        self
    }

    /// Seeded random source, for reproducible shuffles.
    pub fn with_seed(self, seed: u64) -> Self {
        self.with_rng(StdRng::seed_from_u64(seed))
    }

    /// Fix the timestamp templates render against; defaults to the run start.
    pub fn with_now(mut self, now: DateTime<Utc>) -> Self {
        self.now = Some(now);
        self
    }

    /// Collections of the last run, complete or not.
    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    /// Execute every step of `definition` in order.
    ///
    /// The definition is assumed valid; use [`run_pipeline`] to validate first.
    pub async fn run(&mut self, registry: &StepRegistry, definition: &PipelineDefinition) -> PipelineResult<RunReport> {
        self.context = PipelineContext::new();
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let now = self.now.unwrap_or(started_at);

        log_info(format!(
            "Running pipeline '{}' ({} steps, run {})",
            definition.name,
            definition.steps.len(),
            run_id
        ));

        let mut steps = Vec::with_capacity(definition.steps.len());
        for (key, config) in &definition.steps {
            let step_type = PipelineDefinition::step_type(config);
            let step = registry.get(step_type).ok_or_else(|| PipelineError::UnregisteredStep {
                key: key.clone(),
                step_type: step_type.to_string(),
            })?;

            log_info(format!("Step '{}' ({})", key, step_type));
            let clock = Instant::now();
            let mut env = StepEnv {
                context: &self.context,
                provider: self.provider,
                sink: self.sink,
                rng: &mut self.rng,
                now,
            };

            let output = step.execute(config, &mut env).await.map_err(|source| {
                log_error(format!("Step '{}' failed: {}", key, source));
                PipelineError::Step {
                    key: key.clone(),
                    step_type: step_type.to_string(),
                    source,
                }
            })?;

            let produced = output.as_ref().map(Vec::len);
            if let Some(tracks) = output {
                self.context.insert(key.as_str(), tracks);
            }
            steps.push(StepSummary {
                key: key.clone(),
                step_type: step_type.to_string(),
                produced,
                elapsed_ms: clock.elapsed().as_millis() as u64,
            });
        }

        log_success(format!("Pipeline '{}' finished", definition.name));
        Ok(RunReport {
            run_id,
            name: definition.name.clone(),
            started_at,
            finished_at: Utc::now(),
            steps,
        })
    }
}

/// Validate `document` against `registry`, then run it.
///
/// Nothing executes unless the whole document is valid.
pub async fn run_pipeline(
    document: &Value,
    registry: &StepRegistry,
    executor: &mut Executor<'_>,
) -> PipelineResult<RunReport> {
    PipelineValidator::new(registry)?.validate(document)?;
    let definition = PipelineDefinition::from_value(document.clone())?;
    executor.run(registry, &definition).await
}
