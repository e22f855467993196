//! # Trackflow - declarative playlist pipelines
//!
//! Trackflow runs pipelines of named steps over music track collections.
//! A definition (JSON or YAML) declares steps by key; each step fetches,
//! transforms or outputs tracks, and may reference the collections produced
//! by earlier steps.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ Definition  │────▶│  Validator  │────▶│  Executor   │────▶│ Provider /  │
//! │ (JSON/YAML) │     │  (schema)   │     │  (steps)    │     │    Sink     │
//! └─────────────┘     └─────────────┘     └─────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use trackflow::{parser::load_pipeline, run_pipeline, Executor, MemoryProvider, MemorySink, StepRegistry};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = MemoryProvider::from_file("catalog.json").await?;
//!     let sink = MemorySink::new();
//!     let mut executor = Executor::new(&provider, &sink);
//!     let report = run_pipeline(&load_pipeline("weekly.yaml")?, &StepRegistry::builtin(), &mut executor).await?;
//!     println!("Ran {} steps", report.steps.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Layered error types
//! - [`models`] - Track and field model
//! - [`parser`] - Definition loading with format detection
//! - [`validation`] - Schema composition and definition validation
//! - [`steps`] - Step trait, registry and built-in steps
//! - [`transform`] - Filtering, sorting, collection ops and the executor
//! - [`provider`] - Music service collaborators
//! - [`sink`] - Export destinations
//! - [`config`] - Run options
//! - [`api`] - HTTP API server and run logs

// Core modules
pub mod config;
pub mod error;
pub mod models;

// Loading and validation
pub mod parser;
pub mod validation;

// Execution
pub mod steps;
pub mod transform;

// Collaborators
pub mod provider;
pub mod sink;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ConfigErrors, FilterError, LoadError, OptionsError, PipelineError, ProviderError, SinkError, StepError,
    TemplateError, Violation, ViolationKind,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{FieldKind, FieldValue, PlaylistDetails, Track, TrackCollection, TrackField};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use config::RunOptions;
pub use parser::{load_pipeline, parse_pipeline, Format};
pub use steps::{ConfigSchema, Step, StepEnv, StepInfo, StepRegistry};
pub use transform::pipeline::{run_pipeline, Executor, PipelineContext, PipelineDefinition, RunReport, StepSummary};
pub use validation::{compose_pipeline_schema, validate_pipeline, PipelineValidator};

// =============================================================================
// Re-exports - Collaborators
// =============================================================================

pub use provider::{Catalog, MemoryProvider, Provider, ProviderCall, SpotifyProvider};
pub use sink::{FileSink, MemorySink, Sink};

// Server
pub mod server {
    pub use crate::api::server::start_server;
}
