//! Track transformation module.
//!
//! - Filter: shorthand and explicit field matchers, compiled once per step
//! - Grouper: multi-key sorting and grouped ordering
//! - Collection: dedupe, merge, shuffle and export payloads
//! - Template: `{{date}}` rendering for names and filenames
//! - Pipeline: definitions, context and the executor

pub mod collection;
pub mod filter;
pub mod grouper;
pub mod pipeline;
pub mod template;

pub use collection::{dedupe, export_payload, merge, shuffle, ExportFormat};
pub use filter::{filter_tracks, CompiledFilter, FilterExpression};
pub use grouper::{order_collection, Direction, SortSpec};
pub use pipeline::{run_pipeline, Executor, PipelineContext, PipelineDefinition, RunReport, StepSummary};
pub use template::render_template;
