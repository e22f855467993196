//! Set operations over track collections: dedupe, merge, shuffle, export.
//!
//! All of these are synchronous. Dedupe only removes, merge only
//! concatenates, shuffle only permutes.

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::HashSet;

use crate::error::{StepError, StepResult};
use crate::models::{FieldValue, Track, TrackCollection, TrackField};

/// Keep the first track per `uri`, preserving survivor order.
pub fn dedupe(tracks: &[Track]) -> TrackCollection {
    let mut seen: HashSet<&str> = HashSet::with_capacity(tracks.len());
    tracks
        .iter()
        .filter(|t| seen.insert(t.uri.as_str()))
        .cloned()
        .collect()
}

/// Concatenate collections in the order given.
pub fn merge<'a, I>(collections: I) -> TrackCollection
where
    I: IntoIterator<Item = &'a [Track]>,
{
    collections.into_iter().flat_map(|c| c.iter().cloned()).collect()
}

/// Uniformly random permutation (Fisher-Yates).
pub fn shuffle<R: Rng + ?Sized>(tracks: &[Track], rng: &mut R) -> TrackCollection {
    let mut shuffled = tracks.to_vec();
    shuffled.shuffle(rng);
    shuffled
}

// =============================================================================
// Export
// =============================================================================

/// Serialization format of an export payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Json,
    Csv,
}

/// Project a track onto `fields`, in the order given.
pub fn project(track: &Track, fields: &[TrackField]) -> Map<String, Value> {
    fields
        .iter()
        .map(|field| (field.as_str().to_string(), field_json(track.value(*field))))
        .collect()
}

fn field_json(value: FieldValue) -> Value {
    match value {
        FieldValue::Text(s) => json!(s),
        FieldValue::Integer(n) => json!(n),
        FieldValue::Date(d) => json!(d.format("%Y-%m-%d").to_string()),
        FieldValue::Boolean(b) => json!(b),
        FieldValue::List(items) => json!(items),
    }
}

fn field_cell(value: FieldValue) -> String {
    match value {
        FieldValue::Text(s) => s,
        FieldValue::Integer(n) => n.to_string(),
        FieldValue::Date(d) => d.format("%Y-%m-%d").to_string(),
        FieldValue::Boolean(b) => b.to_string(),
        FieldValue::List(items) => items.join(";"),
    }
}

/// Serialize the projected tracks in `format`.
///
/// JSON is an array of objects; CSV is a header row followed by one record
/// per track, with genres joined by `;`.
pub fn export_payload(tracks: &[Track], fields: &[TrackField], format: ExportFormat) -> StepResult<Vec<u8>> {
    match format {
        ExportFormat::Json => {
            let rows: Vec<Value> = tracks.iter().map(|t| Value::Object(project(t, fields))).collect();
            serde_json::to_vec_pretty(&rows).map_err(|e| StepError::Export(e.to_string()))
        }
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(Vec::new());
            writer
                .write_record(fields.iter().map(TrackField::as_str))
                .map_err(|e| StepError::Export(e.to_string()))?;
            for track in tracks {
                writer
                    .write_record(fields.iter().map(|f| field_cell(track.value(*f))))
                    .map_err(|e| StepError::Export(e.to_string()))?;
            }
            writer.into_inner().map_err(|e| StepError::Export(e.to_string()))
        }
    }
}
