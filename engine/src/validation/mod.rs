//! JSON Schema composition and validation for pipeline definitions.
//!
//! The pipeline schema is built from the step registry, never written by
//! hand. Every registered step contributes one discriminated branch:
//!
//! ```text
//! steps.<key>:
//!   type: enum [registered ids]
//!   allOf:
//!     - if: { type: const "filter" }
//!       then: { properties: { type, tracks, filter }, required: [...], additionalProperties: false }
//!     - if: { type: const "sort" }
//!       then: { ... }
//! ```
//!
//! [`PipelineValidator`] compiles that document schema once, plus one
//! validator per (step, field) rule. Validation walks the definition with the
//! per-field validators so each violation carries a precise path, and falls
//! back to the document schema's own messages so nothing it rejects slips
//! through.
//!
//! # Example
//!
//! ```rust,ignore
//! use serde_json::json;
//! use trackflow::{PipelineValidator, StepRegistry};
//!
//! let validator = PipelineValidator::new(&StepRegistry::builtin())?;
//! let errors = validator
//!     .validate(&json!({ "name": "x", "steps": { "a": { "type": "nope" } } }))
//!     .unwrap_err();
//! assert_eq!(errors.violations()[0].path, "/steps/a/type");
//! ```

use serde_json::{json, Map, Value};

use crate::error::{ConfigErrors, Violation, ViolationKind};
use crate::steps::{ConfigSchema, Step, StepRegistry};

/// Build the draft-7 schema for a whole pipeline definition.
pub fn compose_pipeline_schema(registry: &StepRegistry) -> Value {
    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "title": "Pipeline definition",
        "type": "object",
        "required": ["name", "steps"],
        "properties": {
            "name": { "type": "string" },
            "steps": {
                "type": "object",
                "additionalProperties": compose_step_schema(registry)
            }
        }
    })
}

/// Schema every value of `steps` must satisfy.
pub fn compose_step_schema(registry: &StepRegistry) -> Value {
    let ids = registry.ids();
    let type_rule = if ids.is_empty() {
        Value::Bool(false)
    } else {
        json!({ "enum": ids })
    };

    let mut schema = json!({
        "type": "object",
        "required": ["type"],
        "properties": { "type": type_rule }
    });

    let branches: Vec<Value> = registry.iter().map(step_branch).collect();
    if !branches.is_empty() {
        schema["allOf"] = Value::Array(branches);
    }
    schema
}

/// The `if type == id then <fields>` branch of one step.
fn step_branch(step: &dyn Step) -> Value {
    let config = step.config_schema();

    let mut properties = Map::new();
    properties.insert("type".to_string(), json!({ "const": step.id() }));
    properties.extend(config.properties());

    let mut required = vec!["type"];
    required.extend(config.required_names());

    let mut then = json!({
        "properties": properties,
        "required": required,
        "additionalProperties": false
    });
    if !config.any_of().is_empty() {
        let alternatives: Vec<Value> = config.any_of().iter().map(|name| json!({ "required": [name] })).collect();
        then["anyOf"] = Value::Array(alternatives);
    }

    json!({
        "if": { "properties": { "type": { "const": step.id() } }, "required": ["type"] },
        "then": then
    })
}

// =============================================================================
// Validator
// =============================================================================

struct FieldValidator {
    name: &'static str,
    validator: jsonschema::Validator,
}

struct StepRules {
    id: &'static str,
    config: ConfigSchema,
    fields: Vec<FieldValidator>,
}

/// Compiled validator for pipeline definitions over one registry.
pub struct PipelineValidator {
    schema: Value,
    document: jsonschema::Validator,
    steps: Vec<StepRules>,
}

fn schema_error(message: String) -> ConfigErrors {
    ConfigErrors(vec![Violation::new("", ViolationKind::InvalidDocument, message)])
}

impl PipelineValidator {
    /// Compose and compile the schemas for `registry`.
    ///
    /// Fails only if a step declares a rule that is not a valid schema.
    pub fn new(registry: &StepRegistry) -> Result<Self, ConfigErrors> {
        let schema = compose_pipeline_schema(registry);
        let document = jsonschema::draft7::new(&schema)
            .map_err(|e| schema_error(format!("invalid pipeline schema: {}", e)))?;

        let steps = registry
            .iter()
            .map(|step| -> Result<StepRules, ConfigErrors> {
                let config = step.config_schema();
                let fields = config
                    .fields()
                    .iter()
                    .map(|rule| {
                        jsonschema::draft7::new(&rule.schema)
                            .map(|validator| FieldValidator {
                                name: rule.name,
                                validator,
                            })
                            .map_err(|e| {
                                schema_error(format!(
                                    "step '{}' declares an invalid rule for '{}': {}",
                                    step.id(),
                                    rule.name,
                                    e
                                ))
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(StepRules {
                    id: step.id(),
                    config,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { schema, document, steps })
    }

    /// The composed document schema.
    pub fn schema(&self) -> &Value {
        &self.schema
    }

    fn allowed(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.id.to_string()).collect()
    }

    /// Check `document`, reporting every violation at once.
    pub fn validate(&self, document: &Value) -> Result<(), ConfigErrors> {
        let mut violations = Vec::new();

        match document.as_object() {
            None => violations.push(Violation::new(
                "",
                ViolationKind::InvalidDocument,
                "pipeline definition must be an object",
            )),
            Some(doc) => {
                match doc.get("name") {
                    None => violations.push(Violation::new(
                        "/name",
                        ViolationKind::MissingField,
                        "missing required field \"name\"",
                    )),
                    Some(name) if !name.is_string() => violations.push(Violation::new(
                        "/name",
                        ViolationKind::InvalidValue,
                        format!("{} is not of type \"string\"", name),
                    )),
                    Some(_) => {}
                }

                match doc.get("steps") {
                    None => violations.push(Violation::new(
                        "/steps",
                        ViolationKind::MissingField,
                        "missing required field \"steps\"",
                    )),
                    Some(Value::Object(steps)) => {
                        for (key, step) in steps {
                            self.check_step(key, step, &mut violations);
                        }
                    }
                    Some(other) => violations.push(Violation::new(
                        "/steps",
                        ViolationKind::InvalidValue,
                        format!("{} is not of type \"object\"", other),
                    )),
                }
            }
        }

        if violations.is_empty() && !self.document.is_valid(document) {
            violations.extend(
                self.document
                    .iter_errors(document)
                    .map(|e| Violation::new("", ViolationKind::InvalidDocument, e.to_string())),
            );
        }

        if violations.is_empty() {
            Ok(())
        } else {
            Err(ConfigErrors(violations))
        }
    }

    fn check_step(&self, key: &str, step: &Value, out: &mut Vec<Violation>) {
        let path = format!("/steps/{}", escape_pointer(key));

        let Some(config) = step.as_object() else {
            out.push(Violation::new(path, ViolationKind::InvalidValue, "step must be an object"));
            return;
        };

        let step_type = match config.get("type") {
            None => {
                out.push(Violation::new(
                    format!("{}/type", path),
                    ViolationKind::MissingField,
                    "missing required field \"type\"",
                ));
                return;
            }
            Some(Value::String(s)) => s.as_str(),
            Some(other) => {
                out.push(Violation::new(
                    format!("{}/type", path),
                    ViolationKind::InvalidValue,
                    format!("{} is not of type \"string\"", other),
                ));
                return;
            }
        };

        let Some(rules) = self.steps.iter().find(|s| s.id == step_type) else {
            let allowed = self.allowed();
            out.push(Violation::new(
                format!("{}/type", path),
                ViolationKind::UnknownStepType {
                    found: step_type.to_string(),
                    allowed: allowed.clone(),
                },
                format!(
                    "unknown step type \"{}\"; expected one of: {}",
                    step_type,
                    allowed.join(", ")
                ),
            ));
            return;
        };

        for (field, value) in config {
            if field == "type" {
                continue;
            }
            let field_path = format!("{}/{}", path, escape_pointer(field));
            match rules.fields.iter().find(|f| f.name == field) {
                None => {
                    let names: Vec<&str> = rules.fields.iter().map(|f| f.name).collect();
                    out.push(Violation::new(
                        field_path,
                        ViolationKind::UnknownField,
                        format!(
                            "unknown field \"{}\" for step type \"{}\" (allowed: {})",
                            field,
                            step_type,
                            if names.is_empty() { "none".to_string() } else { names.join(", ") }
                        ),
                    ));
                }
                Some(rule) => out.extend(
                    rule.validator
                        .iter_errors(value)
                        .map(|e| Violation::new(field_path.clone(), ViolationKind::InvalidValue, e.to_string())),
                ),
            }
        }

        for name in rules.config.required_names() {
            if !config.contains_key(name) {
                out.push(Violation::new(
                    format!("{}/{}", path, name),
                    ViolationKind::MissingField,
                    format!("missing required field \"{}\" for step type \"{}\"", name, step_type),
                ));
            }
        }

        let any_of = rules.config.any_of();
        if !any_of.is_empty() && !any_of.iter().any(|name| config.contains_key(*name)) {
            out.push(Violation::new(
                path,
                ViolationKind::MissingField,
                format!("step type \"{}\" needs at least one of: {}", step_type, any_of.join(", ")),
            ));
        }
    }
}

/// Escape a key for use as one JSON pointer segment.
fn escape_pointer(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

/// Validate `document` against `registry` in one call.
pub fn validate_pipeline(document: &Value, registry: &StepRegistry) -> Result<(), ConfigErrors> {
    PipelineValidator::new(registry)?.validate(document)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StepResult;
    use crate::models::TrackCollection;
    use crate::steps::StepEnv;
    use async_trait::async_trait;
    use serde_json::json;

    fn builtin() -> PipelineValidator {
        PipelineValidator::new(&StepRegistry::builtin()).unwrap()
    }

    fn full_document() -> Value {
        json!({
            "name": "Weekly",
            "steps": {
                "liked": { "type": "get_library_tracks" },
                "album": { "type": "get_album_tracks", "album": "spotify:album:abc" },
                "list": { "type": "get_playlist_tracks", "playlist": "abc" },
                "all": { "type": "merge", "tracks": ["liked", "album", "list"] },
                "unique": { "type": "dedupe", "tracks": "all" },
                "recent": {
                    "type": "filter",
                    "tracks": "unique",
                    "filter": [
                        { "releaseDate": ">=2020-01", "explicit": false },
                        { "genre": ["jazz", "!smooth jazz"], "popularity": { "operator": "gt", "value": 40 } }
                    ]
                },
                "ordered": {
                    "type": "sort",
                    "tracks": "recent",
                    "sort": { "trackNumber": "asc" },
                    "group_by": "album",
                    "sort_group": { "releaseDate": "desc" }
                },
                "mixed": { "type": "shuffle", "tracks": "ordered" },
                "file": {
                    "type": "export",
                    "tracks": "mixed",
                    "fields": ["name", "artist", "genre"],
                    "filename": "weekly-{{date}}.csv",
                    "format": "csv"
                },
                "save": { "type": "replace_playlist_tracks", "playlist": "abc", "tracks": "mixed" },
                "rename": { "type": "update_playlist_details", "playlist": "abc", "name": "Weekly {{date}}" }
            }
        })
    }

    #[test]
    fn test_full_document_is_valid() {
        let document = full_document();
        assert_eq!(builtin().validate(&document), Ok(()));
        assert!(jsonschema::draft7::is_valid(
            &compose_pipeline_schema(&StepRegistry::builtin()),
            &document
        ));
    }

    #[test]
    fn test_document_shape() {
        let validator = builtin();

        let errors = validator.validate(&json!([])).unwrap_err();
        assert_eq!(errors.violations()[0].kind, ViolationKind::InvalidDocument);

        let errors = validator.validate(&json!({})).unwrap_err();
        assert_eq!(errors.violations().len(), 2);
        assert_eq!(errors.at("/name").next().unwrap().kind, ViolationKind::MissingField);
        assert_eq!(errors.at("/steps").next().unwrap().kind, ViolationKind::MissingField);

        let errors = validator.validate(&json!({ "name": 3, "steps": [] })).unwrap_err();
        assert!(errors.violations().iter().all(|v| v.kind == ViolationKind::InvalidValue));

        assert!(validator.validate(&json!({ "name": "empty", "steps": {} })).is_ok());
    }

    #[test]
    fn test_unknown_step_type_lists_allowed_ids() {
        let errors = builtin()
            .validate(&json!({ "name": "x", "steps": { "a": { "type": "explode" } } }))
            .unwrap_err();

        let violation = &errors.violations()[0];
        assert_eq!(violation.path, "/steps/a/type");
        match &violation.kind {
            ViolationKind::UnknownStepType { found, allowed } => {
                assert_eq!(found, "explode");
                assert_eq!(allowed.len(), 11);
            }
            other => panic!("unexpected kind {:?}", other),
        }
        for id in StepRegistry::builtin().ids() {
            assert!(violation.message.contains(id), "{} missing from {}", id, violation.message);
        }
    }

    #[test]
    fn test_reports_every_violation() {
        let errors = builtin()
            .validate(&json!({
                "name": "x",
                "steps": {
                    "a": { "type": "dedupe" },
                    "b": { "type": "shuffle", "tracks": "a", "seed": 4 },
                    "c": { "type": "merge", "tracks": [] },
                    "d": {}
                }
            }))
            .unwrap_err();

        assert_eq!(errors.at("/steps/a/tracks").next().unwrap().kind, ViolationKind::MissingField);
        assert_eq!(errors.at("/steps/b/seed").next().unwrap().kind, ViolationKind::UnknownField);
        assert_eq!(errors.at("/steps/c/tracks").next().unwrap().kind, ViolationKind::InvalidValue);
        assert_eq!(errors.at("/steps/d/type").next().unwrap().kind, ViolationKind::MissingField);
        assert_eq!(errors.violations().len(), 4);
    }

    #[test]
    fn test_operator_type_mismatch_is_rejected() {
        for filter in [
            json!({ "artist": ">Moby" }),
            json!({ "genre": { "operator": "gte", "value": "rock" } }),
            json!({ "explicit": "<1" }),
            json!({ "popularity": "=>5" }),
        ] {
            let document = json!({
                "name": "x",
                "steps": {
                    "all": { "type": "get_library_tracks" },
                    "f": { "type": "filter", "tracks": "all", "filter": filter }
                }
            });
            let errors = builtin().validate(&document).unwrap_err();
            assert!(errors.at("/steps/f/filter").next().is_some(), "accepted {}", filter);
            assert!(!jsonschema::draft7::is_valid(
                &compose_pipeline_schema(&StepRegistry::builtin()),
                &document
            ));
        }
    }

    #[test]
    fn test_update_details_needs_one_change() {
        let errors = builtin()
            .validate(&json!({
                "name": "x",
                "steps": { "r": { "type": "update_playlist_details", "playlist": "abc" } }
            }))
            .unwrap_err();
        assert_eq!(errors.at("/steps/r").next().unwrap().kind, ViolationKind::MissingField);
    }

    #[test]
    fn test_step_keys_are_escaped_in_paths() {
        let errors = builtin()
            .validate(&json!({ "name": "x", "steps": { "a/b": { "type": "dedupe" } } }))
            .unwrap_err();
        assert_eq!(errors.violations()[0].path, "/steps/a~1b/tracks");
    }

    struct Reverse;

    #[async_trait]
    impl Step for Reverse {
        fn id(&self) -> &'static str {
            "reverse"
        }

        fn description(&self) -> &'static str {
            "Reverse a collection"
        }

        fn config_schema(&self) -> ConfigSchema {
            ConfigSchema::new().required("tracks", json!({ "type": "string" }))
        }

        async fn execute(&self, config: &Value, env: &mut StepEnv<'_>) -> StepResult<Option<TrackCollection>> {
            let key = config["tracks"].as_str().unwrap_or_default();
            let mut tracks = env.tracks(key)?.to_vec();
            tracks.reverse();
            Ok(Some(tracks))
        }
    }

    #[test]
    fn test_composition_follows_registry() {
        let registry = StepRegistry::new().with(Reverse);
        let validator = PipelineValidator::new(&registry).unwrap();

        assert!(validator
            .validate(&json!({ "name": "x", "steps": { "r": { "type": "reverse", "tracks": "a" } } }))
            .is_ok());

        let errors = validator
            .validate(&json!({ "name": "x", "steps": { "d": { "type": "dedupe", "tracks": "a" } } }))
            .unwrap_err();
        assert!(matches!(
            &errors.violations()[0].kind,
            ViolationKind::UnknownStepType { allowed, .. } if allowed == &vec!["reverse".to_string()]
        ));
    }

    #[test]
    fn test_empty_registry_rejects_every_step() {
        let validator = PipelineValidator::new(&StepRegistry::new()).unwrap();
        assert!(validator.validate(&json!({ "name": "x", "steps": {} })).is_ok());
        assert!(validator
            .validate(&json!({ "name": "x", "steps": { "a": { "type": "dedupe" } } }))
            .is_err());
    }
}
