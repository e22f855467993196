//! Filter engine: the declarative track filter micro-language.
//!
//! A filter expression is one clause or a list of clauses. A track passes
//! when it matches **any** clause; it matches a clause when it passes
//! **every** field matcher in it. A field may carry an array of matchers,
//! which is flattened into the clause's AND chain, so each element must pass.
//!
//! ```text
//! popularity: ">40"                       shorthand, coerced to a number
//! artist: ["!Nickelback", "!Creed"]       both must hold
//! explicit: false                         bare literal means eq
//! releaseDate: { operator: gte, value: "2010-01" }
//! - { genre: jazz }                       list of clauses: any may hold
//! - { genre: blues }
//! ```
//!
//! A shorthand value cannot itself begin with `!`, `<`, `>` or `=`; such
//! strings are malformed. Match values like `!!!` with the explicit form,
//! `{ operator: eq, value: "!!!" }`.
//!
//! Expressions are compiled once with [`CompiledFilter::compile`], which is
//! where malformed shorthand and impossible dates are reported, then
//! evaluated per track.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::error::FilterError;
use crate::models::{FieldKind, FieldValue, Track, TrackField};

/// Optional operator prefix, then the raw value.
static SHORTHAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^([!><]?=?)\s*(.*)$").expect("valid shorthand pattern"));

// Schema patterns; kept in step with `parse_shorthand`.
const TEXT_SHORTHAND_PATTERN: &str = r"^(!=?|=)?\s*([^!<>=\s].*)?$";
const INTEGER_SHORTHAND_PATTERN: &str = r"^([!><]?=?)\s*[0-9]+$";
const DATE_SHORTHAND_PATTERN: &str = r"^([!><]?=?)\s*[0-9]{4}(-[0-9]{2}(-[0-9]{2})?)?$";
const DATE_VALUE_PATTERN: &str = r"^[0-9]{4}(-[0-9]{2}(-[0-9]{2})?)?$";

// =============================================================================
// Expression model
// =============================================================================

/// Comparison operator of a field matcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Ne => "ne",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
        }
    }

    /// Map a shorthand prefix to its operator.
    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "" | "=" => Some(Operator::Eq),
            "!" | "!=" => Some(Operator::Ne),
            ">" => Some(Operator::Gt),
            ">=" => Some(Operator::Gte),
            "<" => Some(Operator::Lt),
            "<=" => Some(Operator::Lte),
            _ => None,
        }
    }

    /// Operators a field of this kind accepts.
    pub fn allowed_for(kind: FieldKind) -> &'static [Operator] {
        match kind {
            FieldKind::Integer | FieldKind::Date => &Self::ALL,
            FieldKind::Text | FieldKind::List | FieldKind::Boolean => &Self::ALL[..2],
        }
    }
}

/// One comparison against a single field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldMatcher {
    Bool(bool),
    Number(serde_json::Number),
    Shorthand(String),
    Explicit { operator: Operator, value: Value },
}

/// A single matcher or an array of them under one field name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Matchers {
    Many(Vec<FieldMatcher>),
    One(FieldMatcher),
}

impl Matchers {
    fn iter(&self) -> std::slice::Iter<'_, FieldMatcher> {
        match self {
            Matchers::Many(all) => all.iter(),
            Matchers::One(one) => std::slice::from_ref(one).iter(),
        }
    }
}

/// Field name to matcher(s); every entry must hold.
pub type Clause = BTreeMap<TrackField, Matchers>;

/// One clause, or a list of clauses of which any may hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpression {
    AnyOf(Vec<Clause>),
    Clause(Clause),
}

impl FilterExpression {
    /// An expression that matches every track.
    pub fn everything() -> Self {
        FilterExpression::Clause(Clause::new())
    }

    fn clauses(&self) -> &[Clause] {
        match self {
            FilterExpression::AnyOf(clauses) => clauses,
            FilterExpression::Clause(clause) => std::slice::from_ref(clause),
        }
    }
}

// =============================================================================
// Compilation
// =============================================================================

/// The right-hand side of a comparison, after field normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparand {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Comparand {
    fn from_json(value: &Value) -> Self {
        match value {
            Value::String(s) => Comparand::Text(s.clone()),
            Value::Number(n) => Comparand::number(n),
            Value::Bool(b) => Comparand::Boolean(*b),
            other => Comparand::Text(other.to_string()),
        }
    }

    /// `as_f64` only declines without an f64 reading, under serde_json's
    /// `arbitrary_precision`; such numbers compare as their text.
    fn number(n: &serde_json::Number) -> Self {
        n.as_f64()
            .map_or_else(|| Comparand::Text(n.to_string()), Comparand::Number)
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Comparand::Text(s) => s.trim().parse::<f64>().ok(),
            Comparand::Number(n) => Some(*n),
            Comparand::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Comparand::Date(d) => Some(d.num_days_from_ce() as f64),
        }
    }
}

/// A resolved `(field, operator, value)` test.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: TrackField,
    pub operator: Operator,
    pub value: Comparand,
}

impl Condition {
    /// Resolve one matcher for `field`.
    pub fn resolve(field: TrackField, matcher: &FieldMatcher) -> Result<Self, FilterError> {
        let (operator, raw) = match matcher {
            FieldMatcher::Bool(b) => (Operator::Eq, Comparand::Boolean(*b)),
            FieldMatcher::Number(n) => (Operator::Eq, Comparand::number(n)),
            FieldMatcher::Shorthand(s) => parse_shorthand(field, s)?,
            FieldMatcher::Explicit { operator, value } => (*operator, Comparand::from_json(value)),
        };

        Ok(Self {
            field,
            operator,
            value: normalize(field, raw)?,
        })
    }

    /// Test this condition against a track.
    pub fn test(&self, track: &Track) -> bool {
        let mut actual = track.value(self.field);
        if self.field.filters_case_insensitively() {
            actual = actual.to_lowercase();
        }

        match self.operator {
            Operator::Eq => equals(&actual, &self.value),
            Operator::Ne => !equals(&actual, &self.value),
            Operator::Gt => compare(&actual, &self.value) == Some(Ordering::Greater),
            Operator::Gte => matches!(compare(&actual, &self.value), Some(Ordering::Greater | Ordering::Equal)),
            Operator::Lt => compare(&actual, &self.value) == Some(Ordering::Less),
            Operator::Lte => matches!(compare(&actual, &self.value), Some(Ordering::Less | Ordering::Equal)),
        }
    }
}

/// Split a shorthand string into operator and raw value.
///
/// A digit-only remainder is coerced to a number. A remainder that still
/// begins with an operator character (`=>5`, `!<3`) is malformed.
pub fn parse_shorthand(field: TrackField, input: &str) -> Result<(Operator, Comparand), FilterError> {
    let malformed = || FilterError::MalformedShorthand {
        field: field.to_string(),
        input: input.to_string(),
    };

    let caps = SHORTHAND.captures(input).ok_or_else(malformed)?;
    let prefix = caps.get(1).map_or("", |m| m.as_str());
    let rest = caps.get(2).map_or("", |m| m.as_str());

    if rest.starts_with(|c: char| matches!(c, '!' | '<' | '>' | '=')) {
        return Err(malformed());
    }
    let operator = Operator::from_prefix(prefix).ok_or_else(malformed)?;

    let value = if !rest.is_empty() && rest.chars().all(|c| c.is_ascii_digit()) {
        rest.parse::<f64>()
            .map(Comparand::Number)
            .unwrap_or_else(|_| Comparand::Text(rest.to_string()))
    } else {
        Comparand::Text(rest.to_string())
    };

    Ok((operator, value))
}

/// Bring a comparand into the shape of the field it is compared with.
///
/// Date fields only accept comparands that name a real calendar day.
fn normalize(field: TrackField, value: Comparand) -> Result<Comparand, FilterError> {
    let invalid_date = |input: String| FilterError::InvalidDate {
        field: field.to_string(),
        input,
    };

    Ok(match field.kind() {
        FieldKind::Text | FieldKind::List => {
            let value = match value {
                Comparand::Number(n) => Comparand::Text(format_number(n)),
                other => other,
            };
            match value {
                Comparand::Text(s) if field.filters_case_insensitively() => Comparand::Text(s.to_lowercase()),
                other => other,
            }
        }
        FieldKind::Date => match value {
            Comparand::Text(s) => Comparand::Date(parse_date(&s).ok_or_else(|| invalid_date(s))?),
            Comparand::Number(n) => Comparand::Date(year_start(n).ok_or_else(|| invalid_date(format_number(n)))?),
            Comparand::Boolean(b) => return Err(invalid_date(b.to_string())),
            date @ Comparand::Date(_) => date,
        },
        FieldKind::Integer | FieldKind::Boolean => value,
    })
}

fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}

/// `YYYY-MM-DD`, `YYYY-MM` (first of month) or `YYYY` (1 January).
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let parts: Vec<&str> = s.split('-').collect();
    let year = parts.first()?.parse::<i32>().ok()?;
    let month = match parts.get(1) {
        Some(m) => m.parse::<u32>().ok()?,
        None => 1,
    };
    let day = match parts.get(2) {
        Some(d) => d.parse::<u32>().ok()?,
        None => 1,
    };
    if parts.len() > 3 {
        return None;
    }
    NaiveDate::from_ymd_opt(year, month, day)
}

fn year_start(year: f64) -> Option<NaiveDate> {
    if year.fract() != 0.0 || year < i32::MIN as f64 || year > i32::MAX as f64 {
        return None;
    }
    NaiveDate::from_ymd_opt(year as i32, 1, 1)
}

fn equals(actual: &FieldValue, expected: &Comparand) -> bool {
    match (actual, expected) {
        (FieldValue::List(items), Comparand::Text(t)) => items.iter().any(|item| item == t),
        (FieldValue::Text(a), Comparand::Text(b)) => a == b,
        (FieldValue::Integer(a), Comparand::Number(b)) => (*a as f64) == *b,
        (FieldValue::Boolean(a), Comparand::Boolean(b)) => a == b,
        (FieldValue::Date(a), Comparand::Date(b)) => a == b,
        _ => false,
    }
}

fn compare(actual: &FieldValue, expected: &Comparand) -> Option<Ordering> {
    let a = actual.as_number()?;
    let b = expected.as_number()?;
    a.partial_cmp(&b)
}

// =============================================================================
// Compiled filter
// =============================================================================

/// A filter expression with every matcher resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledFilter {
    clauses: Vec<Vec<Condition>>,
}

impl CompiledFilter {
    /// Resolve every matcher of `expression`, flattening arrays into their clause.
    pub fn compile(expression: &FilterExpression) -> Result<Self, FilterError> {
        let clauses = expression
            .clauses()
            .iter()
            .map(|clause| {
                clause
                    .iter()
                    .flat_map(|(field, matchers)| matchers.iter().map(move |m| (*field, m)))
                    .map(|(field, matcher)| Condition::resolve(field, matcher))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { clauses })
    }

    /// Any clause whose conditions all hold.
    pub fn matches(&self, track: &Track) -> bool {
        self.clauses
            .iter()
            .any(|conditions| conditions.iter().all(|c| c.test(track)))
    }

    /// Keep the matching tracks, in order.
    pub fn apply(&self, tracks: &[Track]) -> Vec<Track> {
        tracks.iter().filter(|t| self.matches(t)).cloned().collect()
    }
}

/// Evaluate `expression` against one track.
pub fn matches(expression: &FilterExpression, track: &Track) -> Result<bool, FilterError> {
    Ok(CompiledFilter::compile(expression)?.matches(track))
}

/// Keep the tracks matching `expression`, preserving order.
pub fn filter_tracks(tracks: &[Track], expression: &FilterExpression) -> Result<Vec<Track>, FilterError> {
    Ok(CompiledFilter::compile(expression)?.apply(tracks))
}

// =============================================================================
// Schema
// =============================================================================

fn explicit_schema(kind: FieldKind, value: Value) -> Value {
    let operators: Vec<&str> = Operator::allowed_for(kind).iter().map(Operator::as_str).collect();
    json!({
        "type": "object",
        "required": ["operator", "value"],
        "additionalProperties": false,
        "properties": {
            "operator": { "enum": operators },
            "value": value
        }
    })
}

/// Accepted shapes of a single matcher for `field`.
fn single_matcher_schema(field: TrackField) -> Value {
    let kind = field.kind();
    let shapes = match kind {
        FieldKind::Text | FieldKind::List => vec![
            json!({ "type": "string", "pattern": TEXT_SHORTHAND_PATTERN }),
            explicit_schema(kind, json!({ "type": "string" })),
        ],
        FieldKind::Integer => vec![
            json!({ "type": "number" }),
            json!({ "type": "string", "pattern": INTEGER_SHORTHAND_PATTERN }),
            explicit_schema(kind, json!({ "type": "number" })),
        ],
        FieldKind::Date => vec![
            json!({ "type": "integer" }),
            json!({ "type": "string", "pattern": DATE_SHORTHAND_PATTERN }),
            explicit_schema(
                kind,
                json!({ "anyOf": [
                    { "type": "string", "pattern": DATE_VALUE_PATTERN },
                    { "type": "integer" }
                ] }),
            ),
        ],
        FieldKind::Boolean => vec![
            json!({ "type": "boolean" }),
            explicit_schema(kind, json!({ "type": "boolean" })),
        ],
    };
    json!({ "anyOf": shapes })
}

/// JSON Schema for a filter expression, restricting operators by field kind.
pub fn filter_schema() -> Value {
    let properties: serde_json::Map<String, Value> = TrackField::ALL
        .iter()
        .map(|field| {
            let single = single_matcher_schema(*field);
            let rule = json!({
                "anyOf": [
                    single,
                    { "type": "array", "minItems": 1, "items": single }
                ]
            });
            (field.as_str().to_string(), rule)
        })
        .collect();

    let clause = json!({
        "type": "object",
        "additionalProperties": false,
        "properties": properties
    });

    json!({
        "anyOf": [
            clause,
            { "type": "array", "minItems": 1, "items": clause }
        ]
    })
}
