//! Pipeline definition loader with format auto-detection.
//!
//! Definitions are JSON or YAML. The format comes from the file extension
//! and, when that says nothing, from the content itself. Both formats load
//! into the same `serde_json::Value`, keeping the declared step order.

use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::LoadError;

/// Serialization format of a definition file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Json,
    Yaml,
}

/// Detect the format from the extension, then by sniffing the content.
pub fn detect_format(path: &Path, content: &str) -> Format {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match extension.as_deref() {
        Some("json") => Format::Json,
        Some("yaml") | Some("yml") => Format::Yaml,
        _ => sniff_format(content),
    }
}

/// JSON documents start with `{` or `[`; anything else is read as YAML.
pub fn sniff_format(content: &str) -> Format {
    match content.trim_start().chars().next() {
        Some('{') | Some('[') => Format::Json,
        _ => Format::Yaml,
    }
}

/// Parse a definition from text.
pub fn parse_pipeline(content: &str, format: Format) -> Result<Value, LoadError> {
    if content.trim().is_empty() {
        return Err(LoadError::Empty);
    }
    match format {
        Format::Json => Ok(serde_json::from_str(content)?),
        Format::Yaml => Ok(serde_yaml::from_str(content)?),
    }
}

/// Read and parse a definition file.
///
/// # Example
/// ```ignore
/// let document = load_pipeline("pipelines/weekly.yaml")?;
/// println!("{}", document["name"]);
/// ```
pub fn load_pipeline<P: AsRef<Path>>(path: P) -> Result<Value, LoadError> {
    let path = path.as_ref();
    let content = fs::read_to_string(path)?;
    parse_pipeline(&content, detect_format(path, &content))
}
