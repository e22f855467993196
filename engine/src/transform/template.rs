//! Template rendering for export filenames and playlist details.
//!
//! Supported tags:
//!
//! - `{{date}}` renders the run timestamp as `YYYY-MM-DD`
//! - `{{date "%d %B %Y"}}` renders it with a strftime format
//!
//! The timestamp is an argument, so rendering is deterministic for a given run.

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, Utc};

use crate::error::TemplateError;

const DEFAULT_DATE_FORMAT: &str = "%Y-%m-%d";

/// Render every `{{...}}` tag in `template` against `now`.
pub fn render_template(template: &str, now: DateTime<Utc>) -> Result<String, TemplateError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let end = after
            .find("}}")
            .ok_or_else(|| TemplateError::Unterminated(template.to_string()))?;
        out.push_str(&render_tag(after[..end].trim(), now)?);
        rest = &after[end + 2..];
    }

    out.push_str(rest);
    Ok(out)
}

fn render_tag(tag: &str, now: DateTime<Utc>) -> Result<String, TemplateError> {
    let format = match tag.strip_prefix("date") {
        Some("") => DEFAULT_DATE_FORMAT,
        Some(args) if args.starts_with(char::is_whitespace) => {
            quoted(args.trim()).ok_or_else(|| TemplateError::UnknownTag(tag.to_string()))?
        }
        _ => return Err(TemplateError::UnknownTag(tag.to_string())),
    };

    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(TemplateError::InvalidDateFormat(format.to_string()));
    }
    Ok(now.format_with_items(StrftimeItems::new(format)).to_string())
}

/// The contents of a single- or double-quoted argument.
fn quoted(arg: &str) -> Option<&str> {
    ['"', '\''].iter().find_map(|q| {
        arg.strip_prefix(*q)
            .and_then(|inner| inner.strip_suffix(*q))
            .filter(|inner| !inner.contains(*q))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 0).unwrap()
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(render_template("tracks.json", now()).unwrap(), "tracks.json");
        assert_eq!(render_template("", now()).unwrap(), "");
    }

    #[test]
    fn test_default_date() {
        assert_eq!(
            render_template("export-{{date}}.json", now()).unwrap(),
            "export-2024-03-09.json"
        );
        assert_eq!(render_template("{{ date }}", now()).unwrap(), "2024-03-09");
    }

    #[test]
    fn test_custom_format() {
        assert_eq!(
            render_template("Weekly mix ({{date \"%d %B %Y\"}})", now()).unwrap(),
            "Weekly mix (09 March 2024)"
        );
        assert_eq!(render_template("{{date '%H%M'}}", now()).unwrap(), "1405");
    }

    #[test]
    fn test_multiple_tags_share_the_instant() {
        let rendered = render_template("{{date \"%Y\"}}/{{date}}", now()).unwrap();
        assert_eq!(rendered, "2024/2024-03-09");
    }

    #[test]
    fn test_errors() {
        assert_eq!(
            render_template("{{time}}", now()),
            Err(TemplateError::UnknownTag("time".into()))
        );
        assert_eq!(
            render_template("{{dates}}", now()),
            Err(TemplateError::UnknownTag("dates".into()))
        );
        assert!(matches!(
            render_template("oops {{date", now()),
            Err(TemplateError::Unterminated(_))
        ));
        assert!(matches!(
            render_template("{{date \"%Q\"}}", now()),
            Err(TemplateError::InvalidDateFormat(_))
        ));
        assert!(matches!(
            render_template("{{date %Y}}", now()),
            Err(TemplateError::UnknownTag(_))
        ));
    }
}
