//! YAML frontmatter for task notes.
//!
//! Frontmatter is parsed with `serde_yaml` and converted to a JSON map so the
//! field accessors work on one value type.

use serde_json::{Map, Value};

use crate::error::Result;

pub type Frontmatter = Map<String, Value>;

/// Split a note into its frontmatter map and body.
///
/// Notes without a frontmatter block, or whose block is not a YAML mapping,
/// yield `None` and the full content as body.
pub fn split(content: &str) -> (Option<Frontmatter>, &str) {
    let stripped = content.trim_start_matches('\u{feff}');
    let Some(rest) = stripped
        .strip_prefix("---\n")
        .or_else(|| stripped.strip_prefix("---\r\n"))
    else {
        return (None, content);
    };

    let mut offset = 0;
    for line in rest.split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == "---" || trimmed == "..." {
            let yaml = &rest[..offset];
            let body = &rest[offset + line.len()..];
            return (parse_yaml_map(yaml), body);
        }
        offset += line.len();
    }
    (None, content)
}

/// Parse only the frontmatter of a note.
pub fn parse(content: &str) -> Option<Frontmatter> {
    split(content).0
}

fn parse_yaml_map(yaml: &str) -> Option<Frontmatter> {
    if yaml.trim().is_empty() {
        return Some(Map::new());
    }
    let yaml_value: serde_yaml::Value = match serde_yaml::from_str(yaml) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "unparsable frontmatter");
            return None;
        }
    };
    match serde_json::to_value(yaml_value).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Render a note with the given frontmatter in front of `body`.
pub fn render(frontmatter: &Frontmatter, body: &str) -> Result<String> {
    let mut out = String::from("---\n");
    if !frontmatter.is_empty() {
        let yaml = serde_yaml::to_string(frontmatter)?;
        out.push_str(&yaml);
        if !yaml.ends_with('\n') {
            out.push('\n');
        }
    }
    out.push_str("---\n");
    out.push_str(body);
    Ok(out)
}

/// Rewrite the frontmatter of `content`, keeping the body untouched.
pub fn update<F>(content: &str, mutate: F) -> Result<String>
where
    F: FnOnce(&mut Frontmatter),
{
    let (existing, body) = split(content);
    let mut frontmatter = existing.unwrap_or_default();
    mutate(&mut frontmatter);
    render(&frontmatter, body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalars_and_lists() {
        let input = "---\nroutine: true\nroutine_type: weekly\nroutine_weekdays:\n  - 1\n  - 3\n---\n# Body";
        let (fm, body) = split(input);
        let fm = fm.unwrap();
        assert_eq!(fm["routine"], Value::Bool(true));
        assert_eq!(fm["routine_type"], Value::String("weekly".into()));
        assert_eq!(fm["routine_weekdays"].as_array().unwrap().len(), 2);
        assert_eq!(body, "# Body");
    }

    #[test]
    fn bom_and_wikilinks_survive() {
        let input = "\u{feff}---\nproject: \"[[Garden]]\"\n---\n";
        let fm = parse(input).unwrap();
        assert_eq!(fm["project"], Value::String("[[Garden]]".into()));
    }

    #[test]
    fn missing_or_broken_frontmatter_is_none() {
        assert!(parse("# Title\nBody").is_none());
        assert!(parse("---\nkey: [unclosed\n---\n").is_none());
        assert!(parse("---\nno closing fence").is_none());
    }

    #[test]
    fn empty_block_is_empty_map() {
        assert!(parse("---\n---\n").unwrap().is_empty());
    }

    #[test]
    fn update_keeps_body() {
        let input = "---\nroutine: true\n---\nnotes here\n";
        let updated = update(input, |fm| {
            fm.insert("scheduled_time".into(), Value::String("09:00".into()));
        })
        .unwrap();
        let (fm, body) = split(&updated);
        let fm = fm.unwrap();
        assert_eq!(fm["scheduled_time"], Value::String("09:00".into()));
        assert_eq!(fm["routine"], Value::Bool(true));
        assert_eq!(body, "notes here\n");
    }

    #[test]
    fn update_adds_block_when_absent() {
        let updated = update("plain", |fm| {
            fm.insert("routine".into(), Value::Bool(false));
        })
        .unwrap();
        assert!(updated.starts_with("---\nroutine: false\n---\nplain"));
    }
}
