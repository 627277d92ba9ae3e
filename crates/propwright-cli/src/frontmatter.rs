//! Markdown front matter and first-level heading handling.
//!
//! Only the front-matter block and the first `# ` line are ever rewritten;
//! everything else in a note is carried through byte for byte.

use propwright_core::{MetadataDiff, MetadataStore, MetadataValue, StoreError};
use serde_yaml::{Mapping, Value};

const DELIMITER: &str = "---";

/// A note split into its front matter and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Note<'a> {
    /// YAML between the delimiters, if the note has a front-matter block
    pub frontmatter: Option<&'a str>,

    /// Everything after the closing delimiter line
    pub body: &'a str,
}

impl<'a> Note<'a> {
    /// Split `content` on a leading `---` block.
    ///
    /// A note whose opening delimiter is never closed has no front matter.
    pub fn parse(content: &'a str) -> Self {
        let no_frontmatter = Self {
            frontmatter: None,
            body: content,
        };

        let Some(first_end) = content.find('\n') else {
            return no_frontmatter;
        };
        if content[..first_end].trim_end() != DELIMITER {
            return no_frontmatter;
        }

        let yaml_start = first_end + 1;
        let mut offset = yaml_start;
        for line in content[yaml_start..].split_inclusive('\n') {
            if line.trim_end() == DELIMITER {
                return Self {
                    frontmatter: Some(&content[yaml_start..offset]),
                    body: &content[offset + line.len()..],
                };
            }
            offset += line.len();
        }

        no_frontmatter
    }

    /// Front matter as a metadata store. Scalars other than strings are
    /// read as their YAML text.
    pub fn metadata(&self) -> Result<MetadataStore, StoreError> {
        let mapping = parse_mapping(self.frontmatter)?;
        Ok(mapping
            .iter()
            .map(|(key, value)| (scalar_text(key), to_metadata(value)))
            .collect())
    }

    /// Text of the first `# ` heading in the body.
    pub fn first_heading(&self) -> Option<String> {
        self.body
            .lines()
            .find_map(heading_text)
            .map(str::to_string)
    }
}

/// Apply `diff` to the note and return the new content.
///
/// Keys not named in the diff are kept in their original order. When the
/// last key is deleted, the front-matter block is removed.
pub fn apply_metadata_diff(content: &str, diff: &MetadataDiff) -> Result<String, StoreError> {
    let note = Note::parse(content);
    let mut mapping = parse_mapping(note.frontmatter)?;

    for (key, value) in diff {
        let key = Value::String(key.clone());
        match value {
            Some(value) => {
                mapping.insert(key, to_yaml(value));
            }
            None => {
                mapping.shift_remove(&key);
            }
        }
    }

    if mapping.is_empty() {
        return Ok(note.body.to_string());
    }

    let yaml = serde_yaml::to_string(&mapping)
        .map_err(|e| StoreError::Frontmatter(e.to_string()))?;
    Ok(format!("{DELIMITER}\n{yaml}{DELIMITER}\n{}", note.body))
}

/// Replace the first `# ` heading with `title`, or insert one at the top
/// of the body.
pub fn set_heading(content: &str, title: &str) -> String {
    let note = Note::parse(content);
    let head = &content[..content.len() - note.body.len()];
    let heading = format!("# {title}");

    let mut body = String::with_capacity(note.body.len() + heading.len() + 1);
    let mut replaced = false;
    for line in note.body.split_inclusive('\n') {
        if !replaced && heading_text(line.trim_end_matches(['\r', '\n'])).is_some() {
            body.push_str(&heading);
            body.push_str(&line[line.trim_end_matches(['\r', '\n']).len()..]);
            replaced = true;
        } else {
            body.push_str(line);
        }
    }

    if !replaced {
        body = format!("{heading}\n{}", note.body);
    }
    format!("{head}{body}")
}

/// Heading text of a `# ` line. Leading indentation is ignored and a blank
/// heading is no heading.
fn heading_text(line: &str) -> Option<&str> {
    line.trim()
        .strip_prefix("# ")
        .map(str::trim)
        .filter(|text| !text.is_empty())
}

fn parse_mapping(frontmatter: Option<&str>) -> Result<Mapping, StoreError> {
    let Some(yaml) = frontmatter.filter(|y| !y.trim().is_empty()) else {
        return Ok(Mapping::new());
    };

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => Ok(mapping),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(StoreError::Frontmatter(
            "front matter is not a mapping".to_string(),
        )),
        Err(e) => Err(StoreError::Frontmatter(e.to_string())),
    }
}

fn to_metadata(value: &Value) -> MetadataValue {
    match value {
        Value::Null => MetadataValue::Null,
        Value::Sequence(items) => {
            MetadataValue::List(items.iter().map(scalar_text).collect())
        }
        Value::Tagged(tagged) => to_metadata(&tagged.value),
        other => MetadataValue::Text(scalar_text(other)),
    }
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Tagged(tagged) => scalar_text(&tagged.value),
        nested => serde_yaml::to_string(nested)
            .map(|s| s.trim_end().to_string())
            .unwrap_or_default(),
    }
}

fn to_yaml(value: &MetadataValue) -> Value {
    match value {
        MetadataValue::Null => Value::Null,
        MetadataValue::Text(s) => Value::String(s.clone()),
        MetadataValue::List(items) => {
            Value::Sequence(items.iter().cloned().map(Value::String).collect())
        }
    }
}
