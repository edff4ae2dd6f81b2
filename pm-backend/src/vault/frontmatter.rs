//! Parse and generate YAML frontmatter for vault entity files.
//!
//! File shape is `---\n<yaml mapping>---\n<body>`. The body is kept verbatim,
//! so `parse(serialize(h, b)) == (h, b)`. Key order in the written header is
//! the insertion order of the mapping, which the schema controls.

use serde_yaml::{Mapping, Value};

use super::error::FormatError;

const DELIMITER: &str = "---";
const BOM: char = '\u{feff}';

/// Decoded header mapping, keys in file order
pub type Header = Mapping;

/// A parsed entity file
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub header: Header,
    pub body: String,
}

/// Split and decode a raw entity file.
pub fn parse(raw: &str) -> Result<Document, FormatError> {
    let raw = raw.strip_prefix(BOM).unwrap_or(raw);

    let mut lines = raw.split_inclusive('\n');
    let first = lines
        .next()
        .ok_or_else(|| FormatError::new("empty file"))?;
    if !is_delimiter(first) {
        return Err(FormatError::new("file does not start with `---`"));
    }

    let header_start = first.len();
    let mut offset = header_start;
    let mut closing = None;
    for line in lines {
        if is_delimiter(line) {
            closing = Some((offset, offset + line.len()));
            break;
        }
        offset += line.len();
    }

    let (header_end, body_start) =
        closing.ok_or_else(|| FormatError::new("missing closing `---`"))?;
    let header = decode_header(&raw[header_start..header_end])?;

    Ok(Document {
        header,
        body: raw[body_start..].to_string(),
    })
}

/// Render a header and body back into file contents.
pub fn serialize(header: &Header, body: &str) -> Result<String, FormatError> {
    let yaml = if header.is_empty() {
        String::new()
    } else {
        serde_yaml::to_string(header)
            .map_err(|e| FormatError::new(format!("cannot encode header: {}", e)))?
    };

    let mut out = String::with_capacity(yaml.len() + body.len() + 8);
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(&yaml);
    if !yaml.is_empty() && !yaml.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(DELIMITER);
    out.push('\n');
    out.push_str(body);
    Ok(out)
}

fn is_delimiter(line: &str) -> bool {
    line.trim_end_matches(['\n', '\r']) == DELIMITER
}

fn decode_header(yaml: &str) -> Result<Header, FormatError> {
    if yaml.trim().is_empty() {
        return Ok(Mapping::new());
    }

    let value: Value = serde_yaml::from_str(yaml)
        .map_err(|e| FormatError::new(format!("header is not valid YAML: {}", e)))?;

    match value {
        Value::Null => Ok(Mapping::new()),
        Value::Mapping(map) => {
            if let Some(key) = map.keys().find(|k| !k.is_string()) {
                return Err(FormatError::new(format!(
                    "header key {:?} is not a string",
                    key
                )));
            }
            Ok(map)
        }
        _ => Err(FormatError::new("header is not a mapping")),
    }
}
