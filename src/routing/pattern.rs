//! Route pattern compilation.
//!
//! # Responsibilities
//! - Parse path templates such as `/rooms/<id>` or `/files/<path:rest>`
//! - Match a request path and extract typed values
//! - Render a path back from values (reverse routing)
//!
//! # Design Decisions
//! - Segment-wise matching, no regex on the hot path
//! - Variables always span a whole segment
//! - `path` variables swallow the rest of the path and must come last
//! - Captured values are percent-decoded, rendered values percent-encoded

use std::fmt;

use serde_json::Value;

use super::error::RoutingError;
use super::Values;

/// Converts between a raw path segment and a typed value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Converter {
    /// One non-empty segment, kept as a string.
    String,
    /// ASCII digits only, yields a JSON number.
    Int,
    /// Everything up to the end of the path, slashes included.
    Path,
}

impl Converter {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "int" => Some(Self::Int),
            "path" => Some(Self::Path),
            _ => None,
        }
    }

    /// Ordering key: lower is more specific.
    fn weight(self) -> u8 {
        match self {
            Self::Int => 1,
            Self::String => 2,
            Self::Path => 3,
        }
    }

    fn to_value(self, raw: &str) -> Option<Value> {
        let decoded = urlencoding::decode(raw).ok()?;
        if decoded.is_empty() {
            return None;
        }
        match self {
            Self::String | Self::Path => Some(Value::String(decoded.into_owned())),
            Self::Int => {
                if !decoded.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                decoded.parse::<i64>().ok().map(Value::from)
            }
        }
    }

    fn to_url(self, value: &Value) -> Option<String> {
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Bool(b) => b.to_string(),
            _ => return None,
        };
        if text.is_empty() {
            return None;
        }
        match self {
            Self::Int => text.bytes().all(|b| b.is_ascii_digit()).then_some(text),
            Self::String => Some(urlencoding::encode(&text).into_owned()),
            Self::Path => Some(
                text.split('/')
                    .map(|part| urlencoding::encode(part).into_owned())
                    .collect::<Vec<_>>()
                    .join("/"),
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Variable { name: String, converter: Converter },
}

/// A compiled path template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    source: String,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Compile a path template.
    pub fn parse(pattern: &str) -> Result<Self, RoutingError> {
        let rest = pattern
            .strip_prefix('/')
            .ok_or_else(|| RoutingError::invalid_pattern(pattern, "must start with '/'"))?;

        let mut segments: Vec<Segment> = Vec::new();
        if !rest.is_empty() {
            let parts: Vec<&str> = rest.split('/').collect();
            let last = parts.len() - 1;

            for (index, part) in parts.iter().enumerate() {
                let segment = Self::parse_segment(pattern, part)?;
                if let Segment::Variable { name, converter } = &segment {
                    if *converter == Converter::Path && index != last {
                        return Err(RoutingError::invalid_pattern(
                            pattern,
                            "path variables must be the last segment",
                        ));
                    }
                    let duplicate = segments.iter().any(
                        |s| matches!(s, Segment::Variable { name: existing, .. } if existing == name),
                    );
                    if duplicate {
                        return Err(RoutingError::invalid_pattern(
                            pattern,
                            format!("variable {name} appears twice"),
                        ));
                    }
                }
                segments.push(segment);
            }
        }

        Ok(Self {
            source: pattern.to_string(),
            segments,
        })
    }

    fn parse_segment(pattern: &str, part: &str) -> Result<Segment, RoutingError> {
        let Some(inner) = part.strip_prefix('<').and_then(|p| p.strip_suffix('>')) else {
            if part.contains('<') || part.contains('>') {
                return Err(RoutingError::invalid_pattern(
                    pattern,
                    "variables must span a whole segment",
                ));
            }
            return Ok(Segment::Static(part.to_string()));
        };

        let (converter, name) = match inner.split_once(':') {
            Some((converter, name)) => {
                let converter = Converter::parse(converter).ok_or_else(|| {
                    RoutingError::invalid_pattern(pattern, format!("unknown converter {converter}"))
                })?;
                (converter, name)
            }
            None => (Converter::String, inner),
        };

        let valid_name = !name.is_empty()
            && !name.starts_with(|c: char| c.is_ascii_digit())
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_name {
            return Err(RoutingError::invalid_pattern(
                pattern,
                format!("invalid variable name {name:?}"),
            ));
        }

        Ok(Segment::Variable {
            name: name.to_string(),
            converter,
        })
    }

    /// The template as written.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Names of the variables, in path order.
    pub fn arguments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|segment| match segment {
            Segment::Variable { name, .. } => Some(name.as_str()),
            Segment::Static(_) => None,
        })
    }

    pub fn has_argument(&self, name: &str) -> bool {
        self.arguments().any(|arg| arg == name)
    }

    /// Specificity key used to order rules (static < int < string < path).
    pub(crate) fn weights(&self) -> Vec<u8> {
        self.segments
            .iter()
            .map(|segment| match segment {
                Segment::Static(_) => 0,
                Segment::Variable { converter, .. } => converter.weight(),
            })
            .collect()
    }

    /// Match a path, returning the captured values.
    pub fn matches(&self, path: &str) -> Option<Values> {
        let rest = path.strip_prefix('/')?;
        let parts: Vec<&str> = if rest.is_empty() {
            Vec::new()
        } else {
            rest.split('/').collect()
        };

        let mut values = Values::new();
        let mut index = 0;
        for segment in &self.segments {
            match segment {
                Segment::Static(expected) => {
                    if *parts.get(index)? != expected.as_str() {
                        return None;
                    }
                    index += 1;
                }
                Segment::Variable {
                    name,
                    converter: Converter::Path,
                } => {
                    if index >= parts.len() {
                        return None;
                    }
                    let raw = parts[index..].join("/");
                    values.insert(name.clone(), Converter::Path.to_value(&raw)?);
                    index = parts.len();
                }
                Segment::Variable { name, converter } => {
                    let raw = parts.get(index)?;
                    values.insert(name.clone(), converter.to_value(raw)?);
                    index += 1;
                }
            }
        }

        (index == parts.len()).then_some(values)
    }

    /// Render the path, taking each variable from `values` first and
    /// `defaults` second. `None` when a variable has no usable value.
    pub fn render(&self, values: &Values, defaults: &Values) -> Option<String> {
        if self.segments.is_empty() {
            return Some("/".to_string());
        }

        let mut path = String::with_capacity(self.source.len());
        for segment in &self.segments {
            path.push('/');
            match segment {
                Segment::Static(text) => path.push_str(text),
                Segment::Variable { name, converter } => {
                    let value = values
                        .get(name)
                        .filter(|v| !v.is_null())
                        .or_else(|| defaults.get(name))?;
                    path.push_str(&converter.to_url(value)?);
                }
            }
        }
        Some(path)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
