//! Parameter records
//!
//! A [`ParamRecord`] is an ordered, string-keyed list of typed values. It is
//! both the payload format of every document message and the serialization
//! unit for elements and documents, so its one-line wire form has to
//! round-trip exactly.
//!
//! Wire form: pairs joined by `,`, each pair `key=tag:payload`. Tags are
//! `s` (string), `i` (integer), `f` (float), `b` (bool), `m` (4x4 matrix,
//! 16 floats space-separated column-major) and `h` (element handle).
//! String payloads are assumed free of the record delimiters; the one field
//! that can legitimately contain them, the serialized material-property
//! blob, is escaped by substitution before it enters a record (see
//! [`escape_payload`] / [`unescape_payload`]).

use crate::foundation::ident::ElementId;
use crate::foundation::math::Mat4;

/// A single typed value inside a [`ParamRecord`]
///
/// `Handle` replaces the raw element pointer the message bus historically
/// smuggled through its payloads: a typed, arena-indexed id that supports the
/// same zero-serialization in-process handoff without an untyped address.
#[derive(Debug, Clone, PartialEq)]
pub enum ParamValue {
    /// UTF-8 string
    Str(String),
    /// Signed integer
    Int(i64),
    /// Double-precision float
    Float(f64),
    /// Boolean, serialized as `1`/`0`
    Bool(bool),
    /// 4x4 transform matrix
    Matrix(Mat4),
    /// In-process element handle
    Handle(ElementId),
}

/// Errors produced while parsing a record line
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RecordError {
    /// A pair was missing its `=` separator
    #[error("malformed record: pair {0:?} has no key/value separator")]
    MissingSeparator(String),

    /// A value was missing its type tag
    #[error("malformed record: value for {0:?} has no type tag")]
    MissingTag(String),

    /// A value carried an unknown type tag
    #[error("malformed record: unknown type tag {tag:?} for key {key:?}")]
    UnknownTag {
        /// Key of the offending pair
        key: String,
        /// The unrecognized tag
        tag: String,
    },

    /// A numeric or matrix payload failed to parse
    #[error("malformed record: bad {kind} payload for key {key:?}")]
    BadPayload {
        /// Key of the offending pair
        key: String,
        /// Human-readable payload kind (int, float, matrix, ...)
        kind: &'static str,
    },

    /// A record that should describe a structured object lacked a field
    #[error("malformed record: missing field {0:?}")]
    MissingField(&'static str),
}

/// Ordered, string-keyed list of typed values
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamRecord {
    pairs: Vec<(String, ParamValue)>,
}

impl ParamRecord {
    /// Create an empty record
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of pairs in the record
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the record holds no pairs
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Append a pair, keeping insertion order
    pub fn push(&mut self, key: impl Into<String>, value: ParamValue) {
        self.pairs.push((key.into(), value));
    }

    /// Builder-style append
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: ParamValue) -> Self {
        self.push(key, value);
        self
    }

    /// Look up the first value stored under `key`
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.pairs.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Iterate pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Get a string value by key
    #[must_use]
    pub fn str_of(&self, key: &str) -> Option<&str> {
        match self.get(key) {
            Some(ParamValue::Str(s)) => Some(s),
            _ => None,
        }
    }

    /// Get an integer value by key
    #[must_use]
    pub fn int_of(&self, key: &str) -> Option<i64> {
        match self.get(key) {
            Some(ParamValue::Int(i)) => Some(*i),
            _ => None,
        }
    }

    /// Get a float value by key
    #[must_use]
    pub fn float_of(&self, key: &str) -> Option<f64> {
        match self.get(key) {
            Some(ParamValue::Float(f)) => Some(*f),
            _ => None,
        }
    }

    /// Get a bool value by key
    #[must_use]
    pub fn bool_of(&self, key: &str) -> Option<bool> {
        match self.get(key) {
            Some(ParamValue::Bool(b)) => Some(*b),
            _ => None,
        }
    }

    /// Get a matrix value by key
    #[must_use]
    pub fn matrix_of(&self, key: &str) -> Option<&Mat4> {
        match self.get(key) {
            Some(ParamValue::Matrix(m)) => Some(m),
            _ => None,
        }
    }

    /// Get a handle value by key
    #[must_use]
    pub fn handle_of(&self, key: &str) -> Option<ElementId> {
        match self.get(key) {
            Some(ParamValue::Handle(h)) => Some(*h),
            _ => None,
        }
    }

    /// Serialize the record into a single line (no trailing newline)
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut out = String::new();
        for (idx, (key, value)) in self.pairs.iter().enumerate() {
            if idx > 0 {
                out.push(',');
            }
            out.push_str(key);
            out.push('=');
            match value {
                ParamValue::Str(s) => {
                    out.push_str("s:");
                    out.push_str(s);
                }
                ParamValue::Int(i) => {
                    out.push_str("i:");
                    out.push_str(&i.to_string());
                }
                ParamValue::Float(f) => {
                    out.push_str("f:");
                    out.push_str(&f.to_string());
                }
                ParamValue::Bool(b) => {
                    out.push_str(if *b { "b:1" } else { "b:0" });
                }
                ParamValue::Matrix(m) => {
                    out.push_str("m:");
                    for (i, v) in m.as_slice().iter().enumerate() {
                        if i > 0 {
                            out.push(' ');
                        }
                        out.push_str(&v.to_string());
                    }
                }
                ParamValue::Handle(h) => {
                    out.push_str("h:");
                    out.push_str(&h.raw().to_string());
                }
            }
        }
        out
    }

    /// Parse a record from one line. An empty line yields an empty record.
    pub fn from_line(line: &str) -> Result<Self, RecordError> {
        let mut record = Self::new();
        let line = line.trim_end_matches(['\r', '\n']);
        if line.is_empty() {
            return Ok(record);
        }
        for pair in line.split(',') {
            let Some((key, tagged)) = pair.split_once('=') else {
                return Err(RecordError::MissingSeparator(pair.to_string()));
            };
            let Some((tag, payload)) = tagged.split_once(':') else {
                return Err(RecordError::MissingTag(key.to_string()));
            };
            let value = match tag {
                "s" => ParamValue::Str(payload.to_string()),
                "i" => ParamValue::Int(payload.parse().map_err(|_| RecordError::BadPayload {
                    key: key.to_string(),
                    kind: "int",
                })?),
                "f" => ParamValue::Float(payload.parse().map_err(|_| {
                    RecordError::BadPayload {
                        key: key.to_string(),
                        kind: "float",
                    }
                })?),
                "b" => ParamValue::Bool(payload == "1"),
                "m" => {
                    let mut floats = [0.0f32; 16];
                    let mut count = 0;
                    for (slot, text) in floats.iter_mut().zip(payload.split(' ')) {
                        *slot = text.parse().map_err(|_| RecordError::BadPayload {
                            key: key.to_string(),
                            kind: "matrix",
                        })?;
                        count += 1;
                    }
                    if count != 16 || payload.split(' ').count() != 16 {
                        return Err(RecordError::BadPayload {
                            key: key.to_string(),
                            kind: "matrix",
                        });
                    }
                    ParamValue::Matrix(Mat4::from_column_slice(&floats))
                }
                "h" => {
                    let raw: u32 = payload.parse().map_err(|_| RecordError::BadPayload {
                        key: key.to_string(),
                        kind: "handle",
                    })?;
                    ParamValue::Handle(ElementId::from_raw(raw))
                }
                other => {
                    return Err(RecordError::UnknownTag {
                        key: key.to_string(),
                        tag: other.to_string(),
                    })
                }
            };
            record.push(key, value);
        }
        Ok(record)
    }
}

/// Escape a payload string so it can live inside a record line.
///
/// Substitution only, applied solely to the serialized material-property
/// field: `=` becomes `?`, space becomes `+`, `,` becomes `&`.
#[must_use]
pub fn escape_payload(raw: &str) -> String {
    raw.chars()
        .map(|c| match c {
            '=' => '?',
            ' ' => '+',
            ',' => '&',
            other => other,
        })
        .collect()
}

/// Reverse [`escape_payload`]
#[must_use]
pub fn unescape_payload(escaped: &str) -> String {
    escaped
        .chars()
        .map(|c| match c {
            '?' => '=',
            '+' => ' ',
            '&' => ',',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Mat4Ext, Vec3};

    #[test]
    fn test_line_round_trip() {
        let record = ParamRecord::new()
            .with("name", ParamValue::Str("chassis".into()))
            .with("id", ParamValue::Int(42))
            .with("opacity", ParamValue::Float(0.25))
            .with("visible", ParamValue::Bool(true))
            .with(
                "transform",
                ParamValue::Matrix(Mat4::from_translation(Vec3::new(1.5, -2.0, 0.5))),
            )
            .with("source", ParamValue::Handle(ElementId::from_raw(3)));

        let line = record.to_line();
        let parsed = ParamRecord::from_line(&line).unwrap();
        assert_eq!(parsed, record);
        // Second serialization is byte-identical.
        assert_eq!(parsed.to_line(), line);
    }

    #[test]
    fn test_empty_line_is_empty_record() {
        let parsed = ParamRecord::from_line("").unwrap();
        assert!(parsed.is_empty());
        assert_eq!(parsed.to_line(), "");
    }

    #[test]
    fn test_ordered_duplicate_keys() {
        let record = ParamRecord::new()
            .with("meta", ParamValue::Str("first".into()))
            .with("meta", ParamValue::Str("second".into()));
        // Lookup returns the first, iteration preserves both in order.
        assert_eq!(record.str_of("meta"), Some("first"));
        let values: Vec<_> = record.iter().map(|(_, v)| v.clone()).collect();
        assert_eq!(values.len(), 2);
        let round = ParamRecord::from_line(&record.to_line()).unwrap();
        assert_eq!(round, record);
    }

    #[test]
    fn test_malformed_pairs_are_rejected() {
        assert!(matches!(
            ParamRecord::from_line("novalue"),
            Err(RecordError::MissingSeparator(_))
        ));
        assert!(matches!(
            ParamRecord::from_line("key=notag"),
            Err(RecordError::MissingTag(_))
        ));
        assert!(matches!(
            ParamRecord::from_line("key=x:whatever"),
            Err(RecordError::UnknownTag { .. })
        ));
        assert!(matches!(
            ParamRecord::from_line("key=i:abc"),
            Err(RecordError::BadPayload { .. })
        ));
        assert!(matches!(
            ParamRecord::from_line("key=m:1 2 3"),
            Err(RecordError::BadPayload { .. })
        ));
    }

    #[test]
    fn test_payload_escaping_is_reversible() {
        let raw = "diffuse=0.5 0.5 0.5,shininess=12";
        let escaped = escape_payload(raw);
        assert!(!escaped.contains('='));
        assert!(!escaped.contains(' '));
        assert!(!escaped.contains(','));
        assert_eq!(unescape_payload(&escaped), raw);
    }

    #[test]
    fn test_escaped_payload_survives_record_round_trip() {
        let blob = escape_payload("ambient=1 0 0,alpha=0.5");
        let record = ParamRecord::new().with("matProps", ParamValue::Str(blob.clone()));
        let parsed = ParamRecord::from_line(&record.to_line()).unwrap();
        assert_eq!(parsed.str_of("matProps"), Some(blob.as_str()));
        assert_eq!(
            unescape_payload(parsed.str_of("matProps").unwrap()),
            "ambient=1 0 0,alpha=0.5"
        );
    }
}
