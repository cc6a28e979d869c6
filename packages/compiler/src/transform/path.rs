//! Target paths into the output value (`a.b[2].c`).

use std::collections::BTreeMap;
use std::fmt;

use crate::error::TransformError;
use crate::types::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location in an output value. Writing creates missing objects and arrays
/// on the way; arrays are padded with nulls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetPath {
    segments: Vec<Segment>,
}

impl TargetPath {
    /// Parse `key.key[index].key` syntax. A path may start with an index
    /// (`[0].name`) to address a top-level array.
    ///
    /// # Errors
    /// `InvalidTargetPath` for empty paths, empty keys or bad indices.
    pub fn parse(input: &str) -> Result<Self, TransformError> {
        let invalid = || TransformError::InvalidTargetPath(input.to_string());
        let input_trimmed = input.trim();
        if input_trimmed.is_empty() {
            return Err(invalid());
        }

        let mut segments = Vec::new();
        for (position, part) in input_trimmed.split('.').enumerate() {
            let (key, mut rest) = match part.find('[') {
                Some(bracket) => part.split_at(bracket),
                None => (part, ""),
            };
            if !key.is_empty() {
                segments.push(Segment::Key(key.to_string()));
            } else if position > 0 || rest.is_empty() {
                return Err(invalid());
            }

            while !rest.is_empty() {
                let inner = rest.strip_prefix('[').ok_or_else(invalid)?;
                let (number, tail) = inner.split_once(']').ok_or_else(invalid)?;
                let index = number.trim().parse::<usize>().map_err(|_| invalid())?;
                segments.push(Segment::Index(index));
                rest = tail;
            }
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Write `value` at this path inside `root`, replacing whatever is there.
    pub fn assign(&self, root: &mut Value, value: Value) {
        let mut current = root;
        for segment in &self.segments {
            current = slot(current, segment);
        }
        *current = value;
    }

    /// The value at this path, if present.
    pub fn get<'v>(&self, root: &'v Value) -> Option<&'v Value> {
        self.segments
            .iter()
            .try_fold(root, |current, segment| match (segment, current) {
                (Segment::Key(key), Value::Object(map)) => map.get(key),
                (Segment::Index(index), Value::Array(items)) => items.get(*index),
                _ => None,
            })
    }
}

/// Step into `segment`, converting `current` into the needed container.
fn slot<'v>(current: &'v mut Value, segment: &Segment) -> &'v mut Value {
    match segment {
        Segment::Key(key) => {
            if !matches!(current, Value::Object(_)) {
                *current = Value::Object(BTreeMap::new());
            }
            match current {
                Value::Object(map) => map.entry(key.clone()).or_insert(Value::Null),
                other => other,
            }
        }
        Segment::Index(index) => {
            if !matches!(current, Value::Array(_)) {
                *current = Value::Array(Vec::new());
            }
            match current {
                Value::Array(items) => {
                    if items.len() <= *index {
                        items.resize(*index + 1, Value::Null);
                    }
                    &mut items[*index]
                }
                other => other,
            }
        }
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                Segment::Key(key) if position == 0 => write!(f, "{key}")?,
                Segment::Key(key) => write!(f, ".{key}")?,
                Segment::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn object(entries: &[(&str, Value)]) -> Value {
        Value::Object(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    #[test]
    fn test_parse() {
        let path = TargetPath::parse("messages[1].content").unwrap();
        assert_eq!(
            path.segments(),
            &[
                Segment::Key("messages".into()),
                Segment::Index(1),
                Segment::Key("content".into())
            ]
        );
        assert_eq!(path.to_string(), "messages[1].content");
        assert_eq!(TargetPath::parse("[0][2]").unwrap().to_string(), "[0][2]");

        for bad in ["", "a..b", "a[", "a[x]", "a.[0]", "a[0]b"] {
            assert!(TargetPath::parse(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn test_sparse_assignment_creates_containers() {
        let mut root = Value::Null;
        TargetPath::parse("a.b[2].c")
            .unwrap()
            .assign(&mut root, Value::from("x"));

        let expected = object(&[(
            "a",
            object(&[(
                "b",
                Value::Array(vec![
                    Value::Null,
                    Value::Null,
                    object(&[("c", Value::from("x"))]),
                ]),
            )]),
        )]);
        assert_eq!(root, expected);
    }

    #[test]
    fn test_assignment_overwrites_and_keeps_siblings() {
        let mut root = object(&[("keep", Value::Int(1)), ("name", Value::from("old"))]);
        let path = TargetPath::parse("name").unwrap();
        path.assign(&mut root, Value::from("new"));

        assert_eq!(path.get(&root), Some(&Value::from("new")));
        assert_eq!(root.get_path("keep"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_scalar_in_the_way_is_replaced() {
        let mut root = object(&[("a", Value::Int(5))]);
        TargetPath::parse("a.b")
            .unwrap()
            .assign(&mut root, Value::Bool(true));
        assert_eq!(root.get_path("a.b"), Some(&Value::Bool(true)));
    }
}
