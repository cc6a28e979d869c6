//! Selector language used by mapping rules.
//!
//! | Syntax        | Matches                                        | Cardinality |
//! |---------------|------------------------------------------------|-------------|
//! | `/`           | the document itself                            | single      |
//! | `#id`         | the first element with that id                 | single      |
//! | `$name.path`  | a context variable                             | single      |
//! | `first(sel)`  | the first match of `sel`                       | single      |
//! | `a/b/c`       | child path from the document's top level       | multiple    |
//! | `tag`         | every element with that tag, in document order | multiple    |
//! | `sel@attr`    | attribute `attr` of each match of `sel`        | as `sel`    |
//!
//! Tag names match case-insensitively.

use std::fmt;

use crate::error::TransformError;
use crate::node::{Document, Element};
use crate::types::Value;

use super::TransformContext;

/// How many matches a selector can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cardinality {
    /// At most one match; a match is always written as a scalar.
    Single,
    /// Any number of matches.
    Multiple,
}

/// A parsed selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Root,
    Id(String),
    Variable(String),
    First(Box<Selector>),
    Path(Vec<String>),
    Tag(String),
    Attribute(Box<Selector>, String),
}

/// One selector match.
#[derive(Debug, Clone, PartialEq)]
pub enum Selected<'a> {
    Document(&'a Document),
    Element(&'a Element),
    Value(Value),
}

impl Selected<'_> {
    /// Generic value of the match.
    pub fn to_value(&self) -> Value {
        match self {
            Selected::Document(document) => document.to_value(),
            Selected::Element(element) => element.to_value(),
            Selected::Value(value) => value.clone(),
        }
    }

    pub fn text(&self) -> String {
        match self {
            Selected::Document(document) => document.text_content(),
            Selected::Element(element) => element.text_content(),
            Selected::Value(value) => value.to_text(),
        }
    }
}

impl Selector {
    /// Parse selector syntax.
    ///
    /// # Errors
    /// `InvalidSelector` for empty input, bad names or unbalanced `first(`.
    pub fn parse(input: &str) -> Result<Self, TransformError> {
        let input = input.trim();
        let invalid = |message: &str| TransformError::InvalidSelector {
            selector: input.to_string(),
            message: message.to_string(),
        };
        if input.is_empty() {
            return Err(invalid("selector is empty"));
        }

        // The attribute suffix binds loosest: `first(item)@key`
        if let Some((base, attribute)) = split_attribute(input) {
            if base.is_empty() {
                return Err(invalid("attribute selector needs a base"));
            }
            if !is_name(attribute) {
                return Err(invalid("invalid attribute name"));
            }
            return Ok(Selector::Attribute(
                Box::new(Self::parse(base)?),
                attribute.to_string(),
            ));
        }

        if input == "/" {
            return Ok(Selector::Root);
        }
        if let Some(inner) = input.strip_prefix("first(") {
            let inner = inner
                .strip_suffix(')')
                .ok_or_else(|| invalid("missing closing parenthesis"))?;
            return Ok(Selector::First(Box::new(Self::parse(inner)?)));
        }
        if let Some(id) = input.strip_prefix('#') {
            if !is_name(id) {
                return Err(invalid("invalid id"));
            }
            return Ok(Selector::Id(id.to_string()));
        }
        if let Some(variable) = input.strip_prefix('$') {
            if variable.is_empty() || !variable.split('.').all(is_name) {
                return Err(invalid("invalid variable path"));
            }
            return Ok(Selector::Variable(variable.to_string()));
        }
        if input.contains('/') {
            let segments: Vec<String> = input
                .trim_start_matches('/')
                .split('/')
                .map(str::to_lowercase)
                .collect();
            if !segments.iter().all(|s| is_name(s)) {
                return Err(invalid("invalid path segment"));
            }
            return Ok(Selector::Path(segments));
        }
        if !is_name(input) {
            return Err(invalid("invalid tag name"));
        }
        Ok(Selector::Tag(input.to_lowercase()))
    }

    pub fn cardinality(&self) -> Cardinality {
        match self {
            Selector::Root | Selector::Id(_) | Selector::Variable(_) | Selector::First(_) => {
                Cardinality::Single
            }
            Selector::Path(_) | Selector::Tag(_) => Cardinality::Multiple,
            Selector::Attribute(base, _) => base.cardinality(),
        }
    }

    /// Evaluate against a processed document, in document order.
    pub fn select<'a>(
        &self,
        document: &'a Document,
        ctx: &TransformContext,
    ) -> Vec<Selected<'a>> {
        match self {
            Selector::Root => vec![Selected::Document(document)],
            Selector::Id(id) => document
                .elements()
                .into_iter()
                .find(|element| element.id() == Some(id.as_str()))
                .map(Selected::Element)
                .into_iter()
                .collect(),
            Selector::Variable(path) => ctx
                .variable(path)
                .cloned()
                .map(Selected::Value)
                .into_iter()
                .collect(),
            Selector::First(inner) => inner.select(document, ctx).into_iter().take(1).collect(),
            Selector::Path(segments) => {
                let mut current: Vec<&Element> = Vec::new();
                for (depth, segment) in segments.iter().enumerate() {
                    current = if depth == 0 {
                        document
                            .children
                            .iter()
                            .filter_map(|node| node.as_element())
                            .filter(|element| tag_matches(element, segment))
                            .collect()
                    } else {
                        current
                            .into_iter()
                            .flat_map(|element| element.element_children())
                            .filter(|element| tag_matches(element, segment))
                            .collect()
                    };
                }
                current.into_iter().map(Selected::Element).collect()
            }
            Selector::Tag(tag) => document
                .elements()
                .into_iter()
                .filter(|element| tag_matches(element, tag))
                .map(Selected::Element)
                .collect(),
            Selector::Attribute(base, attribute) => base
                .select(document, ctx)
                .into_iter()
                .filter_map(|selected| {
                    let element = match selected {
                        Selected::Element(element) => element,
                        Selected::Document(document) => document.root_element()?,
                        Selected::Value(_) => return None,
                    };
                    element
                        .attributes
                        .get(attribute)
                        .cloned()
                        .map(Selected::Value)
                })
                .collect(),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Root => write!(f, "/"),
            Selector::Id(id) => write!(f, "#{id}"),
            Selector::Variable(path) => write!(f, "${path}"),
            Selector::First(inner) => write!(f, "first({inner})"),
            Selector::Path(segments) => write!(f, "{}", segments.join("/")),
            Selector::Tag(tag) => write!(f, "{tag}"),
            Selector::Attribute(base, attribute) => write!(f, "{base}@{attribute}"),
        }
    }
}

fn tag_matches(element: &Element, tag: &str) -> bool {
    element.tag_name.eq_ignore_ascii_case(tag)
}

/// Split `base@attr` on the last `@` outside parentheses.
fn split_attribute(input: &str) -> Option<(&str, &str)> {
    let mut depth = 0i32;
    let mut split = None;
    for (index, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth -= 1,
            '@' if depth == 0 => split = Some(index),
            _ => {}
        }
    }
    split.map(|index| (&input[..index], &input[index + 1..]))
}

fn is_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'))
}
