//! Node model for parsed markup documents.
//!
//! A [`Document`] exclusively owns its subtree. Cross-tree relations used
//! during processing (the id index, the ancestor stack) are expressed as
//! [`NodePath`] indices, never as shared ownership of an [`Element`].

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::types::Value;
use crate::uri::ReferenceUri;

/// Child-index path from the document root to a node.
pub type NodePath = Vec<usize>;

/// Attribute map of an element. Keys are unique.
pub type Attributes = BTreeMap<String, Value>;

/// Discriminant of the four node kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    Document,
    Element,
    Content,
    Reference,
}

/// A location in source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
    /// 0-based byte offset
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self {
            line,
            column,
            offset,
        }
    }
}

/// Source span of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SourcePosition {
    pub start: Position,
    pub end: Position,
}

impl SourcePosition {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    /// True for nodes built programmatically rather than parsed.
    pub fn is_unknown(&self) -> bool {
        self.start.line == 0
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.start.line, self.start.column)
    }
}

/// A value produced by resolving a reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum Resolved {
    /// An element (in-document targets, `extends` ancestors)
    Element(Element),
    /// A whole markup document (remote or file targets with markup content)
    Document(Document),
    /// Structured data (JSON/YAML content, variables)
    Data(Value),
    /// Raw text
    Text(String),
}

impl Resolved {
    /// Convert the resolved value into a generic [`Value`].
    pub fn to_value(&self) -> Value {
        match self {
            Resolved::Element(element) => element.to_value(),
            Resolved::Document(document) => document.to_value(),
            Resolved::Data(value) => value.clone(),
            Resolved::Text(text) => Value::String(text.clone()),
        }
    }

    /// Plain-text rendition of the resolved value.
    pub fn text_content(&self) -> String {
        match self {
            Resolved::Element(element) => element.text_content(),
            Resolved::Document(document) => document.text_content(),
            Resolved::Data(value) => value.to_text(),
            Resolved::Text(text) => text.clone(),
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Resolved::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Name of the variant, used in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Resolved::Element(_) => "element",
            Resolved::Document(_) => "document",
            Resolved::Data(_) => "data",
            Resolved::Text(_) => "text",
        }
    }
}

/// Root node of a parsed document.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Document {
    pub children: Vec<Node>,
    pub position: SourcePosition,
}

impl Document {
    pub fn new(children: Vec<Node>) -> Self {
        Self {
            children,
            position: SourcePosition::default(),
        }
    }

    pub fn kind(&self) -> NodeKind {
        NodeKind::Document
    }

    /// The first element child, which carries document-level attributes
    /// such as `mode`.
    pub fn root_element(&self) -> Option<&Element> {
        self.children.iter().find_map(Node::as_element)
    }

    /// All elements in document order (pre-order, depth-first).
    pub fn elements(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        for child in &self.children {
            if let Node::Element(element) = child {
                out.push(element);
                element.collect_descendants(&mut out);
            }
        }
        out
    }

    /// Follow a child-index path from the document root.
    pub fn node_at(&self, path: &[usize]) -> Option<&Node> {
        let (first, rest) = path.split_first()?;
        let mut current = self.children.get(*first)?;
        for index in rest {
            current = match current {
                Node::Element(element) => element.children.get(*index)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn element_at(&self, path: &[usize]) -> Option<&Element> {
        self.node_at(path).and_then(Node::as_element)
    }

    pub fn text_content(&self) -> String {
        self.children.iter().map(Node::text_content).collect()
    }

    pub fn to_value(&self) -> Value {
        Value::Array(self.children.iter().map(Node::to_value).collect())
    }
}

/// A node below the document root.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Node {
    Element(Element),
    Content(Content),
    Reference(Reference),
}

impl Node {
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::Element(_) => NodeKind::Element,
            Node::Content(_) => NodeKind::Content,
            Node::Reference(_) => NodeKind::Reference,
        }
    }

    pub fn position(&self) -> SourcePosition {
        match self {
            Node::Element(e) => e.position,
            Node::Content(c) => c.position,
            Node::Reference(r) => r.position,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Node::Reference(reference) => Some(reference),
            _ => None,
        }
    }

    pub fn text_content(&self) -> String {
        match self {
            Node::Element(element) => element.text_content(),
            Node::Content(content) => content.value.clone(),
            Node::Reference(reference) => reference
                .resolved()
                .map(Resolved::text_content)
                .unwrap_or_default(),
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Node::Element(element) => element.to_value(),
            Node::Content(content) => Value::String(content.value.clone()),
            Node::Reference(reference) => reference.to_value(),
        }
    }
}

impl From<Element> for Node {
    fn from(element: Element) -> Self {
        Node::Element(element)
    }
}

impl From<Content> for Node {
    fn from(content: Content) -> Self {
        Node::Content(content)
    }
}

impl From<Reference> for Node {
    fn from(reference: Reference) -> Self {
        Node::Reference(reference)
    }
}

/// A tagged element with attributes, children and processor metadata.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Element {
    pub tag_name: String,
    pub attributes: Attributes,
    pub children: Vec<Node>,
    /// Scratch space written by processing visitors. Never produced by the parser.
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
    pub position: SourcePosition,
}

impl Element {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            ..Self::default()
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn with_child(mut self, child: impl Into<Node>) -> Self {
        self.children.push(child.into());
        self
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_child(Content::new(text))
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    /// String form of an attribute, if present and textual.
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.attribute("id")
    }

    /// The `extends` attribute, if the element inherits from another one.
    pub fn extends(&self) -> Option<&str> {
        self.attribute("extends")
    }

    /// Element children only, in order.
    pub fn element_children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    /// Descendant elements in pre-order, excluding `self`.
    pub fn descendants(&self) -> Vec<&Element> {
        let mut out = Vec::new();
        self.collect_descendants(&mut out);
        out
    }

    fn collect_descendants<'a>(&'a self, out: &mut Vec<&'a Element>) {
        for child in self.element_children() {
            out.push(child);
            child.collect_descendants(out);
        }
    }

    /// Concatenated text of content nodes and resolved references.
    pub fn text_content(&self) -> String {
        self.children.iter().map(Node::text_content).collect()
    }

    /// Generic representation used by the transformer.
    ///
    /// Produces `{tag, attributes, children}` plus `metadata` when present.
    pub fn to_value(&self) -> Value {
        let mut map = BTreeMap::new();
        map.insert("tag".to_string(), Value::String(self.tag_name.clone()));
        map.insert(
            "attributes".to_string(),
            Value::Object(self.attributes.clone()),
        );
        map.insert(
            "children".to_string(),
            Value::Array(self.children.iter().map(Node::to_value).collect()),
        );
        if !self.metadata.is_empty() {
            map.insert("metadata".to_string(), Value::Object(self.metadata.clone()));
        }
        Value::Object(map)
    }
}

/// Text payload of mixed or content-only elements.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Content {
    pub value: String,
    pub position: SourcePosition,
}

impl Content {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            position: SourcePosition::default(),
        }
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }
}

/// Pointer to content elsewhere, identified by protocol and path.
///
/// `resolved` is written at most once; later writes are ignored.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Reference {
    pub protocol: String,
    pub path: String,
    resolved: Option<Resolved>,
    pub position: SourcePosition,
}

impl Reference {
    pub fn new(protocol: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            protocol: protocol.into(),
            path: path.into(),
            resolved: None,
            position: SourcePosition::default(),
        }
    }

    pub fn from_uri(uri: &ReferenceUri) -> Self {
        Self::new(uri.protocol(), uri.path())
    }

    pub fn with_position(mut self, position: SourcePosition) -> Self {
        self.position = position;
        self
    }

    /// Canonical cache key: `protocol:path`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.protocol, self.path)
    }

    pub fn uri(&self) -> ReferenceUri {
        ReferenceUri::new(&self.protocol, &self.path)
    }

    pub fn resolved(&self) -> Option<&Resolved> {
        self.resolved.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.resolved.is_some()
    }

    /// Store the resolution result. Returns `false` if already resolved,
    /// in which case the existing value is kept.
    pub(crate) fn set_resolved(&mut self, value: Resolved) -> bool {
        if self.resolved.is_some() {
            return false;
        }
        self.resolved = Some(value);
        true
    }

    pub fn to_value(&self) -> Value {
        match &self.resolved {
            Some(resolved) => resolved.to_value(),
            None => {
                let mut map = BTreeMap::new();
                map.insert("ref".to_string(), Value::String(self.key()));
                Value::Object(map)
            }
        }
    }
}
