//! Markup parsing into the node model.
//!
//! The processor works on an already-built [`Document`]; parsing is behind
//! the [`MarkupParser`] trait so another surface syntax can be plugged in.
//! [`XmlParser`] is the bundled implementation.

use roxmltree::{Node as XmlNode, NodeType, ParsingOptions, TextPos};

use crate::config::REFERENCE_TAG;
use crate::error::SyntaxError;
use crate::node::{Content, Document, Element, Node, Position, Reference, SourcePosition};
use crate::types::Value;
use crate::uri::ReferenceUri;

/// Turns source text into a raw [`Document`].
pub trait MarkupParser: Send + Sync {
    /// # Errors
    /// Returns a [`SyntaxError`] for malformed input.
    fn parse(&self, text: &str) -> Result<Document, SyntaxError>;
}

/// XML-like markup parser.
///
/// - Elements become [`Element`] nodes with string attributes.
/// - Text that is not whitespace-only becomes [`Content`].
/// - `<ref href="protocol:path"/>` (or `uri=`) becomes a [`Reference`].
/// - Comments, processing instructions and DTDs are not accepted/kept.
#[derive(Debug, Clone)]
pub struct XmlParser {
    reference_tag: String,
}

impl Default for XmlParser {
    fn default() -> Self {
        Self {
            reference_tag: REFERENCE_TAG.to_string(),
        }
    }
}

impl XmlParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different tag name for reference nodes.
    pub fn with_reference_tag(mut self, tag: impl Into<String>) -> Self {
        self.reference_tag = tag.into();
        self
    }

    fn convert(
        &self,
        xml: &roxmltree::Document<'_>,
        node: XmlNode<'_, '_>,
    ) -> Result<Option<Node>, SyntaxError> {
        match node.node_type() {
            NodeType::Element => {
                let position = span(xml, node);
                let tag = node.tag_name().name();

                if tag.eq_ignore_ascii_case(&self.reference_tag) {
                    let target = node
                        .attribute("href")
                        .or_else(|| node.attribute("uri"))
                        .ok_or_else(|| {
                            SyntaxError::new(format!("<{tag}> requires an href attribute"))
                                .at(position)
                        })?;
                    let uri = ReferenceUri::parse(target)
                        .map_err(|e| SyntaxError::new(e.to_string()).at(position))?;
                    return Ok(Some(Reference::from_uri(&uri).with_position(position).into()));
                }

                let mut element = Element::new(tag).with_position(position);
                for attribute in node.attributes() {
                    element
                        .attributes
                        .insert(attribute.name().to_string(), Value::from(attribute.value()));
                }
                for child in node.children() {
                    if let Some(converted) = self.convert(xml, child)? {
                        element.children.push(converted);
                    }
                }
                Ok(Some(element.into()))
            }
            NodeType::Text => {
                let text = node.text().unwrap_or_default();
                if text.trim().is_empty() {
                    return Ok(None);
                }
                Ok(Some(
                    Content::new(text).with_position(span(xml, node)).into(),
                ))
            }
            _ => Ok(None),
        }
    }
}

impl MarkupParser for XmlParser {
    fn parse(&self, text: &str) -> Result<Document, SyntaxError> {
        let options = ParsingOptions {
            allow_dtd: false,
            ..ParsingOptions::default()
        };
        let xml = roxmltree::Document::parse_with_options(text, options).map_err(|e| {
            let pos = position(e.pos(), 0);
            SyntaxError::new(e.to_string()).at(SourcePosition::new(pos, pos))
        })?;

        let mut document = Document::new(Vec::new());
        for child in xml.root().children() {
            if let Some(node) = self.convert(&xml, child)? {
                document.children.push(node);
            }
        }
        document.position = SourcePosition::new(
            Position::new(1, 1, 0),
            position(xml.text_pos_at(text.len()), text.len()),
        );
        Ok(document)
    }
}

/// Parse `text` with the default [`XmlParser`].
///
/// # Errors
/// Returns a [`SyntaxError`] for malformed input.
pub fn parse(text: &str) -> Result<Document, SyntaxError> {
    XmlParser::default().parse(text)
}

fn span(xml: &roxmltree::Document<'_>, node: XmlNode<'_, '_>) -> SourcePosition {
    let range = node.range();
    SourcePosition::new(
        position(xml.text_pos_at(range.start), range.start),
        position(xml.text_pos_at(range.end), range.end),
    )
}

fn position(pos: TextPos, offset: usize) -> Position {
    Position::new(pos.row as usize, pos.col as usize, offset)
}
