//! Built-in protocol handlers and shared content decoding.

mod file;
mod http;
mod id;
mod variable;

pub use file::FileHandler;
pub use http::HttpHandler;
pub use id::IdHandler;
pub use variable::VariableHandler;

use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::parser::{MarkupParser, XmlParser};
use crate::types::Value;

/// How fetched bytes are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Yaml,
    Markup,
    Text,
}

impl ContentKind {
    /// Negotiate from a `Content-Type` header value.
    pub fn from_mime(content_type: &str) -> Option<Self> {
        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.is_empty() {
            return None;
        }
        let kind = if mime == "application/json" || mime.ends_with("+json") {
            ContentKind::Json
        } else if mime.contains("yaml") {
            ContentKind::Yaml
        } else if mime.contains("xml") {
            ContentKind::Markup
        } else {
            ContentKind::Text
        };
        Some(kind)
    }

    /// Negotiate from a file name extension.
    pub fn from_extension(path: &str) -> Self {
        let extension = path
            .rsplit('/')
            .next()
            .and_then(|name| name.rsplit_once('.'))
            .map(|(_, ext)| ext.to_ascii_lowercase());
        match extension.as_deref() {
            Some("json") => ContentKind::Json,
            Some("yaml" | "yml") => ContentKind::Yaml,
            Some("xml" | "mw" | "markup") => ContentKind::Markup,
            _ => ContentKind::Text,
        }
    }
}

/// Decode fetched text according to `kind`.
///
/// # Errors
/// Returns `Decode` tagged with `uri` when the text is not valid for `kind`.
pub fn decode_content(
    uri: &str,
    text: &str,
    kind: ContentKind,
) -> Result<Resolved, ReferenceError> {
    let decode_error = |message: String| ReferenceError::Decode {
        uri: uri.to_string(),
        message,
    };
    match kind {
        ContentKind::Json => serde_json::from_str::<Value>(text)
            .map(Resolved::Data)
            .map_err(|e| decode_error(e.to_string())),
        ContentKind::Yaml => serde_yaml_ng::from_str::<Value>(text)
            .map(Resolved::Data)
            .map_err(|e| decode_error(e.to_string())),
        ContentKind::Markup => XmlParser::default()
            .parse(text)
            .map(Resolved::Document)
            .map_err(|e| decode_error(e.to_string())),
        ContentKind::Text => Ok(Resolved::Text(text.to_string())),
    }
}
