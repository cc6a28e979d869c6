//! Reference URI parsing
//!
//! References and `extends` attributes point at content through a
//! `protocol:path` URI.
//!
//! # Supported Formats
//!
//! 1. **Scheme URI**: `id:intro`, `var:user.name`, `file:parts/a.xml`,
//!    `https://example.org/data.json`
//! 2. **Fragment shorthand**: `#intro` (same as `id:intro`)
//!
//! # Examples
//!
//! ```
//! use markweave_compiler::uri::ReferenceUri;
//!
//! let uri = ReferenceUri::parse("https://example.org/a.json").unwrap();
//! assert_eq!(uri.protocol(), "https");
//! assert_eq!(uri.path(), "//example.org/a.json");
//! assert_eq!(uri.key(), "https://example.org/a.json");
//!
//! let uri = ReferenceUri::parse("#intro").unwrap();
//! assert_eq!(uri.key(), "id:intro");
//! ```

use std::fmt;

use crate::error::ReferenceError;

/// Protocol used for in-document references.
pub const ID_PROTOCOL: &str = "id";

/// Parsed `protocol:path` reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferenceUri {
    /// Lower-cased scheme (e.g. "id", "https")
    protocol: String,
    /// Everything after the first `:`
    path: String,
}

impl ReferenceUri {
    /// Build a URI from already-split parts. The protocol is lower-cased.
    pub fn new(protocol: &str, path: &str) -> Self {
        Self {
            protocol: protocol.to_ascii_lowercase(),
            path: path.to_string(),
        }
    }

    /// Parse a URI string into protocol and path.
    ///
    /// # Errors
    ///
    /// Returns `ReferenceError::InvalidUri` if the scheme is missing or
    /// malformed, or if the path is empty.
    pub fn parse(uri: &str) -> Result<Self, ReferenceError> {
        let uri = uri.trim();

        // Handle fragment shorthand (#name)
        if let Some(id) = uri.strip_prefix('#') {
            if id.is_empty() {
                return Err(ReferenceError::InvalidUri(
                    "Fragment reference cannot be empty".to_string(),
                ));
            }
            return Ok(Self::new(ID_PROTOCOL, id));
        }

        let colon = uri.find(':').ok_or_else(|| {
            ReferenceError::InvalidUri(format!(
                "Invalid reference: expected protocol:path or #id, got: {uri}"
            ))
        })?;
        let (protocol, rest) = uri.split_at(colon);
        let path = &rest[1..]; // Skip the :

        if !is_valid_scheme(protocol) {
            return Err(ReferenceError::InvalidUri(format!(
                "Invalid reference protocol '{protocol}' in: {uri}"
            )));
        }
        if path.is_empty() {
            return Err(ReferenceError::InvalidUri(format!(
                "Invalid reference: path cannot be empty, got: {uri}"
            )));
        }

        Ok(Self::new(protocol, path))
    }

    pub fn protocol(&self) -> &str {
        &self.protocol
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Canonical cache key: `protocol + ":" + path`.
    pub fn key(&self) -> String {
        format!("{}:{}", self.protocol, self.path)
    }

    /// True for references resolved against the document itself.
    pub fn is_internal(&self) -> bool {
        self.protocol == ID_PROTOCOL
    }
}

impl fmt::Display for ReferenceUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.protocol, self.path)
    }
}

/// RFC 3986 scheme: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_valid_scheme(scheme: &str) -> bool {
    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
