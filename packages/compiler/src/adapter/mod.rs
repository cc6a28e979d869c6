//! Output adapters turn a transformer's [`Value`] into an external
//! representation.

mod builtin;
mod registry;

pub use builtin::{JsonAdapter, TextAdapter, YamlAdapter};
pub use registry::AdapterRegistry;

use crate::config::MAX_OUTPUT_DEPTH;
use crate::types::Value;

/// Options passed to an adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdaptContext {
    pub pretty: bool,
    /// Values nested deeper than this are reported instead of serialized.
    pub max_depth: usize,
}

impl Default for AdaptContext {
    fn default() -> Self {
        Self {
            pretty: true,
            max_depth: MAX_OUTPUT_DEPTH,
        }
    }
}

impl AdaptContext {
    pub fn compact() -> Self {
        Self {
            pretty: false,
            ..Self::default()
        }
    }
}

/// Converts output values into one format.
///
/// `adapt` never fails: when a value cannot be represented, the adapter
/// returns a diagnostic payload instead.
pub trait OutputAdapter: Send + Sync {
    /// Canonical format name.
    fn name(&self) -> &str;

    fn supports_format(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case(self.name())
    }

    fn adapt(&self, value: &Value, ctx: &AdaptContext) -> String;
}
