//! Rule-based mapping of processed documents into output values.
//!
//! Transformation is synchronous and does not modify the document: the same
//! processed document can be fed through several transformers, and a
//! transformer can be started from another one's output.

mod engine;
mod path;
mod rule;
mod selector;

pub use engine::{TransformOutput, Transformer};
pub use path::{Segment, TargetPath};
pub use rule::{MappingRule, RuleSet, Transform, TransformFn};
pub use selector::{Cardinality, Selected, Selector};

use std::collections::BTreeMap;

use crate::context::{DocumentMode, ProcessingContext};
use crate::error::TransformError;
use crate::types::Value;

/// State visible to selectors and transforms during one transformation.
#[derive(Debug, Clone, Default)]
pub struct TransformContext {
    variables: BTreeMap<String, Value>,
    mode: DocumentMode,
    previous: Option<Value>,
    errors: Vec<TransformError>,
    warnings: Vec<String>,
}

impl TransformContext {
    /// Take variables and mode from a finished processing run.
    pub fn from_processing(ctx: &ProcessingContext) -> Self {
        Self {
            variables: ctx.variables().clone(),
            mode: ctx.mode(),
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_mode(mut self, mode: DocumentMode) -> Self {
        self.mode = mode;
        self
    }

    /// Start from the output of an earlier transformer.
    pub fn with_previous(mut self, previous: Value) -> Self {
        self.previous = Some(previous);
        self
    }

    /// Look up `name` or a dotted path below it.
    pub fn variable(&self, path: &str) -> Option<&Value> {
        let (name, rest) = path.split_once('.').unwrap_or((path, ""));
        self.variables.get(name)?.get_path(rest)
    }

    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    pub fn previous(&self) -> Option<&Value> {
        self.previous.as_ref()
    }

    pub fn errors(&self) -> &[TransformError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub(crate) fn record_error(&mut self, error: TransformError) {
        tracing::warn!("{error}");
        self.errors.push(error);
    }

    pub(crate) fn record_warning(&mut self, warning: String) {
        tracing::debug!("{warning}");
        self.warnings.push(warning);
    }
}
