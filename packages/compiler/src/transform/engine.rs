use std::collections::BTreeMap;

use super::rule::{MappingRule, RuleSet};
use super::TransformContext;
use crate::context::ProcessingContext;
use crate::error::{CompileError, TransformError};
use crate::node::Document;
use crate::types::Value;

/// Output of one transformer run.
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub value: Value,
    pub context: TransformContext,
}

impl TransformOutput {
    pub fn errors(&self) -> &[TransformError] {
        self.context.errors()
    }

    pub fn is_clean(&self) -> bool {
        self.context.errors().is_empty()
    }
}

/// Applies an ordered [`RuleSet`] to processed documents.
///
/// For each rule in order the selector is evaluated. No match writes the
/// default (or an empty array for `collect` rules). One match writes the
/// transformed value, several matches write the array of transformed values.
/// Later rules overwrite earlier writes to the same path. A rule whose
/// transform fails records an error and writes its default, if any.
#[derive(Debug, Clone, Default)]
pub struct Transformer {
    rules: RuleSet,
}

impl Transformer {
    pub fn new(rules: impl Into<RuleSet>) -> Self {
        Self {
            rules: rules.into(),
        }
    }

    /// # Errors
    /// See [`RuleSet::from_yaml_str`].
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CompileError> {
        Ok(Self::new(RuleSet::from_yaml_str(yaml)?))
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn add_rule(&mut self, rule: MappingRule) {
        self.rules.push(rule);
    }

    /// Transform `document` with the variables and mode of `ctx`.
    pub fn transform(&self, document: &Document, ctx: &ProcessingContext) -> TransformOutput {
        self.transform_with(document, TransformContext::from_processing(ctx))
    }

    /// Transform starting from an earlier transformer's output.
    pub fn transform_after(
        &self,
        document: &Document,
        ctx: &ProcessingContext,
        previous: &TransformOutput,
    ) -> TransformOutput {
        let tctx = TransformContext::from_processing(ctx).with_previous(previous.value.clone());
        self.transform_with(document, tctx)
    }

    /// Transform with an explicit context. Output starts from
    /// `ctx.previous()` when set, otherwise from an empty object.
    pub fn transform_with(&self, document: &Document, mut ctx: TransformContext) -> TransformOutput {
        let mut output = ctx
            .previous()
            .cloned()
            .unwrap_or_else(|| Value::Object(BTreeMap::new()));

        for (index, rule) in self.rules.rules().iter().enumerate() {
            if let Some(value) = apply_rule(index, rule, document, &mut ctx) {
                rule.target.assign(&mut output, value);
            }
        }

        tracing::debug!(
            rules = self.rules.len(),
            errors = ctx.errors().len(),
            "Transformed document"
        );
        TransformOutput {
            value: output,
            context: ctx,
        }
    }
}

/// The value `rule` writes, or `None` if it writes nothing.
fn apply_rule(
    index: usize,
    rule: &MappingRule,
    document: &Document,
    ctx: &mut TransformContext,
) -> Option<Value> {
    let matches = rule.selector.select(document, ctx);
    if matches.is_empty() {
        if rule.default.is_none() && !rule.collect {
            ctx.record_warning(format!(
                "rule {index} ({}) matched nothing",
                rule.selector
            ));
        }
        return match (&rule.default, rule.collect) {
            (Some(default), _) => Some(default.clone()),
            (None, true) => Some(Value::Array(Vec::new())),
            (None, false) => None,
        };
    }

    let mut values = Vec::with_capacity(matches.len());
    for selected in &matches {
        match rule.transform.apply(selected, ctx) {
            Ok(value) => values.push(value),
            Err(err) => {
                ctx.record_error(TransformError::Rule {
                    index,
                    selector: rule.selector.to_string(),
                    message: err.to_string(),
                });
                return rule.default.clone();
            }
        }
    }

    if rule.collect || values.len() > 1 {
        return Some(Value::Array(values));
    }
    values.pop()
}
