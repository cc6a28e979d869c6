use std::sync::Arc;

use async_trait::async_trait;

use super::{Visit, Visitor};
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::Element;
use crate::tags::{check_attributes, TagRegistry};

/// Checks allowed and required attributes after inheritance has run, so an
/// attribute inherited from an ancestor satisfies a requirement.
#[derive(Debug, Clone)]
pub struct AttributeValidationVisitor {
    tags: Arc<TagRegistry>,
}

impl AttributeValidationVisitor {
    pub fn new(tags: Arc<TagRegistry>) -> Self {
        Self { tags }
    }
}

#[async_trait]
impl Visitor for AttributeValidationVisitor {
    fn name(&self) -> &str {
        "attribute-validation"
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        let Some(definition) = self.tags.get_definition(&element.tag_name) else {
            return Ok(Visit::Keep);
        };
        let mut errors = Vec::new();
        check_attributes(definition, element, &mut errors);
        for error in errors {
            ctx.report(ProcessingError::from(error))?;
        }
        Ok(Visit::Keep)
    }
}
