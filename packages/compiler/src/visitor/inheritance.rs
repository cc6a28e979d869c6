use std::sync::Arc;

use async_trait::async_trait;

use super::{Visit, Visitor};
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::Element;
use crate::resolver::ReferenceResolver;

/// Merges `extends` ancestors into elements.
///
/// Ancestors are resolved through the same resolver and in-flight stack as
/// references, so `extends` chains that loop back are reported as cycles.
/// On failure the element is left unmerged.
#[derive(Debug, Clone)]
pub struct InheritanceVisitor {
    resolver: Arc<ReferenceResolver>,
}

impl InheritanceVisitor {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl Visitor for InheritanceVisitor {
    fn name(&self) -> &str {
        "inheritance"
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        if element.extends().is_none() {
            return Ok(Visit::Keep);
        }
        self.resolver
            .inherit(element, ctx)
            .await
            .map_err(|err| ProcessingError::from(err).with_position(element.position))?;
        Ok(Visit::Keep)
    }
}
