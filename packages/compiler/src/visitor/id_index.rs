use async_trait::async_trait;

use super::Visitor;
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::Document;

/// Builds the id index in one pass before anything is resolved.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdIndexVisitor;

#[async_trait]
impl Visitor for IdIndexVisitor {
    fn name(&self) -> &str {
        "id-index"
    }

    fn descends(&self) -> bool {
        false
    }

    async fn visit_document(
        &self,
        document: &mut Document,
        ctx: &mut ProcessingContext,
    ) -> Result<(), ProcessingError> {
        ctx.index_ids(document);
        tracing::debug!(ids = ctx.id_index().len(), "Indexed element ids");
        Ok(())
    }
}
