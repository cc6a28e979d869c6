use async_trait::async_trait;

use crate::context::ProcessingContext;
use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::protocol::ProtocolHandler;
use crate::uri::{ReferenceUri, ID_PROTOCOL};

/// Resolves `id:` references against the context's id index.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdHandler;

#[async_trait]
impl ProtocolHandler for IdHandler {
    fn name(&self) -> &str {
        "id"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        protocol == ID_PROTOCOL
    }

    async fn handle(
        &self,
        uri: &ReferenceUri,
        ctx: &ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        ctx.element_by_id(uri.path())
            .cloned()
            .map(Resolved::Element)
            .ok_or_else(|| ReferenceError::NotFound { uri: uri.key() })
    }
}
