use async_trait::async_trait;

use crate::context::ProcessingContext;
use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::protocol::ProtocolHandler;
use crate::uri::ReferenceUri;

/// Resolves `var:` references from the context variables.
///
/// The path may descend into objects and arrays: `var:user.roles.0`.
#[derive(Debug, Clone, Copy, Default)]
pub struct VariableHandler;

#[async_trait]
impl ProtocolHandler for VariableHandler {
    fn name(&self) -> &str {
        "var"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        protocol == "var"
    }

    async fn handle(
        &self,
        uri: &ReferenceUri,
        ctx: &ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        ctx.variable(uri.path())
            .cloned()
            .map(Resolved::Data)
            .ok_or_else(|| ReferenceError::NotFound { uri: uri.key() })
    }
}
