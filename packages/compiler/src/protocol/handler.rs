//! Protocol handler trait.

use async_trait::async_trait;

use crate::context::ProcessingContext;
use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::uri::ReferenceUri;

/// Resolves references for one class of URIs.
///
/// Handlers are queried in priority order (highest first); the first one
/// whose [`can_handle`](ProtocolHandler::can_handle) accepts the protocol
/// resolves the reference.
///
/// Handlers only fetch. Caching, cycle detection and expansion of nested
/// references are done by the resolver around them.
#[async_trait]
pub trait ProtocolHandler: Send + Sync {
    /// Name used in logs and for removal from the registry.
    fn name(&self) -> &str;

    /// Higher priority handlers are asked first.
    fn priority(&self) -> i32 {
        0
    }

    /// Whether this handler resolves URIs with the given (lower-case) protocol.
    fn can_handle(&self, protocol: &str) -> bool;

    /// Fetch the target of `uri`.
    ///
    /// # Errors
    /// Returns a [`ReferenceError`] carrying the originating URI.
    async fn handle(
        &self,
        uri: &ReferenceUri,
        ctx: &ProcessingContext,
    ) -> Result<Resolved, ReferenceError>;
}
