//! Priority-ordered registry of protocol handlers.

use std::sync::Arc;

use super::handler::ProtocolHandler;
use super::handlers::{FileHandler, HttpHandler, IdHandler, VariableHandler};
use crate::config::CompilerConfig;
use crate::error::CompileError;

/// Registry of protocol handlers.
///
/// Handlers are kept sorted by priority (highest first). Among handlers of
/// equal priority the one registered first wins. New protocols are added by
/// registering a handler; the resolver does not change.
#[derive(Default, Clone)]
pub struct ProtocolRegistry {
    handlers: Vec<Arc<dyn ProtocolHandler>>,
}

impl ProtocolRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the `id`, `var`, `file` and `http(s)` handlers.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be built.
    pub fn with_defaults(config: &CompilerConfig) -> Result<Self, CompileError> {
        let mut registry = Self::new();
        registry.register(IdHandler);
        registry.register(VariableHandler);
        registry.register(FileHandler::new(config.max_response_size));
        registry.register(HttpHandler::new(config)?);
        Ok(registry)
    }

    /// Add a handler. The list stays sorted by priority.
    pub fn register(&mut self, handler: impl ProtocolHandler + 'static) {
        self.register_arc(Arc::new(handler));
    }

    pub fn register_arc(&mut self, handler: Arc<dyn ProtocolHandler>) {
        tracing::debug!(
            handler = handler.name(),
            priority = handler.priority(),
            "Registering protocol handler"
        );
        self.handlers.push(handler);
        // Stable sort keeps registration order among equal priorities
        self.handlers
            .sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    /// Remove every handler with the given name.
    ///
    /// # Returns
    /// `true` if a handler was removed.
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.name() != name);
        self.handlers.len() < before
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
    }

    /// First handler (by priority) that accepts `protocol`.
    pub fn handler_for(&self, protocol: &str) -> Option<Arc<dyn ProtocolHandler>> {
        let protocol = protocol.to_ascii_lowercase();
        self.handlers
            .iter()
            .find(|h| h.can_handle(&protocol))
            .cloned()
    }

    /// Handler names in lookup order.
    pub fn handler_names(&self) -> Vec<&str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ProtocolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProtocolRegistry")
            .field("handlers", &self.handler_names())
            .finish()
    }
}
