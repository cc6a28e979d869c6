//! Protocol handlers resolve reference URIs by scheme.

mod handler;
pub mod handlers;
mod registry;

pub use handler::ProtocolHandler;
pub use handlers::{ContentKind, FileHandler, HttpHandler, IdHandler, VariableHandler};
pub use registry::ProtocolRegistry;
