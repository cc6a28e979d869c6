//! markweave compiler
//!
//! Compiles XML-like markup documents into structured output.
//! This library provides functionality for:
//! - Parsing markup into a typed node tree and validating it against tag definitions
//! - Element inheritance (`extends`) and reference resolution over pluggable protocols
//! - Visitor-based document processing with cycle-safe, concurrent resolution
//! - Declarative mapping rules and output adapters (JSON, YAML, text)
//!
//! # Example
//!
//! ```ignore
//! use markweave_compiler::{CompileOptions, Compiler, CompilerConfig, Transformer};
//!
//! let compiler = Compiler::new(CompilerConfig::from_env())?;
//! let rules = Transformer::from_yaml_str("rules:\n  - select: title\n    target: title\n")?;
//! let compilation = compiler
//!     .compile(
//!         "<prompt><title>Hello</title></prompt>",
//!         &CompileOptions::new().with_transformer(rules),
//!     )
//!     .await?;
//! println!("{}", compilation.rendered.unwrap_or_default());
//! ```

pub mod adapter;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod node;
pub mod parser;
pub mod pipeline;
pub mod protocol;
pub mod resolver;
pub mod tags;
pub mod transform;
pub mod types;
pub mod uri;
pub mod visitor;

// Re-export commonly used items
pub use adapter::{
    AdaptContext, AdapterRegistry, JsonAdapter, OutputAdapter, TextAdapter, YamlAdapter,
};
pub use compiler::{Compilation, CompileOptions, Compiler};
pub use config::CompilerConfig;
pub use context::{DocumentMode, ProcessingContext};
pub use error::{
    AdapterError, CompileError, ErrorCode, ProcessingError, ReferenceError, Result, Severity,
    SyntaxError, TransformError, ValidationError,
};
pub use node::{Content, Document, Element, Node, NodeKind, Reference, Resolved, SourcePosition};
pub use parser::{parse, MarkupParser, XmlParser};
pub use pipeline::{ProcessOutput, Processor};
pub use protocol::{ProtocolHandler, ProtocolRegistry};
pub use resolver::ReferenceResolver;
pub use tags::{ContentModel, TagDefinition, TagRegistry, ValidationResult, Validator};
pub use transform::{MappingRule, RuleSet, Selector, Transform, TransformContext, Transformer};
pub use types::Value;
pub use uri::ReferenceUri;
pub use visitor::{Visit, Visitor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
