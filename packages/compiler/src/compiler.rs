//! One-call compilation: parse, validate, process, transform and adapt.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapter::{AdaptContext, AdapterRegistry};
use crate::config::CompilerConfig;
use crate::context::ProcessingContext;
use crate::error::{AdapterError, ProcessingError, Result, Severity, TransformError};
use crate::node::Document;
use crate::parser::{MarkupParser, XmlParser};
use crate::pipeline::Processor;
use crate::protocol::ProtocolRegistry;
use crate::tags::{TagRegistry, ValidationResult, Validator};
use crate::transform::Transformer;
use crate::types::Value;

/// Per-call inputs of [`Compiler::compile`].
#[derive(Debug, Clone, Default)]
pub struct CompileOptions {
    pub variables: BTreeMap<String, Value>,
    pub transformer: Option<Transformer>,
    /// Output format; the configured default when unset.
    pub format: Option<String>,
    /// Source path, used for relative `file:` references and diagnostics.
    pub file_path: Option<PathBuf>,
    pub pretty: bool,
}

impl CompileOptions {
    pub fn new() -> Self {
        Self {
            pretty: true,
            ..Self::default()
        }
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.variables.insert(name.into(), value.into());
        self
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformer = Some(transformer);
        self
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }
}

/// Everything a compilation produced.
#[derive(Debug)]
pub struct Compilation {
    /// The processed document (partially processed if aborted).
    pub document: Document,
    /// Transformer output; `Null` when processing was aborted.
    pub output: Value,
    /// Adapted output; `None` when processing was aborted.
    pub rendered: Option<String>,
    pub format: String,
    pub diagnostics: Vec<ProcessingError>,
    pub transform_errors: Vec<TransformError>,
    /// The diagnostic that stopped processing, if any.
    pub aborted: Option<ProcessingError>,
}

impl Compilation {
    /// No abort and no transform errors. Warnings are allowed.
    pub fn is_success(&self) -> bool {
        self.aborted.is_none() && self.transform_errors.is_empty()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ProcessingError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }
}

/// Compiler facade owning the registries and configuration.
///
/// Registries are populated before the first compilation and shared
/// read-only afterwards; compilations do not share any mutable state.
#[derive(Clone)]
pub struct Compiler {
    config: CompilerConfig,
    parser: Arc<dyn MarkupParser>,
    tags: Arc<TagRegistry>,
    protocols: Arc<ProtocolRegistry>,
    adapters: Arc<AdapterRegistry>,
}

impl std::fmt::Debug for Compiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Compiler")
            .field("config", &self.config)
            .field("tags", &self.tags)
            .field("protocols", &self.protocols)
            .field("adapters", &self.adapters)
            .finish_non_exhaustive()
    }
}

impl Compiler {
    /// A compiler with the built-in protocol handlers and output adapters.
    ///
    /// # Errors
    /// Fails if the HTTP client cannot be created.
    pub fn new(config: CompilerConfig) -> Result<Self> {
        let protocols = ProtocolRegistry::with_defaults(&config)?;
        let adapters = AdapterRegistry::with_defaults()
            .with_default_format(config.default_format.clone())
            .with_strict(config.strict_formats);
        Ok(Self {
            tags: Arc::new(TagRegistry::new().with_strict(config.strict_tags)),
            parser: Arc::new(XmlParser::default()),
            protocols: Arc::new(protocols),
            adapters: Arc::new(adapters),
            config,
        })
    }

    pub fn with_tags(mut self, tags: TagRegistry) -> Self {
        self.tags = Arc::new(tags);
        self
    }

    pub fn with_protocols(mut self, protocols: ProtocolRegistry) -> Self {
        self.protocols = Arc::new(protocols);
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = Arc::new(adapters);
        self
    }

    pub fn with_parser(mut self, parser: impl MarkupParser + 'static) -> Self {
        self.parser = Arc::new(parser);
        self
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    pub fn adapters(&self) -> &AdapterRegistry {
        &self.adapters
    }

    /// # Errors
    /// `CompileError::Syntax` for malformed markup.
    pub fn parse(&self, source: &str) -> Result<Document> {
        Ok(self.parser.parse(source)?)
    }

    /// Full validation (a)-(e) plus id uniqueness, without processing.
    pub fn validate(&self, document: &Document) -> ValidationResult {
        let validator = Validator::new(&self.tags);
        let mut result = validator.validate_document(document);
        if let Err(duplicates) = Validator::validate_id_uniqueness(document) {
            result.errors.push(duplicates);
        }
        result
    }

    pub fn processor(&self) -> Processor {
        Processor::from_config(
            Arc::clone(&self.tags),
            Arc::clone(&self.protocols),
            &self.config,
        )
    }

    /// Compile markup text.
    ///
    /// Diagnostics and aborts are reported in the returned [`Compilation`].
    ///
    /// # Errors
    /// Syntax errors, and unknown output formats.
    pub async fn compile(&self, source: &str, options: &CompileOptions) -> Result<Compilation> {
        let document = self.parse(source)?;
        self.compile_document(document, options).await
    }

    /// Read and compile a file. Relative `file:` references resolve against
    /// its directory.
    ///
    /// # Errors
    /// IO errors, plus everything [`Self::compile`] returns.
    pub async fn compile_file(
        &self,
        path: impl AsRef<Path>,
        options: &CompileOptions,
    ) -> Result<Compilation> {
        let path = path.as_ref();
        let source = tokio::fs::read_to_string(path).await?;
        let options = match options.file_path {
            Some(_) => options.clone(),
            None => options.clone().with_file_path(path),
        };
        self.compile(&source, &options).await
    }

    /// Compile an already parsed document.
    ///
    /// # Errors
    /// `CompileError::Adapter` for unknown output formats.
    pub async fn compile_document(
        &self,
        document: Document,
        options: &CompileOptions,
    ) -> Result<Compilation> {
        let format = options
            .format
            .clone()
            .unwrap_or_else(|| self.config.default_format.clone());
        let adapter = self
            .adapters
            .get_adapter(&format)
            .ok_or_else(|| AdapterError::NotFound(format.clone()))?;

        let mut ctx = ProcessingContext::new(&document).with_variables(options.variables.clone());
        if let Some(path) = &options.file_path {
            ctx = ctx.with_file_path(path.clone());
        }

        let processed = self.processor().process_with(document, ctx).await;
        let diagnostics = processed.diagnostics().to_vec();
        if let Some(aborted) = processed.aborted {
            return Ok(Compilation {
                document: processed.document,
                output: Value::Null,
                rendered: None,
                format,
                diagnostics,
                transform_errors: Vec::new(),
                aborted: Some(aborted),
            });
        }

        let (output, transform_errors) = match &options.transformer {
            Some(transformer) => {
                let result = transformer.transform(&processed.document, &processed.context);
                let errors = result.errors().to_vec();
                (result.value, errors)
            }
            None => (processed.document.to_value(), Vec::new()),
        };

        let adapt_ctx = AdaptContext {
            pretty: options.pretty,
            ..AdaptContext::default()
        };
        let rendered = adapter.adapt(&output, &adapt_ctx);

        Ok(Compilation {
            document: processed.document,
            output,
            rendered: Some(rendered),
            format,
            diagnostics,
            transform_errors,
            aborted: None,
        })
    }
}
