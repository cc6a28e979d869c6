//! The processing pipeline: structural validation followed by an ordered
//! list of visitors.

use std::sync::Arc;

use crate::config::CompilerConfig;
use crate::context::ProcessingContext;
use crate::error::{CompileError, ErrorCode, ProcessingError};
use crate::node::Document;
use crate::protocol::ProtocolRegistry;
use crate::resolver::ReferenceResolver;
use crate::tags::{TagRegistry, Validator};
use crate::visitor::{
    walk, AttributeValidationVisitor, ContentVisitor, IdIndexVisitor, InheritanceVisitor,
    MetadataVisitor, ReferenceVisitor, Visitor,
};

/// Result of a pipeline run.
///
/// The document is returned even when processing stopped early, together
/// with every diagnostic collected up to that point.
#[derive(Debug)]
pub struct ProcessOutput {
    pub document: Document,
    pub context: ProcessingContext,
    /// The diagnostic that stopped the pipeline, if any.
    pub aborted: Option<ProcessingError>,
}

impl ProcessOutput {
    /// True when every visitor ran.
    pub fn is_complete(&self) -> bool {
        self.aborted.is_none()
    }

    pub fn diagnostics(&self) -> &[ProcessingError] {
        self.context.diagnostics()
    }

    /// The processed document and its context, or the aborting diagnostic.
    ///
    /// # Errors
    /// `CompileError::Aborted` when the pipeline did not complete.
    pub fn into_result(self) -> crate::error::Result<(Document, ProcessingContext)> {
        match self.aborted {
            Some(err) => Err(CompileError::Aborted(err)),
            None => Ok((self.document, self.context)),
        }
    }
}

/// Runs validation and the visitor chain over a document.
#[derive(Clone)]
pub struct Processor {
    tags: Arc<TagRegistry>,
    visitors: Vec<Arc<dyn Visitor>>,
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("tags", &self.tags.len())
            .field("visitors", &self.visitor_names())
            .finish()
    }
}

impl Processor {
    /// A processor with the standard visitor order: id indexing,
    /// inheritance, references, metadata, content, attribute validation.
    pub fn new(tags: Arc<TagRegistry>, resolver: Arc<ReferenceResolver>) -> Self {
        let visitors: Vec<Arc<dyn Visitor>> = vec![
            Arc::new(IdIndexVisitor),
            Arc::new(InheritanceVisitor::new(Arc::clone(&resolver))),
            Arc::new(ReferenceVisitor::new(resolver)),
            Arc::new(MetadataVisitor),
            Arc::new(ContentVisitor),
            Arc::new(AttributeValidationVisitor::new(Arc::clone(&tags))),
        ];
        Self { tags, visitors }
    }

    pub fn from_config(
        tags: Arc<TagRegistry>,
        protocols: Arc<ProtocolRegistry>,
        config: &CompilerConfig,
    ) -> Self {
        let resolver = Arc::new(ReferenceResolver::from_config(
            protocols,
            Arc::clone(&tags),
            config,
        ));
        let mut processor = Self::new(tags, Arc::clone(&resolver));
        processor.replace_visitor(
            "references",
            Arc::new(
                ReferenceVisitor::new(resolver).with_concurrency(config.concurrent_references),
            ),
        );
        processor
    }

    /// A processor with no visitors; only structural validation runs.
    pub fn empty(tags: Arc<TagRegistry>) -> Self {
        Self {
            tags,
            visitors: Vec::new(),
        }
    }

    pub fn with_visitor(mut self, visitor: Arc<dyn Visitor>) -> Self {
        self.visitors.push(visitor);
        self
    }

    /// Insert `visitor` at `index` (clamped to the end).
    pub fn insert_visitor(&mut self, index: usize, visitor: Arc<dyn Visitor>) {
        let index = index.min(self.visitors.len());
        self.visitors.insert(index, visitor);
    }

    /// Replace the visitor called `name`. Returns `false` if there is none.
    pub fn replace_visitor(&mut self, name: &str, visitor: Arc<dyn Visitor>) -> bool {
        match self.visitors.iter().position(|v| v.name() == name) {
            Some(index) => {
                self.visitors[index] = visitor;
                true
            }
            None => false,
        }
    }

    pub fn remove_visitor(&mut self, name: &str) -> bool {
        let before = self.visitors.len();
        self.visitors.retain(|v| v.name() != name);
        self.visitors.len() != before
    }

    pub fn visitor_names(&self) -> Vec<&str> {
        self.visitors.iter().map(|v| v.name()).collect()
    }

    /// Process `document` with a fresh context.
    pub async fn process(&self, document: Document) -> ProcessOutput {
        let ctx = ProcessingContext::new(&document);
        self.process_with(document, ctx).await
    }

    /// Process `document` with a caller-prepared context (variables, file
    /// path, mode override).
    pub async fn process_with(
        &self,
        mut document: Document,
        mut ctx: ProcessingContext,
    ) -> ProcessOutput {
        let mut aborted = self.validate(&document, &mut ctx).err();

        if aborted.is_none() {
            for visitor in &self.visitors {
                tracing::debug!(visitor = visitor.name(), "Running visitor");
                if let Err(err) = walk(visitor.as_ref(), &mut document, &mut ctx).await {
                    tracing::warn!(
                        visitor = visitor.name(),
                        code = %err.code,
                        "Processing aborted: {}",
                        err.message
                    );
                    aborted = Some(err);
                    break;
                }
            }
        }

        tracing::info!(
            mode = ?ctx.mode(),
            references = ctx.resolution_state().len(),
            fetches = ctx.resolution_state().fetch_count(),
            diagnostics = ctx.diagnostics().len(),
            complete = aborted.is_none(),
            "Processed document"
        );

        ProcessOutput {
            document,
            context: ctx,
            aborted,
        }
    }

    /// Structural checks and id uniqueness, run before any visitor.
    /// Attribute checks run later, after inheritance.
    fn validate(
        &self,
        document: &Document,
        ctx: &mut ProcessingContext,
    ) -> Result<(), ProcessingError> {
        let result = Validator::new(&self.tags).validate_structure(document);
        for warning in result.warnings {
            ctx.warn(ErrorCode::UnknownTag, warning);
        }
        for error in result.errors {
            ctx.report(ProcessingError::from(error))?;
        }
        if let Err(error) = Validator::validate_id_uniqueness(document) {
            ctx.report(ProcessingError::from(error))?;
        }
        Ok(())
    }
}
