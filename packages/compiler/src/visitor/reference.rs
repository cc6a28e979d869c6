use std::sync::Arc;

use async_trait::async_trait;

use super::{Visit, Visitor};
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::{Content, Document, Element, Node, Reference, Resolved};
use crate::resolver::ReferenceResolver;

/// Resolves every `Reference` node in the document.
///
/// References are resolved when their parent is visited, so siblings can
/// be fetched concurrently. With substitution enabled, each resolved
/// reference is then replaced by its content.
#[derive(Debug, Clone)]
pub struct ReferenceVisitor {
    resolver: Arc<ReferenceResolver>,
    concurrent: bool,
    substitute: bool,
}

impl ReferenceVisitor {
    pub fn new(resolver: Arc<ReferenceResolver>) -> Self {
        Self {
            resolver,
            concurrent: true,
            substitute: false,
        }
    }

    /// Resolve sibling references concurrently (default) or one by one.
    pub fn with_concurrency(mut self, concurrent: bool) -> Self {
        self.concurrent = concurrent;
        self
    }

    /// Replace resolved references by their content.
    pub fn with_substitution(mut self, substitute: bool) -> Self {
        self.substitute = substitute;
        self
    }

    async fn resolve_children(
        &self,
        nodes: &mut [Node],
        ctx: &mut ProcessingContext,
    ) -> Result<(), ProcessingError> {
        let references: Vec<&mut Reference> = nodes
            .iter_mut()
            .filter_map(|node| match node {
                Node::Reference(reference) if !reference.is_resolved() => Some(reference),
                _ => None,
            })
            .collect();
        if references.is_empty() {
            return Ok(());
        }

        let positions: Vec<_> = references.iter().map(|r| r.position).collect();
        let results = if self.concurrent {
            self.resolver.resolve_all(references, ctx).await
        } else {
            let mut results = Vec::with_capacity(references.len());
            for reference in references {
                results.push(self.resolver.resolve(reference, ctx).await);
            }
            results
        };

        for (result, position) in results.into_iter().zip(positions) {
            if let Err(err) = result {
                ctx.report(ProcessingError::from(err).with_position(position))?;
            }
        }
        Ok(())
    }
}

/// Nodes that take the place of a resolved reference.
fn substitution(reference: &Reference) -> Option<Vec<Node>> {
    let text = |value: String| {
        vec![Node::Content(
            Content::new(value).with_position(reference.position),
        )]
    };
    let nodes = match reference.resolved()? {
        Resolved::Element(element) => vec![Node::Element(element.clone())],
        Resolved::Document(document) => document.children.clone(),
        Resolved::Text(value) => text(value.clone()),
        Resolved::Data(value) => text(value.to_text()),
    };
    Some(nodes)
}

#[async_trait]
impl Visitor for ReferenceVisitor {
    fn name(&self) -> &str {
        "references"
    }

    async fn visit_document(
        &self,
        document: &mut Document,
        ctx: &mut ProcessingContext,
    ) -> Result<(), ProcessingError> {
        self.resolve_children(&mut document.children, ctx).await
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        self.resolve_children(&mut element.children, ctx).await?;
        Ok(Visit::Keep)
    }

    async fn visit_reference(
        &self,
        reference: &mut Reference,
        _ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        if !self.substitute {
            return Ok(Visit::Keep);
        }
        Ok(substitution(reference).map_or(Visit::Keep, Visit::Replace))
    }
}
