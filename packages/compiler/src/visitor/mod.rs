//! Tree visitors run by the processing pipeline.
//!
//! A [`Visitor`] receives each node of the document in pre-order. Any hook
//! may replace the node it was given; children of an element are visited
//! after the element itself, with the element pushed onto the context's
//! ancestor stack. Errors returned by a hook go through
//! [`ProcessingContext::report`], so the document mode decides whether the
//! walk continues.

mod attributes;
mod content;
mod id_index;
mod inheritance;
mod metadata;
mod reference;

pub use attributes::AttributeValidationVisitor;
pub use content::{normalize_content, ContentVisitor};
pub use id_index::IdIndexVisitor;
pub use inheritance::InheritanceVisitor;
pub use metadata::MetadataVisitor;
pub use reference::ReferenceVisitor;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::{AncestorFrame, ProcessingContext};
use crate::error::ProcessingError;
use crate::node::{Content, Document, Element, Node, NodePath, Reference};

/// Outcome of visiting a node.
#[derive(Debug, Clone, PartialEq)]
pub enum Visit {
    /// Keep the (possibly mutated) node.
    Keep,
    /// Replace the node with zero or more nodes. Replacements are not
    /// visited by the same visitor.
    Replace(Vec<Node>),
}

impl Visit {
    pub fn replace(node: impl Into<Node>) -> Self {
        Visit::Replace(vec![node.into()])
    }

    pub fn remove() -> Self {
        Visit::Replace(Vec::new())
    }
}

/// One pass over the document. All hooks are optional.
#[async_trait]
pub trait Visitor: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Whether the walker visits the nodes below the document at all.
    fn descends(&self) -> bool {
        true
    }

    async fn visit_document(
        &self,
        _document: &mut Document,
        _ctx: &mut ProcessingContext,
    ) -> Result<(), ProcessingError> {
        Ok(())
    }

    async fn visit_element(
        &self,
        _element: &mut Element,
        _ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        Ok(Visit::Keep)
    }

    async fn visit_content(
        &self,
        _content: &mut Content,
        _ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        Ok(Visit::Keep)
    }

    async fn visit_reference(
        &self,
        _reference: &mut Reference,
        _ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        Ok(Visit::Keep)
    }
}

/// Run `visitor` over `document`.
///
/// # Errors
/// Returns the diagnostic that aborted the walk (fatal, or an error in
/// strict mode). Tolerated diagnostics are recorded in `ctx`.
pub async fn walk(
    visitor: &dyn Visitor,
    document: &mut Document,
    ctx: &mut ProcessingContext,
) -> Result<(), ProcessingError> {
    ctx.set_current_path(Vec::new());
    if let Err(err) = visitor.visit_document(document, ctx).await {
        ctx.report(err.with_position(document.position))?;
    }
    if visitor.descends() {
        walk_nodes(visitor, &mut document.children, Vec::new(), ctx).await?;
    }
    Ok(())
}

fn walk_nodes<'a>(
    visitor: &'a dyn Visitor,
    nodes: &'a mut Vec<Node>,
    parent_path: NodePath,
    ctx: &'a mut ProcessingContext,
) -> BoxFuture<'a, Result<(), ProcessingError>> {
    Box::pin(async move {
        let mut index = 0;
        while index < nodes.len() {
            let mut path = parent_path.clone();
            path.push(index);
            ctx.set_current_path(path.clone());

            let position = nodes[index].position();
            let outcome = match &mut nodes[index] {
                Node::Element(element) => visitor.visit_element(element, ctx).await,
                Node::Content(content) => visitor.visit_content(content, ctx).await,
                Node::Reference(reference) => visitor.visit_reference(reference, ctx).await,
            };
            let visit = match outcome {
                Ok(visit) => visit,
                Err(err) => {
                    let err = if err.position.is_none() {
                        err.with_position(position)
                    } else {
                        err
                    };
                    ctx.report(err)?;
                    Visit::Keep
                }
            };

            if let Visit::Replace(replacement) = visit {
                let count = replacement.len();
                nodes.splice(index..=index, replacement);
                index += count;
                continue;
            }

            if let Node::Element(element) = &mut nodes[index] {
                ctx.push_parent(AncestorFrame::new(element, path.clone()));
                let result = walk_nodes(visitor, &mut element.children, path, ctx).await;
                ctx.pop_parent();
                result?;
            }
            index += 1;
        }
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::parser::parse;
    use std::sync::Mutex;

    /// Records the tag and ancestor depth of every element it sees.
    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<(String, usize, Vec<usize>)>>,
    }

    #[async_trait]
    impl Visitor for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        async fn visit_element(
            &self,
            element: &mut Element,
            ctx: &mut ProcessingContext,
        ) -> Result<Visit, ProcessingError> {
            self.seen.lock().unwrap().push((
                element.tag_name.clone(),
                ctx.parent_elements().len(),
                ctx.current_path().to_vec(),
            ));
            Ok(Visit::Keep)
        }
    }

    struct DropComments;

    #[async_trait]
    impl Visitor for DropComments {
        fn name(&self) -> &str {
            "drop-comments"
        }

        async fn visit_element(
            &self,
            element: &mut Element,
            _ctx: &mut ProcessingContext,
        ) -> Result<Visit, ProcessingError> {
            if element.tag_name == "comment" {
                return Ok(Visit::remove());
            }
            Ok(Visit::Keep)
        }
    }

    struct Failing(crate::error::Severity);

    #[async_trait]
    impl Visitor for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn visit_content(
            &self,
            _content: &mut Content,
            _ctx: &mut ProcessingContext,
        ) -> Result<Visit, ProcessingError> {
            Err(ProcessingError::new(self.0, ErrorCode::Visitor, "bad content"))
        }
    }

    #[tokio::test]
    async fn test_walk_is_pre_order_with_ancestors() {
        let mut doc = parse("<a><b><c/></b><d/></a>").unwrap();
        let mut ctx = ProcessingContext::new(&doc);
        let recorder = Recorder::default();

        walk(&recorder, &mut doc, &mut ctx).await.unwrap();

        let seen = recorder.seen.lock().unwrap().clone();
        assert_eq!(
            seen,
            vec![
                ("a".to_string(), 0, vec![0]),
                ("b".to_string(), 1, vec![0, 0]),
                ("c".to_string(), 2, vec![0, 0, 0]),
                ("d".to_string(), 1, vec![0, 1]),
            ]
        );
        assert!(ctx.parent_elements().is_empty());
    }

    #[tokio::test]
    async fn test_replacement_removes_nodes() {
        let mut doc = parse("<a><comment/><b/><comment>x</comment></a>").unwrap();
        let mut ctx = ProcessingContext::new(&doc);

        walk(&DropComments, &mut doc, &mut ctx).await.unwrap();

        let root = doc.root_element().unwrap();
        let tags: Vec<_> = root.element_children().map(|e| e.tag_name.as_str()).collect();
        assert_eq!(tags, vec!["b"]);
    }

    #[tokio::test]
    async fn test_errors_follow_document_mode() {
        let mut loose = parse("<a>text</a>").unwrap();
        let mut ctx = ProcessingContext::new(&loose);
        walk(&Failing(crate::error::Severity::Error), &mut loose, &mut ctx)
            .await
            .unwrap();
        assert_eq!(ctx.warnings().count(), 1);
        assert!(ctx.diagnostics()[0].position.is_some());

        let mut strict = parse(r#"<a mode="strict">text</a>"#).unwrap();
        let mut ctx = ProcessingContext::new(&strict);
        let err = walk(&Failing(crate::error::Severity::Error), &mut strict, &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Visitor);

        let mut fatal = parse("<a>text</a>").unwrap();
        let mut ctx = ProcessingContext::new(&fatal);
        assert!(walk(&Failing(crate::error::Severity::Fatal), &mut fatal, &mut ctx)
            .await
            .is_err());
    }
}
