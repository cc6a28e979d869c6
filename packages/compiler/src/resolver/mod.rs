//! Reference resolution.
//!
//! The resolver turns `Reference` nodes and `extends` URIs into values by
//! dispatching to protocol handlers. Results and failures are memoized in
//! the shared [`ResolutionState`]; each key is fetched at most once per
//! compilation.
//!
//! A resolved element or document is expanded while its key is still on the
//! in-flight stack: its own `extends` is merged and its nested references are
//! resolved. A chain that comes back to a key already on the stack fails with
//! `CircularReference` before any handler is invoked for it.

pub mod inflight;
mod merge;

pub use inflight::{ResolutionState, TaskId};
pub use merge::merge_inherited;

use std::sync::Arc;
use std::time::Duration;

use futures::future::{join_all, BoxFuture};

use crate::config::{CompilerConfig, MAX_RESOLUTION_DEPTH};
use crate::context::ProcessingContext;
use crate::error::{ProcessingError, ReferenceError};
use crate::node::{Element, Node, Reference, Resolved, SourcePosition};
use crate::protocol::ProtocolRegistry;
use crate::tags::TagRegistry;
use crate::uri::ReferenceUri;
use inflight::Acquired;

/// Resolves references and inheritance targets against a processing context.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    protocols: Arc<ProtocolRegistry>,
    tags: Arc<TagRegistry>,
    timeout: Duration,
    max_depth: usize,
}

impl ReferenceResolver {
    pub fn new(protocols: Arc<ProtocolRegistry>, tags: Arc<TagRegistry>) -> Self {
        Self {
            protocols,
            tags,
            timeout: CompilerConfig::default().resolve_timeout,
            max_depth: MAX_RESOLUTION_DEPTH,
        }
    }

    pub fn from_config(
        protocols: Arc<ProtocolRegistry>,
        tags: Arc<TagRegistry>,
        config: &CompilerConfig,
    ) -> Self {
        Self::new(protocols, tags)
            .with_timeout(config.resolve_timeout)
            .with_max_depth(config.max_resolution_depth)
    }

    /// Upper bound for a single resolution, including waiting for another
    /// task that is already fetching the same key.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn protocols(&self) -> &ProtocolRegistry {
        &self.protocols
    }

    pub fn tags(&self) -> &TagRegistry {
        &self.tags
    }

    /// Resolve `reference` in place. Already resolved references are left
    /// untouched.
    ///
    /// # Errors
    /// Any [`ReferenceError`] from the handler, the cycle guard or the timeout.
    pub async fn resolve(
        &self,
        reference: &mut Reference,
        ctx: &mut ProcessingContext,
    ) -> Result<(), ReferenceError> {
        if reference.is_resolved() {
            return Ok(());
        }
        let value = self.resolve_uri(&reference.uri(), ctx).await?;
        reference.set_resolved(value);
        Ok(())
    }

    /// Resolve sibling references concurrently, each on a forked context.
    ///
    /// Results are returned in input order. Diagnostics recorded by the
    /// forks are moved back into `ctx`.
    pub async fn resolve_all(
        &self,
        references: Vec<&mut Reference>,
        ctx: &mut ProcessingContext,
    ) -> Vec<Result<(), ReferenceError>> {
        if references.len() < 2 {
            let mut results = Vec::with_capacity(references.len());
            for reference in references {
                results.push(self.resolve(reference, ctx).await);
            }
            return results;
        }

        let mut forks: Vec<ProcessingContext> = references.iter().map(|_| ctx.fork()).collect();
        let results = join_all(
            references
                .into_iter()
                .zip(forks.iter_mut())
                .map(|(reference, fork)| self.resolve(reference, fork)),
        )
        .await;
        for fork in forks {
            ctx.absorb(fork);
        }
        results
    }

    /// Resolve a textual URI such as `id:intro` or `https://host/a.json`.
    ///
    /// # Errors
    /// `InvalidUri` for malformed input, otherwise as [`Self::resolve_uri`].
    pub async fn resolve_str(
        &self,
        uri: &str,
        ctx: &mut ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        let uri = ReferenceUri::parse(uri)?;
        self.resolve_uri(&uri, ctx).await
    }

    /// Resolve `uri`, consulting and filling the shared cache.
    ///
    /// A key whose fetch failed keeps failing with the same error for the
    /// rest of the compilation.
    pub fn resolve_uri<'a>(
        &'a self,
        uri: &'a ReferenceUri,
        ctx: &'a mut ProcessingContext,
    ) -> BoxFuture<'a, Result<Resolved, ReferenceError>> {
        Box::pin(async move {
            let key = uri.key();
            if let Some(hit) = ctx.cached(&key) {
                tracing::debug!(uri = %key, "Reference cache hit");
                return Ok(hit);
            }

            let stack = ctx.resolution_stack();
            if let Some(start) = stack.iter().position(|k| *k == key) {
                let mut cycle = stack[start..].to_vec();
                cycle.push(key);
                tracing::warn!(cycle = %cycle.join(" -> "), "Circular reference detected");
                return Err(ReferenceError::CircularReference { cycle });
            }
            if stack.len() >= self.max_depth {
                return Err(ReferenceError::DepthExceeded {
                    uri: key,
                    limit: self.max_depth,
                });
            }

            let state = Arc::clone(ctx.resolution_state());
            let guard = match state
                .acquire(&key, ctx.task_id(), ctx.resolution_stack(), self.timeout)
                .await?
            {
                Acquired::Cached(value) => return Ok(value),
                Acquired::Owned(guard) => guard,
            };

            ctx.enter(key.clone());
            let result = self.fetch(uri, &key, ctx).await;
            ctx.leave(&key);

            match result {
                Ok(value) => {
                    state.store(&key, value.clone());
                    drop(guard);
                    Ok(value)
                }
                Err(err) => {
                    state.store_failure(&key, &err);
                    drop(guard);
                    Err(err)
                }
            }
        })
    }

    /// Merge the ancestor named by `element`'s `extends` attribute into it.
    ///
    /// Returns `false` when the element has no `extends`.
    ///
    /// # Errors
    /// Resolution errors for the ancestor URI, or `InvalidTarget` when it
    /// does not resolve to an element.
    pub async fn inherit(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<bool, ReferenceError> {
        let Some(target) = element.extends().map(str::to_string) else {
            return Ok(false);
        };
        let ancestor = self.resolve_ancestor(&target, ctx).await?;
        tracing::debug!(
            tag = %element.tag_name,
            extends = %target,
            "Merging inherited element"
        );
        merge_inherited(element, ancestor, &self.tags, ctx);
        Ok(true)
    }

    async fn resolve_ancestor(
        &self,
        target: &str,
        ctx: &mut ProcessingContext,
    ) -> Result<Element, ReferenceError> {
        let uri = ReferenceUri::parse(target)?;
        let invalid = |found: &'static str| ReferenceError::InvalidTarget {
            uri: uri.key(),
            expected: "element",
            found,
        };
        match self.resolve_uri(&uri, ctx).await? {
            Resolved::Element(element) => Ok(element),
            Resolved::Document(document) => document
                .root_element()
                .cloned()
                .ok_or_else(|| invalid("document")),
            other => Err(invalid(other.kind())),
        }
    }

    /// Invoke the handler for `uri` and expand its result.
    async fn fetch(
        &self,
        uri: &ReferenceUri,
        key: &str,
        ctx: &mut ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        let handler = self.protocols.handler_for(uri.protocol()).ok_or_else(|| {
            ReferenceError::UnsupportedProtocol {
                protocol: uri.protocol().to_string(),
                uri: key.to_string(),
            }
        })?;

        tracing::debug!(
            uri = %key,
            handler = handler.name(),
            depth = ctx.resolution_stack().len(),
            "Resolving reference"
        );
        ctx.resolution_state().record_fetch();

        let resolved = tokio::time::timeout(self.timeout, handler.handle(uri, ctx))
            .await
            .map_err(|_| ReferenceError::Timeout {
                uri: key.to_string(),
                timeout: self.timeout,
            })??;

        self.expand(resolved, ctx).await
    }

    async fn expand(
        &self,
        resolved: Resolved,
        ctx: &mut ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        match resolved {
            Resolved::Element(mut element) => {
                self.expand_element(&mut element, ctx).await?;
                Ok(Resolved::Element(element))
            }
            Resolved::Document(mut document) => {
                self.expand_nodes(&mut document.children, ctx).await?;
                Ok(Resolved::Document(document))
            }
            other => Ok(other),
        }
    }

    async fn expand_element(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<(), ReferenceError> {
        if element.extends().is_some() {
            if let Err(err) = self.inherit(element, ctx).await {
                tolerate(err, element.position, ctx)?;
            }
        }
        self.expand_nodes(&mut element.children, ctx).await
    }

    fn expand_nodes<'a>(
        &'a self,
        nodes: &'a mut [Node],
        ctx: &'a mut ProcessingContext,
    ) -> BoxFuture<'a, Result<(), ReferenceError>> {
        Box::pin(async move {
            for node in nodes.iter_mut() {
                match node {
                    Node::Element(element) => self.expand_element(element, ctx).await?,
                    Node::Reference(reference) => {
                        if let Err(err) = self.resolve(reference, ctx).await {
                            let position = reference.position;
                            tolerate(err, position, ctx)?;
                        }
                    }
                    Node::Content(_) => {}
                }
            }
            Ok(())
        })
    }
}

/// Apply the mode policy to a failure inside expanded content.
///
/// The failure propagates when it is fatal or the document is strict;
/// otherwise it is recorded as a warning and the node stays unresolved.
fn tolerate(
    err: ReferenceError,
    position: SourcePosition,
    ctx: &mut ProcessingContext,
) -> Result<(), ReferenceError> {
    let diagnostic = ProcessingError::from(err.clone()).with_position(position);
    match ctx.report(diagnostic) {
        Ok(()) => Ok(()),
        Err(_) => Err(err),
    }
}
