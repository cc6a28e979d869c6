//! Per-compilation processing state shared by the visitors.
//!
//! One [`ProcessingContext`] is created for each document run through the
//! pipeline and discarded after transformation. It holds:
//!
//! - the id index (ids mapped to paths into a snapshot of the document)
//! - the shared resolution cache and in-flight bookkeeping
//! - caller-supplied variables
//! - the ancestor stack maintained by the walker
//! - the document mode and every diagnostic collected so far
//!
//! Concurrent sibling resolution works on [`ProcessingContext::fork`]ed
//! copies that share the cache but keep their own in-flight stack. Forks are
//! merged back with [`ProcessingContext::absorb`].

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ErrorCode, ProcessingError, Severity};
use crate::node::{Document, Element, Node, NodePath, Resolved};
use crate::resolver::inflight::{ForkLink, ResolutionState, TaskId};
use crate::types::Value;

/// How `error`-severity diagnostics are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentMode {
    /// Errors abort the pipeline
    Strict,
    /// Errors degrade to warnings and the offending node is left as is
    #[default]
    Loose,
}

impl DocumentMode {
    /// Read the mode from the root element's `mode` attribute.
    pub fn from_document(document: &Document) -> Self {
        let Some(mode) = document.root_element().and_then(|root| root.attribute("mode")) else {
            return Self::default();
        };
        match mode.trim().to_ascii_lowercase().as_str() {
            "strict" => DocumentMode::Strict,
            "loose" => DocumentMode::Loose,
            other => {
                tracing::warn!(mode = %other, "Unknown document mode, using loose");
                DocumentMode::Loose
            }
        }
    }
}

/// One entry of the ancestor stack. Non-owning: the element itself stays
/// in the document and is reachable through `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorFrame {
    pub tag_name: String,
    pub id: Option<String>,
    pub path: NodePath,
}

impl AncestorFrame {
    pub fn new(element: &Element, path: NodePath) -> Self {
        Self {
            tag_name: element.tag_name.clone(),
            id: element.id().map(str::to_string),
            path,
        }
    }
}

/// Index of element ids, built once before any resolution.
///
/// Maps each id to a path into a snapshot of the document taken at indexing
/// time, so lookups never borrow the live tree being mutated. The first
/// occurrence of a repeated id wins.
#[derive(Debug, Clone, Default)]
pub struct IdIndex {
    source: Document,
    ids: HashMap<String, NodePath>,
}

impl IdIndex {
    pub fn build(document: &Document) -> Self {
        let mut ids = HashMap::new();
        let mut path = Vec::new();
        for (index, child) in document.children.iter().enumerate() {
            path.push(index);
            collect_ids(child, &mut path, &mut ids);
            path.pop();
        }
        Self {
            source: document.clone(),
            ids,
        }
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.ids
            .get(id)
            .and_then(|path| self.source.element_at(path))
    }

    pub fn path_of(&self, id: &str) -> Option<&NodePath> {
        self.ids.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains_key(id)
    }

    /// All indexed ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.ids.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

fn collect_ids(node: &Node, path: &mut NodePath, ids: &mut HashMap<String, NodePath>) {
    let Node::Element(element) = node else {
        return;
    };
    if let Some(id) = element.id() {
        ids.entry(id.to_string()).or_insert_with(|| path.clone());
    }
    for (index, child) in element.children.iter().enumerate() {
        path.push(index);
        collect_ids(child, path, ids);
        path.pop();
    }
}

/// Mutable state of one pipeline run.
#[derive(Debug)]
pub struct ProcessingContext {
    ids: Arc<IdIndex>,
    state: Arc<ResolutionState>,
    variables: Arc<BTreeMap<String, Value>>,
    parent_elements: Vec<AncestorFrame>,
    /// Path of the node the walker is currently visiting
    current_path: NodePath,
    mode: DocumentMode,
    file_path: Option<PathBuf>,
    diagnostics: Vec<ProcessingError>,
    /// Keys currently being resolved by this task, outermost first
    resolving: Vec<String>,
    task: TaskId,
    _fork: Option<ForkLink>,
}

impl ProcessingContext {
    /// Create the context for `document`. The mode comes from its root element.
    pub fn new(document: &Document) -> Self {
        Self {
            ids: Arc::new(IdIndex::default()),
            state: Arc::new(ResolutionState::new()),
            variables: Arc::new(BTreeMap::new()),
            parent_elements: Vec::new(),
            current_path: Vec::new(),
            mode: DocumentMode::from_document(document),
            file_path: None,
            diagnostics: Vec::new(),
            resolving: Vec::new(),
            task: 0,
            _fork: None,
        }
    }

    pub fn with_variables(mut self, variables: BTreeMap<String, Value>) -> Self {
        self.variables = Arc::new(variables);
        self
    }

    pub fn with_variable(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        Arc::make_mut(&mut self.variables).insert(name.into(), value.into());
        self
    }

    /// Path of the source file. Relative `file:` references resolve against
    /// its directory.
    pub fn with_file_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_mode(mut self, mode: DocumentMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> DocumentMode {
        self.mode
    }

    pub fn is_strict(&self) -> bool {
        self.mode == DocumentMode::Strict
    }

    pub fn file_path(&self) -> Option<&Path> {
        self.file_path.as_deref()
    }

    /// Directory relative paths resolve against (current directory if unknown).
    pub fn base_dir(&self) -> PathBuf {
        self.file_path
            .as_deref()
            .and_then(Path::parent)
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    // -- ids --

    /// Build the id index from `document`.
    pub fn index_ids(&mut self, document: &Document) {
        self.ids = Arc::new(IdIndex::build(document));
    }

    pub fn id_index(&self) -> &IdIndex {
        &self.ids
    }

    pub fn element_by_id(&self, id: &str) -> Option<&Element> {
        self.ids.get(id)
    }

    // -- variables --

    pub fn variables(&self) -> &BTreeMap<String, Value> {
        &self.variables
    }

    /// Look up `name` or a dotted path below it (`user.address.city`).
    pub fn variable(&self, path: &str) -> Option<&Value> {
        let (name, rest) = path.split_once('.').unwrap_or((path, ""));
        self.variables.get(name)?.get_path(rest)
    }

    // -- ancestors --

    pub fn parent_elements(&self) -> &[AncestorFrame] {
        &self.parent_elements
    }

    pub fn parent(&self) -> Option<&AncestorFrame> {
        self.parent_elements.last()
    }

    pub fn push_parent(&mut self, frame: AncestorFrame) {
        self.parent_elements.push(frame);
    }

    pub fn pop_parent(&mut self) -> Option<AncestorFrame> {
        self.parent_elements.pop()
    }

    /// Child-index path of the node being visited.
    pub fn current_path(&self) -> &[usize] {
        &self.current_path
    }

    pub(crate) fn set_current_path(&mut self, path: NodePath) {
        self.current_path = path;
    }

    // -- resolution --

    pub fn resolution_state(&self) -> &Arc<ResolutionState> {
        &self.state
    }

    /// Cached resolution result for a canonical key.
    pub fn cached(&self, key: &str) -> Option<Resolved> {
        self.state.get(key)
    }

    /// Keys currently in flight on this task, outermost first.
    pub fn resolution_stack(&self) -> &[String] {
        &self.resolving
    }

    pub fn is_resolving(&self, key: &str) -> bool {
        self.resolving.iter().any(|k| k == key)
    }

    pub(crate) fn enter(&mut self, key: String) {
        self.resolving.push(key);
    }

    pub(crate) fn leave(&mut self, key: &str) {
        if let Some(index) = self.resolving.iter().rposition(|k| k == key) {
            self.resolving.truncate(index);
        }
    }

    pub(crate) fn task_id(&self) -> TaskId {
        self.task
    }

    /// A context for a concurrently resolved sibling: shares the cache,
    /// ids and variables, copies the ancestor and in-flight stacks and
    /// starts with no diagnostics.
    pub fn fork(&self) -> Self {
        let task = self.state.next_task_id();
        Self {
            ids: Arc::clone(&self.ids),
            state: Arc::clone(&self.state),
            variables: Arc::clone(&self.variables),
            parent_elements: self.parent_elements.clone(),
            current_path: self.current_path.clone(),
            mode: self.mode,
            file_path: self.file_path.clone(),
            diagnostics: Vec::new(),
            resolving: self.resolving.clone(),
            task,
            _fork: Some(ForkLink::new(Arc::clone(&self.state), self.task, task)),
        }
    }

    /// Take over the diagnostics collected by a fork.
    pub fn absorb(&mut self, fork: ProcessingContext) {
        self.diagnostics.extend(fork.diagnostics);
    }

    // -- diagnostics --

    /// Record a diagnostic according to the mode policy.
    ///
    /// Warnings are recorded. Errors abort in strict mode and are recorded
    /// as warnings in loose mode. Fatal diagnostics always abort.
    ///
    /// # Errors
    /// Returns the diagnostic when processing must stop.
    pub fn report(&mut self, error: ProcessingError) -> Result<(), ProcessingError> {
        let error = match (&error.file_path, &self.file_path) {
            (None, Some(path)) => error.with_file_path(path.clone()),
            _ => error,
        };

        match error.severity {
            Severity::Fatal => Err(error),
            Severity::Error if self.is_strict() => Err(error),
            Severity::Error => {
                tracing::warn!(code = %error.code, "{}", error.message);
                self.diagnostics.push(error.degraded());
                Ok(())
            }
            Severity::Warning => {
                tracing::debug!(code = %error.code, "{}", error.message);
                self.diagnostics.push(error);
                Ok(())
            }
        }
    }

    /// Record a warning.
    pub fn warn(&mut self, code: ErrorCode, message: impl Into<String>) {
        let mut warning = ProcessingError::warning(code, message);
        if let Some(path) = &self.file_path {
            warning = warning.with_file_path(path.clone());
        }
        tracing::debug!(code = %warning.code, "{}", warning.message);
        self.diagnostics.push(warning);
    }

    pub fn diagnostics(&self) -> &[ProcessingError] {
        &self.diagnostics
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ProcessingError> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
    }

    pub fn take_diagnostics(&mut self) -> Vec<ProcessingError> {
        std::mem::take(&mut self.diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReferenceError;

    fn doc(mode: Option<&str>) -> Document {
        let mut root = Element::new("root")
            .with_child(Element::new("a").with_attribute("id", "first"))
            .with_child(
                Element::new("b").with_child(Element::new("c").with_attribute("id", "nested")),
            )
            .with_child(Element::new("d").with_attribute("id", "first"));
        if let Some(mode) = mode {
            root = root.with_attribute("mode", mode);
        }
        Document::new(vec![root.into()])
    }

    #[test]
    fn test_mode_from_root_attribute() {
        assert_eq!(DocumentMode::from_document(&doc(None)), DocumentMode::Loose);
        assert_eq!(
            DocumentMode::from_document(&doc(Some("STRICT"))),
            DocumentMode::Strict
        );
        assert_eq!(
            DocumentMode::from_document(&doc(Some("bogus"))),
            DocumentMode::Loose
        );
    }

    #[test]
    fn test_id_index_first_occurrence_wins() {
        let index = IdIndex::build(&doc(None));
        assert_eq!(index.len(), 2);
        assert_eq!(index.path_of("first"), Some(&vec![0, 0]));
        assert_eq!(index.get("nested").map(|e| e.tag_name.as_str()), Some("c"));
        assert!(index.get("missing").is_none());
    }

    #[test]
    fn test_variable_dotted_lookup() {
        let mut user = BTreeMap::new();
        user.insert("name".to_string(), Value::from("Ada"));
        let ctx = ProcessingContext::new(&doc(None)).with_variable("user", Value::Object(user));

        assert_eq!(ctx.variable("user.name"), Some(&Value::from("Ada")));
        assert!(ctx.variable("user.age").is_none());
        assert!(ctx.variable("other").is_none());
    }

    #[test]
    fn test_report_policy_loose() {
        let mut ctx = ProcessingContext::new(&doc(None));
        let err: ProcessingError = ReferenceError::NotFound { uri: "id:x".into() }.into();
        assert!(ctx.report(err).is_ok());
        assert_eq!(ctx.diagnostics().len(), 1);
        assert_eq!(ctx.diagnostics()[0].severity, Severity::Warning);
        assert_eq!(ctx.diagnostics()[0].code, ErrorCode::ReferenceNotFound);

        let fatal: ProcessingError = ReferenceError::CircularReference {
            cycle: vec!["id:a".into(), "id:a".into()],
        }
        .into();
        assert!(ctx.report(fatal).is_err());
    }

    #[test]
    fn test_report_policy_strict() {
        let mut ctx = ProcessingContext::new(&doc(Some("strict"))).with_file_path("/tmp/x.xml");
        let err: ProcessingError = ReferenceError::NotFound { uri: "id:x".into() }.into();
        let aborted = ctx.report(err).unwrap_err();
        assert_eq!(aborted.file_path, Some(PathBuf::from("/tmp/x.xml")));
        assert!(ctx.diagnostics().is_empty());

        ctx.warn(ErrorCode::UnknownTag, "just a warning");
        assert_eq!(ctx.warnings().count(), 1);
    }

    #[test]
    fn test_fork_shares_cache_and_merges_diagnostics() {
        let mut ctx = ProcessingContext::new(&doc(None));
        ctx.enter("id:outer".into());

        let mut fork = ctx.fork();
        assert_ne!(fork.task_id(), ctx.task_id());
        assert_eq!(fork.resolution_stack(), ["id:outer".to_string()]);

        fork.resolution_state()
            .store("id:x", Resolved::Text("shared".into()));
        fork.warn(ErrorCode::Visitor, "from fork");

        assert_eq!(ctx.cached("id:x"), Some(Resolved::Text("shared".into())));
        ctx.absorb(fork);
        assert_eq!(ctx.diagnostics().len(), 1);

        ctx.leave("id:outer");
        assert!(ctx.resolution_stack().is_empty());
    }

    #[test]
    fn test_base_dir() {
        let ctx = ProcessingContext::new(&doc(None)).with_file_path("/docs/prompts/main.xml");
        assert_eq!(ctx.base_dir(), PathBuf::from("/docs/prompts"));
        assert_eq!(
            ProcessingContext::new(&doc(None)).base_dir(),
            PathBuf::from(".")
        );
    }
}
