use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

use super::{AdaptContext, JsonAdapter, OutputAdapter, TextAdapter, YamlAdapter};
use crate::config::DEFAULT_FORMAT;
use crate::error::AdapterError;
use crate::types::Value;

type AdapterFactory = Arc<dyn Fn() -> Arc<dyn OutputAdapter> + Send + Sync>;

enum AdapterEntry {
    Instance(Arc<dyn OutputAdapter>),
    /// Built on first lookup, then reused.
    Factory {
        factory: AdapterFactory,
        instance: OnceLock<Arc<dyn OutputAdapter>>,
    },
}

impl AdapterEntry {
    fn adapter(&self) -> Arc<dyn OutputAdapter> {
        match self {
            AdapterEntry::Instance(adapter) => Arc::clone(adapter),
            AdapterEntry::Factory { factory, instance } => {
                Arc::clone(instance.get_or_init(|| factory()))
            }
        }
    }
}

/// Output adapters keyed by case-insensitive format name.
///
/// Lookup takes the exact (case-folded) name. Otherwise, unless strict
/// matching is on, the first registered adapter (by format name) whose
/// [`OutputAdapter::supports_format`] accepts the name is used, and failing
/// that the default format's adapter.
pub struct AdapterRegistry {
    entries: HashMap<String, AdapterEntry>,
    default_format: Option<String>,
    strict: bool,
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("formats", &self.formats())
            .field("default_format", &self.default_format)
            .field("strict", &self.strict)
            .finish()
    }
}

impl AdapterRegistry {
    /// An empty registry with no default and lenient matching.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            default_format: None,
            strict: false,
        }
    }

    /// `json`, `yaml`/`yml` and `text`/`txt`, defaulting to JSON.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let yaml: Arc<dyn OutputAdapter> = Arc::new(YamlAdapter);
        let text: Arc<dyn OutputAdapter> = Arc::new(TextAdapter);
        registry.register(JsonAdapter);
        registry.register_arc("yaml", Arc::clone(&yaml));
        registry.register_arc("yml", yaml);
        registry.register_arc("text", Arc::clone(&text));
        registry.register_arc("txt", text);
        registry.set_default_format(Some(DEFAULT_FORMAT.to_string()));
        registry
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.set_default_format(Some(format.into()));
        self
    }

    pub fn set_default_format(&mut self, format: Option<String>) {
        self.default_format = format.map(|f| f.to_lowercase());
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Register `adapter` under its own name. Replaces any existing entry.
    pub fn register(&mut self, adapter: impl OutputAdapter + 'static) {
        let name = adapter.name().to_string();
        self.register_arc(&name, Arc::new(adapter));
    }

    pub fn register_arc(&mut self, format: &str, adapter: Arc<dyn OutputAdapter>) {
        self.insert(format, AdapterEntry::Instance(adapter));
    }

    /// Register a factory; it runs once, on the first lookup.
    pub fn register_factory(
        &mut self,
        format: &str,
        factory: impl Fn() -> Arc<dyn OutputAdapter> + Send + Sync + 'static,
    ) {
        self.insert(
            format,
            AdapterEntry::Factory {
                factory: Arc::new(factory),
                instance: OnceLock::new(),
            },
        );
    }

    fn insert(&mut self, format: &str, entry: AdapterEntry) {
        let key = format.to_lowercase();
        if self.entries.insert(key.clone(), entry).is_some() {
            tracing::debug!(format = %key, "Replacing output adapter");
        }
    }

    pub fn remove(&mut self, format: &str) -> bool {
        self.entries.remove(&format.to_lowercase()).is_some()
    }

    /// Adapter for `format`, see the type docs for the fallback rules.
    pub fn get_adapter(&self, format: &str) -> Option<Arc<dyn OutputAdapter>> {
        let key = format.to_lowercase();
        if let Some(entry) = self.entries.get(&key) {
            return Some(entry.adapter());
        }
        if self.strict {
            return None;
        }
        if let Some(adapter) = self.find_supporting(format) {
            tracing::debug!(
                format = %key,
                adapter = adapter.name(),
                "Output adapter matched by format"
            );
            return Some(adapter);
        }
        let fallback = self.default_format.as_deref()?;
        let adapter = self.entries.get(fallback)?.adapter();
        tracing::debug!(format = %key, fallback, "Falling back to default output adapter");
        Some(adapter)
    }

    fn find_supporting(&self, format: &str) -> Option<Arc<dyn OutputAdapter>> {
        let mut names: Vec<&String> = self.entries.keys().collect();
        names.sort_unstable();
        names
            .into_iter()
            .filter_map(|name| self.entries.get(name))
            .map(AdapterEntry::adapter)
            .find(|adapter| adapter.supports_format(format))
    }

    pub fn has(&self, format: &str) -> bool {
        self.entries.contains_key(&format.to_lowercase())
    }

    /// Registered format names, sorted.
    pub fn formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        formats.sort_unstable();
        formats
    }

    /// Adapt `value` to `format`.
    ///
    /// # Errors
    /// `AdapterError::NotFound` when no adapter (or fallback) applies.
    pub fn adapt(
        &self,
        value: &Value,
        format: &str,
        ctx: &AdaptContext,
    ) -> Result<String, AdapterError> {
        let adapter = self
            .get_adapter(format)
            .ok_or_else(|| AdapterError::NotFound(format.to_string()))?;
        Ok(adapter.adapt(value, ctx))
    }
}
