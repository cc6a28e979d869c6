//! Tag registry mapping tag names to definitions.

use std::collections::HashMap;

use serde::Deserialize;

use super::definition::TagDefinition;
use crate::error::{CompileError, RegistryError};

/// Registry mapping lower-cased tag names to their definitions.
///
/// Lifecycle: create, register definitions, then share immutably (the
/// processor holds it behind an `Arc`). The pipeline never mutates it.
///
/// Re-registering a tag silently replaces the previous definition unless the
/// registry is strict, in which case [`RegistryError::DuplicateTag`] is returned.
#[derive(Debug, Clone, Default)]
pub struct TagRegistry {
    definitions: HashMap<String, TagDefinition>,
    strict: bool,
}

/// YAML layout for tag definition files.
#[derive(Debug, Deserialize)]
struct TagFile {
    #[serde(default)]
    tags: Vec<TagDefinition>,
}

impl TagRegistry {
    /// Create a new empty registry (overwrite on re-registration).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry that rejects duplicate registrations.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            definitions: HashMap::new(),
            strict: true,
        }
    }

    #[must_use]
    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Register a tag definition.
    ///
    /// # Errors
    /// Returns `DuplicateTag` if the registry is strict and the tag exists.
    pub fn register(&mut self, definition: TagDefinition) -> Result<(), RegistryError> {
        let definition = definition.normalized();
        if self.definitions.contains_key(&definition.name) {
            if self.strict {
                return Err(RegistryError::DuplicateTag(definition.name));
            }
            tracing::debug!(tag = %definition.name, "Replacing existing tag definition");
        }
        self.definitions.insert(definition.name.clone(), definition);
        Ok(())
    }

    /// Register several definitions, stopping at the first failure.
    pub fn register_all(
        &mut self,
        definitions: impl IntoIterator<Item = TagDefinition>,
    ) -> Result<(), RegistryError> {
        for definition in definitions {
            self.register(definition)?;
        }
        Ok(())
    }

    /// Load definitions from a YAML document with a top-level `tags:` list.
    ///
    /// # Errors
    /// Returns a YAML error for malformed input, or `DuplicateTag` in strict mode.
    pub fn load_from_yaml(&mut self, yaml: &str) -> Result<usize, CompileError> {
        let file: TagFile = serde_yaml_ng::from_str(yaml)?;
        let count = file.tags.len();
        self.register_all(file.tags)?;
        tracing::debug!(count, "Loaded tag definitions");
        Ok(count)
    }

    /// Case-insensitive lookup.
    pub fn get_definition(&self, name: &str) -> Option<&TagDefinition> {
        self.definitions.get(&name.to_lowercase())
    }

    #[must_use]
    pub fn has(&self, name: &str) -> bool {
        self.definitions.contains_key(&name.to_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<TagDefinition> {
        self.definitions.remove(&name.to_lowercase())
    }

    pub fn clear(&mut self) {
        self.definitions.clear();
    }

    /// Registered tag names, sorted.
    #[must_use]
    pub fn tag_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.definitions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}
