//! Tag definitions describing the allowed shape of an element.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::node::Element;

/// Custom validation predicate. Returns a message describing the violation.
pub type ValidateFn = Arc<dyn Fn(&Element) -> Result<(), String> + Send + Sync>;

/// Allowed body shape of an element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContentModel {
    /// No children and no content
    Empty,
    /// Text content only, no element children
    ContentOnly,
    /// Element children only, no text content
    ChildrenOnly,
    /// Both text and element children
    #[default]
    Mixed,
}

impl ContentModel {
    pub fn allows_content(&self) -> bool {
        matches!(self, ContentModel::ContentOnly | ContentModel::Mixed)
    }

    pub fn allows_elements(&self) -> bool {
        matches!(self, ContentModel::ChildrenOnly | ContentModel::Mixed)
    }

    /// Whether inherited children may be merged into an element of this model.
    pub fn accepts_inherited_children(&self) -> bool {
        !matches!(self, ContentModel::ContentOnly | ContentModel::Empty)
    }
}

impl fmt::Display for ContentModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentModel::Empty => "EMPTY",
            ContentModel::ContentOnly => "CONTENT_ONLY",
            ContentModel::ChildrenOnly => "CHILDREN_ONLY",
            ContentModel::Mixed => "MIXED",
        };
        f.write_str(name)
    }
}

/// Declared shape of one tag.
///
/// Names (of the tag and of listed children) are stored lower-cased.
/// Empty `allowed_attributes` / `allowed_children` lists mean "anything".
#[derive(Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TagDefinition {
    pub name: String,
    pub content_model: ContentModel,
    pub allowed_attributes: Vec<String>,
    pub required_attributes: Vec<String>,
    pub allowed_children: Vec<String>,
    pub forbidden_children: Vec<String>,
    #[serde(skip)]
    pub validate_fn: Option<ValidateFn>,
}

impl TagDefinition {
    pub fn new(name: impl Into<String>, content_model: ContentModel) -> Self {
        Self {
            name: name.into().to_lowercase(),
            content_model,
            ..Self::default()
        }
    }

    pub fn with_allowed_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_required_attributes<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required_attributes = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_allowed_children<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_children = names
            .into_iter()
            .map(|n| n.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_forbidden_children<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.forbidden_children = names
            .into_iter()
            .map(|n| n.into().to_lowercase())
            .collect();
        self
    }

    pub fn with_validator(
        mut self,
        validate: impl Fn(&Element) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.validate_fn = Some(Arc::new(validate));
        self
    }

    /// Lower-case every stored name. Applied on registration so that
    /// definitions loaded from YAML follow the same rules as built ones.
    pub(crate) fn normalized(mut self) -> Self {
        self.name = self.name.to_lowercase();
        for list in [&mut self.allowed_children, &mut self.forbidden_children] {
            for name in list.iter_mut() {
                *name = name.to_lowercase();
            }
        }
        self
    }

    /// Whether `attribute` may appear on this tag.
    pub fn allows_attribute(&self, attribute: &str) -> bool {
        self.allowed_attributes.is_empty()
            || self.allowed_attributes.iter().any(|a| a == attribute)
            || self.required_attributes.iter().any(|a| a == attribute)
    }
}

impl fmt::Debug for TagDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagDefinition")
            .field("name", &self.name)
            .field("content_model", &self.content_model)
            .field("allowed_attributes", &self.allowed_attributes)
            .field("required_attributes", &self.required_attributes)
            .field("allowed_children", &self.allowed_children)
            .field("forbidden_children", &self.forbidden_children)
            .field("validate_fn", &self.validate_fn.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_are_lowercased() {
        let def = TagDefinition::new("Section", ContentModel::ChildrenOnly)
            .with_allowed_children(["Para"])
            .with_forbidden_children(["Script"]);
        assert_eq!(def.name, "section");
        assert_eq!(def.allowed_children, vec!["para"]);
        assert_eq!(def.forbidden_children, vec!["script"]);
    }

    #[test]
    fn test_allows_attribute() {
        let open = TagDefinition::new("p", ContentModel::Mixed);
        assert!(open.allows_attribute("anything"));

        let closed = TagDefinition::new("p", ContentModel::Mixed)
            .with_allowed_attributes(["class"])
            .with_required_attributes(["id"]);
        assert!(closed.allows_attribute("class"));
        assert!(closed.allows_attribute("id"));
        assert!(!closed.allows_attribute("style"));
    }

    #[test]
    fn test_content_model_capabilities() {
        assert!(!ContentModel::Empty.allows_content());
        assert!(!ContentModel::Empty.allows_elements());
        assert!(ContentModel::ContentOnly.allows_content());
        assert!(!ContentModel::ContentOnly.accepts_inherited_children());
        assert!(ContentModel::ChildrenOnly.allows_elements());
        assert!(ContentModel::Mixed.accepts_inherited_children());
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
name: Item
content_model: CONTENT_ONLY
required_attributes: [key]
"#;
        let def: TagDefinition = serde_yaml_ng::from_str(yaml).unwrap();
        let def = def.normalized();
        assert_eq!(def.name, "item");
        assert_eq!(def.content_model, ContentModel::ContentOnly);
        assert_eq!(def.required_attributes, vec!["key"]);
        assert!(def.validate_fn.is_none());
    }
}
