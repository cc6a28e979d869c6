//! Document validation against registered tag definitions.
//!
//! Every element is checked against its [`TagDefinition`]:
//!
//! - (a) attributes are a subset of `allowed_attributes` (when non-empty)
//! - (b) all `required_attributes` are present
//! - (c) children obey the content model
//! - (d) children are not forbidden and, if `allowed_children` is
//!   non-empty, restricted to it
//! - (e) the custom validation predicate, if any
//!
//! Violations are collected, never short-circuited.

use std::collections::BTreeMap;

use super::definition::{ContentModel, TagDefinition};
use super::registry::TagRegistry;
use crate::error::ValidationError;
use crate::node::{Document, Element, Node, SourcePosition};

/// Outcome of a validation pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
    /// Non-fatal findings, such as elements with no registered definition.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Which checks a validation pass runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Checks {
    All,
    Structure,
    Attributes,
}

impl Checks {
    fn attributes(self) -> bool {
        matches!(self, Checks::All | Checks::Attributes)
    }

    fn structure(self) -> bool {
        matches!(self, Checks::All | Checks::Structure)
    }
}

/// Validates documents against a borrowed [`TagRegistry`].
pub struct Validator<'a> {
    registry: &'a TagRegistry,
}

impl<'a> Validator<'a> {
    pub fn new(registry: &'a TagRegistry) -> Self {
        Self { registry }
    }

    /// Run every check (a)-(e) over every element.
    pub fn validate_document(&self, document: &Document) -> ValidationResult {
        self.walk(document, Checks::All)
    }

    /// Content model, child restrictions and custom predicates only.
    pub fn validate_structure(&self, document: &Document) -> ValidationResult {
        self.walk(document, Checks::Structure)
    }

    /// Allowed and required attributes only.
    pub fn validate_attributes(&self, document: &Document) -> ValidationResult {
        self.walk(document, Checks::Attributes)
    }

    /// Fail with every repeated `id` and all the positions where it occurs.
    pub fn validate_id_uniqueness(document: &Document) -> Result<(), ValidationError> {
        let mut seen: BTreeMap<String, Vec<SourcePosition>> = BTreeMap::new();
        for element in document.elements() {
            if let Some(id) = element.id() {
                seen.entry(id.to_string()).or_default().push(element.position);
            }
        }

        let duplicates: BTreeMap<String, Vec<SourcePosition>> = seen
            .into_iter()
            .filter(|(_, positions)| positions.len() > 1)
            .collect();

        if duplicates.is_empty() {
            Ok(())
        } else {
            Err(ValidationError::DuplicateIds { duplicates })
        }
    }

    fn walk(&self, document: &Document, checks: Checks) -> ValidationResult {
        let mut result = ValidationResult::default();
        for element in document.elements() {
            self.check_into(element, checks, &mut result);
        }
        result
    }

    fn check_into(&self, element: &Element, checks: Checks, result: &mut ValidationResult) {
        let Some(definition) = self.registry.get_definition(&element.tag_name) else {
            if checks.structure() {
                result.warnings.push(format!(
                    "<{}> at {}: no tag definition registered",
                    element.tag_name, element.position
                ));
            }
            return;
        };

        if checks.attributes() {
            check_attributes(definition, element, &mut result.errors);
        }
        if checks.structure() {
            check_content_model(definition, element, &mut result.errors);
            check_children(definition, element, &mut result.errors);
            if let Some(validate) = &definition.validate_fn {
                if let Err(message) = validate(element) {
                    result.errors.push(ValidationError::Custom {
                        tag: element.tag_name.clone(),
                        message,
                        position: element.position,
                    });
                }
            }
        }
    }
}

/// Checks (a) and (b).
pub fn check_attributes(
    definition: &TagDefinition,
    element: &Element,
    errors: &mut Vec<ValidationError>,
) {
    for name in element.attributes.keys() {
        if !definition.allows_attribute(name) {
            errors.push(ValidationError::DisallowedAttribute {
                tag: element.tag_name.clone(),
                attribute: name.clone(),
                position: element.position,
            });
        }
    }

    for required in &definition.required_attributes {
        if !element.attributes.contains_key(required) {
            errors.push(ValidationError::MissingAttribute {
                tag: element.tag_name.clone(),
                attribute: required.clone(),
                position: element.position,
            });
        }
    }
}

fn check_content_model(
    definition: &TagDefinition,
    element: &Element,
    errors: &mut Vec<ValidationError>,
) {
    let model = definition.content_model;
    let mut violation = |found: &str| {
        errors.push(ValidationError::ContentModelViolation {
            tag: element.tag_name.clone(),
            model,
            found: found.to_string(),
            position: element.position,
        });
    };

    let has_elements = element.children.iter().any(|c| matches!(c, Node::Element(_)));
    // Whitespace between tags is not content
    let has_content = element
        .children
        .iter()
        .any(|c| matches!(c, Node::Content(content) if !content.value.trim().is_empty()));
    let has_references = element.children.iter().any(|c| matches!(c, Node::Reference(_)));

    if has_elements && !model.allows_elements() {
        violation("element children");
    }
    if has_content && !model.allows_content() {
        violation("text content");
    }
    // References may resolve to either shape; only EMPTY rules them out
    if has_references && model == ContentModel::Empty {
        violation("references");
    }
}

fn check_children(
    definition: &TagDefinition,
    element: &Element,
    errors: &mut Vec<ValidationError>,
) {
    for child in element.element_children() {
        let name = child.tag_name.to_lowercase();
        if definition.forbidden_children.contains(&name) {
            errors.push(ValidationError::ForbiddenChild {
                tag: element.tag_name.clone(),
                child: child.tag_name.clone(),
                position: child.position,
            });
        } else if !definition.allowed_children.is_empty()
            && !definition.allowed_children.contains(&name)
        {
            errors.push(ValidationError::DisallowedChild {
                tag: element.tag_name.clone(),
                child: child.tag_name.clone(),
                position: child.position,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{Position, Reference};

    fn registry() -> TagRegistry {
        let mut registry = TagRegistry::new();
        registry
            .register_all([
                TagDefinition::new("prompt", ContentModel::ChildrenOnly)
                    .with_allowed_children(["role", "task"])
                    .with_forbidden_children(["script"]),
                TagDefinition::new("role", ContentModel::ContentOnly)
                    .with_allowed_attributes(["lang"])
                    .with_required_attributes(["name"]),
                TagDefinition::new("task", ContentModel::Mixed),
                TagDefinition::new("br", ContentModel::Empty),
            ])
            .unwrap();
        registry
    }

    #[test]
    fn test_valid_document() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_child(Element::new("role").with_attribute("name", "x").with_text("hi"))
            .with_child(Element::new("task").with_text("do").with_child(Element::new("br")))
            .into()]);
        let registry = registry();
        let result = Validator::new(&registry).validate_document(&doc);
        assert!(result.is_valid(), "{:?}", result.errors);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_collects_independent_violations() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_child(Element::new("role").with_text("hi"))
            .with_child(Element::new("footer"))
            .into()]);
        let registry = registry();
        let result = Validator::new(&registry).validate_document(&doc);

        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::MissingAttribute { attribute, .. } if attribute == "name"
        )));
        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DisallowedChild { child, .. } if child == "footer"
        )));
        // footer has no definition
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn test_content_model_violations() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_text("stray text")
            .with_child(Element::new("role").with_attribute("name", "r").with_child(Element::new("br")))
            .with_child(Element::new("task").with_child(Element::new("br").with_text("x")))
            .into()]);
        let registry = registry();
        let result = Validator::new(&registry).validate_document(&doc);

        let models: Vec<ContentModel> = result
            .errors
            .iter()
            .filter_map(|e| match e {
                ValidationError::ContentModelViolation { model, .. } => Some(*model),
                _ => None,
            })
            .collect();
        assert_eq!(
            models,
            vec![
                ContentModel::ChildrenOnly,
                ContentModel::ContentOnly,
                ContentModel::Empty
            ]
        );
    }

    #[test]
    fn test_whitespace_and_references_are_neutral() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_text("\n   ")
            .with_child(Reference::new("id", "x"))
            .into()]);
        let registry = registry();
        let result = Validator::new(&registry).validate_document(&doc);
        assert!(result.is_valid(), "{:?}", result.errors);
    }

    #[test]
    fn test_forbidden_and_disallowed_attribute() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_child(
                Element::new("role")
                    .with_attribute("name", "r")
                    .with_attribute("style", "bold"),
            )
            .with_child(Element::new("script"))
            .into()]);
        let registry = registry();
        let result = Validator::new(&registry).validate_document(&doc);

        assert!(result.errors.iter().any(|e| matches!(
            e,
            ValidationError::DisallowedAttribute { attribute, .. } if attribute == "style"
        )));
        assert!(result
            .errors
            .iter()
            .any(|e| matches!(e, ValidationError::ForbiddenChild { .. })));
    }

    #[test]
    fn test_custom_validator() {
        let mut registry = TagRegistry::new();
        registry
            .register(
                TagDefinition::new("n", ContentModel::ContentOnly).with_validator(|e| {
                    e.text_content()
                        .parse::<i64>()
                        .map(|_| ())
                        .map_err(|_| "expected a number".to_string())
                }),
            )
            .unwrap();
        let doc = Document::new(vec![Element::new("n").with_text("abc").into()]);
        let result = Validator::new(&registry).validate_document(&doc);
        assert!(matches!(
            result.errors.as_slice(),
            [ValidationError::Custom { message, .. }] if message == "expected a number"
        ));
    }

    #[test]
    fn test_split_checks() {
        let doc = Document::new(vec![Element::new("prompt")
            .with_text("stray")
            .with_child(Element::new("role").with_text("hi"))
            .into()]);
        let registry = registry();
        let validator = Validator::new(&registry);

        let structure = validator.validate_structure(&doc);
        assert!(structure
            .errors
            .iter()
            .all(|e| matches!(e, ValidationError::ContentModelViolation { .. })));

        let attributes = validator.validate_attributes(&doc);
        assert!(attributes
            .errors
            .iter()
            .all(|e| matches!(e, ValidationError::MissingAttribute { .. })));
        assert_eq!(structure.errors.len() + attributes.errors.len(), 2);
    }

    #[test]
    fn test_id_uniqueness_lists_every_duplicate() {
        let at = |line| SourcePosition::new(Position::new(line, 1, 0), Position::new(line, 1, 0));
        let doc = Document::new(vec![Element::new("root")
            .with_child(Element::new("a").with_attribute("id", "x").with_position(at(2)))
            .with_child(Element::new("b").with_attribute("id", "x").with_position(at(3)))
            .with_child(Element::new("c").with_attribute("id", "y").with_position(at(4)))
            .with_child(Element::new("d").with_attribute("id", "y").with_position(at(5)))
            .with_child(Element::new("e").with_attribute("id", "z"))
            .into()]);

        let Err(ValidationError::DuplicateIds { duplicates }) =
            Validator::validate_id_uniqueness(&doc)
        else {
            panic!("expected duplicate ids");
        };
        assert_eq!(duplicates.len(), 2);
        assert_eq!(duplicates["x"], vec![at(2), at(3)]);
        assert_eq!(duplicates["y"], vec![at(4), at(5)]);
    }
}
