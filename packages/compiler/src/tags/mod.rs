//! Tag definitions, the tag registry and the document validator.

mod definition;
mod registry;
mod validator;

pub use definition::{ContentModel, TagDefinition, ValidateFn};
pub use registry::TagRegistry;
pub use validator::{check_attributes, ValidationResult, Validator};
