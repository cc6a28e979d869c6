//! Mapping rules and their value transforms.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;

use super::path::TargetPath;
use super::selector::{Selected, Selector};
use super::TransformContext;
use crate::error::{CompileError, TransformError};
use crate::types::Value;

/// Signature of a caller-supplied transform.
pub type TransformFn =
    Arc<dyn Fn(&Value, &TransformContext) -> Result<Value, TransformError> + Send + Sync>;

/// Conversion applied to each selector match before it is written.
#[derive(Clone, Default)]
pub enum Transform {
    /// The generic value of the match (`{tag, attributes, children}` for
    /// elements).
    #[default]
    Identity,
    /// Concatenated text content.
    Text,
    /// Text content with surrounding whitespace removed.
    Trim,
    /// The attribute map of an element.
    Attributes,
    /// The tag name of an element.
    Tag,
    /// Text parsed as an integer, falling back to a float.
    Number,
    /// `true/yes/1/on` and `false/no/0/off/""`, case-insensitive.
    Boolean,
    Custom(TransformFn),
}

impl Transform {
    /// Look up a built-in transform by name.
    ///
    /// # Errors
    /// `UnknownTransform` if `name` is not a built-in.
    pub fn from_name(name: &str) -> Result<Self, TransformError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "identity" | "" => Ok(Transform::Identity),
            "text" => Ok(Transform::Text),
            "trim" => Ok(Transform::Trim),
            "attributes" => Ok(Transform::Attributes),
            "tag" => Ok(Transform::Tag),
            "number" => Ok(Transform::Number),
            "boolean" | "bool" => Ok(Transform::Boolean),
            _ => Err(TransformError::UnknownTransform(name.to_string())),
        }
    }

    pub fn custom(
        f: impl Fn(&Value, &TransformContext) -> Result<Value, TransformError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Transform::Custom(Arc::new(f))
    }

    /// Apply the transform to one match.
    ///
    /// # Errors
    /// `Conversion` when the match does not have the required shape.
    pub fn apply(
        &self,
        selected: &Selected<'_>,
        ctx: &TransformContext,
    ) -> Result<Value, TransformError> {
        match self {
            Transform::Identity => Ok(selected.to_value()),
            Transform::Text => Ok(Value::String(selected.text())),
            Transform::Trim => Ok(Value::String(selected.text().trim().to_string())),
            Transform::Attributes => match selected {
                Selected::Element(element) => Ok(Value::Object(element.attributes.clone())),
                Selected::Value(value @ Value::Object(_)) => Ok(value.clone()),
                other => Err(conversion(other, "attributes")),
            },
            Transform::Tag => match selected {
                Selected::Element(element) => Ok(Value::String(element.tag_name.clone())),
                other => Err(conversion(other, "tag name")),
            },
            Transform::Number => match selected {
                Selected::Value(value @ (Value::Int(_) | Value::Float(_))) => Ok(value.clone()),
                other => parse_number(&other.text()).ok_or_else(|| conversion(other, "number")),
            },
            Transform::Boolean => match selected {
                Selected::Value(Value::Bool(flag)) => Ok(Value::Bool(*flag)),
                other => parse_boolean(&other.text()).ok_or_else(|| conversion(other, "boolean")),
            },
            Transform::Custom(f) => f(&selected.to_value(), ctx),
        }
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transform::Identity => "identity",
            Transform::Text => "text",
            Transform::Trim => "trim",
            Transform::Attributes => "attributes",
            Transform::Tag => "tag",
            Transform::Number => "number",
            Transform::Boolean => "boolean",
            Transform::Custom(_) => "custom",
        };
        f.write_str(name)
    }
}

fn conversion(selected: &Selected<'_>, expected: &'static str) -> TransformError {
    let mut input = selected.text();
    if input.chars().count() > 40 {
        input = input.chars().take(40).collect::<String>() + "...";
    }
    TransformError::Conversion { input, expected }
}

fn parse_number(text: &str) -> Option<Value> {
    let text = text.trim();
    if let Ok(int) = text.parse::<i64>() {
        return Some(Value::Int(int));
    }
    text.parse::<f64>()
        .ok()
        .filter(|float| float.is_finite())
        .map(Value::Float)
}

fn parse_boolean(text: &str) -> Option<Value> {
    match text.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(Value::Bool(true)),
        "false" | "no" | "0" | "off" | "" => Some(Value::Bool(false)),
        _ => None,
    }
}

/// Selects nodes from the processed document and writes them into the
/// output value.
#[derive(Debug, Clone)]
pub struct MappingRule {
    pub selector: Selector,
    pub target: TargetPath,
    pub transform: Transform,
    /// Written when the selector matches nothing.
    pub default: Option<Value>,
    /// Always write an array, even for zero or one match.
    pub collect: bool,
}

impl MappingRule {
    /// # Errors
    /// Invalid selector or target path syntax.
    pub fn new(selector: &str, target: &str) -> Result<Self, TransformError> {
        Ok(Self {
            selector: Selector::parse(selector)?,
            target: TargetPath::parse(target)?,
            transform: Transform::Identity,
            default: None,
            collect: false,
        })
    }

    pub fn with_transform(mut self, transform: Transform) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }

    pub fn collect(mut self) -> Self {
        self.collect = true;
        self
    }
}

/// Serialized form of a rule, as found in rule files.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    select: String,
    target: String,
    #[serde(default)]
    transform: Option<String>,
    #[serde(default)]
    default: Option<Value>,
    #[serde(default)]
    collect: bool,
}

impl TryFrom<RuleEntry> for MappingRule {
    type Error = TransformError;

    fn try_from(entry: RuleEntry) -> Result<Self, Self::Error> {
        let mut rule = MappingRule::new(&entry.select, &entry.target)?;
        if let Some(name) = &entry.transform {
            rule.transform = Transform::from_name(name)?;
        }
        rule.default = entry.default;
        rule.collect = entry.collect;
        Ok(rule)
    }
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    rules: Vec<RuleEntry>,
}

/// An ordered list of mapping rules.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<MappingRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<MappingRule>) -> Self {
        Self { rules }
    }

    /// Load rules from YAML:
    ///
    /// ```yaml
    /// rules:
    ///   - select: "title"
    ///     target: "meta.title"
    ///     transform: text
    ///   - select: "p"
    ///     target: "paragraphs"
    ///     transform: trim
    ///     collect: true
    /// ```
    ///
    /// # Errors
    /// YAML syntax errors, or invalid selectors, paths and transform names.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, CompileError> {
        let file: RuleFile = serde_yaml_ng::from_str(yaml)?;
        let rules = file
            .rules
            .into_iter()
            .map(MappingRule::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    pub fn push(&mut self, rule: MappingRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl From<Vec<MappingRule>> for RuleSet {
    fn from(rules: Vec<MappingRule>) -> Self {
        Self::new(rules)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Element;

    #[test]
    fn test_builtin_transforms() {
        let ctx = TransformContext::default();
        let element = Element::new("count")
            .with_attribute("unit", "kg")
            .with_text(" 42 ");
        let selected = Selected::Element(&element);

        assert_eq!(
            Transform::Text.apply(&selected, &ctx).unwrap(),
            Value::from(" 42 ")
        );
        assert_eq!(
            Transform::Trim.apply(&selected, &ctx).unwrap(),
            Value::from("42")
        );
        assert_eq!(
            Transform::Number.apply(&selected, &ctx).unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            Transform::Tag.apply(&selected, &ctx).unwrap(),
            Value::from("count")
        );
        assert_eq!(
            Transform::Attributes
                .apply(&selected, &ctx)
                .unwrap()
                .get_path("unit"),
            Some(&Value::from("kg"))
        );
        assert_eq!(
            Transform::Number
                .apply(&Selected::Value(Value::from("2.5")), &ctx)
                .unwrap(),
            Value::Float(2.5)
        );
        assert_eq!(
            Transform::Boolean
                .apply(&Selected::Value(Value::from("Yes")), &ctx)
                .unwrap(),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_conversion_errors() {
        let ctx = TransformContext::default();
        let err = Transform::Number
            .apply(&Selected::Value(Value::from("many")), &ctx)
            .unwrap_err();
        assert_eq!(
            err,
            TransformError::Conversion {
                input: "many".into(),
                expected: "number"
            }
        );
        assert!(Transform::Tag
            .apply(&Selected::Value(Value::Int(1)), &ctx)
            .is_err());
    }

    #[test]
    fn test_custom_transform() {
        let ctx = TransformContext::default();
        let shout = Transform::custom(|value, _| Ok(Value::String(value.to_text().to_uppercase())));
        assert_eq!(
            shout
                .apply(&Selected::Value(Value::from("hi")), &ctx)
                .unwrap(),
            Value::from("HI")
        );
    }

    #[test]
    fn test_transform_names() {
        assert!(matches!(Transform::from_name("TEXT"), Ok(Transform::Text)));
        assert!(matches!(
            Transform::from_name("reverse"),
            Err(TransformError::UnknownTransform(_))
        ));
    }

    #[test]
    fn test_rule_set_from_yaml() {
        let yaml = r##"
rules:
  - select: title
    target: meta.title
    transform: text
  - select: p
    target: body
    collect: true
  - select: "#missing"
    target: meta.fallback
    default: none
"##;
        let set = RuleSet::from_yaml_str(yaml).unwrap();
        assert_eq!(set.len(), 3);
        assert!(matches!(set.rules()[0].transform, Transform::Text));
        assert!(set.rules()[1].collect);
        assert_eq!(set.rules()[2].default, Some(Value::from("none")));

        let bad = "rules:\n  - select: \"bad tag\"\n    target: x\n";
        assert!(matches!(
            RuleSet::from_yaml_str(bad),
            Err(CompileError::Transform(TransformError::InvalidSelector { .. }))
        ));
    }
}
