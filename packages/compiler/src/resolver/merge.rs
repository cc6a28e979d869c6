//! Inheritance merge (`extends`).

use crate::context::ProcessingContext;
use crate::error::ErrorCode;
use crate::node::Element;
use crate::tags::{ContentModel, TagRegistry};
use crate::types::Value;

/// Attributes an element never takes over from its ancestor.
const NON_INHERITED: [&str; 2] = ["id", "extends"];

/// Merge `ancestor` into `element`.
///
/// - Attributes: shallow merge, the element's own values win. The
///   ancestor's `id` and `extends` are not inherited.
/// - Children: the ancestor's children come first, followed by the
///   element's own, unless the element's content model is `CONTENT_ONLY`
///   or `EMPTY`, in which case inherited children are dropped with a warning.
/// - The consumed `extends` attribute moves to `metadata.extends` and the
///   ancestor is recorded in `metadata.inherited_from`.
pub fn merge_inherited(
    element: &mut Element,
    ancestor: Element,
    tags: &TagRegistry,
    ctx: &mut ProcessingContext,
) {
    let source = element.attributes.remove("extends");
    let inherited_from = ancestor
        .id()
        .unwrap_or(ancestor.tag_name.as_str())
        .to_string();
    let Element {
        tag_name: ancestor_tag,
        attributes,
        children,
        ..
    } = ancestor;

    for (name, value) in attributes {
        if NON_INHERITED.contains(&name.as_str()) {
            continue;
        }
        element.attributes.entry(name).or_insert(value);
    }

    let model = tags
        .get_definition(&element.tag_name)
        .map(|definition| definition.content_model)
        .unwrap_or(ContentModel::Mixed);

    if model.accepts_inherited_children() {
        let own = std::mem::replace(&mut element.children, children);
        element.children.extend(own);
    } else if !children.is_empty() {
        tracing::warn!(
            tag = %element.tag_name,
            model = %model,
            discarded = children.len(),
            "Discarding inherited children"
        );
        ctx.warn(
            ErrorCode::InheritedChildrenDiscarded,
            format!(
                "<{}> at {}: content model {model} does not accept {} children inherited from <{ancestor_tag}>",
                element.tag_name,
                element.position,
                children.len(),
            ),
        );
    }

    if let Some(source) = source {
        element.metadata.insert("extends".to_string(), source);
    }
    element
        .metadata
        .insert("inherited_from".to_string(), Value::String(inherited_from));
}
