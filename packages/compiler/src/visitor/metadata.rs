use async_trait::async_trait;

use super::{Visit, Visitor};
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::Element;
use crate::types::Value;

/// Records the structural position of every element in its metadata:
/// `depth`, `path`, `parent` (tag name or null), `parent_id` when the
/// parent has one, and `child_count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetadataVisitor;

#[async_trait]
impl Visitor for MetadataVisitor {
    fn name(&self) -> &str {
        "metadata"
    }

    async fn visit_element(
        &self,
        element: &mut Element,
        ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        let path = ctx.current_path().iter().copied().map(Value::from).collect();
        let parent = ctx.parent();

        let metadata = &mut element.metadata;
        metadata.insert("depth".into(), Value::from(ctx.parent_elements().len()));
        metadata.insert("path".into(), Value::Array(path));
        metadata.insert(
            "parent".into(),
            parent.map_or(Value::Null, |frame| Value::from(frame.tag_name.as_str())),
        );
        if let Some(id) = parent.and_then(|frame| frame.id.as_deref()) {
            metadata.insert("parent_id".into(), Value::from(id));
        }
        metadata.insert("child_count".into(), Value::from(element.children.len()));
        Ok(Visit::Keep)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::visitor::walk;

    #[tokio::test]
    async fn test_attaches_structural_metadata() {
        let mut doc = parse(r#"<a id="top"><b/><c>text<d/></c></a>"#).unwrap();
        let mut ctx = ProcessingContext::new(&doc);

        walk(&MetadataVisitor, &mut doc, &mut ctx).await.unwrap();

        let a = doc.root_element().unwrap();
        assert_eq!(a.metadata["depth"], Value::Int(0));
        assert_eq!(a.metadata["parent"], Value::Null);
        assert_eq!(a.metadata["child_count"], Value::Int(2));

        let c = a.element_children().nth(1).unwrap();
        assert_eq!(c.metadata["depth"], Value::Int(1));
        assert_eq!(c.metadata["parent"], Value::from("a"));
        assert_eq!(c.metadata["parent_id"], Value::from("top"));
        assert_eq!(
            c.metadata["path"],
            Value::Array(vec![Value::Int(0), Value::Int(1)])
        );

        let d = c.element_children().next().unwrap();
        assert_eq!(d.metadata["depth"], Value::Int(2));
        assert!(!d.metadata.contains_key("parent_id"));
        assert!(a.attributes.get("depth").is_none());
    }
}
