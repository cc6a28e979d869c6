//! End-to-end processing scenarios: inheritance, references, cycles and
//! validation.

use std::sync::Arc;

use markweave_compiler::{
    parse, CompileOptions, Compiler, CompilerConfig, ContentModel, Document, Element, ErrorCode,
    Node, ProcessingContext, Processor, ProtocolRegistry, ReferenceError, Resolved, TagDefinition,
    TagRegistry, ValidationError, Validator, Value,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

fn compiler() -> Compiler {
    Compiler::new(CompilerConfig::default()).expect("compiler creation")
}

fn processor(config: &CompilerConfig) -> Processor {
    let protocols = ProtocolRegistry::with_defaults(config).expect("protocol registry");
    Processor::from_config(
        Arc::new(TagRegistry::new()),
        Arc::new(protocols),
        config,
    )
}

fn child_tags(element: &Element) -> Vec<&str> {
    element
        .element_children()
        .map(|child| child.tag_name.as_str())
        .collect()
}

fn find<'a>(document: &'a Document, id: &str) -> &'a Element {
    document
        .elements()
        .into_iter()
        .find(|element| element.id() == Some(id))
        .expect("element with id")
}

#[tokio::test]
async fn test_extends_merges_ancestor() {
    let compilation = compiler()
        .compile(
            r#"<root><b id="y" attr="1"><d/></b><a id="x" extends="id:y"><c/></a></root>"#,
            &CompileOptions::new(),
        )
        .await
        .expect("compilation");
    assert!(compilation.aborted.is_none());

    let merged = find(&compilation.document, "x");
    assert_eq!(merged.attribute("attr"), Some("1"));
    assert_eq!(merged.attribute("extends"), None);
    assert_eq!(merged.attributes.len(), 2);
    assert_eq!(child_tags(merged), vec!["d", "c"]);
    assert_eq!(
        merged.metadata.get("inherited_from"),
        Some(&Value::from("y"))
    );

    // the ancestor itself is untouched
    let ancestor = find(&compilation.document, "y");
    assert_eq!(child_tags(ancestor), vec!["d"]);
}

#[tokio::test]
async fn test_extends_cycle_is_fatal_and_lists_both_uris() {
    let compilation = compiler()
        .compile(
            r#"<root mode="loose"><a id="a" extends="id:b"/><b id="b" extends="id:a"/></root>"#,
            &CompileOptions::new(),
        )
        .await
        .expect("compilation");

    let aborted = compilation.aborted.expect("cycle aborts in loose mode too");
    assert_eq!(aborted.code, ErrorCode::CircularReference);
    let Some(ReferenceError::CircularReference { cycle }) = aborted.reference_error() else {
        panic!("expected a circular reference, got {aborted}");
    };
    assert!(cycle.contains(&"id:a".to_string()));
    assert!(cycle.contains(&"id:b".to_string()));
}

#[tokio::test]
async fn test_reference_cycle_through_nested_content() {
    let compilation = compiler()
        .compile(
            r##"<root><p id="a"><ref href="#b"/></p><q id="b"><ref href="#a"/></q></root>"##,
            &CompileOptions::new(),
        )
        .await
        .expect("compilation");

    let aborted = compilation.aborted.expect("cycle aborts");
    assert_eq!(aborted.code, ErrorCode::CircularReference);
}

#[tokio::test]
async fn test_missing_id_is_reference_not_found() {
    let compilation = compiler()
        .compile(
            r#"<root><p><ref href="id:missing"/></p></root>"#,
            &CompileOptions::new(),
        )
        .await
        .expect("compilation");

    assert!(compilation.aborted.is_none());
    let not_found: Vec<_> = compilation
        .diagnostics
        .iter()
        .filter(|d| d.code == ErrorCode::ReferenceNotFound)
        .collect();
    assert_eq!(not_found.len(), 1);
    assert_eq!(
        not_found[0].reference_error(),
        Some(&ReferenceError::NotFound {
            uri: "id:missing".to_string()
        })
    );

    let strict = compiler()
        .compile(
            r#"<root mode="strict"><p><ref href="id:missing"/></p></root>"#,
            &CompileOptions::new(),
        )
        .await
        .expect("compilation");
    assert_eq!(
        strict.aborted.map(|e| e.code),
        Some(ErrorCode::ReferenceNotFound)
    );
}

#[tokio::test]
async fn test_each_uri_is_fetched_once() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("shared.txt"), "shared").unwrap();
    let doc_path = dir.path().join("doc.xml");

    let document = parse(
        r#"<root>
            <a><ref href="file:shared.txt"/><ref href="file:shared.txt"/></a>
            <b><ref href="file:shared.txt"/></b>
        </root>"#,
    )
    .unwrap();

    for concurrent in [true, false] {
        let config = CompilerConfig::default().with_concurrent_references(concurrent);
        let ctx = ProcessingContext::new(&document).with_file_path(&doc_path);
        let output = processor(&config).process_with(document.clone(), ctx).await;

        assert!(output.is_complete());
        assert_eq!(output.context.resolution_state().fetch_count(), 1);

        let mut resolved = 0;
        for element in output.document.elements() {
            for child in &element.children {
                if let Node::Reference(reference) = child {
                    assert_eq!(reference.resolved(), Some(&Resolved::Text("shared".into())));
                    resolved += 1;
                }
            }
        }
        assert_eq!(resolved, 3);
    }
}

#[tokio::test]
async fn test_nested_file_documents_are_expanded() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("part.xml"),
        r#"<part><ref href="var:user"/></part>"#,
    )
    .unwrap();
    let doc_path = dir.path().join("doc.xml");
    std::fs::write(&doc_path, r#"<root><ref href="file:part.xml"/></root>"#).unwrap();

    let compilation = compiler()
        .compile_file(&doc_path, &CompileOptions::new().with_variable("user", "Ada"))
        .await
        .expect("compilation");

    assert!(compilation.aborted.is_none());
    assert_eq!(compilation.document.text_content(), "Ada");
}

#[test]
fn test_validation_reports_all_violations() {
    let mut tags = TagRegistry::new();
    tags.register(
        TagDefinition::new("card", ContentModel::ChildrenOnly)
            .with_required_attributes(["title"])
            .with_allowed_children(["line"]),
    )
    .unwrap();
    tags.register(TagDefinition::new("line", ContentModel::ContentOnly))
        .unwrap();

    let document = parse(r#"<card><line>ok</line><image/></card>"#).unwrap();
    let result = Validator::new(&tags).validate_document(&document);

    assert_eq!(result.errors.len(), 2);
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, ValidationError::MissingAttribute { attribute, .. } if attribute == "title")));
    assert!(result
        .errors
        .iter()
        .any(|e| matches!(e, ValidationError::DisallowedChild { child, .. } if child == "image")));
}

#[test]
fn test_duplicate_ids_are_all_listed() {
    let document = parse(r#"<r><a id="x"/><b id="x"/><c id="x"/><d id="y"/></r>"#).unwrap();
    let Err(ValidationError::DuplicateIds { duplicates }) =
        Validator::validate_id_uniqueness(&document)
    else {
        panic!("expected duplicate ids");
    };
    assert_eq!(duplicates.len(), 1);
    assert_eq!(duplicates["x"].len(), 3);
}
