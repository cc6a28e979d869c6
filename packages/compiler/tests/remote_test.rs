//! Remote references resolved against a mock HTTP server.

use std::time::Duration;

use markweave_compiler::protocol::{HttpHandler, IdHandler, VariableHandler};
use markweave_compiler::{
    CompileOptions, Compiler, CompilerConfig, Document, ErrorCode, Node, ProtocolRegistry,
    Resolved, Value,
};
use pretty_assertions::assert_eq;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn compiler() -> Compiler {
    Compiler::new(CompilerConfig::default()).expect("compiler creation")
}

/// Compiler whose HTTP handler retries quickly.
fn fast_retry_compiler() -> Compiler {
    let config = CompilerConfig::default();
    let http = HttpHandler::new(&config)
        .expect("client creation")
        .with_max_retries(3)
        .with_retry_delay(Duration::from_millis(1));
    let mut protocols = ProtocolRegistry::new();
    protocols.register(IdHandler);
    protocols.register(VariableHandler);
    protocols.register(http);
    compiler().with_protocols(protocols)
}

/// Resolution of the first reference below the element at `index` of the root.
fn resolved_at(document: &Document, index: usize) -> Option<&Resolved> {
    let child = document.element_at(&[0, index])?;
    match child.children.first()? {
        Node::Reference(reference) => reference.resolved(),
        _ => None,
    }
}

#[tokio::test]
async fn test_remote_json_is_fetched_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/data.json"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(r#"{"name":"Ada"}"#, "application/json"),
        )
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/data.json", mock_server.uri());
    let source =
        format!(r#"<prompt><a><ref href="{url}"/></a><b><ref href="{url}"/></b></prompt>"#);

    let compilation = compiler()
        .compile(&source, &CompileOptions::new())
        .await
        .expect("compilation");

    assert!(compilation.aborted.is_none());
    let expected: Value = serde_json::from_str::<Value>(r#"{"name":"Ada"}"#).unwrap();
    assert_eq!(
        resolved_at(&compilation.document, 0),
        Some(&Resolved::Data(expected.clone()))
    );
    assert_eq!(
        resolved_at(&compilation.document, 1),
        Some(&Resolved::Data(expected))
    );
}

#[tokio::test]
async fn test_content_type_negotiation() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/part"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("<part>remote text</part>", "application/xml"),
        )
        .mount(&mock_server)
        .await;
    Mock::given(method("GET"))
        .and(path("/settings"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw("level: 3\n", "application/x-yaml"),
        )
        .mount(&mock_server)
        .await;

    let source = format!(
        r#"<prompt><a><ref href="{0}/part"/></a><b><ref href="{0}/settings"/></b></prompt>"#,
        mock_server.uri()
    );
    let compilation = compiler()
        .compile(&source, &CompileOptions::new())
        .await
        .expect("compilation");

    let part = resolved_at(&compilation.document, 0).expect("part resolved");
    assert_eq!(part.kind(), "document");
    assert_eq!(part.text_content(), "remote text");

    let settings = resolved_at(&compilation.document, 1).expect("settings resolved");
    assert_eq!(settings.to_value().get_path("level"), Some(&Value::Int(3)));
}

#[tokio::test]
async fn test_client_error_degrades_in_loose_mode() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/missing"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let source = format!(
        r#"<prompt><a><ref href="{}/missing"/></a></prompt>"#,
        mock_server.uri()
    );
    let compilation = fast_retry_compiler()
        .compile(&source, &CompileOptions::new())
        .await
        .expect("compilation");

    assert!(compilation.aborted.is_none());
    assert!(resolved_at(&compilation.document, 0).is_none());
    let http_warnings: Vec<_> = compilation
        .warnings()
        .filter(|d| d.code == ErrorCode::Http)
        .collect();
    assert_eq!(http_warnings.len(), 1);
    assert!(http_warnings[0].message.contains("404"));
}

#[tokio::test]
async fn test_failed_uri_is_fetched_once() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gone"))
        .respond_with(ResponseTemplate::new(404))
        .expect(1)
        .mount(&mock_server)
        .await;

    let url = format!("{}/gone", mock_server.uri());
    let source = format!(
        r#"<prompt><a><ref href="{url}"/><ref href="{url}"/></a><b><ref href="{url}"/></b></prompt>"#
    );
    let compilation = compiler()
        .compile(&source, &CompileOptions::new())
        .await
        .expect("compilation");

    assert!(compilation.aborted.is_none());
    let http_warnings = compilation
        .warnings()
        .filter(|d| d.code == ErrorCode::Http)
        .count();
    assert_eq!(http_warnings, 3);
}

#[tokio::test]
async fn test_server_errors_are_retried_then_abort_strict_documents() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/flaky"))
        .respond_with(ResponseTemplate::new(503))
        .expect(3)
        .mount(&mock_server)
        .await;

    let source = format!(
        r#"<prompt mode="strict"><a><ref href="{}/flaky"/></a></prompt>"#,
        mock_server.uri()
    );
    let compilation = fast_retry_compiler()
        .compile(&source, &CompileOptions::new())
        .await
        .expect("compilation");

    let aborted = compilation.aborted.expect("strict mode aborts");
    assert_eq!(aborted.code, ErrorCode::Http);
    assert!(compilation.rendered.is_none());
}
