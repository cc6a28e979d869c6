use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}

const RULES: &str = r#"
rules:
  - select: title
    target: title
    transform: text
  - select: item
    target: items
    transform: text
    collect: true
"#;

#[test]
fn compile_with_rules_prints_json() {
    let dir = TempDir::new().unwrap();
    let doc = write(
        dir.path(),
        "doc.xml",
        "<prompt><title>Hi</title><item>a</item><item>b</item></prompt>",
    );
    let rules = write(dir.path(), "rules.yaml", RULES);

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("compile")
        .arg(&doc)
        .arg("--rules")
        .arg(&rules)
        .arg("--compact");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains(r#"{"items":["a","b"],"title":"Hi"}"#));
}

#[test]
fn compile_resolves_variables_and_files() {
    let dir = TempDir::new().unwrap();
    write(dir.path(), "part.txt", "shared text");
    let doc = write(
        dir.path(),
        "doc.xml",
        r#"<prompt><greeting>Hello <ref href="var:user"/></greeting><body><ref href="file:part.txt"/></body></prompt>"#,
    );
    let rules = write(
        dir.path(),
        "rules.yaml",
        "rules:\n  - select: greeting\n    target: greeting\n    transform: text\n  - select: body\n    target: body\n    transform: trim\n",
    );

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("compile")
        .arg(&doc)
        .arg("--rules")
        .arg(&rules)
        .arg("--var")
        .arg("user=Ada")
        .arg("--format")
        .arg("YAML");

    cmd.assert().success().stdout(
        predicate::str::contains("greeting: Hello Ada")
            .and(predicate::str::contains("body: shared text")),
    );
}

#[test]
fn compile_writes_output_file() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.xml", "<prompt><title>Hi</title></prompt>");
    let rules = write(dir.path(), "rules.yaml", RULES);
    let out = dir.path().join("out.json");

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("compile")
        .arg(&doc)
        .arg("-r")
        .arg(&rules)
        .arg("-o")
        .arg(&out)
        .arg("--compact");

    cmd.assert()
        .success()
        .stderr(predicate::str::contains("Saved to:"));
    let written = std::fs::read_to_string(&out).unwrap();
    assert_eq!(written.trim(), r#"{"items":[],"title":"Hi"}"#);
}

#[test]
fn compile_fails_on_circular_inheritance() {
    let dir = TempDir::new().unwrap();
    let doc = write(
        dir.path(),
        "doc.xml",
        r#"<root><a id="a" extends="id:b"/><b id="b" extends="id:a"/></root>"#,
    );

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("compile").arg(&doc);

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("aborted").and(predicate::str::contains("CIRCULAR")));
}

#[test]
fn compile_rejects_malformed_variable() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.xml", "<prompt/>");

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("compile").arg(&doc).arg("--var").arg("nonsense");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Invalid variable"));
}

#[test]
fn validate_reports_violations() {
    let dir = TempDir::new().unwrap();
    let tags = write(
        dir.path(),
        "tags.yaml",
        "tags:\n  - name: list\n    content_model: CHILDREN_ONLY\n    required_attributes: [name]\n    allowed_children: [item]\n",
    );
    let valid = write(dir.path(), "valid.xml", r#"<list name="todo"><item/></list>"#);
    let invalid = write(dir.path(), "invalid.xml", "<list><other/></list>");

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("validate").arg(&valid).arg("--tags").arg(&tags);
    cmd.assert()
        .success()
        .stdout(predicate::str::contains("Valid:"));

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("validate").arg(&invalid).arg("--tags").arg(&tags);
    cmd.assert().failure().stderr(
        predicate::str::contains("2 validation error(s)")
            .and(predicate::str::contains("missing required attribute 'name'")),
    );
}

#[test]
fn syntax_errors_fail() {
    let dir = TempDir::new().unwrap();
    let doc = write(dir.path(), "doc.xml", "<prompt>");

    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("validate").arg(&doc);
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Syntax error"));
}

#[test]
fn formats_lists_adapters() {
    let mut cmd = cargo_bin_cmd!("markweave");
    cmd.arg("formats").env_remove("MARKWEAVE_DEFAULT_FORMAT");

    cmd.assert().success().stdout(
        predicate::str::contains("json (default)")
            .and(predicate::str::contains("yaml"))
            .and(predicate::str::contains("txt")),
    );
}
