//! Lightweight normalization of text content.

use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;

use super::{Visit, Visitor};
use crate::context::ProcessingContext;
use crate::error::ProcessingError;
use crate::node::Content;

/// Runs of spaces and tabs inside a single line of text.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static INLINE_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]+").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static TRAILING_SPACE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)[ \t]+$").expect("valid regex"));

/// `*` and `+` list markers, rewritten to `-`.
#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BULLET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^([ \t]*)[*+][ \t]+").expect("valid regex"));

#[allow(clippy::expect_used)] // Static regex that is guaranteed to be valid
static BLANK_LINES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Normalize a content string.
///
/// Single-line text only has its runs of spaces collapsed, so inline text
/// next to references keeps its surrounding spaces. Multi-line text is
/// dedented, stripped of trailing spaces and leading/trailing blank lines,
/// has `*`/`+` bullets rewritten to `-` and at most one blank line between
/// paragraphs.
pub fn normalize_content(text: &str) -> String {
    let text = text.replace("\r\n", "\n");
    if !text.contains('\n') {
        return INLINE_SPACE.replace_all(&text, " ").into_owned();
    }

    let dedented = dedent(&text);
    let trimmed = TRAILING_SPACE.replace_all(&dedented, "");
    let bullets = BULLET.replace_all(&trimmed, "${1}- ");
    let collapsed = BLANK_LINES.replace_all(&bullets, "\n\n");
    collapsed.trim_matches('\n').to_string()
}

/// Remove the indentation shared by all non-blank lines.
fn dedent(text: &str) -> String {
    let indent = text
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.len() - line.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    text.lines()
        .map(|line| {
            if line.trim().is_empty() {
                ""
            } else {
                line.get(indent..).unwrap_or(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Applies [`normalize_content`] to every content node and drops the ones
/// that end up empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentVisitor;

#[async_trait]
impl Visitor for ContentVisitor {
    fn name(&self) -> &str {
        "content"
    }

    async fn visit_content(
        &self,
        content: &mut Content,
        _ctx: &mut ProcessingContext,
    ) -> Result<Visit, ProcessingError> {
        let normalized = normalize_content(&content.value);
        if normalized.is_empty() {
            return Ok(Visit::remove());
        }
        content.value = normalized;
        Ok(Visit::Keep)
    }
}
