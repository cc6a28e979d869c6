use serde_json::json;

use super::{AdaptContext, OutputAdapter};
use crate::types::Value;

const CIRCULAR_STRUCTURE: &str = "CIRCULAR_STRUCTURE";
const SERIALIZATION_FAILED: &str = "SERIALIZATION_FAILED";

/// JSON payload describing why a value could not be adapted.
fn diagnostic(code: &str, message: String, pretty: bool) -> String {
    let payload = json!({
        "error": message,
        "code": code,
    });
    let rendered = if pretty {
        serde_json::to_string_pretty(&payload)
    } else {
        serde_json::to_string(&payload)
    };
    rendered.unwrap_or_else(|_| format!(r#"{{"code":"{code}"}}"#))
}

/// Refuse values nested beyond the configured depth. Owned value trees
/// cannot loop, so runaway nesting is what a circular structure looks like.
fn check_depth(format: &str, value: &Value, ctx: &AdaptContext) -> Option<String> {
    let depth = value.depth();
    if depth <= ctx.max_depth {
        return None;
    }
    tracing::warn!(format, depth, max_depth = ctx.max_depth, "Output value too deep");
    Some(diagnostic(
        CIRCULAR_STRUCTURE,
        format!(
            "value nesting depth {depth} exceeds {}; the structure is likely circular",
            ctx.max_depth
        ),
        ctx.pretty,
    ))
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonAdapter;

impl OutputAdapter for JsonAdapter {
    fn name(&self) -> &str {
        "json"
    }

    fn adapt(&self, value: &Value, ctx: &AdaptContext) -> String {
        if let Some(report) = check_depth(self.name(), value, ctx) {
            return report;
        }
        let rendered = if ctx.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "JSON serialization failed");
            diagnostic(SERIALIZATION_FAILED, e.to_string(), ctx.pretty)
        })
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlAdapter;

impl OutputAdapter for YamlAdapter {
    fn name(&self) -> &str {
        "yaml"
    }

    fn supports_format(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("yaml") || format.eq_ignore_ascii_case("yml")
    }

    fn adapt(&self, value: &Value, ctx: &AdaptContext) -> String {
        if let Some(report) = check_depth(self.name(), value, ctx) {
            return report;
        }
        serde_yaml_ng::to_string(value).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "YAML serialization failed");
            diagnostic(SERIALIZATION_FAILED, e.to_string(), ctx.pretty)
        })
    }
}

/// Plain text: strings as is, arrays one item per line, objects as
/// `key: value` lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextAdapter;

impl OutputAdapter for TextAdapter {
    fn name(&self) -> &str {
        "text"
    }

    fn supports_format(&self, format: &str) -> bool {
        format.eq_ignore_ascii_case("text") || format.eq_ignore_ascii_case("txt")
    }

    fn adapt(&self, value: &Value, ctx: &AdaptContext) -> String {
        if let Some(report) = check_depth(self.name(), value, ctx) {
            return report;
        }
        value.to_text()
    }
}
