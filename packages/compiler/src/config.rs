//! Configuration for the markweave compiler
//!
//! Compile-time limits live here as documented constants. Runtime settings
//! are gathered in [`CompilerConfig`], which can be built in code or read
//! from `MARKWEAVE_*` environment variables.
//!
//! # Security Considerations
//!
//! The limits are designed to prevent:
//! - Infinite recursion (reference and `extends` chains)
//! - Memory exhaustion (oversized remote or file responses)
//! - Hung compilations (unresponsive remote hosts)

use std::time::Duration;

/// Maximum nesting of reference resolution within one chain.
///
/// Cycles are detected precisely; this bounds long acyclic chains
/// (e.g. remote documents that keep referencing new documents).
pub const MAX_RESOLUTION_DEPTH: usize = 32;

/// Default timeout for resolving a single reference, in seconds.
pub const DEFAULT_RESOLVE_TIMEOUT_SECS: u64 = 30;

/// HTTP timeout in seconds for one remote request.
pub const HTTP_TIMEOUT_SECS: u64 = 30;

/// Maximum number of attempts for transient HTTP failures.
pub const MAX_HTTP_RETRIES: u32 = 3;

/// Base delay for exponential backoff (milliseconds).
pub const RETRY_BASE_DELAY_MS: u64 = 500;

/// Maximum size of a remote or file response in bytes (10 MB).
pub const MAX_RESPONSE_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum container nesting an output adapter will serialise.
///
/// Deeper values are reported as a circular-structure diagnostic.
pub const MAX_OUTPUT_DEPTH: usize = 128;

/// User agent sent with remote requests.
pub const USER_AGENT: &str = concat!("markweave/", env!("CARGO_PKG_VERSION"));

/// Tag name the parser turns into reference nodes (`<ref href="id:x"/>`).
pub const REFERENCE_TAG: &str = "ref";

/// Output format used when none is requested.
pub const DEFAULT_FORMAT: &str = "json";

/// Runtime settings for one compiler instance.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilerConfig {
    /// Reject duplicate tag registrations instead of overwriting.
    pub strict_tags: bool,
    /// Upper bound for one reference resolution (handler call).
    pub resolve_timeout: Duration,
    /// Timeout of one HTTP request.
    pub http_timeout: Duration,
    /// Accept invalid TLS certificates for remote references.
    pub insecure_tls: bool,
    pub max_resolution_depth: usize,
    pub max_response_size: u64,
    /// Resolve sibling references concurrently.
    pub concurrent_references: bool,
    pub default_format: String,
    /// Disable the default-adapter fallback for unknown formats.
    pub strict_formats: bool,
}

impl Default for CompilerConfig {
    fn default() -> Self {
        Self {
            strict_tags: false,
            resolve_timeout: Duration::from_secs(DEFAULT_RESOLVE_TIMEOUT_SECS),
            http_timeout: Duration::from_secs(HTTP_TIMEOUT_SECS),
            insecure_tls: false,
            max_resolution_depth: MAX_RESOLUTION_DEPTH,
            max_response_size: MAX_RESPONSE_SIZE,
            concurrent_references: true,
            default_format: DEFAULT_FORMAT.to_string(),
            strict_formats: false,
        }
    }
}

impl CompilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read settings from `MARKWEAVE_*` environment variables.
    ///
    /// Unset or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let flag = |key: &str, default: bool| {
            lookup(key)
                .map(|v| {
                    let v = v.trim().to_ascii_lowercase();
                    v != "false" && v != "0" && !v.is_empty()
                })
                .unwrap_or(default)
        };
        let secs = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .map(Duration::from_secs)
                .unwrap_or(default)
        };

        Self {
            strict_tags: flag("MARKWEAVE_STRICT_TAGS", defaults.strict_tags),
            resolve_timeout: secs("MARKWEAVE_RESOLVE_TIMEOUT_SECS", defaults.resolve_timeout),
            http_timeout: secs("MARKWEAVE_HTTP_TIMEOUT_SECS", defaults.http_timeout),
            insecure_tls: flag("MARKWEAVE_INSECURE_TLS", defaults.insecure_tls),
            max_resolution_depth: lookup("MARKWEAVE_MAX_RESOLUTION_DEPTH")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_resolution_depth),
            max_response_size: lookup("MARKWEAVE_MAX_RESPONSE_SIZE")
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(defaults.max_response_size),
            concurrent_references: flag(
                "MARKWEAVE_CONCURRENT_REFERENCES",
                defaults.concurrent_references,
            ),
            default_format: lookup("MARKWEAVE_DEFAULT_FORMAT")
                .map(|v| v.trim().to_lowercase())
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.default_format),
            strict_formats: flag("MARKWEAVE_STRICT_FORMATS", defaults.strict_formats),
        }
    }

    pub fn with_strict_tags(mut self, strict: bool) -> Self {
        self.strict_tags = strict;
        self
    }

    pub fn with_resolve_timeout(mut self, timeout: Duration) -> Self {
        self.resolve_timeout = timeout;
        self
    }

    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    pub fn with_insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }

    pub fn with_max_resolution_depth(mut self, depth: usize) -> Self {
        self.max_resolution_depth = depth;
        self
    }

    pub fn with_max_response_size(mut self, bytes: u64) -> Self {
        self.max_response_size = bytes;
        self
    }

    pub fn with_concurrent_references(mut self, concurrent: bool) -> Self {
        self.concurrent_references = concurrent;
        self
    }

    pub fn with_default_format(mut self, format: impl Into<String>) -> Self {
        self.default_format = format.into().to_lowercase();
        self
    }

    pub fn with_strict_formats(mut self, strict: bool) -> Self {
        self.strict_formats = strict;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_constants_are_reasonable() {
        assert!(MAX_RESOLUTION_DEPTH >= 8, "Should allow nested references");
        assert!(MAX_RESOLUTION_DEPTH <= 256, "Should bound recursion");

        assert!(MAX_HTTP_RETRIES >= 1);
        assert!(RETRY_BASE_DELAY_MS <= 5_000);

        assert!(MAX_RESPONSE_SIZE >= 1024 * 1024, "Should allow at least 1MB");
        assert!(MAX_OUTPUT_DEPTH >= 32);
        assert!(USER_AGENT.starts_with("markweave/"));
    }

    #[test]
    fn test_from_lookup_reads_values() {
        let env: HashMap<&str, &str> = [
            ("MARKWEAVE_STRICT_TAGS", "true"),
            ("MARKWEAVE_RESOLVE_TIMEOUT_SECS", "5"),
            ("MARKWEAVE_INSECURE_TLS", "1"),
            ("MARKWEAVE_CONCURRENT_REFERENCES", "false"),
            ("MARKWEAVE_DEFAULT_FORMAT", "YAML"),
        ]
        .into_iter()
        .collect();
        let config = CompilerConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));

        assert!(config.strict_tags);
        assert_eq!(config.resolve_timeout, Duration::from_secs(5));
        assert!(config.insecure_tls);
        assert!(!config.concurrent_references);
        assert_eq!(config.default_format, "yaml");
        assert_eq!(config.http_timeout, Duration::from_secs(HTTP_TIMEOUT_SECS));
    }

    #[test]
    fn test_from_lookup_falls_back_on_garbage() {
        let config = CompilerConfig::from_lookup(|k| match k {
            "MARKWEAVE_MAX_RESOLUTION_DEPTH" => Some("lots".to_string()),
            "MARKWEAVE_HTTP_TIMEOUT_SECS" => Some("-1".to_string()),
            _ => None,
        });
        assert_eq!(config, CompilerConfig::default());
    }
}
