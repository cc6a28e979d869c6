use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{decode_content, ContentKind};
use crate::config::MAX_RESPONSE_SIZE;
use crate::context::ProcessingContext;
use crate::error::ReferenceError;
use crate::node::Resolved;
use crate::protocol::ProtocolHandler;
use crate::uri::ReferenceUri;

/// Resolves `file:` references from the local filesystem.
///
/// Relative paths are resolved against the directory of the document being
/// processed. Both `file:parts/a.xml` and `file:///abs/a.xml` are accepted.
/// The extension decides how the content is decoded.
#[derive(Debug, Clone)]
pub struct FileHandler {
    max_size: u64,
}

impl Default for FileHandler {
    fn default() -> Self {
        Self::new(MAX_RESPONSE_SIZE)
    }
}

impl FileHandler {
    pub fn new(max_size: u64) -> Self {
        Self { max_size }
    }

    fn locate(&self, path: &str, ctx: &ProcessingContext) -> PathBuf {
        // file:///abs/path keeps "///abs/path" as its path
        let path = path.strip_prefix("//").unwrap_or(path);
        let path = Path::new(path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            ctx.base_dir().join(path)
        }
    }
}

#[async_trait]
impl ProtocolHandler for FileHandler {
    fn name(&self) -> &str {
        "file"
    }

    fn can_handle(&self, protocol: &str) -> bool {
        protocol == "file"
    }

    async fn handle(
        &self,
        uri: &ReferenceUri,
        ctx: &ProcessingContext,
    ) -> Result<Resolved, ReferenceError> {
        let key = uri.key();
        let path = self.locate(uri.path(), ctx);
        let io_error = |e: std::io::Error| match e.kind() {
            std::io::ErrorKind::NotFound => ReferenceError::NotFound { uri: key.clone() },
            _ => ReferenceError::Io {
                uri: key.clone(),
                message: e.to_string(),
            },
        };

        let metadata = tokio::fs::metadata(&path).await.map_err(io_error)?;
        if metadata.len() > self.max_size {
            return Err(ReferenceError::Io {
                uri: key.clone(),
                message: format!(
                    "file is {} bytes, limit is {} bytes",
                    metadata.len(),
                    self.max_size
                ),
            });
        }

        tracing::debug!(uri = %key, path = %path.display(), "Reading file reference");
        let text = tokio::fs::read_to_string(&path).await.map_err(io_error)?;
        decode_content(&key, &text, ContentKind::from_extension(uri.path()))
    }
}
