//! Built-in file resource.
//!
//! Serves workspace files as `file://{path}` resources. Reads are confined
//! to the workspace root; percent-encoded URIs are decoded first.

use async_trait::async_trait;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::{Error, Result};
use crate::protocol::types::{Resource, ResourceContents};
use crate::registry::ResourceHandler;

/// Decode a percent-encoded `file://` URI path to a PathBuf.
fn decode_file_uri(uri: &str) -> Option<PathBuf> {
    uri.strip_prefix("file://").map(|path| {
        let decoded = percent_decode_str(path).decode_utf8_lossy();
        PathBuf::from(decoded.as_ref())
    })
}

/// Workspace file reader.
pub struct FileResource {
    workspace: PathBuf,
}

impl FileResource {
    pub fn new(workspace: impl Into<PathBuf>) -> Self {
        Self {
            workspace: workspace.into(),
        }
    }

    /// Infer a MIME type from the file extension. `None` when there is no
    /// extension to go by.
    fn guess_mime_type(path: &Path) -> Option<String> {
        let ext = path.extension()?.to_str()?;
        let mime = match ext {
            "rs" => "text/x-rust",
            "py" => "text/x-python",
            "js" => "text/javascript",
            "ts" => "text/typescript",
            "tsx" | "jsx" => "text/javascript",
            "php" => "text/x-php",
            "json" => "application/json",
            "yaml" | "yml" => "text/yaml",
            "toml" => "text/x-toml",
            "md" => "text/markdown",
            "html" => "text/html",
            "css" => "text/css",
            "sh" | "bash" => "text/x-shellscript",
            "sql" => "text/x-sql",
            "go" => "text/x-go",
            "java" => "text/x-java",
            "c" | "h" => "text/x-c",
            "cpp" | "hpp" | "cc" => "text/x-c++",
            "rb" => "text/x-ruby",
            "xml" => "application/xml",
            _ => "text/plain",
        };
        Some(mime.to_string())
    }
}

#[async_trait]
impl ResourceHandler for FileResource {
    fn definition(&self) -> Resource {
        Resource {
            uri: "file://{path}".to_string(),
            name: "file".to_string(),
            description: Some("Read a file from the workspace".to_string()),
            mime_type: None,
        }
    }

    async fn read(
        &self,
        uri: &str,
        _params: HashMap<String, Value>,
    ) -> Result<Vec<ResourceContents>> {
        let path = decode_file_uri(uri)
            .ok_or_else(|| Error::InvalidParams(format!("invalid uri scheme: {}", uri)))?;
        let path = if path.is_absolute() {
            path
        } else {
            self.workspace.join(path)
        };

        // Both sides canonicalized so symlinks cannot escape the workspace.
        let workspace = self
            .workspace
            .canonicalize()
            .map_err(|e| Error::InvalidParams(format!("cannot resolve workspace: {}", e)))?;
        let canonical = path
            .canonicalize()
            .map_err(|e| Error::InvalidParams(format!("cannot resolve path: {}", e)))?;

        if !canonical.starts_with(&workspace) {
            return Err(Error::InvalidParams(
                "access denied: path outside workspace".to_string(),
            ));
        }

        let content = fs::read_to_string(&canonical)
            .await
            .map_err(|e| Error::InvalidParams(format!("cannot read file: {}", e)))?;

        Ok(vec![ResourceContents {
            uri: uri.to_string(),
            mime_type: Self::guess_mime_type(&canonical),
            text: Some(content),
        }])
    }
}
