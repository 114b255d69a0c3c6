//! Filesystem tools: `list_files`, `read_file` and `write_file`.
//!
//! Paths are resolved against a root directory and may not escape it.
//! Absolute paths are accepted when they fall inside the root.

use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use threadloop_agent::{Tool, ToolDefinition};
use tracing::debug;

use crate::error::{AdapterError, Result};

/// Maximum characters returned by `read_file` before truncation.
pub const MAX_FILE_READ_CHARS: usize = 16_000;

/// The directory every filesystem tool is confined to.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a tool-supplied path and check that it stays under the root.
    fn resolve(&self, raw_path: &str, tool_name: &str) -> Result<PathBuf> {
        let candidate = if Path::new(raw_path).is_absolute() {
            PathBuf::from(raw_path)
        } else {
            self.root.join(raw_path)
        };

        // The target may not exist yet, so normalize lexically.
        let normalized = normalize_path(&candidate);

        if !normalized.starts_with(&self.root) {
            return Err(AdapterError::InvalidParams {
                tool_name: tool_name.to_owned(),
                reason: format!(
                    "path `{raw_path}` resolves to `{}` which is outside the root directory `{}`",
                    normalized.display(),
                    self.root.display(),
                ),
            });
        }

        Ok(normalized)
    }
}

/// Collapse `.` and `..` components without touching the filesystem.
fn normalize_path(path: &Path) -> PathBuf {
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                if matches!(components.last(), Some(Component::Normal(_))) {
                    components.pop();
                } else {
                    components.push(component);
                }
            }
            Component::CurDir => {}
            _ => components.push(component),
        }
    }
    components.iter().collect()
}

fn require_str<'a>(args: &'a Value, field: &str, tool_name: &str) -> Result<&'a str> {
    args.get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| AdapterError::InvalidParams {
            tool_name: tool_name.to_owned(),
            reason: format!("missing required string field `{field}`"),
        })
}

/// Cut `raw` to [`MAX_FILE_READ_CHARS`] characters, appending a notice.
fn truncate_file_text(raw: String) -> String {
    match raw.char_indices().nth(MAX_FILE_READ_CHARS) {
        Some((end, _)) => {
            let total_chars = raw.chars().count();
            format!(
                "{}\n\n[... file truncated at {MAX_FILE_READ_CHARS} chars ({total_chars} total)]",
                &raw[..end]
            )
        }
        None => raw,
    }
}

// ---------------------------------------------------------------------------
// list_files
// ---------------------------------------------------------------------------

/// Lists the entries of a directory, one name per line, sorted.
#[derive(Debug, Clone)]
pub struct ListFilesTool {
    workspace: Arc<Workspace>,
}

impl ListFilesTool {
    pub const NAME: &'static str = "list_files";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: &Value) -> Result<String> {
        let directory = require_str(args, "directory", Self::NAME)?;
        let path = self.workspace.resolve(directory, Self::NAME)?;
        debug!(path = %path.display(), "listing directory");

        let mut entries = tokio::fs::read_dir(&path).await?;
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
        names.sort();
        Ok(names.join("\n"))
    }
}

#[async_trait]
impl Tool for ListFilesTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "List all files and subdirectories in a directory.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "Directory to list, relative to the workspace root"
                    }
                },
                "required": ["directory"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> threadloop_agent::Result<String> {
        self.run(&arguments)
            .await
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// read_file
// ---------------------------------------------------------------------------

/// Reads a UTF-8 text file.
#[derive(Debug, Clone)]
pub struct ReadFileTool {
    workspace: Arc<Workspace>,
}

impl ReadFileTool {
    pub const NAME: &'static str = "read_file";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: &Value) -> Result<String> {
        let file_path = require_str(args, "file_path", Self::NAME)?;
        let path = self.workspace.resolve(file_path, Self::NAME)?;
        debug!(path = %path.display(), "reading file");

        let raw = tokio::fs::read_to_string(&path).await?;
        Ok(truncate_file_text(raw))
    }
}

#[async_trait]
impl Tool for ReadFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "Read the contents of a text file.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to read, relative to the workspace root"
                    }
                },
                "required": ["file_path"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> threadloop_agent::Result<String> {
        self.run(&arguments)
            .await
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}

// ---------------------------------------------------------------------------
// write_file
// ---------------------------------------------------------------------------

/// Writes a text file, overwriting it if present and creating parent
/// directories.
#[derive(Debug, Clone)]
pub struct WriteFileTool {
    workspace: Arc<Workspace>,
}

impl WriteFileTool {
    pub const NAME: &'static str = "write_file";

    pub fn new(workspace: Arc<Workspace>) -> Self {
        Self { workspace }
    }

    async fn run(&self, args: &Value) -> Result<String> {
        let file_path = require_str(args, "file_path", Self::NAME)?;
        let content = require_str(args, "content", Self::NAME)?;
        let path = self.workspace.resolve(file_path, Self::NAME)?;
        debug!(path = %path.display(), bytes = content.len(), "writing file");

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, content).await?;

        Ok(format!("file written: {file_path}"))
    }
}

#[async_trait]
impl Tool for WriteFileTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: Self::NAME.into(),
            description: "Write content to a file, overwriting it if it already exists.".into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "File to write, relative to the workspace root"
                    },
                    "content": {
                        "type": "string",
                        "description": "Full text content of the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        }
    }

    async fn execute(&self, arguments: Value) -> threadloop_agent::Result<String> {
        self.run(&arguments)
            .await
            .map_err(|e| e.into_agent_error(Self::NAME))
    }
}
