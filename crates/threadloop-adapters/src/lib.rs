//! Built-in tools for threadloop.
//!
//! - [`filesystem`] -- `list_files`, `read_file`, `write_file`, confined to a
//!   workspace root.
//! - [`shell`] -- `run_cmd`, with a timeout and an output cap.
//!
//! [`builtin_tools`] returns all four, ready to hand to an orchestrator.

pub mod error;
pub mod filesystem;
pub mod shell;

use std::path::PathBuf;
use std::sync::Arc;

use threadloop_agent::Tool;

pub use error::{AdapterError, Result};
pub use filesystem::{ListFilesTool, ReadFileTool, Workspace, WriteFileTool};
pub use shell::RunCmdTool;

/// The four built-in tools, rooted at `root`.
pub fn builtin_tools(root: impl Into<PathBuf>) -> Vec<Arc<dyn Tool>> {
    let workspace = Arc::new(Workspace::new(root));
    let root = workspace.root().to_path_buf();
    vec![
        Arc::new(ListFilesTool::new(workspace.clone())),
        Arc::new(ReadFileTool::new(workspace.clone())),
        Arc::new(WriteFileTool::new(workspace)),
        Arc::new(RunCmdTool::new(root)),
    ]
}
