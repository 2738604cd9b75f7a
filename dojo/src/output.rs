//! Output formatting for CLI commands.
//!
//! Provides abstraction layer for outputting results in text or JSON format.

use anyhow::Result;
use dojo_core::{ErrorKind, ExerciseView, NodeKind, SectionMeta, TreeNode};
use serde::Serialize;
use std::io::{self, Write};

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Writer for command output with format abstraction.
pub struct OutputWriter {
    format: OutputFormat,
    stdout: io::Stdout,
}

impl OutputWriter {
    /// Create a new OutputWriter.
    pub fn new(json: bool) -> Self {
        Self {
            format: if json {
                OutputFormat::Json
            } else {
                OutputFormat::Text
            },
            stdout: io::stdout(),
        }
    }

    /// Check if JSON mode is enabled.
    pub fn is_json(&self) -> bool {
        self.format == OutputFormat::Json
    }

    /// Write output using the configured format.
    ///
    /// The `data` parameter must be a serializable struct that includes
    /// `success: bool` and `result_code: u8` fields.
    ///
    /// The `text_fn` closure is called only in text mode to generate the
    /// human-readable output.
    pub fn write<T: Serialize>(&self, data: &T, text_fn: impl FnOnce() -> String) -> Result<()> {
        match self.format {
            OutputFormat::Json => {
                let json = serde_json::to_string_pretty(data)?;
                writeln!(&self.stdout, "{}", json)?;
            }
            OutputFormat::Text => {
                let text = text_fn();
                if !text.is_empty() {
                    write!(&self.stdout, "{}", text)?;
                }
            }
        }
        Ok(())
    }

    /// Write an error message to stderr.
    ///
    /// In JSON mode, writes a JSON error object with success=false.
    /// In text mode, writes the error message directly.
    pub fn write_error(&self, error: &anyhow::Error, result_code: u8) {
        match self.format {
            OutputFormat::Json => {
                let error_output = ErrorOutput {
                    success: false,
                    result_code,
                    error: format!("{:#}", error),
                };
                if let Ok(json) = serde_json::to_string_pretty(&error_output) {
                    let _ = writeln!(io::stderr(), "{}", json);
                }
            }
            OutputFormat::Text => {
                let _ = writeln!(io::stderr(), "Error: {:#}", error);
            }
        }
    }
}

/// Map an error to the process exit code and JSON `result_code`.
pub fn result_code(error: &anyhow::Error) -> u8 {
    let kind = error
        .chain()
        .find_map(|cause| cause.downcast_ref::<dojo_core::Error>())
        .map(dojo_core::Error::kind);

    match kind {
        Some(ErrorKind::InvalidPath) => 2,
        Some(ErrorKind::NotFound) => 3,
        Some(ErrorKind::Conflict) => 4,
        Some(ErrorKind::CorruptMetadata) => 5,
        Some(ErrorKind::StorageFailure) => 6,
        None => 1,
    }
}

/// Render a forest as an indented outline.
pub fn format_tree(nodes: &[TreeNode]) -> String {
    fn walk(nodes: &[TreeNode], depth: usize, out: &mut String) {
        for node in nodes {
            let marker = match node.kind {
                NodeKind::Section => "+",
                NodeKind::Exercise => "-",
            };
            out.push_str(&format!("{}{} {}\n", "  ".repeat(depth), marker, node.name));
            if let Some(children) = &node.children {
                walk(children, depth + 1, out);
            }
        }
    }

    let mut out = String::new();
    walk(nodes, 0, &mut out);
    out
}

// ============================================================================
// Data Transfer Objects (DTOs) for JSON output
// ============================================================================

/// Error output structure.
#[derive(Debug, Serialize)]
pub struct ErrorOutput {
    pub success: bool,
    pub result_code: u8,
    pub error: String,
}

/// Output for `init` command.
#[derive(Debug, Serialize)]
pub struct InitOutput {
    pub success: bool,
    pub result_code: u8,
    pub root: String,
    pub seeded: bool,
}

/// Output for `tree` command.
#[derive(Debug, Serialize)]
pub struct TreeOutput {
    pub success: bool,
    pub result_code: u8,
    pub nodes: Vec<TreeNode>,
}

/// Data variants for `show` command.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ShowData {
    Section { path: String, section: SectionMeta },
    Exercise(ExerciseView),
}

/// Output for `show` command.
#[derive(Debug, Serialize)]
pub struct ShowOutput {
    pub success: bool,
    pub result_code: u8,
    #[serde(flatten)]
    pub data: ShowData,
}

/// Output for commands that create or rename a node.
#[derive(Debug, Serialize)]
pub struct PathOutput {
    pub success: bool,
    pub result_code: u8,
    pub path: String,
}

/// Output for commands that only report completion.
#[derive(Debug, Serialize)]
pub struct DoneOutput {
    pub success: bool,
    pub result_code: u8,
}

/// Stored file reported by `file upload`.
#[derive(Debug, Clone, Serialize)]
pub struct UploadedFile {
    pub source: String,
    pub stored_as: String,
}

/// Output for `file upload` command.
#[derive(Debug, Serialize)]
pub struct UploadOutput {
    pub success: bool,
    pub result_code: u8,
    pub exercise: String,
    pub files: Vec<UploadedFile>,
}

/// Status line and headers of `file stream`, written to stderr.
#[derive(Debug, Serialize)]
pub struct StreamHeadOutput {
    pub success: bool,
    pub result_code: u8,
    pub status: u16,
    pub headers: Vec<(String, String)>,
}
