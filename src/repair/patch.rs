//! Patch document schema and validation
//!
//! The model answers with a JSON document listing line-level edits per file:
//!
//! ```json
//! {
//!   "intent": "print a greeting",
//!   "explanation": "the string literal was missing its opening quote",
//!   "files": [
//!     {
//!       "file_name": "hello.py",
//!       "changes": [
//!         {"action": "edit", "line_number": 2,
//!          "original_line": "print(hello world')",
//!          "new_line": "print('hello world')"}
//!       ]
//!     }
//!   ]
//! }
//! ```

use crate::backend_executor::extract_json;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced while validating a patch document
#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed patch: {reason}")]
    Malformed { reason: String },
}

impl PatchError {
    fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// What an edit does to its line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EditAction {
    /// Insert `new_line` before the line at `line_number`
    #[serde(alias = "Add", alias = "ADD")]
    Add,
    /// Delete the line if it matches `original_line`
    #[serde(alias = "Remove", alias = "REMOVE")]
    Remove,
    /// Replace the line with `new_line` if it matches `original_line`
    #[serde(alias = "Edit", alias = "EDIT")]
    Edit,
}

/// One line-level operation
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Edit {
    pub action: EditAction,

    /// 1-based, relative to the file as it stands when this edit runs.
    ///
    /// Any integer is accepted here; values that do not address a line are
    /// skipped when the edit is applied.
    pub line_number: i64,

    /// Guard for `remove` and `edit`
    #[serde(default)]
    pub original_line: String,

    /// Replacement or inserted text for `add` and `edit`
    #[serde(default)]
    pub new_line: String,
}

#[allow(dead_code)]
impl Edit {
    pub fn add(line_number: i64, new_line: impl Into<String>) -> Self {
        Self {
            action: EditAction::Add,
            line_number,
            original_line: String::new(),
            new_line: new_line.into(),
        }
    }

    pub fn remove(line_number: i64, original_line: impl Into<String>) -> Self {
        Self {
            action: EditAction::Remove,
            line_number,
            original_line: original_line.into(),
            new_line: String::new(),
        }
    }

    pub fn edit(
        line_number: i64,
        original_line: impl Into<String>,
        new_line: impl Into<String>,
    ) -> Self {
        Self {
            action: EditAction::Edit,
            line_number,
            original_line: original_line.into(),
            new_line: new_line.into(),
        }
    }
}

/// All edits for one file, applied in order
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct FileChangeSet {
    pub file_name: String,
    pub changes: Vec<Edit>,
}

/// The model's answer for one repair attempt
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PatchDocument {
    /// What the model thinks the program should do. Advisory only.
    #[serde(default)]
    pub intent: String,

    /// What went wrong and what the edits change. Advisory only.
    #[serde(default)]
    pub explanation: String,

    pub files: Vec<FileChangeSet>,
}

impl PatchDocument {
    /// Total number of edits across all files
    pub fn edit_count(&self) -> usize {
        self.files.iter().map(|f| f.changes.len()).sum()
    }
}

/// Validate raw model output and turn it into a [`PatchDocument`].
///
/// Accepts bare JSON, JSON in a markdown fence, or a JSON object embedded in
/// prose. Line numbers are not checked against any file.
pub fn parse_patch(raw: &str) -> Result<PatchDocument, PatchError> {
    let value =
        extract_json(raw).ok_or_else(|| PatchError::malformed("no JSON object in response"))?;

    serde_json::from_value(value).map_err(|e| PatchError::malformed(e.to_string()))
}
