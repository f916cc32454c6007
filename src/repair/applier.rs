//! Line-level patch application
//!
//! Edits in a [`FileChangeSet`] run strictly in the order given, top to
//! bottom. Each edit's `line_number` addresses the file as it stands after
//! every earlier edit in the same set, so an `add` or `remove` shifts the
//! lines seen by the edits after it. Nothing is reordered or renumbered.

use super::patch::{Edit, EditAction, FileChangeSet, PatchDocument};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors while applying a change set to a file
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to read file {path}: {source}")]
    ReadError { path: PathBuf, source: io::Error },

    #[error("failed to write file {path}: {source}")]
    WriteError { path: PathBuf, source: io::Error },
}

/// Why an edit was not applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The line's trimmed content differs from the trimmed `original_line`
    GuardMismatch { expected: String, found: String },
    /// `line_number` does not address a line (or an append position for `add`)
    OutOfRange { line_number: i64, line_count: usize },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::GuardMismatch { expected, found } => {
                write!(f, "expected {:?}, found {:?}", expected, found)
            }
            SkipReason::OutOfRange {
                line_number,
                line_count,
            } => write!(f, "line {} out of range ({} lines)", line_number, line_count),
        }
    }
}

/// Result of a single edit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditOutcome {
    Applied,
    Skipped(SkipReason),
}

impl EditOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, EditOutcome::Applied)
    }
}

/// What happened to one file
#[derive(Debug, Clone)]
pub struct FileReport {
    /// Name as given in the patch
    pub file_name: String,
    /// Resolved path that was rewritten
    pub path: PathBuf,
    /// Text before the change set ran
    pub before: String,
    /// Text written back
    pub after: String,
    /// One outcome per edit, in patch order
    pub outcomes: Vec<EditOutcome>,
}

impl FileReport {
    pub fn applied_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_applied()).count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes.len() - self.applied_count()
    }

    #[allow(dead_code)]
    pub fn changed(&self) -> bool {
        self.before != self.after
    }
}

/// Apply change sets to files under a base directory
pub struct PatchApplier {
    base_dir: PathBuf,
}

impl PatchApplier {
    /// Relative `file_name`s resolve against `base_dir`
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    /// Apply every file in the document, in order.
    ///
    /// A failing file does not stop the rest; files already rewritten stay
    /// rewritten.
    pub fn apply_document(&self, patch: &PatchDocument) -> Vec<Result<FileReport, ApplyError>> {
        patch.files.iter().map(|set| self.apply(set)).collect()
    }

    /// Apply one change set and overwrite the file.
    ///
    /// The file is left untouched if it cannot be read.
    pub fn apply(&self, change_set: &FileChangeSet) -> Result<FileReport, ApplyError> {
        let path = self.base_dir.join(&change_set.file_name);

        if !path.is_file() {
            return Err(ApplyError::FileNotFound { path });
        }

        let before = fs::read_to_string(&path).map_err(|e| ApplyError::ReadError {
            path: path.clone(),
            source: e,
        })?;

        let (after, outcomes) = apply_edits(&before, &change_set.changes);

        for (edit, outcome) in change_set.changes.iter().zip(&outcomes) {
            if let EditOutcome::Skipped(reason) = outcome {
                tracing::warn!(
                    file = %change_set.file_name,
                    line = edit.line_number,
                    action = ?edit.action,
                    "skipped edit: {}",
                    reason
                );
            }
        }

        fs::write(&path, &after).map_err(|e| ApplyError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        Ok(FileReport {
            file_name: change_set.file_name.clone(),
            path,
            before,
            after,
            outcomes,
        })
    }
}

/// Apply `edits` to `text` in order, returning the new text and one outcome
/// per edit.
///
/// Lines are split on `'\n'` and joined back the same way, so a trailing
/// newline survives as an empty last line.
pub fn apply_edits(text: &str, edits: &[Edit]) -> (String, Vec<EditOutcome>) {
    let mut lines: Vec<String> = text.split('\n').map(String::from).collect();
    let outcomes = edits
        .iter()
        .map(|edit| apply_edit(&mut lines, edit))
        .collect();
    (lines.join("\n"), outcomes)
}

fn apply_edit(lines: &mut Vec<String>, edit: &Edit) -> EditOutcome {
    match edit.action {
        EditAction::Add => {
            // One past the end appends
            match line_index(edit) {
                Some(index) if index <= lines.len() => {
                    lines.insert(index, edit.new_line.clone());
                    EditOutcome::Applied
                }
                _ => out_of_range(edit, lines),
            }
        }
        EditAction::Edit => match guarded_index(lines, edit) {
            Ok(index) => {
                let indent = leading_whitespace(&lines[index]).to_string();
                lines[index] = format!("{}{}", indent, edit.new_line.trim_start());
                EditOutcome::Applied
            }
            Err(outcome) => outcome,
        },
        EditAction::Remove => match guarded_index(lines, edit) {
            Ok(index) => {
                lines.remove(index);
                EditOutcome::Applied
            }
            Err(outcome) => outcome,
        },
    }
}

/// Index of the line an edit targets, if it exists and passes the guard
fn guarded_index(lines: &[String], edit: &Edit) -> Result<usize, EditOutcome> {
    let index = line_index(edit)
        .filter(|&i| i < lines.len())
        .ok_or_else(|| out_of_range(edit, lines))?;

    let found = lines[index].trim();
    let expected = edit.original_line.trim();
    if found != expected {
        return Err(EditOutcome::Skipped(SkipReason::GuardMismatch {
            expected: expected.to_string(),
            found: found.to_string(),
        }));
    }

    Ok(index)
}

/// 0-based index for a 1-based line number; `None` below line 1
fn line_index(edit: &Edit) -> Option<usize> {
    usize::try_from(edit.line_number).ok()?.checked_sub(1)
}

fn out_of_range(edit: &Edit, lines: &[String]) -> EditOutcome {
    EditOutcome::Skipped(SkipReason::OutOfRange {
        line_number: edit.line_number,
        line_count: lines.len(),
    })
}

fn leading_whitespace(line: &str) -> &str {
    &line[..line.len() - line.trim_start().len()]
}
