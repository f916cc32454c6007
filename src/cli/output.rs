//! Output handlers for the repair loop
//!
//! Supports console (pretty), JSON lines, and quiet output modes.

use crate::repair::diff::colorize;
use serde::{Deserialize, Serialize};

const YELLOW: &str = "\x1b[33m";
const RESET: &str = "\x1b[0m";

/// Output mode for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Console,
    Json,
    Quiet,
}

/// Events emitted as the repair loop moves between states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RepairEvent {
    Start {
        target: String,
        code: String,
    },
    ProbeFinished {
        output: String,
        failed: bool,
        exit_code: Option<i32>,
    },
    Fixing {
        attempt: u32,
        max_attempts: u32,
    },
    PatchReceived {
        text: String,
    },
    PatchRejected {
        error: String,
        retries_left: u32,
    },
    PatchAccepted {
        explanation: String,
        files: usize,
        edits: usize,
    },
    FileChanged {
        file: String,
        /// Plain unified diff, empty if nothing changed
        diff: String,
        applied: usize,
        skipped: usize,
    },
    FileFailed {
        file: String,
        error: String,
    },
    Fixed {
        attempts: u32,
    },
    GaveUp {
        attempts: u32,
    },
}

/// Output handler trait
pub trait OutputHandler: Send + Sync {
    fn emit(&self, event: RepairEvent);
}

/// Console output handler with colors
pub struct ConsoleHandler {
    debug: bool,
}

impl ConsoleHandler {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Text printed for an event
    fn format_event(&self, event: &RepairEvent) -> String {
        match event {
            RepairEvent::Start { target, code } => {
                format!("Original Code ({}):\n{}\n", target, code)
            }
            RepairEvent::ProbeFinished {
                output,
                failed,
                exit_code,
            } => {
                if self.debug {
                    let code = exit_code.map_or("none".to_string(), |c| c.to_string());
                    format!("Output (exit code {}, failed: {}):\n{}\n", code, failed, output)
                } else {
                    format!("Output:\n{}\n", output)
                }
            }
            RepairEvent::Fixing {
                attempt,
                max_attempts,
            } => format!("Fixing code... (attempt {}/{})\n", attempt, max_attempts),
            RepairEvent::PatchReceived { text } => format!("Raw fix:\n{}\n", text),
            RepairEvent::PatchRejected {
                error,
                retries_left,
            } => format!(
                "Could not use the suggested fix ({}), asking again ({} retries left)",
                error, retries_left
            ),
            RepairEvent::PatchAccepted {
                explanation,
                files,
                edits,
            } => format!(
                "Fix: {}\n({} edits across {} files)\n",
                explanation, edits, files
            ),
            RepairEvent::FileChanged {
                file,
                diff,
                applied,
                skipped,
            } => {
                let mut text = format!("{}{}{}\n", YELLOW, file, RESET);
                if diff.is_empty() {
                    text.push_str("(no changes)\n");
                } else {
                    text.push_str(&colorize(diff));
                    text.push('\n');
                }
                if *skipped > 0 {
                    text.push_str(&format!(
                        "{} of {} edits did not match the file and were skipped\n",
                        skipped,
                        applied + skipped
                    ));
                }
                text
            }
            RepairEvent::FileFailed { file, error } => {
                format!("Could not patch {}: {}\n", file, error)
            }
            RepairEvent::Fixed { attempts } => match attempts {
                0 => "Code ran without errors, nothing to fix.".to_string(),
                1 => "Code is error-free after 1 fix!".to_string(),
                n => format!("Code is error-free after {} fixes!", n),
            },
            RepairEvent::GaveUp { attempts } => {
                format!("Still failing after {} fix attempts, giving up.", attempts)
            }
        }
    }
}

impl OutputHandler for ConsoleHandler {
    fn emit(&self, event: RepairEvent) {
        println!("{}", self.format_event(&event));
    }
}

/// JSON lines output handler
pub struct JsonHandler;

impl OutputHandler for JsonHandler {
    fn emit(&self, event: RepairEvent) {
        if let Ok(line) = serde_json::to_string(&event) {
            println!("{}", line);
        }
    }
}

/// Quiet handler that emits nothing; the exit code carries the result
pub struct QuietHandler;

impl OutputHandler for QuietHandler {
    fn emit(&self, _event: RepairEvent) {}
}

/// Create an output handler based on mode
pub fn create_handler(mode: OutputMode, debug: bool) -> Box<dyn OutputHandler> {
    match mode {
        OutputMode::Console => Box::new(ConsoleHandler::new(debug)),
        OutputMode::Json => Box::new(JsonHandler),
        OutputMode::Quiet => Box::new(QuietHandler),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_json_shape() {
        let event = RepairEvent::Fixing {
            attempt: 2,
            max_attempts: 5,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "fixing");
        assert_eq!(json["attempt"], 2);

        let back: RepairEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_console_colors_diff() {
        let handler = ConsoleHandler::new(false);
        let text = handler
            .format_event(&RepairEvent::FileChanged {
                file: "hello.py".into(),
                diff: "--- a/hello.py\n+++ b/hello.py\n@@ -1 +1 @@\n-x\n+y\n".into(),
                applied: 1,
                skipped: 0,
            });

        assert!(text.starts_with("\x1b[33mhello.py\x1b[0m\n"));
        assert!(text.contains("\x1b[32m+y\x1b[0m"));
        assert!(!text.contains("skipped"));
    }

    #[test]
    fn test_console_reports_skips() {
        let handler = ConsoleHandler::new(false);
        let text = handler
            .format_event(&RepairEvent::FileChanged {
                file: "hello.py".into(),
                diff: String::new(),
                applied: 0,
                skipped: 2,
            });

        assert!(text.contains("(no changes)"));
        assert!(text.contains("2 of 2 edits"));
    }

    #[test]
    fn test_raw_patch_always_shown() {
        let event = RepairEvent::PatchReceived {
            text: r#"{"files": []}"#.into(),
        };
        for debug in [false, true] {
            let text = ConsoleHandler::new(debug).format_event(&event);
            assert!(text.starts_with("Raw fix:\n"));
            assert!(text.contains(r#"{"files": []}"#));
        }
    }

    #[test]
    fn test_debug_adds_exit_code() {
        let event = RepairEvent::ProbeFinished {
            output: "boom".into(),
            failed: true,
            exit_code: Some(1),
        };

        let plain = ConsoleHandler::new(false).format_event(&event);
        assert_eq!(plain, "Output:\nboom\n");

        let verbose = ConsoleHandler::new(true).format_event(&event);
        assert!(verbose.starts_with("Output (exit code 1, failed: true):"));
    }

    #[test]
    fn test_create_handler() {
        let _ = create_handler(OutputMode::Console, false);
        let _ = create_handler(OutputMode::Json, false);
        let _ = create_handler(OutputMode::Quiet, false);
    }
}
