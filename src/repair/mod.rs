//! Repair loop for mend
//!
//! This module handles:
//! - Running the target and spotting the failure marker in its output
//! - Validating the model's patch document
//! - Applying line-level edits to files, in order, with a content guard
//! - Rendering before/after diffs
//! - Looping until the target runs clean or the attempt budget is spent
//!
//! # Example
//!
//! ```ignore
//! use mend::repair::{RepairLoop, RepairOutcome};
//!
//! let repair = RepairLoop::new(&target, &cwd, backend, &config.repair)?
//!     .with_intent(intent);
//!
//! match repair.run(&*handler).await {
//!     RepairOutcome::Success { attempts, .. } => println!("fixed in {} attempts", attempts),
//!     RepairOutcome::Exhausted { .. } => println!("gave up"),
//!     RepairOutcome::Fatal(e) => eprintln!("error: {}", e),
//! }
//! ```

mod applier;
mod controller;
pub mod diff;
mod patch;
mod probe;
mod prompt;

#[allow(unused_imports)]
pub use applier::{ApplyError, EditOutcome, FileReport, PatchApplier, SkipReason, apply_edits};
pub use controller::{RepairError, RepairLoop, RepairOutcome};
#[allow(unused_imports)]
pub use patch::{Edit, EditAction, FileChangeSet, PatchDocument, PatchError, parse_patch};
#[allow(unused_imports)]
pub use probe::{ExecutionProbe, ExecutionResult, ProbeError};
#[allow(unused_imports)]
pub use prompt::{PromptBuilder, PromptContext, PromptError};
