//! CLI support for mend
//!
//! Output handlers turn repair loop events into console text, JSON lines,
//! or nothing at all.
//!
//! # Example
//!
//! ```ignore
//! use mend::cli::{create_handler, OutputMode};
//!
//! let handler = create_handler(OutputMode::Console, false);
//! let outcome = repair_loop.run(&*handler).await;
//! ```

pub mod output;

pub use output::{OutputHandler, OutputMode, RepairEvent, create_handler};
