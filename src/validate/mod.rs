//! Database validation orchestration.
//!
//! Copies a built database to a scratch location, invokes an external
//! validation engine against the copy, and maps every finding back to a
//! source position using an index built from the in-memory table model.
//!
//! # Key Components
//!
//! - [`ValidationEngine`] - Protocol seam for the external engine
//! - [`ValidationFinding`] / [`ValidationMessageKind`] - The finding protocol
//! - [`ValidateDatabase`] - The orchestrator command and its state machine

mod engine;
mod orchestrator;

pub use engine::{ValidationEngine, ValidationFinding, ValidationMessageKind};
pub use orchestrator::{ValidateDatabase, ValidationState, BUILT_IN_SUPPRESSED_RULES};
