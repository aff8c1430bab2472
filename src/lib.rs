#![deny(missing_docs)]
#![allow(dead_code)]
//! # packbind
//!
//! A binder backend for installer packages, built in pure Rust. `packbind`
//! takes an already-resolved symbolic intermediate representation and turns it
//! into a validated relational database of installer tables and a packaged
//! bundle of compressed containers referencing payload files, with diagnostic
//! feedback tied back to original source positions.
//!
//! ## Features
//!
//! - **Relational table model** - Named tables of typed rows with a lossless
//!   serialized form, including embedded table definitions and substorages
//! - **File metadata resolution** - Versions, languages, content hashes and
//!   embedded assembly identity read straight from the staged files
//! - **Deterministic install ordering** - A stable total order over staged
//!   files that minimizes seek cost during physical installation
//! - **Bundle container packaging** - Attached/detached container addressing,
//!   per-payload compression and content hashing
//! - **Database validation** - Orchestrates an external validation engine and
//!   maps its findings back to source positions
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use packbind::prelude::*;
//!
//! // Load a serialized installer database and look up a table.
//! let data = InstallerData::load("product.pdata".as_ref(), false)?;
//! if let Some(table) = data.try_table("File") {
//!     println!("{} staged files", table.rows().len());
//! }
//! # Ok::<(), packbind::Error>(())
//! ```
//!
//! ## Architecture
//!
//! `packbind` is organized into several key modules:
//!
//! - [`data`] - Relational table model and its serialized form
//! - [`bind`] - File facades, the metadata resolver and the order optimizer
//! - [`bundle`] - Container addressing and payload packaging
//! - [`validate`] - Database validation orchestration
//! - [`messaging`] - The injected diagnostic sink all components report to
//! - [`filesystem`] - File system capability seam with retry discipline
//! - [`Error`] and [`Result`] - Comprehensive error handling
//!
//! Every component is a command object: inputs are injected through the
//! constructor, `execute` runs the work, and diagnostics flow through the
//! [`messaging::Messaging`] collaborator rather than a global logger. This
//! keeps each component independently testable with deterministic fakes.
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Build-fatal conditions
//! (oversized files, container write failures, malformed documents) surface
//! as [`Error`]; per-item conditions are reported to the messaging sink and
//! processing continues so a single run can aggregate every diagnostic.

#[macro_use]
mod error;

pub mod bind;
pub mod bundle;
pub mod data;
pub mod filesystem;
pub mod messaging;
pub mod validate;

/// Convenient re-exports of the most commonly used types and traits.
pub mod prelude;

/// Specialized `Result` type for packbind operations.
///
/// All fallible operations in this library return this type.
pub type Result<T> = std::result::Result<T, Error>;

pub use error::Error;
