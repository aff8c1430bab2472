//! Relational table model for installer databases.
//!
//! An [`InstallerData`] owns a collection of named [`Table`]s, each holding an
//! ordered sequence of typed [`Row`]s. Insertion order of rows is semantically
//! meaningful and preserved; tables are written out sorted by name. The model
//! round-trips losslessly through a structured-text serialized form, including
//! table-definition metadata and nested substorages (patch transforms).
//!
//! # Key Components
//!
//! - [`InstallerData`] - The database: tables by name, output type, codepage, substorages
//! - [`Table`] / [`TableDefinition`] - A named table and its column schema
//! - [`Row`] / [`FieldValue`] - A row of schema-shaped, typed field values
//! - [`ColumnDefinition`] / [`ColumnKind`] - Per-column type and key metadata
//!
//! # Example
//!
//! ```rust
//! use packbind::data::{ColumnDefinition, ColumnKind, FieldValue, InstallerData, OutputType, TableDefinition};
//!
//! let definition = TableDefinition::new(
//!     "Property",
//!     vec![
//!         ColumnDefinition::new("Property", ColumnKind::String).primary_key(),
//!         ColumnDefinition::new("Value", ColumnKind::String),
//!     ],
//! );
//!
//! let mut data = InstallerData::new(OutputType::Package, None);
//! let table = data.ensure_table(&definition);
//! let row = table.new_row(None);
//! row.set(0, Some(FieldValue::String("ProductName".into())));
//! row.set(1, Some(FieldValue::String("Example".into())));
//! ```

mod column;
mod database;
mod field;
mod row;
mod serialize;
mod table;

pub use column::{ColumnDefinition, ColumnKind};
pub use database::{InstallerData, OutputType, SubStorage};
pub use field::FieldValue;
pub use row::Row;
pub use serialize::FORMAT_VERSION;
pub use table::{Table, TableDefinition};
