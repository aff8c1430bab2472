//! The installer database: tables, type, codepage and substorages.

use std::collections::HashMap;

use crate::data::{Table, TableDefinition};
use crate::messaging::SourcePosition;
use crate::Result;

/// The kind of output a database describes.
///
/// The legacy `Product` spelling parses as [`OutputType::Package`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum OutputType {
    /// A self-extracting bundle of packages.
    Bundle,
    /// A merge module.
    Module,
    /// A patch.
    Patch,
    /// A patch-creation description.
    PatchCreation,
    /// An installation package.
    #[strum(to_string = "Package", serialize = "Package", serialize = "Product")]
    Package,
    /// A database transform.
    Transform,
}

/// A nested database representing a transform, carried inside its parent
/// database under its own name.
#[derive(Debug, Clone)]
pub struct SubStorage {
    /// Name of the substorage within its parent.
    pub name: String,
    /// The nested database.
    pub data: InstallerData,
}

impl SubStorage {
    /// Creates a substorage.
    #[must_use]
    pub fn new(name: impl Into<String>, data: InstallerData) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// An installer database: a collection of uniquely-named tables plus the
/// output type, codepage, source position and any substorages.
///
/// Table lookup by name is O(1); the serialized form writes tables sorted by
/// name regardless of registration order.
#[derive(Debug, Clone, Default)]
pub struct InstallerData {
    /// The kind of output this database describes.
    pub output_type: OutputType,
    /// ANSI codepage of the database, `0` when unspecified.
    pub codepage: i32,
    /// Substorages nested in this database.
    pub substorages: Vec<SubStorage>,
    source: Option<SourcePosition>,
    tables: HashMap<String, Table>,
}

impl Default for OutputType {
    fn default() -> Self {
        Self::Package
    }
}

impl InstallerData {
    /// Creates an empty database.
    #[must_use]
    pub fn new(output_type: OutputType, source: Option<SourcePosition>) -> Self {
        Self {
            output_type,
            codepage: 0,
            substorages: Vec::new(),
            source,
            tables: HashMap::new(),
        }
    }

    /// The source position this database was created from.
    #[must_use]
    pub fn source(&self) -> Option<&SourcePosition> {
        self.source.as_ref()
    }

    /// Ensures this database contains a table for `definition`.
    ///
    /// Idempotent: returns the existing table when one is already registered
    /// under the definition's name, otherwise registers and returns a new
    /// empty table.
    pub fn ensure_table(&mut self, definition: &TableDefinition) -> &mut Table {
        self.tables
            .entry(definition.name.clone())
            .or_insert_with(|| Table::new(definition.clone()))
    }

    /// The table named `name`, if registered.
    #[must_use]
    pub fn try_table(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    /// Mutable access to the table named `name`, if registered.
    pub fn try_table_mut(&mut self, name: &str) -> Option<&mut Table> {
        self.tables.get_mut(name)
    }

    /// Registers an already-built table.
    ///
    /// # Errors
    ///
    /// Returns an error when a table with the same name is already
    /// registered; table names are unique within a database.
    pub fn add_table(&mut self, table: Table) -> Result<()> {
        let name = table.name().to_string();

        if self.tables.contains_key(&name) {
            return Err(malformed_error!("Duplicate table '{}'", name));
        }

        self.tables.insert(name, table);
        Ok(())
    }

    /// Number of registered tables.
    #[must_use]
    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    /// All tables in unspecified order.
    pub fn tables(&self) -> impl Iterator<Item = &Table> {
        self.tables.values()
    }

    /// All tables sorted by name, the order the serialized form uses.
    #[must_use]
    pub fn sorted_tables(&self) -> Vec<&Table> {
        let mut tables: Vec<&Table> = self.tables.values().collect();
        tables.sort_by(|a, b| a.name().cmp(b.name()));
        tables
    }
}
