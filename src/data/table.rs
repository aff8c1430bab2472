//! Tables and their definitions.

use crate::data::{ColumnDefinition, Row};
use crate::messaging::SourcePosition;
use crate::Result;

/// Definition of a table: its name, its ordered column schema, and whether it
/// is a metadata-only ("unreal") table that never reaches the built database.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDefinition {
    /// Table name, unique within a database.
    pub name: String,
    /// Ordered column definitions.
    pub columns: Vec<ColumnDefinition>,
    /// Metadata-only tables are excluded from validation-position indexing
    /// and never written to the physical database.
    pub unreal: bool,
}

impl TableDefinition {
    /// Creates a real table definition.
    #[must_use]
    pub fn new(name: impl Into<String>, columns: Vec<ColumnDefinition>) -> Self {
        Self {
            name: name.into(),
            columns,
            unreal: false,
        }
    }

    /// Marks the table as metadata-only.
    #[must_use]
    pub fn unreal(mut self) -> Self {
        self.unreal = true;
        self
    }

    /// The index of the column named `name`.
    #[must_use]
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.name == name)
    }
}

/// A named table: a definition plus an ordered sequence of rows.
///
/// Row insertion order is preserved; it is semantically meaningful for
/// sequenced tables and must survive a serialization round trip.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    definition: TableDefinition,
    rows: Vec<Row>,
}

impl Table {
    /// Creates an empty table from its definition.
    #[must_use]
    pub fn new(definition: TableDefinition) -> Self {
        Self {
            definition,
            rows: Vec::new(),
        }
    }

    /// The table's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// The table's definition.
    #[must_use]
    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    /// The table's rows in insertion order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Mutable access to the table's rows.
    pub fn rows_mut(&mut self) -> &mut Vec<Row> {
        &mut self.rows
    }

    /// Appends a schema-shaped all-null row and returns it for population.
    pub fn new_row(&mut self, source: Option<SourcePosition>) -> &mut Row {
        self.rows.push(Row::new(&self.definition, source));
        self.rows.last_mut().expect("row was just pushed")
    }

    /// Appends an existing row, validating its shape against the schema.
    ///
    /// # Errors
    ///
    /// Returns an error when the row's field count differs from the table's
    /// column count.
    pub fn add_row(&mut self, row: Row) -> Result<()> {
        if row.len() != self.definition.columns.len() {
            return Err(malformed_error!(
                "Row with {} fields added to table '{}' which has {} columns",
                row.len(),
                self.definition.name,
                self.definition.columns.len()
            ));
        }

        self.rows.push(row);
        Ok(())
    }

    /// The primary key of `row` under this table's schema, with parts joined
    /// by `separator`.
    #[must_use]
    pub fn row_primary_key(&self, row: &Row, separator: char) -> Option<String> {
        row.primary_key(&self.definition, separator)
    }
}
