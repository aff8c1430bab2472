//! Table rows.

use crate::data::{FieldValue, TableDefinition};
use crate::messaging::SourcePosition;

/// One row of a table: a schema-shaped vector of optional field values plus
/// the source position of the authoring that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    fields: Vec<Option<FieldValue>>,
    source: Option<SourcePosition>,
}

impl Row {
    /// Creates an all-null row shaped after `definition`.
    #[must_use]
    pub fn new(definition: &TableDefinition, source: Option<SourcePosition>) -> Self {
        Self {
            fields: vec![None; definition.columns.len()],
            source,
        }
    }

    /// Creates a row from already-shaped parts. The caller is responsible for
    /// matching the field count to the table definition.
    #[must_use]
    pub(crate) fn from_parts(
        fields: Vec<Option<FieldValue>>,
        source: Option<SourcePosition>,
    ) -> Self {
        Self { fields, source }
    }

    /// Number of fields in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The field at `index`, or `None` when null or out of range.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&FieldValue> {
        self.fields.get(index).and_then(Option::as_ref)
    }

    /// Sets the field at `index`, normalizing empty strings to null.
    ///
    /// # Panics
    ///
    /// Panics when `index` is outside the row's schema.
    pub fn set(&mut self, index: usize, value: Option<FieldValue>) {
        self.fields[index] = FieldValue::normalize(value);
    }

    /// All fields in column order.
    #[must_use]
    pub fn fields(&self) -> &[Option<FieldValue>] {
        &self.fields
    }

    /// The source position of the authoring that produced this row.
    #[must_use]
    pub fn source(&self) -> Option<&SourcePosition> {
        self.source.as_ref()
    }

    /// Replaces the row's source position.
    pub fn set_source(&mut self, source: Option<SourcePosition>) {
        self.source = source;
    }

    /// The row's primary key: its designated key fields joined by
    /// `separator`, in column order. Null key fields contribute an empty
    /// part. Returns `None` when the table has no key columns or every key
    /// part is empty.
    #[must_use]
    pub fn primary_key(&self, definition: &TableDefinition, separator: char) -> Option<String> {
        let mut parts = Vec::new();

        for (index, column) in definition.columns.iter().enumerate() {
            if column.primary_key {
                parts.push(self.get(index).map(ToString::to_string).unwrap_or_default());
            }
        }

        if parts.is_empty() || parts.iter().all(String::is_empty) {
            None
        } else {
            Some(parts.join(&separator.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnDefinition, ColumnKind};

    fn file_definition() -> TableDefinition {
        TableDefinition::new(
            "File",
            vec![
                ColumnDefinition::new("File", ColumnKind::String).primary_key(),
                ColumnDefinition::new("Component", ColumnKind::String).primary_key(),
                ColumnDefinition::new("Sequence", ColumnKind::Number).nullable(),
            ],
        )
    }

    #[test]
    fn primary_key_joins_key_fields() {
        let definition = file_definition();
        let mut row = Row::new(&definition, None);
        row.set(0, Some("FileA".into()));
        row.set(1, Some("CompA".into()));

        assert_eq!(row.primary_key(&definition, ';').unwrap(), "FileA;CompA");
        assert_eq!(row.primary_key(&definition, '/').unwrap(), "FileA/CompA");
    }

    #[test]
    fn primary_key_with_null_part() {
        let definition = file_definition();
        let mut row = Row::new(&definition, None);
        row.set(0, Some("FileA".into()));

        assert_eq!(row.primary_key(&definition, ';').unwrap(), "FileA;");
    }

    #[test]
    fn primary_key_none_when_all_parts_empty() {
        let definition = file_definition();
        let row = Row::new(&definition, None);
        assert_eq!(row.primary_key(&definition, ';'), None);

        let keyless = TableDefinition::new(
            "Keyless",
            vec![ColumnDefinition::new("Value", ColumnKind::String)],
        );
        let mut row = Row::new(&keyless, None);
        row.set(0, Some("x".into()));
        assert_eq!(row.primary_key(&keyless, ';'), None);
    }

    #[test]
    fn set_normalizes_empty_string() {
        let definition = file_definition();
        let mut row = Row::new(&definition, None);
        row.set(0, Some("".into()));
        assert_eq!(row.get(0), None);
    }
}
