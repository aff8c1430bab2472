//! Column schema for installer tables.

/// The runtime type of a column, consulted when rows are constructed and when
/// the serialized form is parsed back into typed field values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
pub enum ColumnKind {
    /// Text data.
    #[strum(serialize = "string")]
    String,
    /// 32-bit signed integer data.
    #[strum(serialize = "number")]
    Number,
    /// A reference to a named binary stream.
    #[strum(serialize = "stream")]
    Stream,
}

/// Definition of a single column: name, type and key/null metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    /// Column name, unique within its table.
    pub name: String,
    /// Runtime type of the column's field values.
    pub kind: ColumnKind,
    /// Whether the column participates in the table's primary key.
    pub primary_key: bool,
    /// Whether rows may leave this column null.
    pub nullable: bool,
}

impl ColumnDefinition {
    /// Creates a non-key, non-nullable column.
    #[must_use]
    pub fn new(name: impl Into<String>, kind: ColumnKind) -> Self {
        Self {
            name: name.into(),
            kind,
            primary_key: false,
            nullable: false,
        }
    }

    /// Marks the column as part of the table's primary key.
    #[must_use]
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Marks the column as nullable.
    #[must_use]
    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }
}
