//! The validation engine protocol.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::Result;

/// Kind of a validation finding.
///
/// The protocol is closed: the orchestrator treats any other raw kind value
/// as a fatal internal-consistency error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ValidationMessageKind {
    /// The engine itself failed while evaluating a rule.
    InternalFailure = 0,
    /// The database violates a rule.
    Error = 1,
    /// The database is suspicious under a rule.
    Warning = 2,
    /// Informational output from a rule.
    Info = 3,
}

impl TryFrom<u32> for ValidationMessageKind {
    type Error = crate::Error;

    fn try_from(value: u32) -> Result<Self> {
        match value {
            0 => Ok(Self::InternalFailure),
            1 => Ok(Self::Error),
            2 => Ok(Self::Warning),
            3 => Ok(Self::Info),
            other => Err(crate::Error::UnknownValidationMessageKind(other)),
        }
    }
}

/// One finding reported by the validation engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationFinding {
    /// Raw message kind from the engine protocol; see
    /// [`ValidationMessageKind`].
    pub kind: u32,
    /// Name of the rule that produced the finding.
    pub rule: String,
    /// Human-readable description of the finding.
    pub description: String,
    /// Table the finding refers to, when the rule names one.
    pub table: Option<String>,
    /// Column the finding refers to, when the rule names one.
    pub column: Option<String>,
    /// Primary key of the offending row, when the rule names one.
    pub primary_keys: Option<Vec<String>>,
}

impl ValidationFinding {
    /// Creates a finding with no row reference.
    #[must_use]
    pub fn new(
        kind: ValidationMessageKind,
        rule: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            kind: kind as u32,
            rule: rule.into(),
            description: description.into(),
            table: None,
            column: None,
            primary_keys: None,
        }
    }

    /// Attaches the table, column and primary key the finding refers to.
    #[must_use]
    pub fn with_row(
        mut self,
        table: impl Into<String>,
        column: impl Into<String>,
        primary_keys: Vec<String>,
    ) -> Self {
        self.table = Some(table.into());
        self.column = Some(column.into());
        self.primary_keys = Some(primary_keys);
        self
    }
}

/// The external validation engine seam.
///
/// The orchestrator owns scratch-file handling and finding classification;
/// an engine only evaluates rules against the database it is handed. The
/// engine receives the merged suppression set and must not deliver findings
/// for suppressed rules.
pub trait ValidationEngine {
    /// Validates the database at `database_path`.
    ///
    /// # Errors
    ///
    /// Returns an error when the engine cannot run at all; individual rule
    /// findings are returned, not errors.
    fn validate(
        &self,
        database_path: &Path,
        rule_files: &[PathBuf],
        rules: &[String],
        suppressed: &HashSet<String>,
    ) -> Result<Vec<ValidationFinding>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_round_trips_through_raw_values() {
        for kind in [
            ValidationMessageKind::InternalFailure,
            ValidationMessageKind::Error,
            ValidationMessageKind::Warning,
            ValidationMessageKind::Info,
        ] {
            assert_eq!(ValidationMessageKind::try_from(kind as u32).unwrap(), kind);
        }
    }

    #[test]
    fn unknown_kind_is_rejected() {
        assert!(matches!(
            ValidationMessageKind::try_from(7),
            Err(crate::Error::UnknownValidationMessageKind(7))
        ));
    }
}
