//! The validation orchestrator.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::data::InstallerData;
use crate::filesystem::FileSystem;
use crate::messaging::{Message, Messaging, SourcePosition};
use crate::validate::{ValidationEngine, ValidationFinding, ValidationMessageKind};
use crate::Result;

/// Rules that have equivalent-or-better checks earlier in this toolchain and
/// are therefore always suppressed, merged with any caller suppressions.
pub const BUILT_IN_SUPPRESSED_RULES: &[&str] = &["ICE08", "ICE33", "ICE47", "ICE66"];

/// Progress of a validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationState {
    /// Not started.
    Idle,
    /// Copying the database to its scratch location.
    CopyingWorkingFile,
    /// The external engine is running.
    Validating,
    /// Finished successfully (findings may still have been reported).
    Done,
    /// An I/O or protocol error aborted the run.
    Failed,
}

/// Command that validates a finished database.
///
/// The database is copied to a scratch working path first; the external
/// engine mutates its target, so the original is never validated in place.
/// The scratch copy is deleted when the command returns, success or failure.
pub struct ValidateDatabase<'a> {
    messaging: &'a dyn Messaging,
    filesystem: &'a dyn FileSystem,
    engine: &'a dyn ValidationEngine,
    intermediate_folder: &'a Path,
    database_path: &'a Path,
    data: Option<&'a InstallerData>,
    rule_files: &'a [PathBuf],
    rules: &'a [String],
    suppressed_rules: &'a [String],
    state: ValidationState,
    fallback_position: SourcePosition,
    position_index: Option<HashMap<String, SourcePosition>>,
}

impl<'a> ValidateDatabase<'a> {
    /// Creates the command.
    ///
    /// `data` is the in-memory model of the database being validated; when
    /// supplied, findings that name a table, column and primary key resolve
    /// to the row's authored source position. `suppressed_rules` are merged
    /// with [`BUILT_IN_SUPPRESSED_RULES`].
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        messaging: &'a dyn Messaging,
        filesystem: &'a dyn FileSystem,
        engine: &'a dyn ValidationEngine,
        intermediate_folder: &'a Path,
        database_path: &'a Path,
        data: Option<&'a InstallerData>,
        rule_files: &'a [PathBuf],
        rules: &'a [String],
        suppressed_rules: &'a [String],
    ) -> Self {
        Self {
            messaging,
            filesystem,
            engine,
            intermediate_folder,
            database_path,
            data,
            rule_files,
            rules,
            suppressed_rules,
            state: ValidationState::Idle,
            fallback_position: SourcePosition::new(database_path.display().to_string()),
            position_index: None,
        }
    }

    /// Progress of the run; [`ValidationState::Done`] or
    /// [`ValidationState::Failed`] after [`execute`](Self::execute) returns.
    #[must_use]
    pub fn state(&self) -> ValidationState {
        self.state
    }

    /// Runs validation.
    ///
    /// # Errors
    ///
    /// Returns an error when the scratch copy cannot be prepared, the engine
    /// fails to run, or a finding carries an out-of-protocol message kind.
    /// Rule findings themselves are reported through the messaging
    /// collaborator, not returned as errors; build success is the caller's
    /// decision based on accumulated error state.
    pub fn execute(&mut self) -> Result<()> {
        let started = Instant::now();
        self.messaging.write(Message::validating_database());

        let working_path = self.working_path();

        // The scratch copy is removed on every exit path, including errors;
        // this is the one place a crash mid-run could otherwise leak a file.
        let _cleanup = ScratchFile {
            filesystem: self.filesystem,
            path: working_path.clone(),
        };

        self.state = ValidationState::CopyingWorkingFile;
        let outcome = self.run(&working_path);

        self.state = match outcome {
            Ok(()) => ValidationState::Done,
            Err(_) => ValidationState::Failed,
        };
        outcome?;

        self.messaging
            .write(Message::validated_database(started.elapsed().as_millis()));
        Ok(())
    }

    /// Scratch file name: the database name with a `_validate` marker, in
    /// the intermediate folder.
    fn working_path(&self) -> PathBuf {
        let stem = self
            .database_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        let extension = self
            .database_path
            .extension()
            .map(|extension| format!(".{}", extension.to_string_lossy()))
            .unwrap_or_default();

        self.intermediate_folder
            .join(format!("{stem}_validate{extension}"))
    }

    fn run(&mut self, working_path: &Path) -> Result<()> {
        self.filesystem
            .copy_file(self.database_path, working_path)?;

        // The engine requires write access to its target.
        self.filesystem.clear_readonly(working_path)?;

        let suppressed: HashSet<String> = BUILT_IN_SUPPRESSED_RULES
            .iter()
            .map(ToString::to_string)
            .chain(self.suppressed_rules.iter().cloned())
            .collect();

        self.state = ValidationState::Validating;
        let findings =
            self.engine
                .validate(working_path, self.rule_files, self.rules, &suppressed)?;

        for finding in findings {
            // A conforming engine never delivers suppressed findings; drop
            // them here in case one does anyway.
            if suppressed.contains(&finding.rule) {
                continue;
            }

            self.report_finding(&finding)?;
        }

        Ok(())
    }

    fn report_finding(&mut self, finding: &ValidationFinding) -> Result<()> {
        let position = self.finding_position(finding);

        match ValidationMessageKind::try_from(finding.kind)? {
            ValidationMessageKind::InternalFailure | ValidationMessageKind::Error => {
                self.messaging.write(Message::validation_error(
                    Some(position),
                    &finding.rule,
                    &finding.description,
                ));
            }
            ValidationMessageKind::Warning => {
                self.messaging.write(Message::validation_warning(
                    Some(position),
                    &finding.rule,
                    &finding.description,
                ));
            }
            ValidationMessageKind::Info => {
                self.messaging
                    .write(Message::validation_info(&finding.rule, &finding.description));
            }
        }

        Ok(())
    }

    /// Resolves the source position of a finding: the authored position of
    /// the named row when the index has one, otherwise a position synthesized
    /// from the database's own path.
    fn finding_position(&mut self, finding: &ValidationFinding) -> SourcePosition {
        let (Some(table), Some(_column), Some(primary_keys)) =
            (&finding.table, &finding.column, &finding.primary_keys)
        else {
            return self.fallback_position.clone();
        };

        let Some(data) = self.data else {
            return self.fallback_position.clone();
        };

        if self.position_index.is_none() {
            self.position_index = Some(build_position_index(data, self.messaging));
        }

        let key = format!("{}:{}", table, primary_keys.join(";"));
        self.position_index
            .as_ref()
            .and_then(|index| index.get(&key).cloned())
            .unwrap_or_else(|| self.fallback_position.clone())
    }
}

/// Indexes the authored source position of every real table's rows by
/// `table-name:primary-key`. Duplicate primary keys are reported once and
/// the first registration wins.
fn build_position_index(
    data: &InstallerData,
    messaging: &dyn Messaging,
) -> HashMap<String, SourcePosition> {
    let mut index = HashMap::new();

    for table in data.sorted_tables() {
        if table.definition().unreal {
            continue;
        }

        for row in table.rows() {
            let Some(source) = row.source() else {
                continue;
            };

            let Some(primary_key) = table.row_primary_key(row, ';') else {
                continue;
            };

            let key = format!("{}:{}", table.name(), primary_key);
            if index.contains_key(&key) {
                messaging.write(Message::duplicate_primary_key(
                    Some(source.clone()),
                    &primary_key,
                    table.name(),
                ));
            } else {
                index.insert(key, source.clone());
            }
        }
    }

    index
}

/// Deletes the scratch working copy when dropped, so cleanup survives every
/// error path.
struct ScratchFile<'a> {
    filesystem: &'a dyn FileSystem,
    path: PathBuf,
}

impl Drop for ScratchFile<'_> {
    fn drop(&mut self) {
        let _ = self
            .filesystem
            .delete_file(&self.path, false, crate::filesystem::StdFileSystem::DEFAULT_RETRIES);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{ColumnDefinition, ColumnKind, OutputType, TableDefinition};
    use crate::filesystem::StdFileSystem;
    use crate::messaging::MessageCollector;
    use std::sync::Mutex;

    /// Engine fake: records its inputs, returns configured findings, and can
    /// fail or leave a marker proving it saw the scratch copy.
    #[derive(Default)]
    struct FakeEngine {
        findings: Vec<ValidationFinding>,
        fail: bool,
        seen: Mutex<Vec<(PathBuf, Vec<String>)>>,
    }

    impl ValidationEngine for FakeEngine {
        fn validate(
            &self,
            database_path: &Path,
            _rule_files: &[PathBuf],
            _rules: &[String],
            suppressed: &HashSet<String>,
        ) -> Result<Vec<ValidationFinding>> {
            let mut suppressed: Vec<String> = suppressed.iter().cloned().collect();
            suppressed.sort();
            self.seen
                .lock()
                .unwrap()
                .push((database_path.to_path_buf(), suppressed));

            if self.fail {
                return Err(crate::Error::Error("engine crashed".into()));
            }

            assert!(database_path.exists(), "scratch copy must exist");
            Ok(self.findings.clone())
        }
    }

    struct Scenario {
        _temp: tempfile::TempDir,
        intermediate: PathBuf,
        database: PathBuf,
    }

    fn scenario() -> Scenario {
        let temp = tempfile::tempdir().unwrap();
        let intermediate = temp.path().join("obj");
        std::fs::create_dir_all(&intermediate).unwrap();
        let database = temp.path().join("product.msi");
        std::fs::write(&database, b"database bytes").unwrap();
        Scenario {
            intermediate,
            database,
            _temp: temp,
        }
    }

    fn sample_data() -> InstallerData {
        let mut data = InstallerData::new(OutputType::Package, None);
        let table = data.ensure_table(&TableDefinition::new(
            "File",
            vec![
                ColumnDefinition::new("File", ColumnKind::String).primary_key(),
                ColumnDefinition::new("FileName", ColumnKind::String),
            ],
        ));

        let row = table.new_row(Some(SourcePosition::with_line("product.pxs", 21)));
        row.set(0, Some("FileA".into()));
        row.set(1, Some("a.dll".into()));

        // A duplicate primary key; the first registration must win.
        let row = table.new_row(Some(SourcePosition::with_line("product.pxs", 22)));
        row.set(0, Some("FileA".into()));
        row.set(1, Some("a2.dll".into()));

        data
    }

    fn run(
        scenario: &Scenario,
        engine: &FakeEngine,
        data: Option<&InstallerData>,
        suppressed: &[String],
    ) -> (MessageCollector, Result<()>, ValidationState) {
        let messaging = MessageCollector::new();
        let filesystem = StdFileSystem;
        let mut command = ValidateDatabase::new(
            &messaging,
            &filesystem,
            engine,
            &scenario.intermediate,
            &scenario.database,
            data,
            &[],
            &[],
            suppressed,
        );
        let result = command.execute();
        let state = command.state();
        (messaging, result, state)
    }

    fn scratch_path(scenario: &Scenario) -> PathBuf {
        scenario.intermediate.join("product_validate.msi")
    }

    #[test]
    fn scratch_copy_is_removed_on_success() {
        let scenario = scenario();
        let engine = FakeEngine::default();

        let (_, result, state) = run(&scenario, &engine, None, &[]);

        result.unwrap();
        assert_eq!(state, ValidationState::Done);
        assert!(!scratch_path(&scenario).exists());
        // The original database is untouched.
        assert!(scenario.database.exists());

        let seen = engine.seen.lock().unwrap();
        assert_eq!(seen[0].0, scratch_path(&scenario));
    }

    #[test]
    fn scratch_copy_is_removed_when_engine_fails() {
        let scenario = scenario();
        let engine = FakeEngine {
            fail: true,
            ..Default::default()
        };

        let (_, result, state) = run(&scenario, &engine, None, &[]);

        assert!(result.is_err());
        assert_eq!(state, ValidationState::Failed);
        assert!(!scratch_path(&scenario).exists());
    }

    #[test]
    fn scratch_copy_is_removed_when_copy_fails() {
        let scenario = scenario();
        std::fs::remove_file(&scenario.database).unwrap();
        let engine = FakeEngine::default();

        let (_, result, state) = run(&scenario, &engine, None, &[]);

        assert!(result.is_err());
        assert_eq!(state, ValidationState::Failed);
        assert!(!scratch_path(&scenario).exists());
    }

    #[test]
    fn built_in_suppressions_merge_with_callers() {
        let scenario = scenario();
        let engine = FakeEngine::default();

        let (_, result, _) = run(&scenario, &engine, None, &["ICE99".to_string()]);
        result.unwrap();

        let seen = engine.seen.lock().unwrap();
        let suppressed = &seen[0].1;
        for rule in ["ICE08", "ICE33", "ICE47", "ICE66", "ICE99"] {
            assert!(suppressed.contains(&rule.to_string()), "missing {rule}");
        }
    }

    #[test]
    fn findings_classify_and_resolve_positions() {
        let scenario = scenario();
        let data = sample_data();
        let engine = FakeEngine {
            findings: vec![
                ValidationFinding::new(
                    ValidationMessageKind::Error,
                    "ICE01",
                    "broken reference",
                )
                .with_row("File", "FileName", vec!["FileA".to_string()]),
                ValidationFinding::new(ValidationMessageKind::Warning, "ICE02", "suspicious"),
                ValidationFinding::new(ValidationMessageKind::Info, "ICE03", "note"),
            ],
            ..Default::default()
        };

        let (messaging, result, _) = run(&scenario, &engine, Some(&data), &[]);
        result.unwrap();

        let messages = messaging.messages();

        // The error resolved to the authored row position; the first of the
        // duplicate rows won the index slot.
        let error = messages.iter().find(|m| m.id == 306).unwrap();
        assert_eq!(
            error.source.as_ref().unwrap(),
            &SourcePosition::with_line("product.pxs", 21)
        );
        assert!(error.text.contains("ICE01"));

        // Indexing reported the duplicate primary key once.
        assert_eq!(messages.iter().filter(|m| m.id == 1104).count(), 1);

        // The warning without a row reference fell back to the database path.
        let warning = messages.iter().find(|m| m.id == 1105).unwrap();
        assert_eq!(
            warning.source.as_ref().unwrap().file,
            scenario.database.display().to_string()
        );

        assert!(messages.iter().any(|m| m.id == 9002));
        assert!(messaging.encountered_error());
    }

    #[test]
    fn finding_without_model_falls_back_to_database_path() {
        let scenario = scenario();
        let engine = FakeEngine {
            findings: vec![ValidationFinding::new(
                ValidationMessageKind::Error,
                "ICE01",
                "broken reference",
            )
            .with_row("File", "FileName", vec!["FileA".to_string()])],
            ..Default::default()
        };

        let (messaging, result, _) = run(&scenario, &engine, None, &[]);
        result.unwrap();

        let error = messaging.messages().into_iter().find(|m| m.id == 306).unwrap();
        assert_eq!(
            error.source.unwrap().file,
            scenario.database.display().to_string()
        );
    }

    #[test]
    fn unknown_message_kind_is_fatal() {
        let scenario = scenario();
        let engine = FakeEngine {
            findings: vec![ValidationFinding {
                kind: 9,
                rule: "ICE01".into(),
                description: "?".into(),
                table: None,
                column: None,
                primary_keys: None,
            }],
            ..Default::default()
        };

        let (_, result, state) = run(&scenario, &engine, None, &[]);

        assert!(matches!(
            result,
            Err(crate::Error::UnknownValidationMessageKind(9))
        ));
        assert_eq!(state, ValidationState::Failed);
        assert!(!scratch_path(&scenario).exists());
    }

    #[test]
    fn unreal_tables_are_not_indexed() {
        let scenario = scenario();

        let mut data = InstallerData::new(OutputType::Package, None);
        let table = data.ensure_table(
            &TableDefinition::new(
                "Metadata",
                vec![ColumnDefinition::new("Id", ColumnKind::String).primary_key()],
            )
            .unreal(),
        );
        let row = table.new_row(Some(SourcePosition::with_line("product.pxs", 5)));
        row.set(0, Some("M1".into()));

        let engine = FakeEngine {
            findings: vec![ValidationFinding::new(
                ValidationMessageKind::Error,
                "ICE01",
                "broken",
            )
            .with_row("Metadata", "Id", vec!["M1".to_string()])],
            ..Default::default()
        };

        let (messaging, result, _) = run(&scenario, &engine, Some(&data), &[]);
        result.unwrap();

        // The unreal row is invisible to the index, so the finding falls back.
        let error = messaging.messages().into_iter().find(|m| m.id == 306).unwrap();
        assert_eq!(
            error.source.unwrap().file,
            scenario.database.display().to_string()
        );
    }
}
