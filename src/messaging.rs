//! Diagnostic messages and the injected messaging collaborator.
//!
//! Every component in this library reports its diagnostics to a single
//! [`Messaging`] sink injected at construction time. Error-level messages mark
//! the run as failed without aborting it, so one build can aggregate every
//! problem before the caller decides to stop; build-fatal conditions use
//! [`crate::Error`] instead.
//!
//! Well-known messages carry stable numeric ids grouped by area: binder
//! errors start at 300, binder warnings at 1100, bundle warnings at 8500 and
//! verbose messages at 9000.

use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Mutex,
};

/// A position in an original source document, used to tie diagnostics back
/// to the authored input that produced a row, facade or container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourcePosition {
    /// Path of the source document.
    pub file: String,
    /// One-based line number, when known.
    pub line: Option<u32>,
}

impl SourcePosition {
    /// Creates a position referring to a whole file.
    #[must_use]
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            line: None,
        }
    }

    /// Creates a position referring to a specific line of a file.
    #[must_use]
    pub fn with_line(file: impl Into<String>, line: u32) -> Self {
        Self {
            file: file.into(),
            line: Some(line),
        }
    }
}

impl fmt::Display for SourcePosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "{}({})", self.file, line),
            None => write!(f, "{}", self.file),
        }
    }
}

/// Severity of a diagnostic message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Severity {
    /// The run is failed; processing continues so further errors aggregate.
    Error,
    /// Suspicious but allowed; never stops processing.
    Warning,
    /// Informational chatter, typically only shown in verbose output.
    Verbose,
}

/// A single diagnostic message with a stable id, severity, optional source
/// position and formatted text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Stable numeric identifier of the message.
    pub id: u32,
    /// Severity of the message.
    pub severity: Severity,
    /// Source position the message refers to, when one could be resolved.
    pub source: Option<SourcePosition>,
    /// Human-readable message text.
    pub text: String,
}

impl Message {
    /// Creates a message from raw parts.
    #[must_use]
    pub fn new(
        id: u32,
        severity: Severity,
        source: Option<SourcePosition>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id,
            severity,
            source,
            text: text.into(),
        }
    }

    // Binder errors: 300..=399.

    /// The source path of a staged file is not a usable file name.
    #[must_use]
    pub fn invalid_file_name(source: Option<SourcePosition>, path: &str) -> Self {
        Self::new(
            300,
            Severity::Error,
            source,
            format!("Invalid file name '{path}'."),
        )
    }

    /// A staged file does not exist on the build machine.
    #[must_use]
    pub fn cannot_find_file(
        source: Option<SourcePosition>,
        file_id: &str,
        file_name: &str,
        path: &str,
    ) -> Self {
        Self::new(
            301,
            Severity::Error,
            source,
            format!("The file '{file_id}' with name '{file_name}' cannot be found at '{path}'."),
        )
    }

    /// A machine-global managed assembly has no strong-name signature.
    #[must_use]
    pub fn assembly_requires_strong_name(
        source: Option<SourcePosition>,
        path: &str,
        component_id: &str,
    ) -> Self {
        Self::new(
            302,
            Severity::Error,
            source,
            format!(
                "The assembly '{path}' in component '{component_id}' is installed machine-global \
                 and must have a strong name."
            ),
        )
    }

    /// The file name of a machine-global assembly disagrees with its
    /// resolved assembly name.
    #[must_use]
    pub fn assembly_identity_mismatch(
        source: Option<SourcePosition>,
        file_name: &str,
        assembly_name: &str,
    ) -> Self {
        Self::new(
            303,
            Severity::Error,
            source,
            format!(
                "The file name '{file_name}' does not match the assembly name '{assembly_name}'; \
                 installing the assembly machine-global would fail."
            ),
        )
    }

    /// A native assembly references a manifest file that is not staged.
    #[must_use]
    pub fn missing_manifest(
        source: Option<SourcePosition>,
        file_id: &str,
        manifest_ref: &str,
    ) -> Self {
        Self::new(
            304,
            Severity::Error,
            source,
            format!(
                "The native assembly file '{file_id}' references the manifest file \
                 '{manifest_ref}' which is not part of the package."
            ),
        )
    }

    /// Reading the identity of an assembly failed.
    #[must_use]
    pub fn assembly_identity_failure(
        source: Option<SourcePosition>,
        path: &str,
        detail: &str,
    ) -> Self {
        Self::new(
            305,
            Severity::Error,
            source,
            format!("Failed to read the assembly identity of '{path}': {detail}"),
        )
    }

    /// A validation rule reported an error against the built database.
    #[must_use]
    pub fn validation_error(source: Option<SourcePosition>, rule: &str, description: &str) -> Self {
        Self::new(
            306,
            Severity::Error,
            source,
            format!("{rule}: {description}"),
        )
    }

    // Binder warnings: 1100..=1199.

    /// A version was authored for an unversioned file and no companion file
    /// matches it.
    #[must_use]
    pub fn default_version_used_for_unversioned_file(
        source: Option<SourcePosition>,
        version: &str,
        file_id: &str,
    ) -> Self {
        Self::new(
            1100,
            Severity::Warning,
            source,
            format!(
                "The file '{file_id}' has no embedded version, but version '{version}' was \
                 authored for it. The authored version will be used, which can cause repair and \
                 patching to misbehave."
            ),
        )
    }

    /// A language was authored for an unversioned file.
    #[must_use]
    pub fn default_language_used_for_unversioned_file(
        source: Option<SourcePosition>,
        language: &str,
        file_id: &str,
    ) -> Self {
        Self::new(
            1101,
            Severity::Warning,
            source,
            format!(
                "The file '{file_id}' has no embedded version, but language '{language}' was \
                 authored for it. The authored language will be used."
            ),
        )
    }

    /// A language was authored for a versioned file that has none embedded.
    #[must_use]
    pub fn default_language_used_for_versioned_file(
        source: Option<SourcePosition>,
        language: &str,
        file_id: &str,
    ) -> Self {
        Self::new(
            1102,
            Severity::Warning,
            source,
            format!(
                "The versioned file '{file_id}' has no embedded language, but language \
                 '{language}' was authored for it. The authored language will be used."
            ),
        )
    }

    /// A resolved assembly-name attribute came back empty.
    #[must_use]
    pub fn null_assembly_name_value(
        source: Option<SourcePosition>,
        component_id: &str,
        name: &str,
    ) -> Self {
        Self::new(
            1103,
            Severity::Warning,
            source,
            format!(
                "The assembly in component '{component_id}' resolved an empty value for its \
                 '{name}' attribute; the attribute is skipped."
            ),
        )
    }

    /// Two rows of one table share a primary key; the first registration wins.
    #[must_use]
    pub fn duplicate_primary_key(
        source: Option<SourcePosition>,
        primary_key: &str,
        table: &str,
    ) -> Self {
        Self::new(
            1104,
            Severity::Warning,
            source,
            format!(
                "The primary key '{primary_key}' is duplicated in table '{table}'. The first row \
                 keeps the key for diagnostic lookups."
            ),
        )
    }

    /// A validation rule reported a warning against the built database.
    #[must_use]
    pub fn validation_warning(
        source: Option<SourcePosition>,
        rule: &str,
        description: &str,
    ) -> Self {
        Self::new(
            1105,
            Severity::Warning,
            source,
            format!("{rule}: {description}"),
        )
    }

    // Bundle warnings: 8500..=8999.

    /// A declared container has no payloads and is dropped.
    #[must_use]
    pub fn empty_container(source: Option<SourcePosition>, container_id: &str) -> Self {
        Self::new(
            8502,
            Severity::Warning,
            source,
            format!("The container '{container_id}' is being ignored because it doesn't have any payloads."),
        )
    }

    // Verbose messages: 9000 and up.

    /// Database validation is starting.
    #[must_use]
    pub fn validating_database() -> Self {
        Self::new(9000, Severity::Verbose, None, "Validating database.")
    }

    /// Database validation finished.
    #[must_use]
    pub fn validated_database(elapsed_ms: u128) -> Self {
        Self::new(
            9001,
            Severity::Verbose,
            None,
            format!("Validated database in {elapsed_ms}ms."),
        )
    }

    /// A validation rule reported an informational finding.
    #[must_use]
    pub fn validation_info(rule: &str, description: &str) -> Self {
        Self::new(
            9002,
            Severity::Verbose,
            None,
            format!("{rule}: {description}"),
        )
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(source) => write!(f, "{} : {} PKB{:04} : {}", source, self.severity, self.id, self.text),
            None => write!(f, "{} PKB{:04} : {}", self.severity, self.id, self.text),
        }
    }
}

/// The diagnostic sink all components write to.
///
/// Injected as a capability rather than held as ambient state so components
/// stay independently testable. Implementations must be safe to share across
/// the resolver's parallel workers.
pub trait Messaging: Send + Sync {
    /// Records a diagnostic message.
    fn write(&self, message: Message);

    /// Whether any error-level message was written so far.
    ///
    /// Callers check this before proceeding to packaging or serialization;
    /// the container packager also consults it to short-circuit packing.
    fn encountered_error(&self) -> bool;
}

/// A [`Messaging`] implementation that collects every message in memory.
#[derive(Debug, Default)]
pub struct MessageCollector {
    messages: Mutex<Vec<Message>>,
    errored: AtomicBool,
}

impl MessageCollector {
    /// Creates an empty collector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of every message written so far.
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.messages.lock().expect("message lock poisoned").clone()
    }
}

impl Messaging for MessageCollector {
    fn write(&self, message: Message) {
        if message.severity == Severity::Error {
            self.errored.store(true, Ordering::Relaxed);
        }

        self.messages
            .lock()
            .expect("message lock poisoned")
            .push(message);
    }

    fn encountered_error(&self) -> bool {
        self.errored.load(Ordering::Relaxed)
    }
}
