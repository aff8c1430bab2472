//! Resolves physical file metadata onto facades.
//!
//! For every facade with a source path, fills in size, version, language,
//! content hash and assembly identity by reading the actual file, applying
//! the precedence rules between authored and discovered values, and reporting
//! per-file warnings and errors through the messaging collaborator.
//!
//! Per-file work is independent across facades and fans out over a rayon
//! pool. Diagnostics within one facade keep their fixed sequence; ordering
//! across facades is not guaranteed and must not be relied upon.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

use dashmap::DashMap;
use rayon::prelude::*;

use crate::bind::{
    AssemblyKind, FileFacade, FileMetadataProbe, ManagedIdentity, ManifestIdentity,
};
use crate::messaging::{Message, Messaging};
use crate::{Error, Result};

/// Command that enriches file facades with physical metadata.
///
/// Only build-fatal conditions (an oversized file) abort the run; everything
/// else is reported through the messaging collaborator and leaves the facade
/// in its prior, possibly incomplete state.
pub struct ResolveFileMetadata<'a> {
    messaging: &'a dyn Messaging,
    probe: &'a dyn FileMetadataProbe,
    overwrite_hash: bool,
    variable_cache: Option<&'a DashMap<String, String>>,
}

impl<'a> ResolveFileMetadata<'a> {
    /// Creates the command.
    ///
    /// `overwrite_hash` enables hashing of unversioned files and the
    /// companion-file heuristics tied to it. When `variable_cache` is
    /// supplied, resolved metadata is recorded under `fileversion.<id>`,
    /// `filelanguage.<id>`, `assembly<attr>.<id>` and
    /// `assemblyfullname.<id>` keys for later text-substitution stages.
    #[must_use]
    pub fn new(
        messaging: &'a dyn Messaging,
        probe: &'a dyn FileMetadataProbe,
        overwrite_hash: bool,
        variable_cache: Option<&'a DashMap<String, String>>,
    ) -> Self {
        Self {
            messaging,
            probe,
            overwrite_hash,
            variable_cache,
        }
    }

    /// Resolves every facade that has a source path.
    ///
    /// # Errors
    ///
    /// Returns an error for build-fatal conditions only: a file whose size
    /// exceeds the 32-bit signed maximum of the table format.
    pub fn execute(&self, facades: &mut [FileFacade]) -> Result<()> {
        // The companion-file heuristic asks whether an authored version names
        // another facade's id; an id set built once answers that with results
        // identical to scanning all facades per file.
        let ids: HashSet<String> = facades.iter().map(|facade| facade.id.clone()).collect();

        // Native assemblies locate their manifest facade by id.
        let source_paths: HashMap<String, Option<PathBuf>> = facades
            .iter()
            .map(|facade| (facade.id.clone(), facade.source_path.clone()))
            .collect();

        facades
            .par_iter_mut()
            .try_for_each(|facade| self.resolve_facade(facade, &ids, &source_paths))
    }

    fn resolve_facade(
        &self,
        facade: &mut FileFacade,
        ids: &HashSet<String>,
        source_paths: &HashMap<String, Option<PathBuf>>,
    ) -> Result<()> {
        let Some(source_path) = facade.source_path.clone() else {
            return Ok(());
        };

        let Some(path) = self.probe.canonicalize(&source_path) else {
            self.messaging.write(Message::invalid_file_name(
                facade.source.clone(),
                &source_path.display().to_string(),
            ));
            return Ok(());
        };

        if !self.probe.exists(&path) {
            self.messaging.write(Message::cannot_find_file(
                facade.source.clone(),
                &facade.id,
                &facade.file_name,
                &path.display().to_string(),
            ));
            return Ok(());
        }

        let size = self.probe.file_size(&path)?;
        if size > i32::MAX as u64 {
            return Err(Error::FileTooLarge {
                path: path.display().to_string(),
            });
        }
        facade.file_size = Some(size as i32);

        let info = self.probe.version_info(&path)?;

        // If there is no version, it is assumed there is no language because
        // it won't matter in the versioning of the install.
        match info.version {
            None => {
                // Unversioned files have their hashes recorded instead.
                if !self.overwrite_hash {
                    // Not overwriting hashes, so skip the rest of these options.
                } else if let Some(authored) = facade.version.as_deref() {
                    // An authored version on an unversioned file is either a
                    // companion-file reference (another facade's id) that must
                    // be left untouched, or a default version the author chose
                    // to provide. The latter is allowed but risky, so point it
                    // out.
                    if !ids.contains(authored) {
                        self.messaging
                            .write(Message::default_version_used_for_unversioned_file(
                                facade.source.clone(),
                                authored,
                                &facade.id,
                            ));
                    }
                } else {
                    if let Some(language) = facade.language.as_deref() {
                        self.messaging
                            .write(Message::default_language_used_for_unversioned_file(
                                facade.source.clone(),
                                language,
                                &facade.id,
                            ));
                    }

                    facade.hash = Some(self.probe.file_hash(&path)?);
                }
            }
            Some(discovered) => {
                if facade.version.is_none() {
                    // No version was authored; use the version from the file
                    // itself. This is the most common case.
                    facade.version = Some(discovered);
                } else if !ids.contains(facade.version.as_deref().unwrap_or_default()) {
                    // The authored version is not a companion-file reference,
                    // so it was a literal default. Once a real version exists,
                    // defaults lose priority.
                    facade.version = Some(discovered);
                }

                match info.language {
                    None if facade.language.is_some() => {
                        let language = facade.language.clone().unwrap_or_default();
                        self.messaging
                            .write(Message::default_language_used_for_versioned_file(
                                facade.source.clone(),
                                &language,
                                &facade.id,
                            ));
                    }
                    discovered => {
                        // The language from the file itself overrides the
                        // authored default, even when the file has none.
                        facade.language = discovered;
                    }
                }
            }
        }

        if let Some(cache) = self.variable_cache {
            cache.insert(
                format!("fileversion.{}", facade.id),
                facade.version.clone().unwrap_or_default(),
            );
            cache.insert(
                format!("filelanguage.{}", facade.id),
                facade.language.clone().unwrap_or_default(),
            );
        }

        if let Some(assembly) = facade.assembly.clone() {
            match assembly.kind {
                AssemblyKind::Managed => {
                    let version = facade.version.clone();
                    match self.probe.managed_identity(&path, version.as_deref()) {
                        Ok(identity) => self.apply_managed_identity(
                            facade,
                            &path,
                            assembly.application_ref.as_deref(),
                            &identity,
                        ),
                        Err(error) => {
                            self.messaging.write(Message::assembly_identity_failure(
                                facade.source.clone(),
                                &path.display().to_string(),
                                &error.to_string(),
                            ));
                        }
                    }
                }
                AssemblyKind::Native => {
                    let manifest_ref = assembly.manifest_ref.clone().unwrap_or_default();
                    let Some(manifest_path) =
                        source_paths.get(&manifest_ref).and_then(Clone::clone)
                    else {
                        self.messaging.write(Message::missing_manifest(
                            facade.source.clone(),
                            &facade.id,
                            &manifest_ref,
                        ));
                        return Ok(());
                    };

                    match self.probe.manifest_identity(&manifest_path) {
                        Ok(identity) => self.apply_manifest_identity(facade, &identity),
                        Err(error) => {
                            self.messaging.write(Message::assembly_identity_failure(
                                facade.source.clone(),
                                &manifest_path.display().to_string(),
                                &error.to_string(),
                            ));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn apply_managed_identity(
        &self,
        facade: &mut FileFacade,
        path: &std::path::Path,
        application_ref: Option<&str>,
        identity: &ManagedIdentity,
    ) {
        let machine_global = application_ref.is_none();

        self.set_assembly_name(facade, machine_global, "name", identity.name.as_deref());
        self.set_assembly_name(facade, machine_global, "culture", identity.culture.as_deref());
        self.set_assembly_name(facade, machine_global, "version", identity.version.as_deref());

        if identity.architecture.is_some() {
            self.set_assembly_name(
                facade,
                machine_global,
                "processorArchitecture",
                identity.architecture.as_deref(),
            );
        }

        if identity.strong_named {
            self.set_assembly_name(
                facade,
                machine_global,
                "publicKeyToken",
                identity.public_key_token.as_deref(),
            );
        } else if machine_global {
            // Machine-global registration requires a verifiable identity.
            self.messaging.write(Message::assembly_requires_strong_name(
                facade.source.clone(),
                &path.display().to_string(),
                &facade.component_id,
            ));
            return;
        }

        if identity.file_version.is_some() {
            self.set_assembly_name(
                facade,
                machine_global,
                "fileVersion",
                identity.file_version.as_deref(),
            );
        }

        if let Some(cache) = self.variable_cache {
            cache.insert(
                format!("assemblyfullname.{}", facade.id),
                identity.full_name(),
            );
        }
    }

    fn apply_manifest_identity(&self, facade: &mut FileFacade, identity: &ManifestIdentity) {
        // Only the attributes present in the manifest are recorded; native
        // assemblies have no strong-name requirement.
        if identity.name.is_some() {
            self.set_assembly_name(facade, false, "name", identity.name.as_deref());
        }
        if identity.version.is_some() {
            self.set_assembly_name(facade, false, "version", identity.version.as_deref());
        }
        if identity.kind.is_some() {
            self.set_assembly_name(facade, false, "type", identity.kind.as_deref());
        }
        if identity.architecture.is_some() {
            self.set_assembly_name(
                facade,
                false,
                "processorArchitecture",
                identity.architecture.as_deref(),
            );
        }
        if identity.public_key_token.is_some() {
            self.set_assembly_name(
                facade,
                false,
                "publicKeyToken",
                identity.public_key_token.as_deref(),
            );
        }
    }

    /// Merges one resolved identity attribute into the facade: an existing
    /// authored attribute (keyed component + name) is overwritten with the
    /// discovered value, otherwise the attribute is newly recorded.
    fn set_assembly_name(
        &self,
        facade: &mut FileFacade,
        machine_global: bool,
        name: &str,
        value: Option<&str>,
    ) {
        let Some(value) = value.filter(|value| !value.is_empty()) else {
            // This can occur when grabbing the file version from an assembly
            // without one.
            self.messaging.write(Message::null_assembly_name_value(
                facade.source.clone(),
                &facade.component_id,
                name,
            ));
            return;
        };

        // If the assembly is installed machine-global and the name in the
        // file table doesn't match the assembly name, the install will fail.
        if name == "name"
            && machine_global
            && !facade.file_stem().eq_ignore_ascii_case(value)
        {
            self.messaging.write(Message::assembly_identity_mismatch(
                facade.source.clone(),
                facade.file_stem(),
                value,
            ));
        }

        let component_id = facade.component_id.clone();
        match facade
            .assembly_names
            .iter_mut()
            .find(|attr| attr.component_id == component_id && attr.name == name)
        {
            Some(attribute) => attribute.value = value.to_string(),
            None => facade.assembly_names.push(crate::bind::AssemblyName {
                component_id,
                name: name.to_string(),
                value: value.to_string(),
            }),
        }

        if let Some(cache) = self.variable_cache {
            let key = format!("assembly{}.{}", name, facade.id).to_lowercase();
            cache.insert(key, value.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bind::{AssemblyInfo, FileHash, VersionInfo};
    use crate::messaging::MessageCollector;
    use std::path::Path;

    /// Deterministic probe configured per path.
    #[derive(Default)]
    struct FakeProbe {
        missing: HashSet<PathBuf>,
        invalid: HashSet<PathBuf>,
        sizes: HashMap<PathBuf, u64>,
        versions: HashMap<PathBuf, VersionInfo>,
        managed: HashMap<PathBuf, ManagedIdentity>,
        manifests: HashMap<PathBuf, ManifestIdentity>,
    }

    impl FakeProbe {
        fn with_file(mut self, path: &str, info: VersionInfo) -> Self {
            self.sizes.insert(PathBuf::from(path), 100);
            self.versions.insert(PathBuf::from(path), info);
            self
        }

        fn versioned(self, path: &str, version: &str, language: Option<&str>) -> Self {
            self.with_file(
                path,
                VersionInfo {
                    version: Some(version.to_string()),
                    language: language.map(ToString::to_string),
                },
            )
        }

        fn unversioned(self, path: &str) -> Self {
            self.with_file(path, VersionInfo::default())
        }
    }

    impl FileMetadataProbe for FakeProbe {
        fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
            if self.invalid.contains(path) {
                None
            } else {
                Some(path.to_path_buf())
            }
        }

        fn exists(&self, path: &Path) -> bool {
            !self.missing.contains(path) && self.sizes.contains_key(path)
        }

        fn file_size(&self, path: &Path) -> Result<u64> {
            Ok(self.sizes.get(path).copied().unwrap_or(100))
        }

        fn version_info(&self, path: &Path) -> Result<VersionInfo> {
            Ok(self.versions.get(path).cloned().unwrap_or_default())
        }

        fn file_hash(&self, _path: &Path) -> Result<FileHash> {
            Ok(FileHash {
                part1: 1,
                part2: 2,
                part3: 3,
                part4: 4,
            })
        }

        fn managed_identity(
            &self,
            path: &Path,
            file_version: Option<&str>,
        ) -> Result<ManagedIdentity> {
            let mut identity = self
                .managed
                .get(path)
                .cloned()
                .ok_or_else(|| malformed_error!("not a managed assembly"))?;
            identity.file_version = file_version.map(ToString::to_string);
            Ok(identity)
        }

        fn manifest_identity(&self, path: &Path) -> Result<ManifestIdentity> {
            self.manifests
                .get(path)
                .cloned()
                .ok_or_else(|| malformed_error!("unreadable manifest"))
        }
    }

    fn resolve(
        probe: &FakeProbe,
        facades: &mut [FileFacade],
        overwrite_hash: bool,
    ) -> (MessageCollector, Result<()>) {
        let messaging = MessageCollector::new();
        let command = ResolveFileMetadata::new(&messaging, probe, overwrite_hash, None);
        let result = command.execute(facades);
        (messaging, result)
    }

    #[test]
    fn facade_without_source_path_is_skipped() {
        let probe = FakeProbe::default();
        let mut facades = vec![FileFacade::new("F1", "C1", "a.dll")];
        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert!(messaging.messages().is_empty());
        assert_eq!(facades[0].file_size, None);
    }

    #[test]
    fn invalid_name_and_missing_file_are_per_item_errors() {
        let mut probe = FakeProbe::default().unversioned("good.txt");
        probe.invalid.insert(PathBuf::from("bad<name"));
        let mut facades = vec![
            FileFacade::new("F1", "C1", "bad.dll").with_source_path("bad<name"),
            FileFacade::new("F2", "C1", "gone.dll").with_source_path("gone.dll"),
            FileFacade::new("F3", "C1", "good.txt").with_source_path("good.txt"),
        ];

        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert!(messaging.encountered_error());
        let ids: Vec<u32> = messaging.messages().iter().map(|m| m.id).collect();
        assert!(ids.contains(&300));
        assert!(ids.contains(&301));

        // The run continued and resolved the good facade.
        assert_eq!(facades[2].file_size, Some(100));
    }

    #[test]
    fn oversized_file_is_build_fatal() {
        let mut probe = FakeProbe::default().unversioned("huge.bin");
        probe.sizes.insert(PathBuf::from("huge.bin"), u64::from(u32::MAX));
        let mut facades =
            vec![FileFacade::new("F1", "C1", "huge.bin").with_source_path("huge.bin")];

        let (_, result) = resolve(&probe, &mut facades, true);
        assert!(matches!(result, Err(Error::FileTooLarge { .. })));
    }

    #[test]
    fn companion_reference_is_left_untouched() {
        let probe = FakeProbe::default()
            .unversioned("data.bin")
            .versioned("main.exe", "1.0.0.0", None);
        let mut facades = vec![
            FileFacade::new("F1", "C1", "data.bin")
                .with_source_path("data.bin")
                .with_version("F9"),
            FileFacade::new("F9", "C2", "main.exe").with_source_path("main.exe"),
        ];

        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        // No "default version used" warning and the literal reference stays.
        assert!(messaging.messages().iter().all(|m| m.id != 1100));
        assert_eq!(facades[0].version.as_deref(), Some("F9"));
        assert_eq!(facades[0].hash, None);
    }

    #[test]
    fn default_version_on_unversioned_file_warns() {
        let probe = FakeProbe::default().unversioned("data.bin");
        let mut facades = vec![FileFacade::new("F1", "C1", "data.bin")
            .with_source_path("data.bin")
            .with_version("9.9.9.9")];

        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert!(messaging.messages().iter().any(|m| m.id == 1100));
        // The facade keeps the authored default.
        assert_eq!(facades[0].version.as_deref(), Some("9.9.9.9"));
    }

    #[test]
    fn unversioned_file_gets_hash_and_language_warning() {
        let probe = FakeProbe::default().unversioned("data.bin");
        let mut facades = vec![FileFacade::new("F1", "C1", "data.bin")
            .with_source_path("data.bin")
            .with_language("1033")];

        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert!(messaging.messages().iter().any(|m| m.id == 1101));
        assert!(facades[0].hash.is_some());
    }

    #[test]
    fn hash_is_skipped_without_overwrite() {
        let probe = FakeProbe::default().unversioned("data.bin");
        let mut facades =
            vec![FileFacade::new("F1", "C1", "data.bin").with_source_path("data.bin")];

        let (messaging, result) = resolve(&probe, &mut facades, false);

        result.unwrap();
        assert!(messaging.messages().is_empty());
        assert_eq!(facades[0].hash, None);
    }

    #[test]
    fn discovered_version_fills_unauthored_facade() {
        let probe = FakeProbe::default().versioned("main.exe", "2.3.4.5", Some("1033"));
        let mut facades =
            vec![FileFacade::new("F1", "C1", "main.exe").with_source_path("main.exe")];

        let (_, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert_eq!(facades[0].version.as_deref(), Some("2.3.4.5"));
        assert_eq!(facades[0].language.as_deref(), Some("1033"));
    }

    #[test]
    fn authored_default_loses_to_discovered_version() {
        let probe = FakeProbe::default().versioned("main.exe", "2.0.0.0", None);
        let mut facades = vec![FileFacade::new("F1", "C1", "main.exe")
            .with_source_path("main.exe")
            .with_version("1.0.0.0")];

        let (_, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert_eq!(facades[0].version.as_deref(), Some("2.0.0.0"));
    }

    #[test]
    fn authored_companion_survives_on_versioned_file() {
        let probe = FakeProbe::default()
            .versioned("main.exe", "2.0.0.0", None)
            .versioned("other.exe", "1.0.0.0", None);
        let mut facades = vec![
            FileFacade::new("F1", "C1", "main.exe")
                .with_source_path("main.exe")
                .with_version("F2"),
            FileFacade::new("F2", "C2", "other.exe").with_source_path("other.exe"),
        ];

        let (_, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert_eq!(facades[0].version.as_deref(), Some("F2"));
    }

    #[test]
    fn authored_language_kept_when_file_has_none() {
        let probe = FakeProbe::default().versioned("main.exe", "2.0.0.0", None);
        let mut facades = vec![FileFacade::new("F1", "C1", "main.exe")
            .with_source_path("main.exe")
            .with_language("1036")];

        let (messaging, result) = resolve(&probe, &mut facades, true);

        result.unwrap();
        assert!(messaging.messages().iter().any(|m| m.id == 1102));
        assert_eq!(facades[0].language.as_deref(), Some("1036"));
    }

    #[test]
    fn metadata_cache_records_version_and_language() {
        let probe = FakeProbe::default().versioned("main.exe", "2.0.0.0", Some("1033"));
        let mut facades =
            vec![FileFacade::new("F1", "C1", "main.exe").with_source_path("main.exe")];

        let messaging = MessageCollector::new();
        let cache = DashMap::new();
        let command = ResolveFileMetadata::new(&messaging, &probe, true, Some(&cache));
        command.execute(&mut facades).unwrap();

        assert_eq!(cache.get("fileversion.F1").unwrap().value(), "2.0.0.0");
        assert_eq!(cache.get("filelanguage.F1").unwrap().value(), "1033");
    }

    #[test]
    fn managed_assembly_attributes_are_recorded() {
        let mut probe = FakeProbe::default().versioned("widgets.dll", "1.2.3.4", None);
        probe.managed.insert(
            PathBuf::from("widgets.dll"),
            ManagedIdentity {
                name: Some("widgets".into()),
                culture: Some("neutral".into()),
                version: Some("1.2.0.0".into()),
                architecture: Some("MSIL".into()),
                public_key_token: Some("b77a5c561934e089".into()),
                strong_named: true,
                file_version: None,
            },
        );

        let mut facades = vec![FileFacade::new("F1", "C1", "widgets.dll")
            .with_source_path("widgets.dll")
            .with_assembly(AssemblyInfo {
                kind: AssemblyKind::Managed,
                application_ref: None,
                manifest_ref: None,
            })];

        let messaging = MessageCollector::new();
        let cache = DashMap::new();
        let command = ResolveFileMetadata::new(&messaging, &probe, true, Some(&cache));
        command.execute(&mut facades).unwrap();

        assert!(!messaging.encountered_error());
        let find = |name: &str| {
            facades[0]
                .assembly_names
                .iter()
                .find(|attr| attr.name == name)
                .map(|attr| attr.value.clone())
        };
        assert_eq!(find("name").as_deref(), Some("widgets"));
        assert_eq!(find("version").as_deref(), Some("1.2.0.0"));
        assert_eq!(find("publicKeyToken").as_deref(), Some("b77a5c561934e089"));
        assert_eq!(find("fileVersion").as_deref(), Some("1.2.3.4"));

        assert_eq!(cache.get("assemblyname.F1").unwrap().value(), "widgets");
        assert!(cache.contains_key("assemblyfullname.F1"));
    }

    #[test]
    fn discovered_attribute_overwrites_authored_value() {
        let mut probe = FakeProbe::default().versioned("widgets.dll", "1.2.3.4", None);
        probe.managed.insert(
            PathBuf::from("widgets.dll"),
            ManagedIdentity {
                name: Some("widgets".into()),
                culture: Some("neutral".into()),
                version: Some("1.2.0.0".into()),
                strong_named: true,
                public_key_token: Some("abcdefabcdefabcd".into()),
                ..Default::default()
            },
        );

        let mut facade = FileFacade::new("F1", "C1", "widgets.dll")
            .with_source_path("widgets.dll")
            .with_assembly(AssemblyInfo {
                kind: AssemblyKind::Managed,
                application_ref: None,
                manifest_ref: None,
            });
        facade.assembly_names.push(crate::bind::AssemblyName {
            component_id: "C1".into(),
            name: "version".into(),
            value: "0.0.0.1".into(),
        });
        let mut facades = vec![facade];

        let (_, result) = resolve(&probe, &mut facades, true);
        result.unwrap();

        let versions: Vec<&str> = facades[0]
            .assembly_names
            .iter()
            .filter(|attr| attr.name == "version")
            .map(|attr| attr.value.as_str())
            .collect();
        assert_eq!(versions, vec!["1.2.0.0"]);
    }

    #[test]
    fn machine_global_assembly_requires_strong_name() {
        let mut probe = FakeProbe::default().versioned("weak.dll", "1.0.0.0", None);
        probe.managed.insert(
            PathBuf::from("weak.dll"),
            ManagedIdentity {
                name: Some("weak".into()),
                culture: Some("neutral".into()),
                version: Some("1.0.0.0".into()),
                strong_named: false,
                ..Default::default()
            },
        );

        let mut facades = vec![FileFacade::new("F1", "C1", "weak.dll")
            .with_source_path("weak.dll")
            .with_assembly(AssemblyInfo {
                kind: AssemblyKind::Managed,
                application_ref: None,
                manifest_ref: None,
            })];

        let (messaging, result) = resolve(&probe, &mut facades, true);
        result.unwrap();
        assert!(messaging.messages().iter().any(|m| m.id == 302));

        // Scoped to a private application directory the same assembly is fine.
        facades[0].assembly = Some(AssemblyInfo {
            kind: AssemblyKind::Managed,
            application_ref: Some("PrivateApp".into()),
            manifest_ref: None,
        });
        let (messaging, result) = resolve(&probe, &mut facades, true);
        result.unwrap();
        assert!(messaging.messages().iter().all(|m| m.id != 302));
    }

    #[test]
    fn machine_global_name_mismatch_is_reported() {
        let mut probe = FakeProbe::default().versioned("renamed.dll", "1.0.0.0", None);
        probe.managed.insert(
            PathBuf::from("renamed.dll"),
            ManagedIdentity {
                name: Some("original".into()),
                culture: Some("neutral".into()),
                version: Some("1.0.0.0".into()),
                strong_named: true,
                public_key_token: Some("abcdefabcdefabcd".into()),
                ..Default::default()
            },
        );

        let mut facades = vec![FileFacade::new("F1", "C1", "renamed.dll")
            .with_source_path("renamed.dll")
            .with_assembly(AssemblyInfo {
                kind: AssemblyKind::Managed,
                application_ref: None,
                manifest_ref: None,
            })];

        let (messaging, result) = resolve(&probe, &mut facades, true);
        result.unwrap();
        assert!(messaging.messages().iter().any(|m| m.id == 303));
    }

    #[test]
    fn native_assembly_reads_manifest_facade() {
        let mut probe = FakeProbe::default()
            .unversioned("native.dll")
            .unversioned("native.manifest");
        probe.manifests.insert(
            PathBuf::from("native.manifest"),
            ManifestIdentity {
                name: Some("Example.SxS".into()),
                version: Some("5.1.0.0".into()),
                kind: Some("win32".into()),
                architecture: None,
                public_key_token: None,
            },
        );

        let mut facades = vec![
            FileFacade::new("F1", "C1", "native.dll")
                .with_source_path("native.dll")
                .with_assembly(AssemblyInfo {
                    kind: AssemblyKind::Native,
                    application_ref: None,
                    manifest_ref: Some("F2".into()),
                }),
            FileFacade::new("F2", "C1", "native.manifest").with_source_path("native.manifest"),
        ];

        let (messaging, result) = resolve(&probe, &mut facades, true);
        result.unwrap();

        assert!(!messaging.encountered_error());
        let names: Vec<&str> = facades[0]
            .assembly_names
            .iter()
            .map(|attr| attr.name.as_str())
            .collect();
        assert!(names.contains(&"name"));
        assert!(names.contains(&"version"));
        assert!(names.contains(&"type"));
        // Attributes absent from the manifest are not recorded.
        assert!(!names.contains(&"processorArchitecture"));
        assert!(!names.contains(&"publicKeyToken"));
    }

    #[test]
    fn missing_manifest_is_reported_and_skipped() {
        let probe = FakeProbe::default().unversioned("native.dll");
        let mut facades = vec![FileFacade::new("F1", "C1", "native.dll")
            .with_source_path("native.dll")
            .with_assembly(AssemblyInfo {
                kind: AssemblyKind::Native,
                application_ref: None,
                manifest_ref: Some("F404".into()),
            })];

        let (messaging, result) = resolve(&probe, &mut facades, true);
        result.unwrap();

        assert!(messaging.messages().iter().any(|m| m.id == 304));
        assert!(facades[0].assembly_names.is_empty());
    }
}
