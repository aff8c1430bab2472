//! Deterministic installation-order optimization.
//!
//! Imposes a stable total order over file facades to minimize seek cost when
//! the installation engine streams files sequentially: files are grouped by
//! the medium they ship on, then by the directory they install into, then
//! ordered by name, with the facade id as the final deterministic tie-break.
//! The order is a pure function of the inputs and independent of insertion
//! order, so the table writer that follows produces byte-identical databases
//! across identical inputs.

use std::cmp::Ordering;
use std::collections::HashMap;

use crate::bind::FileFacade;

/// A directory entry for target-path resolution: its parent reference and
/// its name within the parent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDirectory {
    /// Id of the parent directory; `None` for a root.
    pub parent_id: Option<String>,
    /// Directory name within its parent.
    pub name: String,
}

impl ResolvedDirectory {
    /// Creates a directory entry.
    #[must_use]
    pub fn new(parent_id: Option<String>, name: impl Into<String>) -> Self {
        Self {
            parent_id,
            name: name.into(),
        }
    }
}

/// Computes the canonical absolute target path of every directory by walking
/// parent references to the root.
///
/// Canonical paths are lowercase and joined with `\`. Directories whose
/// parent chain is broken or cyclic get no canonical path and are skipped by
/// the ordering comparator's directory level.
#[must_use]
pub fn resolve_directory_paths(
    directories: &HashMap<String, ResolvedDirectory>,
) -> HashMap<String, String> {
    let mut paths = HashMap::new();

    'outer: for id in directories.keys() {
        let mut segments = Vec::new();
        let mut visited = vec![id.as_str()];
        let mut current = id.as_str();

        loop {
            let Some(directory) = directories.get(current) else {
                continue 'outer;
            };
            segments.push(directory.name.to_lowercase());

            match directory.parent_id.as_deref() {
                None => break,
                Some(parent) => {
                    if visited.contains(&parent) {
                        continue 'outer;
                    }
                    visited.push(parent);
                    current = parent;
                }
            }
        }

        segments.reverse();
        paths.insert(id.clone(), segments.join("\\"));
    }

    paths
}

/// Maps each component to its canonical target directory path.
///
/// `components` maps component id to directory reference; components whose
/// directory has no canonical path are omitted.
#[must_use]
pub fn component_target_paths(
    components: &HashMap<String, String>,
    directory_paths: &HashMap<String, String>,
) -> HashMap<String, String> {
    components
        .iter()
        .filter_map(|(component_id, directory_ref)| {
            directory_paths
                .get(directory_ref)
                .map(|path| (component_id.clone(), path.clone()))
        })
        .collect()
}

/// Command that sorts file facades into their installation order.
pub struct OptimizeFileOrder<'a> {
    component_paths: &'a HashMap<String, String>,
}

impl<'a> OptimizeFileOrder<'a> {
    /// Creates the command over a resolved component-to-target-path mapping.
    #[must_use]
    pub fn new(component_paths: &'a HashMap<String, String>) -> Self {
        Self { component_paths }
    }

    /// Sorts `facades` in place into the deterministic installation order.
    pub fn execute(&self, facades: &mut [FileFacade]) {
        facades.sort_by(|x, y| self.compare(x, y));
    }

    fn compare(&self, x: &FileFacade, y: &FileFacade) -> Ordering {
        // First group files by the medium they ship on.
        let compare = x.disk_id.cmp(&y.disk_id);
        if compare != Ordering::Equal {
            return compare;
        }

        // Next try to group files by target install directory; facades whose
        // component has no resolvable path skip this level.
        if let (Some(path_x), Some(path_y)) = (
            self.component_paths.get(&x.component_id),
            self.component_paths.get(&y.component_id),
        ) {
            let compare = path_x.cmp(path_y);
            if compare != Ordering::Equal {
                return compare;
            }
        }

        let compare = x.file_name.cmp(&y.file_name);
        if compare != Ordering::Equal {
            return compare;
        }

        x.id.cmp(&y.id)
    }
}
