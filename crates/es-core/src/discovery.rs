//! Test suite discovery
//!
//! A suite is a directory of `*.es.sql` files. Tests may live directly in the
//! suite root or one level down in a sub-suite directory; deeper files are
//! ignored.

use crate::error::{CoreError, CoreResult};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File suffix that marks a SQL file as a test
pub const TEST_FILE_SUFFIX: &str = ".es.sql";

/// Default suite directory, relative to the working directory
pub const DEFAULT_SUITE_DIR: &str = "es_suite";

/// One discovered SQL test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSource {
    /// Lower-cased file name without the `.es.sql` suffix
    pub name: String,

    /// Location of the SQL text
    pub path: PathBuf,

    /// Sub-suite directory, if the test is not in the suite root
    pub subgroup: Option<String>,
}

impl TestSource {
    /// Create a test source; the name is normalized to lower case
    pub fn new(name: &str, path: impl Into<PathBuf>, subgroup: Option<String>) -> Self {
        Self {
            name: name.to_lowercase(),
            path: path.into(),
            subgroup,
        }
    }

    /// `subgroup/name` for grouped tests, otherwise just the name
    pub fn display_name(&self) -> String {
        match &self.subgroup {
            Some(group) => format!("{}/{}", group, self.name),
            None => self.name.clone(),
        }
    }
}

/// Discover all tests under `root`, keyed by lower-cased test name.
///
/// When `subgroup` is given, only tests in that sub-suite are returned; the
/// sub-suite is matched case-insensitively.
/// A missing root yields an empty map; two files resolving to the same
/// name are rejected.
pub fn discover_tests(
    root: &Path,
    subgroup: Option<&str>,
) -> CoreResult<BTreeMap<String, TestSource>> {
    let mut tests: BTreeMap<String, TestSource> = BTreeMap::new();

    if !root.is_dir() {
        log::debug!("Suite directory {} does not exist", root.display());
        return Ok(tests);
    }

    let escaped_root = glob::Pattern::escape(&root.to_string_lossy());
    let patterns = [
        format!("{}/*{}", escaped_root, TEST_FILE_SUFFIX),
        format!("{}/*/*{}", escaped_root, TEST_FILE_SUFFIX),
    ];

    for pattern in &patterns {
        let entries = glob::glob(pattern).map_err(|e| CoreError::InvalidPattern {
            pattern: pattern.clone(),
            message: e.to_string(),
        })?;

        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    log::warn!("Skipping unreadable test path: {}", e);
                    continue;
                }
            };
            if !path.is_file() {
                continue;
            }

            let Some(source) = source_from_path(root, &path) else {
                continue;
            };
            if let Some(wanted) = subgroup {
                let matches = source
                    .subgroup
                    .as_deref()
                    .is_some_and(|group| group.eq_ignore_ascii_case(wanted));
                if !matches {
                    continue;
                }
            }

            if let Some(existing) = tests.get(&source.name) {
                return Err(CoreError::DuplicateTest {
                    name: source.name.clone(),
                    path1: existing.path.display().to_string(),
                    path2: source.path.display().to_string(),
                });
            }
            tests.insert(source.name.clone(), source);
        }
    }

    Ok(tests)
}

/// Look up one test by `name` or `subgroup/name` (case-insensitive)
pub fn find_test(root: &Path, identifier: &str) -> CoreResult<Option<TestSource>> {
    let (subgroup, name) = match identifier.split_once('/') {
        Some((group, name)) => (Some(group), name),
        None => (None, identifier),
    };

    let mut tests = discover_tests(root, subgroup)?;
    Ok(tests.remove(&name.to_lowercase()))
}

fn source_from_path(root: &Path, path: &Path) -> Option<TestSource> {
    let file_name = path.file_name()?.to_str()?;
    let stem = file_name.strip_suffix(TEST_FILE_SUFFIX)?;
    if stem.is_empty() {
        return None;
    }

    let subgroup = path
        .strip_prefix(root)
        .ok()
        .and_then(Path::parent)
        .filter(|parent| !parent.as_os_str().is_empty())
        .map(|parent| parent.to_string_lossy().into_owned());

    Some(TestSource::new(stem, path, subgroup))
}

#[cfg(test)]
#[path = "discovery_test.rs"]
mod tests;
