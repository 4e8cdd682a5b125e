//! Test discovery.
//!
//! A fixture is any file under the test root whose name starts with `test_`
//! and whose extension selects a protocol: `.c`/`.cpp` for native sources,
//! `.ll` for precompiled IR. Discovery only lists fixtures; it never runs them.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use walkdir::WalkDir;

use crate::diagnostics::HarnessError;
use crate::err_io;
use crate::toolchain::Language;

/// File-name prefix every test fixture starts with.
pub const TEST_PREFIX: &str = "test_";
/// Extensions of native-source tests (compiled through both pipelines).
pub const NATIVE_EXTENSIONS: &[&str] = &["c", "cpp"];
/// Extension of precompiled IR tests.
pub const IR_EXTENSIONS: &[&str] = &["ll"];

/// How a test enters the pipelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Native(Language),
    Ir,
}

impl SourceKind {
    fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "c" => Some(SourceKind::Native(Language::C)),
            "cpp" => Some(SourceKind::Native(Language::Cxx)),
            "ll" => Some(SourceKind::Ir),
            _ => None,
        }
    }
}

/// A discovered test fixture.
///
/// Identity is the absolute `path`; `name` is only a display label and may
/// repeat across directories.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TestCase {
    pub path: PathBuf,
    pub name: String,
    pub kind: SourceKind,
}

impl TestCase {
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let ext = path.extension()?.to_str()?;
        let kind = SourceKind::from_extension(ext)?;
        Some(Self {
            name: test_name_from_path(&path),
            path,
            kind,
        })
    }
}

/// Extension-stripped base name, e.g. `test_bitfields` for `.../test_bitfields.c`.
pub fn test_name_from_path(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_test_file(path: &Path, extensions: &[&str]) -> bool {
    let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    file_name.starts_with(TEST_PREFIX)
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| extensions.contains(&ext))
}

/// Fixtures found by one walk.
#[derive(Debug, Default)]
pub struct Discovered {
    pub tests: Vec<TestCase>,
    /// Entries below the root the walk could not read and stepped over.
    pub unreadable: Vec<HarnessError>,
}

/// Recursively collects test fixtures under `root` whose extension is in
/// `extensions`.
///
/// Entries are visited in file-name order within each directory so repeated
/// runs list tests identically; tests themselves must not depend on it.
pub fn collect_tests(root: &Path, extensions: &[&str]) -> Result<Discovered, HarnessError> {
    let root = fs::canonicalize(root).map_err(err_io!("failed to open test directory", root))?;

    let mut found = Discovered::default();
    for entry in WalkDir::new(&root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            // The root itself is unreadable: nothing to discover.
            Err(source) if source.depth() == 0 => {
                return Err(HarnessError::Walk {
                    root: root.clone(),
                    source,
                })
            }
            Err(source) => {
                found.unreadable.push(HarnessError::Walk {
                    root: root.clone(),
                    source,
                });
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !is_test_file(path, extensions) {
            continue;
        }
        if let Some(case) = TestCase::from_path(path) {
            found.tests.push(case);
        }
    }
    Ok(found)
}

/// Native-source tests (`.c`, `.cpp`) under `root`.
pub fn collect_native_tests(root: &Path) -> Result<Discovered, HarnessError> {
    collect_tests(root, NATIVE_EXTENSIONS)
}

/// Precompiled IR tests (`.ll`) under `root`.
pub fn collect_ir_tests(root: &Path) -> Result<Discovered, HarnessError> {
    collect_tests(root, IR_EXTENSIONS)
}
