//! Harness configuration.
//!
//! Nothing in the library reads the environment. The CLI resolves the
//! `LLVMToolDir` override and any YAML configuration file, then hands a fully
//! built [`HarnessConfig`] to [`crate::driver::Harness::new`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::diagnostics::HarnessError;
use crate::err_io;

/// Name of the translator binary inside the tool directory.
pub const TRANSLATOR_BINARY: &str = "llvm-cbe";

/// Default per-invocation wall-clock limit.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

// =============================================================================
// CONFIGURATION MATRIX
// =============================================================================

/// One configuration of the native-source matrix: an ordered flag list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Configuration {
    pub flags: Vec<String>,
}

impl Configuration {
    pub fn new<I, S>(flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            flags: flags.into_iter().map(Into::into).collect(),
        }
    }

    /// Label used in unit ids, e.g. `-O2`.
    pub fn label(&self) -> String {
        self.flags.join(" ")
    }
}

/// The optimization levels every native-source test is checked under.
pub fn default_matrix() -> Vec<Configuration> {
    ["-O0", "-O1", "-O2", "-O3"]
        .into_iter()
        .map(|level| Configuration::new([level]))
        .collect()
}

/// Parses a comma-separated list of optimization levels (`0,2,s` or `-O0,-O2`).
///
/// A list with no levels is rejected: it would plan no native units at all.
pub fn parse_matrix(levels: &str) -> Result<Vec<Configuration>, HarnessError> {
    let matrix: Vec<_> = levels
        .split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(|level| {
            if level.starts_with('-') {
                Configuration::new([level])
            } else {
                Configuration::new([format!("-O{}", level)])
            }
        })
        .collect();
    if matrix.is_empty() {
        return Err(HarnessError::EmptyMatrix {
            levels: levels.to_string(),
        });
    }
    Ok(matrix)
}

// =============================================================================
// TOOLCHAIN
// =============================================================================

/// Tool locations and the fixed flag set of each compiler role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolchainConfig {
    /// The IR-to-C translator under test.
    pub translator: PathBuf,
    pub translator_flags: Vec<String>,
    /// Runs precompiled IR directly.
    pub interpreter: PathBuf,
    /// Reference C compiler; also emits IR.
    pub clang: PathBuf,
    pub clangxx: PathBuf,
    /// Alternate compiler for the translator's output.
    pub gcc: PathBuf,
    pub include_dir: PathBuf,
    pub common_cflags: Vec<String>,
    pub clang_flags: Vec<String>,
    pub gcc_flags: Vec<String>,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            translator: PathBuf::from(TRANSLATOR_BINARY),
            // Harder to get right than early declarations, so more value to test it.
            translator_flags: strings(&["-cbe-declare-locals-late"]),
            interpreter: PathBuf::from("lli"),
            clang: PathBuf::from("clang"),
            clangxx: PathBuf::from("clang++"),
            gcc: PathBuf::from("gcc"),
            include_dir: PathBuf::from("include/"),
            common_cflags: strings(&[
                "-g",
                "-Wall",
                "-Wno-unused-function",
                "-Wno-unused-variable",
                "-Werror",
            ]),
            clang_flags: strings(&["-Wno-error=unused-variable", "-Wno-unused-variable"]),
            gcc_flags: strings(&[
                "-Wno-error=unused-but-set-variable",
                "-Wno-unused-but-set-variable",
                "-Wno-builtin-declaration-mismatch",
                "-Wno-error=builtin-declaration-mismatch",
                "-latomic",
            ]),
        }
    }
}

impl ToolchainConfig {
    /// Default layout for a checkout: the translator is built next to the tests.
    pub fn default_tool_dir(test_root: &Path) -> PathBuf {
        test_root
            .join("..")
            .join("build")
            .join("tools")
            .join(TRANSLATOR_BINARY)
    }

    /// Points the translator at `<dir>/llvm-cbe`.
    pub fn with_tool_dir(mut self, dir: &Path) -> Self {
        self.translator = dir.join(TRANSLATOR_BINARY);
        self
    }

    /// Loads a YAML file; missing fields keep their defaults.
    pub fn from_yaml_file(path: &Path) -> Result<Self, HarnessError> {
        let text = fs::read_to_string(path).map_err(err_io!("failed to read config", path))?;
        Self::from_yaml_str(&text).map_err(|source| HarnessError::Config {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_yaml_str(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

// =============================================================================
// HARNESS
// =============================================================================

/// Configuration for test discovery, execution and reporting.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub test_root: PathBuf,
    pub toolchain: ToolchainConfig,
    pub matrix: Vec<Configuration>,
    /// `None` disables the limit.
    pub timeout: Option<Duration>,
    pub jobs: usize,
    /// Case-insensitive substring; non-matching units are skipped.
    pub filter: Option<String>,
    /// Still run the pipelines of xfail-marked tests and check they agree.
    pub run_xfail: bool,
    pub keep_artifacts: bool,
    pub verbose: bool,
}

impl HarnessConfig {
    pub fn new(test_root: impl Into<PathBuf>) -> Self {
        let test_root = test_root.into();
        let toolchain =
            ToolchainConfig::default().with_tool_dir(&ToolchainConfig::default_tool_dir(&test_root));
        Self {
            test_root,
            toolchain,
            matrix: default_matrix(),
            timeout: Some(DEFAULT_TIMEOUT),
            jobs: default_jobs(),
            filter: None,
            run_xfail: false,
            keep_artifacts: false,
            verbose: false,
        }
    }
}

pub fn default_jobs() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
