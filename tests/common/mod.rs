//! Shared fixtures for integration tests.
//!
//! A fake toolchain made of POSIX shell scripts stands in for clang, gcc,
//! llvm-cbe and lli. The "compilers" turn a source file into a tiny shell
//! program whose exit code is read from markers in the source:
//!
//! - `status: N` sets the exit code of every pipeline
//! - `cbe-status: N` overrides it for the translated pipeline only
//! - `translator-warning` makes llvm-cbe print a warning to stderr
//! - `clang-warning` makes the reference compiler print a warning
//! - `emit-ir-warning` makes the IR-emitting compile print a warning
//! - `gcc-note` makes the alternate compiler print a note on stdout
//! - `hang-reference` / `hang-translated` build a program that never exits
//! - `hang-forked` builds a translated program whose child never exits
//!
//! Every tool appends its command line to `calls.log` so tests can check what
//! ran.

#![allow(dead_code)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use cbe_diff::config::{Configuration, HarnessConfig, ToolchainConfig};
use tempfile::TempDir;

const CLANG: &str = r#"
src="$1"
out="$3"
case " $* " in
  *" -emit-llvm "*)
    if grep -q 'emit-ir-warning' "$src"; then echo "warning: implicit declaration of function" >&2; fi
    cp "$src" "$out"
    exit 0
    ;;
esac
if grep -q 'clang-warning' "$src"; then echo "warning: unused parameter" >&2; fi
code=$(sed -n 's/.* status: *\([0-9][0-9]*\).*/\1/p' "$src" | head -n 1)
if grep -q 'hang-reference' "$src"; then
  printf '#!/bin/sh\nexec sleep 30\n' > "$out"
else
  printf '#!/bin/sh\nexit %s\n' "${code:-0}" > "$out"
fi
chmod +x "$out"
"#;

const GCC: &str = r#"
src="$1"
out="$3"
if grep -q 'gcc-note' "$src"; then echo "note: variable tracking size limit exceeded"; fi
code=$(sed -n 's/.*cbe-status: *\([0-9][0-9]*\).*/\1/p' "$src" | head -n 1)
if [ -z "$code" ]; then
  code=$(sed -n 's/.* status: *\([0-9][0-9]*\).*/\1/p' "$src" | head -n 1)
fi
if grep -q 'hang-forked' "$src"; then
  printf '#!/bin/sh\nsleep 30\ntrue\n' > "$out"
elif grep -q 'hang-translated' "$src"; then
  printf '#!/bin/sh\nexec sleep 30\n' > "$out"
else
  printf '#!/bin/sh\nexit %s\n' "${code:-0}" > "$out"
fi
chmod +x "$out"
"#;

const LLVM_CBE: &str = r#"
src="$1"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-o" ]; then out="$2"; fi
  shift
done
if grep -q 'translator-warning' "$src"; then echo "warning: suspicious cast in function main" >&2; fi
cp "$src" "$out"
"#;

const LLI: &str = r#"
code=$(sed -n 's/.* status: *\([0-9][0-9]*\).*/\1/p' "$1" | head -n 1)
exit "${code:-0}"
"#;

/// A scratch test suite plus the fake tools that build it.
pub struct FakeSuite {
    dir: TempDir,
}

impl FakeSuite {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let suite = Self { dir };
        fs::create_dir_all(suite.tests_dir()).unwrap();
        fs::create_dir_all(suite.bin_dir()).unwrap();
        fs::write(suite.log_path(), "").unwrap();
        for (name, body) in [
            ("clang", CLANG),
            ("clang++", CLANG),
            ("gcc", GCC),
            ("llvm-cbe", LLVM_CBE),
            ("lli", LLI),
        ] {
            suite.write_tool(name, body);
        }
        suite
    }

    fn write_tool(&self, name: &str, body: &str) {
        let path = self.bin_dir().join(name);
        let script = format!(
            "#!/bin/sh\necho \"{} $*\" >> '{}'\n{}",
            name,
            self.log_path().display(),
            body
        );
        fs::write(&path, script).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    }

    pub fn tests_dir(&self) -> PathBuf {
        self.dir.path().join("test")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.dir.path().join("bin")
    }

    pub fn log_path(&self) -> PathBuf {
        self.dir.path().join("calls.log")
    }

    /// Tool invocations so far, one per line.
    pub fn calls(&self) -> Vec<String> {
        fs::read_to_string(self.log_path())
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    /// Writes a fixture below the tests directory and returns its path.
    pub fn add_test(&self, rel: &str, source: &str) -> PathBuf {
        let path = self.tests_dir().join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, source).unwrap();
        path
    }

    pub fn toolchain(&self) -> ToolchainConfig {
        let bin = self.bin_dir();
        ToolchainConfig {
            interpreter: bin.join("lli"),
            clang: bin.join("clang"),
            clangxx: bin.join("clang++"),
            gcc: bin.join("gcc"),
            ..ToolchainConfig::default()
        }
        .with_tool_dir(&bin)
    }

    /// Harness configuration wired to the fake tools, two matrix entries,
    /// a short timeout and a single worker.
    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig::new(self.tests_dir());
        config.toolchain = self.toolchain();
        config.matrix = vec![Configuration::new(["-O0"]), Configuration::new(["-O2"])];
        config.timeout = Some(Duration::from_secs(2));
        config.jobs = 1;
        config
    }

    /// Writes a YAML tool configuration for CLI tests.
    pub fn write_tool_config(&self) -> PathBuf {
        let path = self.dir.path().join("tools.yaml");
        let yaml = serde_yaml::to_string(&self.toolchain()).unwrap();
        fs::write(&path, yaml).unwrap();
        path
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }
}
