//! Invocation templates for the external tools.
//!
//! Each adapter builds a [`CommandLine`] from the role's fixed flags plus the
//! caller's per-test flags, runs it in silent mode, and hands back the path of
//! the artifact it produced. The interpreter is the one exception: it is the
//! reference run for precompiled IR, so it is observed rather than silenced.

use std::path::{Path, PathBuf};

use crate::config::ToolchainConfig;
use crate::diagnostics::HarnessError;
use crate::process::{CommandLine, ProcessRunner};

/// Source language of a native test; selects `clang` vs `clang++`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cxx,
}

#[derive(Debug, Clone)]
pub struct Toolchain {
    config: ToolchainConfig,
    runner: ProcessRunner,
}

impl Toolchain {
    pub fn new(config: ToolchainConfig, runner: ProcessRunner) -> Self {
        Self { config, runner }
    }

    pub fn config(&self) -> &ToolchainConfig {
        &self.config
    }

    pub fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    // =========================================================================
    // Command construction
    // =========================================================================

    fn include_flag(&self) -> String {
        format!("-I{}", self.config.include_dir.display())
    }

    fn reference_compiler(&self, language: Language) -> &Path {
        match language {
            Language::C => &self.config.clang,
            Language::Cxx => &self.config.clangxx,
        }
    }

    /// `clang source -o output <common> <clang> <flags>`
    pub fn compile_native_command(
        &self,
        source: &Path,
        output: &Path,
        flags: &[String],
        language: Language,
    ) -> CommandLine {
        CommandLine::new(self.reference_compiler(language))
            .arg(source)
            .arg("-o")
            .arg(output)
            .arg(self.include_flag())
            .args(&self.config.common_cflags)
            .args(&self.config.clang_flags)
            .args(flags)
    }

    /// Same as the native compile with the front-end-only IR flags appended.
    pub fn compile_to_ir_command(
        &self,
        source: &Path,
        output: &Path,
        flags: &[String],
        language: Language,
    ) -> CommandLine {
        self.compile_native_command(source, output, flags, language)
            .args(["-S", "-emit-llvm"])
    }

    /// `llvm-cbe module <translator flags> -o output`
    pub fn translate_command(&self, module: &Path, output: &Path) -> CommandLine {
        CommandLine::new(&self.config.translator)
            .arg(module)
            .args(&self.config.translator_flags)
            .arg("-o")
            .arg(output)
    }

    /// `gcc source -o output <common> <gcc> <flags>`
    pub fn compile_from_c_command(&self, source: &Path, output: &Path, flags: &[String]) -> CommandLine {
        CommandLine::new(&self.config.gcc)
            .arg(source)
            .arg("-o")
            .arg(output)
            .arg(self.include_flag())
            .args(&self.config.common_cflags)
            .args(&self.config.gcc_flags)
            .args(flags)
    }

    pub fn interpret_command(&self, module: &Path) -> CommandLine {
        CommandLine::new(&self.config.interpreter).arg(module)
    }

    // =========================================================================
    // Adapters
    // =========================================================================

    /// Builds a native executable straight from source (reference pipeline).
    pub fn compile_native(
        &self,
        source: &Path,
        output: &Path,
        flags: &[String],
        language: Language,
    ) -> Result<PathBuf, HarnessError> {
        self.runner
            .run_silent(&self.compile_native_command(source, output, flags, language))?;
        Ok(output.to_path_buf())
    }

    /// Emits an IR module from source, without linking.
    pub fn compile_to_ir(
        &self,
        source: &Path,
        output: &Path,
        flags: &[String],
        language: Language,
    ) -> Result<PathBuf, HarnessError> {
        self.runner
            .run_silent(&self.compile_to_ir_command(source, output, flags, language))?;
        Ok(output.to_path_buf())
    }

    /// Runs the translator under test.
    pub fn translate_ir_to_c(&self, module: &Path, output: &Path) -> Result<PathBuf, HarnessError> {
        self.runner.run_silent(&self.translate_command(module, output))?;
        Ok(output.to_path_buf())
    }

    /// Compiles the translator's C output with the alternate compiler.
    pub fn compile_native_from_c(
        &self,
        source: &Path,
        output: &Path,
        flags: &[String],
    ) -> Result<PathBuf, HarnessError> {
        self.runner
            .run_silent(&self.compile_from_c_command(source, output, flags))?;
        Ok(output.to_path_buf())
    }

    /// Executes an IR module in the interpreter and returns its exit code.
    pub fn interpret(&self, module: &Path) -> Result<i32, HarnessError> {
        self.runner.run_observed(&self.interpret_command(module))
    }

    /// Executes a built program and returns its exit code.
    pub fn execute(&self, executable: &Path) -> Result<i32, HarnessError> {
        self.runner.run_observed(&CommandLine::new(executable))
    }
}
