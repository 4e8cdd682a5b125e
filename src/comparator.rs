//! Dual-pipeline comparison.
//!
//! For native sources the reference pipeline is a direct native build and the
//! translated pipeline goes source -> IR -> C (translator under test) -> native
//! via a different C compiler. For precompiled IR the interpreter is the
//! reference. Either way the unit passes only when every silent stage stayed
//! silent, the reference exited with a sentinel, and the translated program
//! exited with the same code.
//!
//! Stages run strictly in order and the first failure ends the unit; artifacts
//! live in a scratch directory owned by the caller.

use std::fmt;
use std::path::Path;

use serde::Serialize;
use thiserror::Error;

use crate::config::Configuration;
use crate::diagnostics::HarnessError;
use crate::discovery::{SourceKind, TestCase};
use crate::status::{ExitStatus, TEST_SUCCESS_EXIT_CODE, TEST_XFAIL_EXIT_CODE};
use crate::toolchain::{Language, Toolchain};

// Artifact names inside a unit's scratch directory.
const IR_ARTIFACT: &str = "ir.ll";
const CBE_C_ARTIFACT: &str = "cbe.c";
const REGULAR_EXE_ARTIFACT: &str = "regular.exe";
const CBE_EXE_ARTIFACT: &str = "cbe.exe";

// =============================================================================
// STAGES AND FAILURES
// =============================================================================

/// One step of either pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    EmitIr,
    Translate,
    CompileReference,
    RunReference,
    Interpret,
    CompileTranslated,
    RunTranslated,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::EmitIr => "emit-ir",
            Stage::Translate => "translate",
            Stage::CompileReference => "compile-reference",
            Stage::RunReference => "run-reference",
            Stage::Interpret => "interpret",
            Stage::CompileTranslated => "compile-translated",
            Stage::RunTranslated => "run-translated",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure classes, most severe first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    /// The harness could not do its job (missing tool, unwritable scratch dir).
    Harness,
    /// A stage that must be silent printed something or exited nonzero.
    ToolchainDiagnostic,
    /// A toolchain stage or the translated program hung.
    Timeout,
    /// The reference pipeline did not exit with a sentinel; the test is broken.
    FixtureDefect,
    /// The translated program disagrees with the reference.
    Divergence,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::Harness => "harness error",
            FailureKind::ToolchainDiagnostic => "toolchain diagnostic",
            FailureKind::Timeout => "timeout",
            FailureKind::FixtureDefect => "fixture defect",
            FailureKind::Divergence => "behavioral divergence",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single (test, configuration) unit did not pass.
#[derive(Debug, Error)]
pub enum UnitFailure {
    #[error("{stage}: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: HarnessError,
    },

    #[error("{stage}: broken fixture, {detail}")]
    FixtureDefect { stage: Stage, detail: String },

    #[error("reference exited with {reference} but translated program exited with {translated}")]
    Divergence {
        reference: ExitStatus,
        translated: ExitStatus,
    },

    #[error(transparent)]
    Harness(#[from] HarnessError),
}

impl UnitFailure {
    pub fn kind(&self) -> FailureKind {
        match self {
            UnitFailure::Stage { source, .. } => match source {
                HarnessError::NotSilent { .. } => FailureKind::ToolchainDiagnostic,
                HarnessError::Timeout { .. } => FailureKind::Timeout,
                _ => FailureKind::Harness,
            },
            UnitFailure::FixtureDefect { .. } => FailureKind::FixtureDefect,
            UnitFailure::Divergence { .. } => FailureKind::Divergence,
            UnitFailure::Harness(_) => FailureKind::Harness,
        }
    }

    pub fn stage(&self) -> Option<Stage> {
        match self {
            UnitFailure::Stage { stage, .. } | UnitFailure::FixtureDefect { stage, .. } => {
                Some(*stage)
            }
            UnitFailure::Divergence { .. } => Some(Stage::RunTranslated),
            UnitFailure::Harness(_) => None,
        }
    }
}

/// Both pipelines finished and agreed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Agreement {
    pub reference: ExitStatus,
    pub translated: ExitStatus,
}

fn at(stage: Stage) -> impl FnOnce(HarnessError) -> UnitFailure {
    move |source| UnitFailure::Stage { stage, source }
}

// =============================================================================
// COMPARATOR
// =============================================================================

#[derive(Debug, Clone)]
pub struct Comparator {
    toolchain: Toolchain,
}

impl Comparator {
    pub fn new(toolchain: Toolchain) -> Self {
        Self { toolchain }
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    /// Runs the protocol that matches the test's source kind.
    ///
    /// `configuration` is ignored for precompiled IR; a native test without one
    /// is built with no extra flags.
    pub fn compare(
        &self,
        case: &TestCase,
        configuration: Option<&Configuration>,
        scratch: &Path,
    ) -> Result<Agreement, UnitFailure> {
        match case.kind {
            SourceKind::Native(language) => {
                let unflagged = Configuration::default();
                let configuration = configuration.unwrap_or(&unflagged);
                self.compare_native(&case.path, language, configuration, scratch)
            }
            SourceKind::Ir => self.compare_ir(&case.path, scratch),
        }
    }

    /// Native-source protocol for one configuration.
    pub fn compare_native(
        &self,
        source: &Path,
        language: Language,
        configuration: &Configuration,
        scratch: &Path,
    ) -> Result<Agreement, UnitFailure> {
        let tc = &self.toolchain;
        let flags = &configuration.flags;

        // The translator must accept clean front-end output before any
        // executable is worth building.
        let ir = tc
            .compile_to_ir(source, &scratch.join(IR_ARTIFACT), flags, language)
            .map_err(at(Stage::EmitIr))?;
        let cbe_c = tc
            .translate_ir_to_c(&ir, &scratch.join(CBE_C_ARTIFACT))
            .map_err(at(Stage::Translate))?;

        let regular_exe = tc
            .compile_native(source, &scratch.join(REGULAR_EXE_ARTIFACT), flags, language)
            .map_err(at(Stage::CompileReference))?;
        let reference = check_reference(Stage::RunReference, tc.execute(&regular_exe))?;

        let cbe_exe = tc
            .compile_native_from_c(&cbe_c, &scratch.join(CBE_EXE_ARTIFACT), flags)
            .map_err(at(Stage::CompileTranslated))?;
        let translated = tc.execute(&cbe_exe).map_err(at(Stage::RunTranslated))?;

        agree(reference, ExitStatus::from_code(translated))
    }

    /// Precompiled-IR protocol; the interpreter stands in for a native build.
    pub fn compare_ir(&self, module: &Path, scratch: &Path) -> Result<Agreement, UnitFailure> {
        let tc = &self.toolchain;

        let reference = check_reference(Stage::Interpret, tc.interpret(module))?;

        let cbe_c = tc
            .translate_ir_to_c(module, &scratch.join(CBE_C_ARTIFACT))
            .map_err(at(Stage::Translate))?;
        let cbe_exe = tc
            .compile_native_from_c(&cbe_c, &scratch.join(CBE_EXE_ARTIFACT), &[])
            .map_err(at(Stage::CompileTranslated))?;
        let translated = tc.execute(&cbe_exe).map_err(at(Stage::RunTranslated))?;

        agree(reference, ExitStatus::from_code(translated))
    }
}

/// Classifies the reference run. A hung or non-sentinel reference is the
/// fixture's fault, not the translator's.
fn check_reference(
    stage: Stage,
    result: Result<i32, HarnessError>,
) -> Result<ExitStatus, UnitFailure> {
    let code = match result {
        Ok(code) => code,
        Err(err) if err.is_timeout() => {
            return Err(UnitFailure::FixtureDefect {
                stage,
                detail: err.to_string(),
            })
        }
        Err(err) => return Err(UnitFailure::Stage { stage, source: err }),
    };

    let status = ExitStatus::from_code(code);
    if !status.is_sentinel() {
        return Err(UnitFailure::FixtureDefect {
            stage,
            detail: format!(
                "exited with {}, expected {} or {}",
                code, TEST_SUCCESS_EXIT_CODE, TEST_XFAIL_EXIT_CODE
            ),
        });
    }
    Ok(status)
}

fn agree(reference: ExitStatus, translated: ExitStatus) -> Result<Agreement, UnitFailure> {
    if translated != reference {
        return Err(UnitFailure::Divergence {
            reference,
            translated,
        });
    }
    Ok(Agreement {
        reference,
        translated,
    })
}
