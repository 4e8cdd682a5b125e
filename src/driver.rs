//! Test driver.
//!
//! Binds discovery, the configuration matrix, xfail detection and the
//! comparator into independently reportable units:
//!
//! 1. **Discovery**: native-source and precompiled-IR fixtures under the root
//! 2. **Planning**: one unit per (native test, configuration), one per IR test
//! 3. **Filtering**: units not matching the filter are skipped, not dropped
//! 4. **Xfail check**: marked fixtures short-circuit before any tool runs
//! 5. **Comparison**: both pipelines in a private scratch directory
//!
//! Units share nothing mutable, so [`Harness::run_units`] spreads them over a
//! pool of scoped worker threads. A failing unit never stops its siblings.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use serde::{Serialize, Serializer};

use crate::comparator::{Comparator, FailureKind, Stage, UnitFailure};
use crate::config::{Configuration, HarnessConfig};
use crate::diagnostics::HarnessError;
use crate::discovery::{collect_ir_tests, collect_native_tests, SourceKind, TestCase};
use crate::process::ProcessRunner;
use crate::status::ExitStatus;
use crate::toolchain::Toolchain;
use crate::xfail::check_xfail;

// =============================================================================
// UNITS
// =============================================================================

/// One independently executable (test, configuration) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestUnit {
    pub case: TestCase,
    /// `None` for precompiled IR, which has no optimization matrix.
    pub configuration: Option<Configuration>,
}

impl TestUnit {
    /// Display label, e.g. `test_struct_return[-O2]`. Not unique across
    /// directories; `case.path` is the identity.
    pub fn label(&self) -> String {
        match &self.configuration {
            Some(configuration) => format!("{}[{}]", self.case.name, configuration.label()),
            None => self.case.name.clone(),
        }
    }
}

/// Cross product of native tests with the matrix, followed by the IR tests.
pub fn plan_units(native: &[TestCase], ir: &[TestCase], matrix: &[Configuration]) -> Vec<TestUnit> {
    let mut units = Vec::with_capacity(native.len() * matrix.len() + ir.len());
    for case in native {
        for configuration in matrix {
            units.push(TestUnit {
                case: case.clone(),
                configuration: Some(configuration.clone()),
            });
        }
    }
    for case in ir {
        units.push(TestUnit {
            case: case.clone(),
            configuration: None,
        });
    }
    units
}

/// Reason a unit is filtered out, if any.
pub fn skip_reason(unit: &TestUnit, filter: Option<&str>) -> Option<String> {
    let filter = filter?;
    if unit.label().to_lowercase().contains(&filter.to_lowercase()) {
        return None;
    }
    Some(format!("Filtered out by substring: {}", filter))
}

// =============================================================================
// RESULTS
// =============================================================================

/// Terminal state of a unit.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum Outcome {
    Pass {
        reference: ExitStatus,
    },
    Fail {
        kind: FailureKind,
        stage: Option<Stage>,
        #[serde(serialize_with = "serialize_display")]
        failure: UnitFailure,
    },
    /// Expected failure. `checked` holds the agreed exit status when the
    /// pipelines were run anyway.
    XFail {
        reason: String,
        checked: Option<ExitStatus>,
    },
    Skipped {
        reason: String,
    },
}

impl Outcome {
    fn fail(failure: UnitFailure) -> Self {
        Outcome::Fail {
            kind: failure.kind(),
            stage: failure.stage(),
            failure,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Fail { .. })
    }
}

fn serialize_display<T: std::fmt::Display, S: Serializer>(
    value: &T,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}

/// Result of running one unit.
#[derive(Debug, Serialize)]
pub struct UnitResult {
    pub label: String,
    pub path: PathBuf,
    #[serde(flatten)]
    pub outcome: Outcome,
    /// Scratch directory, when kept for manual reproduction.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifacts: Option<PathBuf>,
}

/// Outcome counts, with failures broken down by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub xfailed: usize,
    pub skipped: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
}

impl Summary {
    pub fn from_results(results: &[UnitResult]) -> Self {
        let mut summary = Summary {
            total: results.len(),
            ..Summary::default()
        };
        for result in results {
            match &result.outcome {
                Outcome::Pass { .. } => summary.passed += 1,
                Outcome::Fail { kind, .. } => {
                    summary.failed += 1;
                    *summary.failures_by_kind.entry(*kind).or_default() += 1;
                }
                Outcome::XFail { .. } => summary.xfailed += 1,
                Outcome::Skipped { .. } => summary.skipped += 1,
            }
        }
        summary
    }

    pub fn is_success(&self) -> bool {
        self.failed == 0
    }
}

// =============================================================================
// HARNESS
// =============================================================================

pub struct Harness {
    config: HarnessConfig,
    comparator: Comparator,
}

impl Harness {
    pub fn new(config: HarnessConfig) -> Self {
        let runner = ProcessRunner::new(config.timeout);
        let toolchain = Toolchain::new(config.toolchain.clone(), runner);
        Self {
            comparator: Comparator::new(toolchain),
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Discovers fixtures under the test root and plans every unit.
    pub fn discover(&self) -> Result<Plan, HarnessError> {
        let native = collect_native_tests(&self.config.test_root)?;
        let ir = collect_ir_tests(&self.config.test_root)?;
        let units = plan_units(&native.tests, &ir.tests, &self.config.matrix);
        let mut warnings = native.unreadable;
        warnings.extend(ir.unreadable);
        Ok(Plan { units, warnings })
    }

    /// Discovers and runs everything. Discovery warnings are dropped; call
    /// [`Harness::discover`] to see them.
    pub fn run_all(&self) -> Result<Vec<UnitResult>, HarnessError> {
        let plan = self.discover()?;
        Ok(self.run_units(&plan.units))
    }

    /// Runs units on `config.jobs` workers; results come back in plan order.
    pub fn run_units(&self, units: &[TestUnit]) -> Vec<UnitResult> {
        self.run_units_with(units, |_| {})
    }

    /// Like [`Harness::run_units`], calling `on_result` for each unit as soon
    /// as it and every unit planned before it have finished. Callbacks are
    /// serialized and arrive in plan order.
    pub fn run_units_with<F>(&self, units: &[TestUnit], on_result: F) -> Vec<UnitResult>
    where
        F: FnMut(&UnitResult) + Send,
    {
        let next = AtomicUsize::new(0);
        let release = Mutex::new(InOrder::new(units.len(), on_result));
        let jobs = self.config.jobs.max(1).min(units.len().max(1));

        std::thread::scope(|scope| {
            for _ in 0..jobs {
                scope.spawn(|| loop {
                    let idx = next.fetch_add(1, Ordering::Relaxed);
                    let Some(unit) = units.get(idx) else {
                        return;
                    };
                    let result = self.run_unit(unit);
                    if let Ok(mut release) = release.lock() {
                        release.finish(idx, result);
                    }
                });
            }
        });

        release
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .done
    }

    /// Runs a single unit to its terminal state.
    pub fn run_unit(&self, unit: &TestUnit) -> UnitResult {
        let label = unit.label();
        let mut result = UnitResult {
            label: label.clone(),
            path: unit.case.path.clone(),
            outcome: Outcome::Skipped {
                reason: String::new(),
            },
            artifacts: None,
        };

        if let Some(reason) = skip_reason(unit, self.config.filter.as_deref()) {
            result.outcome = Outcome::Skipped { reason };
            return result;
        }
        if self.config.verbose {
            eprintln!("test: {} ({})", label, unit.case.path.display());
        }

        // Decided before any tool runs.
        let marker = match check_xfail(&unit.case.path) {
            Ok(marker) => marker,
            Err(err) => {
                result.outcome = Outcome::fail(err.into());
                return result;
            }
        };
        if let Some(marker) = &marker {
            if !self.config.run_xfail {
                result.outcome = Outcome::XFail {
                    reason: marker.reason.clone(),
                    checked: None,
                };
                return result;
            }
        }

        let scratch = match tempfile::Builder::new()
            .prefix(&format!("cbe-diff-{}-", unit.case.name))
            .tempdir()
        {
            Ok(dir) => dir,
            Err(source) => {
                let err = HarnessError::Io {
                    context: "failed to create scratch directory",
                    path: std::env::temp_dir(),
                    source,
                };
                result.outcome = Outcome::fail(err.into());
                return result;
            }
        };

        let compared = self
            .comparator
            .compare(&unit.case, unit.configuration.as_ref(), scratch.path());
        result.outcome = match (compared, marker) {
            (Ok(agreement), None) => Outcome::Pass {
                reference: agreement.reference,
            },
            (Ok(agreement), Some(marker)) => Outcome::XFail {
                reason: marker.reason,
                checked: Some(agreement.reference),
            },
            (Err(failure), _) => Outcome::fail(failure),
        };

        if self.config.keep_artifacts {
            result.artifacts = Some(scratch.keep());
        }
        result
    }
}

/// Releases results in plan order as the gaps before them fill in.
struct InOrder<F> {
    pending: BTreeMap<usize, UnitResult>,
    done: Vec<UnitResult>,
    on_result: F,
}

impl<F: FnMut(&UnitResult)> InOrder<F> {
    fn new(capacity: usize, on_result: F) -> Self {
        Self {
            pending: BTreeMap::new(),
            done: Vec::with_capacity(capacity),
            on_result,
        }
    }

    fn finish(&mut self, idx: usize, result: UnitResult) {
        self.pending.insert(idx, result);
        while let Some(result) = self.pending.remove(&self.done.len()) {
            (self.on_result)(&result);
            self.done.push(result);
        }
    }
}

/// Units planned from one discovery walk.
#[derive(Debug)]
pub struct Plan {
    pub units: Vec<TestUnit>,
    /// Unreadable entries the walk stepped over.
    pub warnings: Vec<HarnessError>,
}

/// Counts units per source kind, for the listing command.
pub fn count_by_kind(units: &[TestUnit]) -> (usize, usize) {
    units.iter().fold((0, 0), |(native, ir), unit| match unit.case.kind {
        SourceKind::Native(_) => (native + 1, ir),
        SourceKind::Ir => (native, ir + 1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_matrix;

    fn case(path: &str) -> TestCase {
        TestCase::from_path(path).unwrap()
    }

    #[test]
    fn native_tests_cross_the_matrix_and_ir_tests_run_once() {
        let native = [case("/t/test_a.c"), case("/t/test_b.cpp")];
        let ir = [case("/t/test_c.ll")];
        let units = plan_units(&native, &ir, &default_matrix());

        assert_eq!(units.len(), 2 * 4 + 1);
        let labels: Vec<_> = units.iter().map(TestUnit::label).collect();
        assert_eq!(labels[0], "test_a[-O0]");
        assert_eq!(labels[7], "test_b[-O3]");
        assert_eq!(labels[8], "test_c");
        assert_eq!(count_by_kind(&units), (8, 1));
    }

    #[test]
    fn filter_is_case_insensitive_and_skips() {
        let unit = TestUnit {
            case: case("/t/test_Bitfields.c"),
            configuration: Some(Configuration::new(["-O1"])),
        };
        assert_eq!(skip_reason(&unit, None), None);
        assert_eq!(skip_reason(&unit, Some("bitfields")), None);
        assert_eq!(skip_reason(&unit, Some("-o1")), None);
        assert_eq!(
            skip_reason(&unit, Some("vector")),
            Some("Filtered out by substring: vector".to_string())
        );
    }

    fn passed(label: &str) -> UnitResult {
        UnitResult {
            label: label.into(),
            path: format!("/t/{}.c", label).into(),
            outcome: Outcome::Pass {
                reference: ExitStatus::Success,
            },
            artifacts: None,
        }
    }

    #[test]
    fn results_are_released_in_plan_order() {
        let mut seen = Vec::new();
        let mut release = InOrder::new(3, |r: &UnitResult| seen.push(r.label.clone()));
        release.finish(2, passed("c"));
        release.finish(1, passed("b"));
        assert!(release.done.is_empty());
        release.finish(0, passed("a"));
        let labels: Vec<_> = release.done.iter().map(|r| r.label.clone()).collect();
        drop(release);
        assert_eq!(labels, ["a", "b", "c"]);
        assert_eq!(seen, ["a", "b", "c"]);
    }

    #[test]
    fn summary_counts_failures_by_kind() {
        let results = vec![
            UnitResult {
                label: "a".into(),
                path: "/t/a.c".into(),
                outcome: Outcome::Pass {
                    reference: ExitStatus::Success,
                },
                artifacts: None,
            },
            UnitResult {
                label: "b".into(),
                path: "/t/b.c".into(),
                outcome: Outcome::fail(UnitFailure::Divergence {
                    reference: ExitStatus::Success,
                    translated: ExitStatus::Other(1),
                }),
                artifacts: None,
            },
            UnitResult {
                label: "c".into(),
                path: "/t/c.c".into(),
                outcome: Outcome::XFail {
                    reason: "known".into(),
                    checked: None,
                },
                artifacts: None,
            },
        ];
        let summary = Summary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.xfailed, 1);
        assert_eq!(summary.failures_by_kind.get(&FailureKind::Divergence), Some(&1));
        assert!(!summary.is_success());
    }

    #[test]
    fn failed_outcome_serializes_with_kind_and_message() {
        let result = UnitResult {
            label: "test_x[-O2]".into(),
            path: "/t/test_x.c".into(),
            outcome: Outcome::fail(UnitFailure::Divergence {
                reference: ExitStatus::Success,
                translated: ExitStatus::Other(1),
            }),
            artifacts: None,
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["outcome"], "fail");
        assert_eq!(json["kind"], "divergence");
        assert_eq!(json["stage"], "run-translated");
        assert_eq!(
            json["failure"],
            "reference exited with 6 (success) but translated program exited with 1"
        );
        assert!(json.get("artifacts").is_none());
    }
}
