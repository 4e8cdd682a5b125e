//! Harness error handling.
//!
//! Two layers live here:
//!
//! - [`HarnessError`]: infrastructure failures (spawning a tool, a stage that was
//!   not silent, a timeout, filesystem or configuration problems). It derives
//!   `miette::Diagnostic` so the binary can render it with codes and help text.
//! - The `err_io!` macro, which wraps an `std::io::Error` with the path it
//!   concerns. Every IO error the harness surfaces names its file.
//!
//! Per-unit verdicts (divergence, fixture defects) are not errors of the harness
//! and live in [`crate::comparator::UnitFailure`].

use std::path::PathBuf;
use std::time::Duration;

use miette::Diagnostic;
use thiserror::Error;

/// Unified error type for everything the harness itself can trip over.
#[derive(Debug, Error, Diagnostic)]
pub enum HarnessError {
    #[error("failed to spawn `{command}`")]
    #[diagnostic(
        code(cbe_diff::spawn),
        help("check that the tool exists and is executable, or override its path")
    )]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// A silent-mode stage wrote to stdout/stderr or exited nonzero.
    #[error(
        "unexpected output from process (exit code {exit_code})\ncommand: {command}\n\nstdout:\n{stdout}\n\nstderr:\n{stderr}"
    )]
    #[diagnostic(code(cbe_diff::toolchain))]
    NotSilent {
        command: String,
        exit_code: i32,
        stdout: String,
        stderr: String,
    },

    #[error("`{command}` timed out after {}s", .limit.as_secs_f64())]
    #[diagnostic(
        code(cbe_diff::timeout),
        help("raise the limit with --timeout, or pass --timeout 0 to disable it")
    )]
    Timeout { command: String, limit: Duration },

    #[error("{context}: {}", .path.display())]
    #[diagnostic(code(cbe_diff::io))]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk test directory {}", .root.display())]
    #[diagnostic(code(cbe_diff::discovery))]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error("no optimization levels in `{levels}`")]
    #[diagnostic(
        code(cbe_diff::config),
        help("pass a comma-separated list such as `0,1,2,3` or `-O2,-Os`")
    )]
    EmptyMatrix { levels: String },

    #[error("invalid configuration file {}", .path.display())]
    #[diagnostic(code(cbe_diff::config))]
    Config {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

impl HarnessError {
    /// True when the failure is a toolchain stage that produced diagnostics.
    pub fn is_diagnostic(&self) -> bool {
        matches!(self, HarnessError::NotSilent { .. })
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, HarnessError::Timeout { .. })
    }
}

/// Wraps an `io::Error` into [`HarnessError::Io`] with the offending path.
///
/// `err_io!("failed to read test source", path)` produces a closure suitable for
/// `map_err`.
#[macro_export]
macro_rules! err_io {
    ($context:expr, $path:expr) => {
        |source: std::io::Error| $crate::diagnostics::HarnessError::Io {
            context: $context,
            path: std::path::PathBuf::from($path),
            source,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_silent_message_carries_command_and_streams() {
        let err = HarnessError::NotSilent {
            command: "llvm-cbe ir.ll -o cbe.c".to_string(),
            exit_code: 0,
            stdout: String::new(),
            stderr: "warning: something odd".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("llvm-cbe ir.ll -o cbe.c"));
        assert!(msg.contains("warning: something odd"));
        assert!(err.is_diagnostic());
        assert!(!err.is_timeout());
    }

    #[test]
    fn diagnostic_codes_are_stable() {
        let err = HarnessError::Timeout {
            command: "lli test.ll".to_string(),
            limit: Duration::from_secs(2),
        };
        let code = err.code().map(|c| c.to_string());
        assert_eq!(code.as_deref(), Some("cbe_diff::timeout"));
        assert_eq!(err.to_string(), "`lli test.ll` timed out after 2s");
    }

    #[test]
    fn err_io_names_the_path() {
        let err = std::fs::read_to_string("/definitely/not/here.c")
            .map_err(err_io!("failed to read test source", "/definitely/not/here.c"))
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "failed to read test source: /definitely/not/here.c"
        );
    }
}
