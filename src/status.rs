//! Exit-status convention shared by every test fixture.
//!
//! Fixtures signal their verdict through the process exit code: `6` means the
//! program ran to completion and checked itself, `25` means it deliberately
//! reports a known failure. Any other code is a defect.

use serde::Serialize;
use std::fmt;

/// Exit code used by fixtures to indicate success.
pub const TEST_SUCCESS_EXIT_CODE: i32 = 6;
/// Exit code used by fixtures to indicate an expected failure.
pub const TEST_XFAIL_EXIT_CODE: i32 = 25;

/// Classified exit status of a pipeline's final executable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "i32")]
pub enum ExitStatus {
    Success,
    Xfail,
    Other(i32),
}

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        match code {
            TEST_SUCCESS_EXIT_CODE => ExitStatus::Success,
            TEST_XFAIL_EXIT_CODE => ExitStatus::Xfail,
            other => ExitStatus::Other(other),
        }
    }

    pub fn code(self) -> i32 {
        match self {
            ExitStatus::Success => TEST_SUCCESS_EXIT_CODE,
            ExitStatus::Xfail => TEST_XFAIL_EXIT_CODE,
            ExitStatus::Other(code) => code,
        }
    }

    /// True for the two codes a well-formed fixture may produce.
    pub fn is_sentinel(self) -> bool {
        !matches!(self, ExitStatus::Other(_))
    }
}

impl From<ExitStatus> for i32 {
    fn from(status: ExitStatus) -> Self {
        status.code()
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Success => write!(f, "{} (success)", TEST_SUCCESS_EXIT_CODE),
            ExitStatus::Xfail => write!(f, "{} (xfail)", TEST_XFAIL_EXIT_CODE),
            ExitStatus::Other(code) => write!(f, "{}", code),
        }
    }
}
