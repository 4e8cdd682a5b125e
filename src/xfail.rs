//! Expected-failure markers.
//!
//! A fixture opts into xfail with a line comment at the start of a line:
//!
//! ```c
//! // xfail: known rounding bug
//! ```
//!
//! Detection is a pure scan of the source text and happens before any tool
//! runs, so a fixture already known to be broken never touches the toolchain.

use std::fs;
use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::diagnostics::HarnessError;
use crate::err_io;

static XFAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^// xfail: (.+)$").expect("xfail pattern is valid"));

/// An `xfail:` annotation found in a test source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct XfailMarker {
    pub reason: String,
    /// 1-based line of the marker.
    pub line: usize,
}

/// Returns the first xfail marker in `source`, if any.
pub fn detect_xfail(source: &str) -> Option<XfailMarker> {
    let captures = XFAIL_RE.captures(source)?;
    let whole = captures.get(0)?;
    let reason = captures.get(1)?.as_str().trim_end_matches('\r').trim().to_string();
    let line = source[..whole.start()].matches('\n').count() + 1;
    Some(XfailMarker { reason, line })
}

/// Reads a test source from disk and scans it for a marker.
pub fn check_xfail(path: &Path) -> Result<Option<XfailMarker>, HarnessError> {
    let bytes = fs::read(path).map_err(err_io!("failed to read test source", path))?;
    Ok(detect_xfail(&String::from_utf8_lossy(&bytes)))
}
