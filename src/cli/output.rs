//! Handles all user-facing output for the CLI.
//!
//! Passing, expected-failure and skipped units go to stdout; failures and their
//! details go to stderr. Everything is written through `termcolor` so colors
//! can be switched off for pipes and tests.

use std::io::{self, Write};

use serde::Serialize;
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::cli::args::ColorMode;
use crate::diagnostics::HarnessError;
use crate::driver::{count_by_kind, Outcome, Summary, TestUnit, UnitResult};

/// Resolves the color mode, treating a non-terminal stdout as `never`.
pub fn color_choice(mode: ColorMode) -> ColorChoice {
    match mode {
        ColorMode::Always => ColorChoice::Always,
        ColorMode::Never => ColorChoice::Never,
        ColorMode::Auto if atty::is(atty::Stream::Stdout) => ColorChoice::Auto,
        ColorMode::Auto => ColorChoice::Never,
    }
}

/// Every unit line followed by the footer.
pub fn write_report<O: WriteColor, E: WriteColor>(
    out: &mut O,
    err: &mut E,
    results: &[UnitResult],
    summary: &Summary,
) -> io::Result<()> {
    for result in results {
        write_result(out, err, result)?;
    }
    write_footer(out, err, results, summary)
}

/// Summary plus the list of failed units, written once everything ran.
pub fn write_footer<O: WriteColor, E: WriteColor>(
    out: &mut O,
    err: &mut E,
    results: &[UnitResult],
    summary: &Summary,
) -> io::Result<()> {
    write_summary(out, summary)?;

    if summary.failed > 0 {
        writeln!(err, "\nFailed tests:")?;
        for result in results.iter().filter(|r| r.outcome.is_failure()) {
            writeln!(err, "  - {} [{}]", result.label, result.path.display())?;
        }
    }
    Ok(())
}

/// Writes unit lines to the terminal while the run is still going.
///
/// The first write error stops further output and is returned by
/// [`LiveReport::finish`].
pub struct LiveReport {
    out: StandardStream,
    err: StandardStream,
    error: Option<io::Error>,
}

impl LiveReport {
    pub fn new(choice: ColorChoice) -> Self {
        Self {
            out: StandardStream::stdout(choice),
            err: StandardStream::stderr(choice),
            error: None,
        }
    }

    pub fn result(&mut self, result: &UnitResult) {
        if self.error.is_none() {
            if let Err(e) = write_result(&mut self.out, &mut self.err, result) {
                self.error = Some(e);
            }
        }
    }

    pub fn finish(mut self, results: &[UnitResult], summary: &Summary) -> io::Result<()> {
        if let Some(e) = self.error.take() {
            return Err(e);
        }
        write_footer(&mut self.out, &mut self.err, results, summary)
    }
}

/// Reports entries discovery had to step over.
pub fn write_warnings<W: WriteColor>(w: &mut W, warnings: &[HarnessError]) -> io::Result<()> {
    for warning in warnings {
        tag(w, "warning", Color::Yellow)?;
        write!(w, ": {}", warning)?;
        let mut source = std::error::Error::source(warning);
        while let Some(cause) = source {
            write!(w, ": {}", cause)?;
            source = cause.source();
        }
        writeln!(w)?;
    }
    Ok(())
}

fn write_result<O: WriteColor, E: WriteColor>(
    out: &mut O,
    err: &mut E,
    result: &UnitResult,
) -> io::Result<()> {
    let path = result.path.display();
    match &result.outcome {
        Outcome::Pass { .. } => {
            tag(out, "PASS", Color::Green)?;
            writeln!(out, ": {} [{}]", result.label, path)
        }
        Outcome::XFail { reason, checked } => {
            tag(out, "XFAIL", Color::Yellow)?;
            match checked {
                Some(status) => writeln!(
                    out,
                    ": {} [{}] ({}; both pipelines exited {})",
                    result.label, path, reason, status
                ),
                None => writeln!(out, ": {} [{}] ({})", result.label, path, reason),
            }
        }
        Outcome::Skipped { reason } => {
            tag(out, "SKIP", Color::Yellow)?;
            writeln!(out, ": {} [{}] ({})", result.label, path, reason)
        }
        Outcome::Fail {
            kind,
            stage,
            failure,
        } => {
            tag(err, "FAIL", Color::Red)?;
            writeln!(err, ": {} [{}]", result.label, path)?;
            writeln!(err, "  Kind: {}", kind)?;
            if let Some(stage) = stage {
                writeln!(err, "  Stage: {}", stage)?;
            }
            let message = failure.to_string();
            let mut lines = message.lines();
            if let Some(first) = lines.next() {
                writeln!(err, "  Error: {}", first)?;
            }
            for line in lines {
                writeln!(err, "    {}", line)?;
            }
            if let Some(dir) = &result.artifacts {
                writeln!(err, "  Artifacts: {}", dir.display())?;
            }
            Ok(())
        }
    }
}

fn write_summary<O: WriteColor>(out: &mut O, summary: &Summary) -> io::Result<()> {
    write!(out, "\nTest summary: total {}, ", summary.total)?;
    tag(out, "passed", Color::Green)?;
    write!(out, " {}, ", summary.passed)?;
    tag(out, "failed", Color::Red)?;
    write!(out, " {}, ", summary.failed)?;
    tag(out, "xfailed", Color::Yellow)?;
    write!(out, " {}, ", summary.xfailed)?;
    tag(out, "skipped", Color::Yellow)?;
    writeln!(out, " {}", summary.skipped)?;
    for (kind, count) in &summary.failures_by_kind {
        writeln!(out, "  {}: {}", kind, count)?;
    }
    Ok(())
}

fn tag<W: WriteColor>(w: &mut W, text: &str, color: Color) -> io::Result<()> {
    w.set_color(ColorSpec::new().set_fg(Some(color)).set_bold(true))?;
    write!(w, "{}", text)?;
    w.reset()
}

#[derive(Serialize)]
struct JsonReport<'a> {
    results: &'a [UnitResult],
    summary: &'a Summary,
}

/// Machine-readable report on stdout.
pub fn print_json(results: &[UnitResult], summary: &Summary) -> io::Result<()> {
    let stdout = io::stdout();
    let mut lock = stdout.lock();
    write_json(&mut lock, results, summary)
}

pub fn write_json<W: Write>(w: &mut W, results: &[UnitResult], summary: &Summary) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *w, &JsonReport { results, summary })?;
    writeln!(w)
}

/// One line per planned unit, then totals.
pub fn write_listing<W: Write>(w: &mut W, units: &[TestUnit], skipped: &[bool]) -> io::Result<()> {
    for (unit, &skip) in units.iter().zip(skipped) {
        let marker = if skip { " (filtered)" } else { "" };
        writeln!(w, "{} [{}]{}", unit.label(), unit.case.path.display(), marker)?;
    }
    let (native, ir) = count_by_kind(units);
    writeln!(w, "\n{} units: {} native, {} ir", units.len(), native, ir)
}
