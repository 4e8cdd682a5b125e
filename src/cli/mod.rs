//! The cbe-diff Command-Line Interface.
//!
//! This module is the main entry point for all CLI commands. It resolves the
//! configuration surface (YAML file, `LLVMToolDir`, per-tool flags) into an
//! explicit [`HarnessConfig`] and hands it to the driver.

use std::io;
use std::time::Duration;

use clap::Parser;
use termcolor::{ColorChoice, StandardStream};

use crate::cli::args::{CbeDiffArgs, Command, OutputFormat, RunArgs, SelectionArgs, ToolArgs};
use crate::config::{default_jobs, parse_matrix, HarnessConfig, ToolchainConfig};
use crate::diagnostics::HarnessError;
use crate::driver::{skip_reason, Harness, Summary};

pub mod args;
pub mod output;

/// Parses the process arguments and runs the requested command.
///
/// Returns the process exit code: `0` when no unit failed, `1` otherwise.
pub fn run() -> Result<i32, HarnessError> {
    run_with(CbeDiffArgs::parse())
}

pub fn run_with(args: CbeDiffArgs) -> Result<i32, HarnessError> {
    match args.command {
        Command::Run(run) => handle_run(run),
        Command::List(selection) => handle_list(selection),
    }
}

fn handle_run(args: RunArgs) -> Result<i32, HarnessError> {
    let config = harness_config(&args)?;
    let harness = Harness::new(config);
    let plan = harness.discover()?;
    let choice = output::color_choice(args.color);
    report_warnings(&plan.warnings, choice);

    let (written, summary) = match args.format {
        OutputFormat::Human => {
            let mut live = output::LiveReport::new(choice);
            let results = harness.run_units_with(&plan.units, |result| live.result(result));
            let summary = Summary::from_results(&results);
            (live.finish(&results, &summary), summary)
        }
        OutputFormat::Json => {
            let results = harness.run_units(&plan.units);
            let summary = Summary::from_results(&results);
            (output::print_json(&results, &summary), summary)
        }
    };
    if let Err(e) = written {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error writing report: {}", e);
        }
    }

    Ok(if summary.is_success() { 0 } else { 1 })
}

fn handle_list(selection: SelectionArgs) -> Result<i32, HarnessError> {
    let mut config = HarnessConfig::new(&selection.test_root);
    apply_selection(&mut config, &selection)?;
    let harness = Harness::new(config);
    let plan = harness.discover()?;
    report_warnings(&plan.warnings, ColorChoice::Never);
    let filter = harness.config().filter.as_deref();
    let skipped: Vec<bool> = plan
        .units
        .iter()
        .map(|unit| skip_reason(unit, filter).is_some())
        .collect();

    let stdout = io::stdout();
    let mut lock = stdout.lock();
    if let Err(e) = output::write_listing(&mut lock, &plan.units, &skipped) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("Error writing listing: {}", e);
        }
    }
    Ok(0)
}

fn report_warnings(warnings: &[HarnessError], choice: ColorChoice) {
    if warnings.is_empty() {
        return;
    }
    let mut stderr = StandardStream::stderr(choice);
    let _ = output::write_warnings(&mut stderr, warnings);
}

fn apply_selection(
    config: &mut HarnessConfig,
    selection: &SelectionArgs,
) -> Result<(), HarnessError> {
    config.filter = selection.filter.clone();
    if let Some(levels) = &selection.opt_levels {
        config.matrix = parse_matrix(levels)?;
    }
    Ok(())
}

/// Builds the harness configuration from defaults, the YAML file, the tool
/// directory and the individual tool flags, in increasing precedence.
pub fn harness_config(args: &RunArgs) -> Result<HarnessConfig, HarnessError> {
    let mut config = HarnessConfig::new(&args.selection.test_root);
    apply_selection(&mut config, &args.selection)?;
    config.toolchain = toolchain_config(&args.tools, &config.toolchain)?;
    config.timeout = (args.timeout > 0).then(|| Duration::from_secs(args.timeout));
    config.jobs = args.jobs.unwrap_or_else(default_jobs);
    config.run_xfail = args.run_xfail;
    config.keep_artifacts = args.keep_artifacts;
    config.verbose = args.verbose;
    Ok(config)
}

fn toolchain_config(
    tools: &ToolArgs,
    defaults: &ToolchainConfig,
) -> Result<ToolchainConfig, HarnessError> {
    let mut toolchain = match &tools.config {
        Some(path) => ToolchainConfig::from_yaml_file(path)?,
        None => defaults.clone(),
    };
    if let Some(dir) = &tools.tool_dir {
        toolchain = toolchain.with_tool_dir(dir);
    }
    let overrides = [
        (&tools.translator, &mut toolchain.translator),
        (&tools.interpreter, &mut toolchain.interpreter),
        (&tools.clang, &mut toolchain.clang),
        (&tools.clangxx, &mut toolchain.clangxx),
        (&tools.gcc, &mut toolchain.gcc),
        (&tools.include_dir, &mut toolchain.include_dir),
    ];
    for (value, slot) in overrides {
        if let Some(value) = value {
            *slot = value.clone();
        }
    }
    Ok(toolchain)
}
