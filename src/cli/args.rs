//! Defines the command-line arguments and subcommands for the cbe-diff CLI.
//!
//! This module uses the `clap` crate with its "derive" feature to create a
//! declarative and type-safe argument parsing structure. The `LLVMToolDir`
//! environment variable is read here and nowhere else.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// The main CLI argument structure.
#[derive(Debug, Parser)]
#[command(
    name = "cbe-diff",
    version,
    about = "Checks that programs behave the same when built natively and when round-tripped through llvm-cbe."
)]
pub struct CbeDiffArgs {
    #[command(subcommand)]
    pub command: Command,
}

/// An enumeration of all available CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Discover and run every test unit under a directory.
    Run(RunArgs),
    /// Print the planned test units without running anything.
    List(SelectionArgs),
}

/// Which tests to plan.
#[derive(Debug, Args)]
pub struct SelectionArgs {
    /// Directory searched recursively for `test_*.c`, `test_*.cpp` and `test_*.ll`.
    #[arg(default_value = ".")]
    pub test_root: PathBuf,

    /// Only run units whose label contains this substring (case-insensitive).
    #[arg(long, short = 'k')]
    pub filter: Option<String>,

    /// Comma-separated optimization levels for native tests, e.g. `0,2,s`.
    #[arg(long, value_name = "LEVELS")]
    pub opt_levels: Option<String>,
}

/// Where the external tools live.
#[derive(Debug, Args)]
pub struct ToolArgs {
    /// YAML file overriding tool paths and flag sets.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Directory containing the llvm-cbe binary.
    #[arg(long, env = "LLVMToolDir", value_name = "DIR")]
    pub tool_dir: Option<PathBuf>,

    /// Path of the translator under test; wins over --tool-dir.
    #[arg(long, value_name = "PATH")]
    pub translator: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub interpreter: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub clang: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub clangxx: Option<PathBuf>,

    /// Compiler used for the translator's C output.
    #[arg(long, value_name = "PATH")]
    pub gcc: Option<PathBuf>,

    /// Include directory passed as `-I` to every C compile.
    #[arg(long, value_name = "DIR")]
    pub include_dir: Option<PathBuf>,
}

#[derive(Debug, Args)]
pub struct RunArgs {
    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub tools: ToolArgs,

    /// Number of units run in parallel (defaults to the number of CPUs).
    #[arg(long, short = 'j')]
    pub jobs: Option<usize>,

    /// Per-invocation limit in seconds; 0 disables it.
    #[arg(long, value_name = "SECS", default_value_t = 60)]
    pub timeout: u64,

    /// Run the pipelines of xfail-marked tests and require them to agree.
    #[arg(long)]
    pub run_xfail: bool,

    /// Keep each unit's scratch directory and print its path.
    #[arg(long)]
    pub keep_artifacts: bool,

    #[arg(long, value_enum, default_value_t = OutputFormat::Human)]
    pub format: OutputFormat,

    #[arg(long, value_enum, default_value_t = ColorMode::Auto)]
    pub color: ColorMode,

    /// Echo each unit as it starts.
    #[arg(long, short = 'v')]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ColorMode {
    Auto,
    Always,
    Never,
}
