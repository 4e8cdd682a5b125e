//! Differential testing for the LLVM C backend.
//!
//! Every fixture is built twice: directly to a native executable, and through
//! IR -> C (the translator under test) -> a different C compiler. Both programs
//! must exit with the same sentinel code. See [`driver::Harness`] for the entry
//! point and [`comparator`] for the protocols.

pub use crate::diagnostics::HarnessError;

pub mod cli;
pub mod comparator;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod driver;
pub mod process;
pub mod status;
pub mod toolchain;
pub mod xfail;
