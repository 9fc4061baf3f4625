//! entryfix-core
//!
//! Core library for reconstructing and repairing the function boundary table
//! consumed by a static recompiler for MIPS (R5900-class) binaries.
//!
//! This crate loads the binary's loadable code, classifies control-flow
//! instructions, discovers mandatory entry points, corrects boundaries that
//! separate a branch from its delay slot, and drives the iterative repair loop
//! against the external recompile-and-run oracle.
//!
//! All substantive logic lives here so it is fully testable and reusable from
//! multiple frontends (CLI, scripts, etc.).

pub mod analysis;
pub mod db;
pub mod image;
pub mod isa;
pub mod model;
pub mod services;
pub mod symbols;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
