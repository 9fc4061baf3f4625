//! Function boundary table: the data model the recompiler consumes.
//!
//! - `FunctionEntry`: one named half-open byte range `[address, address + size)`.
//! - `FunctionTable`: ordered, non-overlapping entries keyed by address, with the
//!   `split` / `adjust_boundary` mutations used by the repair passes.
//! - Persistence (`load` / `store`) in JSON or YAML.

mod entry;
mod store;
mod table;

pub use entry::FunctionEntry;
pub use store::{TableFile, TableFormat, TableSink};
pub use table::{
    AdjustError, BoundaryAdjustment, FunctionTable, SplitError, SplitOutcome, TableError,
};
