pub mod analysis;
pub mod history;
pub mod project;
pub mod repair;
pub mod table;
pub mod util;

pub use analysis::*;
pub use history::*;
pub use project::*;
pub use repair::*;
pub use table::*;
pub use util::*;
