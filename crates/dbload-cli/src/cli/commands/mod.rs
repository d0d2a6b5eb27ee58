//! CLI command handlers, one per file.

mod completions;
mod load;
mod serve;

pub use completions::run_completions;
pub use load::run_load;
pub use serve::run_serve;
