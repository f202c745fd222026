//! Command-line interface: argument parsing, dispatch, and output
//! formatting.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::{OutputFormat, format_error};
pub use parser::{Cli, Commands};
