//! Shared utilities for the tether commands.
//!
//! - `duration` - timeout strings on the command line
//! - `report` - relaying outcomes and mapping them to exit codes
//! - `terminal` - colors and pipe-safe output

pub mod duration;
pub mod report;
pub mod terminal;

pub use duration::{format_timeout, parse_grace, parse_timeout};
pub use report::{
    EXIT_CANCELLED, EXIT_FAILURE, EXIT_OK, EXIT_TIMED_OUT, OutcomeReport, emit, exit_code_for,
    print_json,
};
pub use terminal::{TermColor, safe_write_stderr, safe_write_stdout};
