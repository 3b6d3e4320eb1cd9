//! tether CLI library module.
//!
//! The binary is a thin front end over `tether-exec` and `tether-remote`:
//! it builds one invocation per command, runs it under a deadline, relays the
//! captured output and maps the outcome to an exit code.
//!
//! # Module Organization
//!
//! - `cli/` - argument parsing, dispatch, Ctrl+C wiring
//! - `utils/` - timeout parsing, output relay, exit codes
//! - `*_cmd.rs` - individual commands

pub mod cli;
pub mod utils;

pub mod backup_cmd;
pub mod hosts_cmd;
pub mod run_cmd;
pub mod scp_cmd;
pub mod ssh_cmd;
