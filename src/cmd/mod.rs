//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module    | Commands handled                           |
//! |-----------|--------------------------------------------|
//! | `project` | `Init`, `Import`                           |
//! | `run`     | `Step`, `Run`                              |
//! | `phase`   | `Status`, `History`, `Maintain`, `Archive` |
//! | `config`  | `Config`                                   |
//!
//! Commands return the process exit code; fatal failures come back as errors
//! and exit with `EXIT_FATAL`.

pub mod config;
pub mod phase;
pub mod project;
pub mod run;

pub use config::cmd_config;
pub use phase::{cmd_archive, cmd_history, cmd_maintain, cmd_status};
pub use project::{cmd_import, cmd_init};
pub use run::{cmd_run, cmd_step};
