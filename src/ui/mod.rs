pub mod icons;
pub mod report;

pub use report::{print_fatal, print_outcome, render_gate_history, render_outcome, render_status};
