pub mod machine;
pub mod outcome;
pub mod session;

pub use machine::{MachineOptions, StateMachine};
pub use outcome::{Halt, StepOutcome};
pub use session::{OPERATOR_ARTIFACTS, ProjectSession};
