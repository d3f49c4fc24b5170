pub mod error;
pub mod machine;
pub mod types;

pub use error::WorkflowError;
pub use machine::{StateOf, WorkflowMachine};
