pub mod context;
pub mod decision;
pub mod workflow;

pub use decision::{decide, parse_decision};
pub use workflow::{DefaultWorkflow, WorkflowEngine};
