//! Message-passing graphs of executors.
//!
//! A [`Workflow`] delivers a start message to its start executor and then
//! routes whatever each executor sends along the outgoing edges, one
//! superstep at a time, until nothing is pending.

mod agent;
mod builder;
mod context;
mod events;
mod executor;
mod message;
mod runner;
mod state;

pub use agent::{AgentExecutor, WorkflowAgent};
pub use builder::{Edge, WorkflowBuilder};
pub use context::WorkflowContext;
pub use events::WorkflowEvent;
pub use executor::Executor;
pub use message::{Message, TypeKey};
pub use runner::{Workflow, WorkflowRunResult};
pub use state::SharedState;

#[cfg(test)]
mod tests;
