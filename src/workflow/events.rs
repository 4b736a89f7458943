use std::fmt;

use serde_json::Value;

use crate::agent::AgentRunResponseUpdate;
use crate::workflow::Message;

/// Everything observable about a workflow run, in the order it happened.
#[derive(Clone, Debug)]
pub enum WorkflowEvent {
    Started,
    ExecutorInvoked {
        executor_id: String,
    },
    ExecutorCompleted {
        executor_id: String,
    },
    /// A value yielded with `yield_output`, or a message sent by an executor
    /// without outgoing edges.
    Output {
        executor_id: String,
        data: Message,
    },
    AgentRunUpdate {
        executor_id: String,
        update: AgentRunResponseUpdate,
    },
    Custom {
        executor_id: String,
        name: String,
        data: Value,
    },
    SuperstepCompleted {
        superstep: u32,
    },
    Failed {
        executor_id: String,
        message: String,
    },
    Completed {
        supersteps: u32,
    },
}

impl WorkflowEvent {
    pub fn custom(executor_id: impl Into<String>, name: impl Into<String>, data: Value) -> Self {
        WorkflowEvent::Custom {
            executor_id: executor_id.into(),
            name: name.into(),
            data,
        }
    }

    pub fn executor_id(&self) -> Option<&str> {
        match self {
            WorkflowEvent::ExecutorInvoked { executor_id }
            | WorkflowEvent::ExecutorCompleted { executor_id }
            | WorkflowEvent::Output { executor_id, .. }
            | WorkflowEvent::AgentRunUpdate { executor_id, .. }
            | WorkflowEvent::Custom { executor_id, .. }
            | WorkflowEvent::Failed { executor_id, .. } => Some(executor_id),
            WorkflowEvent::Started
            | WorkflowEvent::SuperstepCompleted { .. }
            | WorkflowEvent::Completed { .. } => None,
        }
    }
}

impl fmt::Display for WorkflowEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowEvent::Started => write!(f, "WorkflowStarted"),
            WorkflowEvent::ExecutorInvoked { executor_id } => {
                write!(f, "ExecutorInvoked(executor_id={executor_id})")
            }
            WorkflowEvent::ExecutorCompleted { executor_id } => {
                write!(f, "ExecutorCompleted(executor_id={executor_id})")
            }
            WorkflowEvent::Output { executor_id, data } => {
                write!(f, "WorkflowOutput(executor_id={executor_id}, type={})", data.type_name())
            }
            WorkflowEvent::AgentRunUpdate {
                executor_id,
                update,
            } => write!(f, "AgentRunUpdate(executor_id={executor_id}, data={update})"),
            WorkflowEvent::Custom {
                executor_id,
                name,
                data,
            } => write!(f, "{name}(executor_id={executor_id}, data={data})"),
            WorkflowEvent::SuperstepCompleted { superstep } => {
                write!(f, "SuperstepCompleted(superstep={superstep})")
            }
            WorkflowEvent::Failed {
                executor_id,
                message,
            } => write!(f, "ExecutorFailed(executor_id={executor_id}, error={message})"),
            WorkflowEvent::Completed { supersteps } => {
                write!(f, "WorkflowCompleted(supersteps={supersteps})")
            }
        }
    }
}
