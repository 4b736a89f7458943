use std::any::Any;

use serde_json::Value;

use crate::workflow::{Message, SharedState, WorkflowEvent};

/// Handle an executor uses to talk to the rest of the workflow while it
/// handles one message.
///
/// Sends and outputs are buffered; the runner routes them after `execute`
/// returns. Outside a workflow, create one with [`WorkflowContext::new`] and
/// read the buffers back with the `drain_*` methods.
#[derive(Debug)]
pub struct WorkflowContext {
    executor_id: String,
    shared_state: SharedState,
    messages: Vec<Message>,
    outputs: Vec<Message>,
    events: Vec<WorkflowEvent>,
}

impl WorkflowContext {
    pub fn new(executor_id: impl Into<String>) -> Self {
        Self::with_shared_state(executor_id, SharedState::new())
    }

    pub fn with_shared_state(executor_id: impl Into<String>, shared_state: SharedState) -> Self {
        Self {
            executor_id: executor_id.into(),
            shared_state,
            messages: Vec::new(),
            outputs: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn executor_id(&self) -> &str {
        &self.executor_id
    }

    /// Sends along every outgoing edge whose condition accepts the message.
    pub fn send_message<T>(&mut self, message: T)
    where
        T: Any + Send + Sync,
    {
        self.messages
            .push(Message::new(message).with_source(&self.executor_id));
    }

    /// Sends along the outgoing edge to `target_id` only.
    pub fn send_message_to<T>(&mut self, target_id: impl Into<String>, message: T)
    where
        T: Any + Send + Sync,
    {
        self.messages.push(
            Message::new(message)
                .with_source(&self.executor_id)
                .addressed_to(target_id),
        );
    }

    pub fn yield_output<T>(&mut self, output: T)
    where
        T: Any + Send + Sync,
    {
        self.outputs
            .push(Message::new(output).with_source(&self.executor_id));
    }

    pub fn add_event(&mut self, event: WorkflowEvent) {
        self.events.push(event);
    }

    /// Shorthand for a [`WorkflowEvent::Custom`] attributed to this executor.
    pub fn add_custom_event(&mut self, name: impl Into<String>, data: Value) {
        let event = WorkflowEvent::custom(self.executor_id.clone(), name, data);
        self.events.push(event);
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    pub fn drain_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.messages)
    }

    pub fn drain_outputs(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.outputs)
    }

    pub fn drain_events(&mut self) -> Vec<WorkflowEvent> {
        std::mem::take(&mut self.events)
    }
}
