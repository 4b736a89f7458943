use async_trait::async_trait;

use crate::error::WorkflowError;
use crate::workflow::{Message, TypeKey, WorkflowContext};

/// A node of the workflow graph.
///
/// An executor declares the payload types it accepts and handles one message
/// at a time, talking to the graph through the [`WorkflowContext`]:
/// `send_message` feeds downstream executors, `yield_output` surfaces a value
/// to the caller and `add_event` records an observable event.
#[async_trait]
pub trait Executor: Send + Sync {
    fn id(&self) -> &str;

    fn input_types(&self) -> Vec<TypeKey>;

    /// Types this executor sends downstream. When declared, edges out of the
    /// executor are checked against their targets when the workflow is built.
    fn output_types(&self) -> Vec<TypeKey> {
        Vec::new()
    }

    fn can_handle(&self, message: &Message) -> bool {
        self.input_types()
            .iter()
            .any(|key| *key == message.type_key())
    }

    async fn execute(&self, message: Message, ctx: &mut WorkflowContext)
    -> Result<(), WorkflowError>;
}
