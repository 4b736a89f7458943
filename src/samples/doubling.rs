use async_trait::async_trait;
use num_bigint::BigInt;
use serde_json::Value;

use crate::error::WorkflowError;
use crate::llm::ChatMessage;
use crate::workflow::{Executor, Message, TypeKey, WorkflowContext};

pub const DEFAULT_THRESHOLD: i64 = 10;

fn parse_number(executor_id: &str, text: &str) -> Result<BigInt, WorkflowError> {
    text.trim()
        .parse::<BigInt>()
        .map_err(|err| WorkflowError::ExecutorFailed {
            executor: executor_id.to_string(),
            message: format!("expected an integer, got {text:?}: {err}"),
        })
}

fn double(number: &BigInt) -> BigInt {
    number + number
}

/// JSON number when the value fits in an `i64`, decimal string otherwise.
fn number_value(number: &BigInt) -> Value {
    i64::try_from(number)
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(number.to_string()))
}

/// Takes a `String` holding an integer and sends its double as a `String`.
pub struct NumberDoubleExecutor {
    id: String,
}

impl NumberDoubleExecutor {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

#[async_trait]
impl Executor for NumberDoubleExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let text = message.require::<String>(&self.id)?;
        let doubled = double(&parse_number(&self.id, text)?);
        tracing::info!(executor = %self.id, %doubled, "doubled number");
        ctx.send_message(doubled.to_string());
        Ok(())
    }
}

/// Doubles the integer in the last message of a conversation.
///
/// Below the threshold the result is sent on as a new user message; once it
/// reaches the threshold it is yielded as the workflow output and nothing is
/// sent, which ends a cycle of these executors. The output is a
/// [`BigInt`].
pub struct DoublingLoopExecutor {
    id: String,
    threshold: i64,
}

impl DoublingLoopExecutor {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            threshold: DEFAULT_THRESHOLD,
        }
    }

    pub fn with_threshold(mut self, threshold: i64) -> Self {
        self.threshold = threshold;
        self
    }
}

#[async_trait]
impl Executor for DoublingLoopExecutor {
    fn id(&self) -> &str {
        &self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Vec<ChatMessage>>()]
    }

    fn output_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<Vec<ChatMessage>>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let messages = message.require::<Vec<ChatMessage>>(&self.id)?;
        let last = messages
            .last()
            .ok_or_else(|| WorkflowError::ExecutorFailed {
                executor: self.id.clone(),
                message: "no messages to read a number from".to_string(),
            })?;

        let doubled = double(&parse_number(&self.id, &last.text())?);
        tracing::info!(executor = %self.id, %doubled, "doubled number");
        ctx.add_custom_event("doubled", number_value(&doubled));

        if doubled < BigInt::from(self.threshold) {
            ctx.send_message(vec![ChatMessage::user(doubled.to_string())]);
        } else {
            ctx.yield_output(doubled);
        }
        Ok(())
    }
}
