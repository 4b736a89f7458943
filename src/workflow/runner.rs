use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use async_stream::try_stream;
use futures_util::StreamExt;
use futures_util::stream::BoxStream;

use crate::error::WorkflowError;
use crate::workflow::{
    Edge, Executor, Message, SharedState, WorkflowAgent, WorkflowContext, WorkflowEvent,
};

/// Result of a completed run.
#[derive(Clone, Debug, Default)]
pub struct WorkflowRunResult {
    pub outputs: Vec<Message>,
    pub events: Vec<WorkflowEvent>,
    pub supersteps: u32,
}

impl WorkflowRunResult {
    /// Outputs whose payload is a `T`, in emission order.
    pub fn outputs_of<T: Any + Clone>(&self) -> Vec<T> {
        self.outputs
            .iter()
            .filter_map(Message::downcast::<T>)
            .collect()
    }

    pub fn custom_events<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a serde_json::Value> + 'a {
        self.events.iter().filter_map(move |event| match event {
            WorkflowEvent::Custom {
                name: event_name,
                data,
                ..
            } if event_name == name => Some(data),
            _ => None,
        })
    }
}

/// A built graph of executors. Built once, run any number of times; runs
/// share only executor-internal state and the [`SharedState`].
#[derive(Clone)]
pub struct Workflow {
    id: String,
    name: Option<String>,
    executors: HashMap<String, Arc<dyn Executor>>,
    edges: HashMap<String, Vec<Edge>>,
    start_id: String,
    max_supersteps: u32,
    shared_state: SharedState,
}

impl Workflow {
    pub(crate) fn new(
        name: Option<String>,
        executors: HashMap<String, Arc<dyn Executor>>,
        edges: HashMap<String, Vec<Edge>>,
        start_id: String,
        max_supersteps: u32,
        shared_state: SharedState,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            executors,
            edges,
            start_id,
            max_supersteps,
            shared_state,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn start_executor(&self) -> &Arc<dyn Executor> {
        &self.executors[&self.start_id]
    }

    pub fn executor(&self, id: &str) -> Option<&Arc<dyn Executor>> {
        self.executors.get(id)
    }

    pub fn edges_from(&self, source_id: &str) -> &[Edge] {
        self.edges.get(source_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn shared_state(&self) -> &SharedState {
        &self.shared_state
    }

    pub fn as_agent(&self) -> WorkflowAgent {
        WorkflowAgent::new(self.clone())
    }

    /// Runs to quiescence and collects outputs and events.
    pub async fn run<M>(&self, message: M) -> Result<WorkflowRunResult, WorkflowError>
    where
        M: Any + Send + Sync,
    {
        let mut stream = self.run_stream(message);
        let mut result = WorkflowRunResult::default();

        while let Some(event) = stream.next().await {
            let event = event?;
            match &event {
                WorkflowEvent::Output { data, .. } => result.outputs.push(data.clone()),
                WorkflowEvent::Completed { supersteps } => result.supersteps = *supersteps,
                _ => {}
            }
            result.events.push(event);
        }

        Ok(result)
    }

    /// Streams events as the run progresses.
    ///
    /// Each superstep delivers every pending message in send order; messages
    /// sent while handling them are delivered in the next superstep. The run
    /// ends when no messages are pending.
    pub fn run_stream<M>(
        &self,
        message: M,
    ) -> BoxStream<'_, Result<WorkflowEvent, WorkflowError>>
    where
        M: Any + Send + Sync,
    {
        let start = Message::new(message);

        Box::pin(try_stream! {
            yield WorkflowEvent::Started;

            let mut pending = vec![(self.start_id.clone(), start)];
            let mut superstep = 0_u32;

            while !pending.is_empty() {
                if superstep >= self.max_supersteps {
                    tracing::warn!(
                        max_supersteps = self.max_supersteps,
                        pending = pending.len(),
                        "workflow did not converge"
                    );
                    Err::<(), _>(WorkflowError::DidNotConverge {
                        max_supersteps: self.max_supersteps,
                    })?;
                }
                superstep += 1;

                let mut next = Vec::new();
                for (executor_id, message) in std::mem::take(&mut pending) {
                    let executor = self.deliverable(&executor_id, &message)?;

                    tracing::debug!(
                        executor = %executor_id,
                        message_type = message.type_name(),
                        superstep,
                        "delivering message"
                    );
                    yield WorkflowEvent::ExecutorInvoked {
                        executor_id: executor_id.clone(),
                    };

                    let mut ctx =
                        WorkflowContext::with_shared_state(&executor_id, self.shared_state.clone());
                    let outcome = executor.execute(message, &mut ctx).await;

                    for event in ctx.drain_events() {
                        yield event;
                    }
                    if let Err(err) = outcome {
                        yield WorkflowEvent::Failed {
                            executor_id: executor_id.clone(),
                            message: err.to_string(),
                        };
                        Err::<(), _>(err)?;
                    }

                    for output in ctx.drain_outputs() {
                        yield WorkflowEvent::Output {
                            executor_id: executor_id.clone(),
                            data: output,
                        };
                    }

                    let edges = self.edges_from(&executor_id);
                    for sent in ctx.drain_messages() {
                        if edges.is_empty() && sent.target_id().is_none() {
                            yield WorkflowEvent::Output {
                                executor_id: executor_id.clone(),
                                data: sent,
                            };
                            continue;
                        }
                        let mut routed = false;
                        for edge in edges.iter().filter(|edge| edge.accepts(&sent)) {
                            next.push((edge.target().to_string(), sent.clone()));
                            routed = true;
                        }
                        if routed {
                            continue;
                        }
                        match sent.target_id() {
                            Some(target) => tracing::warn!(
                                executor = %executor_id,
                                target,
                                message_type = sent.type_name(),
                                "addressed message has no edge to its target, dropping it"
                            ),
                            None => tracing::debug!(
                                executor = %executor_id,
                                message_type = sent.type_name(),
                                "no edge condition accepted the message"
                            ),
                        }
                    }

                    yield WorkflowEvent::ExecutorCompleted { executor_id };
                }

                yield WorkflowEvent::SuperstepCompleted { superstep };
                pending = next;
            }

            tracing::debug!(supersteps = superstep, "workflow reached quiescence");
            yield WorkflowEvent::Completed { supersteps: superstep };
        })
    }

    fn deliverable(
        &self,
        executor_id: &str,
        message: &Message,
    ) -> Result<&Arc<dyn Executor>, WorkflowError> {
        let executor = self
            .executors
            .get(executor_id)
            .ok_or_else(|| WorkflowError::UnknownExecutor(executor_id.to_string()))?;

        if !executor.can_handle(message) {
            return Err(WorkflowError::UnhandledMessage {
                executor: executor_id.to_string(),
                type_name: message.type_name(),
            });
        }
        Ok(executor)
    }
}
