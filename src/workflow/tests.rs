use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::json;

use super::*;
use crate::agent::{Agent, ChatClientAgentExt};
use crate::error::WorkflowError;
use crate::llm::{CannedChatClient, ChatMessage};

struct UpperCase {
    id: &'static str,
}

#[async_trait]
impl Executor for UpperCase {
    fn id(&self) -> &str {
        self.id
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
        let text = message.require::<String>(self.id)?;
        ctx.send_message(text.to_uppercase());
        Ok(())
    }
}

struct Reverse {
    id: &'static str,
}

#[async_trait]
impl Executor for Reverse {
    fn id(&self) -> &str {
        self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let text = message.require::<String>(self.id)?;
        ctx.send_message(text.chars().rev().collect::<String>());
        Ok(())
    }
}

/// Counts forever; only the superstep bound stops it.
struct Increment {
    id: &'static str,
}

#[async_trait]
impl Executor for Increment {
    fn id(&self) -> &str {
        self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<i64>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        let value = *message.require::<i64>(self.id)?;
        ctx.shared_state().set("last", &value)?;
        ctx.send_message(value + 1);
        Ok(())
    }
}

struct Counted {
    id: &'static str,
    calls: AtomicUsize,
}

#[async_trait]
impl Executor for Counted {
    fn id(&self) -> &str {
        self.id
    }

    fn input_types(&self) -> Vec<TypeKey> {
        vec![TypeKey::of::<String>()]
    }

    async fn execute(
        &self,
        message: Message,
        ctx: &mut WorkflowContext,
    ) -> Result<(), WorkflowError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let text = message.require::<String>(self.id)?;
        if text.is_empty() {
            return Err(WorkflowError::ExecutorFailed {
                executor: self.id.to_string(),
                message: "empty input".to_string(),
            });
        }
        ctx.add_custom_event("seen", json!(text));
        ctx.yield_output(text.len());
        Ok(())
    }
}

fn executor<E: Executor + 'static>(executor: E) -> Arc<dyn Executor> {
    Arc::new(executor)
}

#[tokio::test]
async fn chain_outputs_come_from_terminal_executor() {
    let upper = executor(UpperCase { id: "upper" });
    let reverse = executor(Reverse { id: "reverse" });

    let workflow = WorkflowBuilder::new()
        .add_edge(&upper, &reverse)
        .set_start_executor(&upper)
        .build()
        .expect("workflow builds");

    let result = workflow
        .run("hello world".to_string())
        .await
        .expect("run succeeds");

    assert_eq!(result.outputs_of::<String>(), vec!["DLROW OLLEH".to_string()]);
    assert_eq!(result.supersteps, 2);
    assert!(matches!(result.events.first(), Some(WorkflowEvent::Started)));
    assert!(matches!(
        result.events.last(),
        Some(WorkflowEvent::Completed { supersteps: 2 })
    ));
}

#[tokio::test]
async fn conditional_and_addressed_edges_filter_delivery() {
    struct Router;

    #[async_trait]
    impl Executor for Router {
        fn id(&self) -> &str {
            "router"
        }

        fn input_types(&self) -> Vec<TypeKey> {
            vec![TypeKey::of::<String>()]
        }

        async fn execute(
            &self,
            message: Message,
            ctx: &mut WorkflowContext,
        ) -> Result<(), WorkflowError> {
            let text = message.require::<String>("router")?.clone();
            ctx.send_message(text.clone());
            ctx.send_message_to("reverse", format!("direct:{text}"));
            Ok(())
        }
    }

    let router = executor(Router);
    let upper = executor(UpperCase { id: "upper" });
    let reverse = executor(Reverse { id: "reverse" });

    let workflow = WorkflowBuilder::new()
        .add_edge_with_condition(&router, &upper, |message| {
            message
                .downcast_ref::<String>()
                .is_some_and(|text| text.starts_with('a'))
        })
        .add_edge(&router, &reverse)
        .set_start_executor(&router)
        .build()
        .expect("workflow builds");

    let result = workflow.run("abc".to_string()).await.expect("run succeeds");
    let mut outputs = result.outputs_of::<String>();
    outputs.sort();
    assert_eq!(outputs, vec!["ABC", "cba", "cba:tcerid"]);

    let result = workflow.run("xyz".to_string()).await.expect("run succeeds");
    let mut outputs = result.outputs_of::<String>();
    outputs.sort();
    assert_eq!(outputs, vec!["zyx", "zyx:tcerid"]);
}

#[tokio::test]
async fn unbounded_cycle_fails_with_did_not_converge() {
    let step = executor(Increment { id: "step" });
    let again = executor(Increment { id: "again" });
    let state = SharedState::new();

    let workflow = WorkflowBuilder::new()
        .add_edge(&step, &again)
        .add_edge(&again, &step)
        .set_start_executor(&step)
        .max_supersteps(5)
        .shared_state(state.clone())
        .build()
        .expect("workflow builds");

    let err = workflow.run(0_i64).await.expect_err("never converges");

    assert!(matches!(
        err,
        WorkflowError::DidNotConverge { max_supersteps: 5 }
    ));
    assert_eq!(state.get::<i64>("last").expect("state"), Some(4));
}

#[tokio::test]
async fn message_of_unhandled_type_aborts_the_run() {
    let step = executor(Increment { id: "step" });
    let upper = executor(UpperCase { id: "upper" });

    let workflow = WorkflowBuilder::new()
        .add_edge(&step, &upper)
        .set_start_executor(&step)
        .build()
        .expect("workflow builds");

    let err = workflow.run(1_i64).await.expect_err("i64 is not a String");
    assert!(matches!(
        err,
        WorkflowError::UnhandledMessage { executor, type_name }
            if executor == "upper" && type_name == "i64"
    ));

    let err = workflow
        .run("text".to_string())
        .await
        .expect_err("start executor takes i64");
    assert!(matches!(err, WorkflowError::UnhandledMessage { .. }));
}

#[tokio::test]
async fn executor_errors_are_reported_then_abort() {
    let counted = Arc::new(Counted {
        id: "counted",
        calls: AtomicUsize::new(0),
    });
    let node: Arc<dyn Executor> = counted.clone();

    let workflow = WorkflowBuilder::new()
        .set_start_executor(&node)
        .build()
        .expect("workflow builds");

    let events = workflow
        .run_stream(String::new())
        .collect::<Vec<_>>()
        .await;

    assert!(matches!(
        events.iter().rev().nth(1),
        Some(Ok(WorkflowEvent::Failed { executor_id, .. })) if executor_id == "counted"
    ));
    assert!(matches!(
        events.last(),
        Some(Err(WorkflowError::ExecutorFailed { .. }))
    ));

    let result = workflow.run("four".to_string()).await.expect("run succeeds");
    assert_eq!(result.outputs_of::<usize>(), vec![4]);
    assert_eq!(result.custom_events("seen").collect::<Vec<_>>(), vec![&json!("four")]);
    assert_eq!(counted.calls.load(Ordering::SeqCst), 2);
}

#[test]
fn build_requires_start_executor() {
    let upper = executor(UpperCase { id: "upper" });
    let reverse = executor(Reverse { id: "reverse" });

    let result = WorkflowBuilder::new().add_edge(&upper, &reverse).build();
    assert!(matches!(result, Err(WorkflowError::Config(message)) if message.contains("start")));
}

#[test]
fn build_rejects_two_instances_with_one_id() {
    let first = executor(UpperCase { id: "same" });
    let second = executor(Reverse { id: "same" });

    let result = WorkflowBuilder::new()
        .add_edge(&first, &second)
        .set_start_executor(&first)
        .build();
    assert!(matches!(result, Err(WorkflowError::Config(message)) if message.contains("same")));
}

#[test]
fn build_checks_declared_edge_types() {
    let upper = executor(UpperCase { id: "upper" });
    let step = executor(Increment { id: "step" });

    let result = WorkflowBuilder::new()
        .add_edge(&upper, &step)
        .set_start_executor(&upper)
        .build();
    assert!(matches!(result, Err(WorkflowError::Config(message)) if message.contains("upper -> step")));
}

#[tokio::test]
async fn executors_run_standalone_with_a_context() {
    let upper = UpperCase { id: "upper" };
    let mut ctx = WorkflowContext::new("upper");

    upper
        .execute(Message::new("abc".to_string()), &mut ctx)
        .await
        .expect("executes");

    let sent = ctx.drain_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].downcast::<String>().as_deref(), Some("ABC"));
    assert_eq!(sent[0].source_id(), Some("upper"));
    assert!(ctx.drain_messages().is_empty());
}

#[tokio::test]
async fn agent_executors_chain_and_workflow_runs_as_agent() {
    let writer = CannedChatClient::new("draft")
        .create_agent()
        .name("writer")
        .build()
        .expect("agent builds");
    let editor = CannedChatClient::new("final")
        .create_agent()
        .name("editor")
        .build()
        .expect("agent builds");

    let writer = executor(AgentExecutor::new(Arc::new(writer)));
    let editor = executor(AgentExecutor::new(Arc::new(editor)).streaming(true));

    let workflow = WorkflowBuilder::new()
        .name("pipeline")
        .add_chain(&[writer.clone(), editor.clone()])
        .set_start_executor(&writer)
        .build()
        .expect("workflow builds");

    let result = workflow
        .run(vec![ChatMessage::user("write something")])
        .await
        .expect("run succeeds");
    let outputs = result.outputs_of::<Vec<ChatMessage>>();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0][0].text(), "final");
    assert!(result.events.iter().any(|event| matches!(
        event,
        WorkflowEvent::AgentRunUpdate { executor_id, .. } if executor_id == "editor"
    )));

    let agent = workflow.as_agent();
    assert_eq!(agent.name(), Some("pipeline"));
    let thread = agent.get_new_thread();
    let response = agent
        .run(vec![ChatMessage::user("write something")], Some(&thread))
        .await
        .expect("agent run");
    assert_eq!(response.text(), "final");
    assert_eq!(thread.messages()[0].text(), "write something");
}

#[tokio::test]
async fn addressed_messages_without_a_matching_edge_are_not_outputs() {
    struct Misaddressed;

    #[async_trait]
    impl Executor for Misaddressed {
        fn id(&self) -> &str {
            "misaddressed"
        }

        fn input_types(&self) -> Vec<TypeKey> {
            vec![TypeKey::of::<String>()]
        }

        async fn execute(
            &self,
            message: Message,
            ctx: &mut WorkflowContext,
        ) -> Result<(), WorkflowError> {
            let text = message.require::<String>("misaddressed")?.clone();
            ctx.send_message_to("ghost", format!("lost:{text}"));
            ctx.send_message(text);
            Ok(())
        }
    }

    let terminal = executor(Misaddressed);
    let workflow = WorkflowBuilder::new()
        .set_start_executor(&terminal)
        .build()
        .expect("workflow builds");

    let result = workflow.run("kept".to_string()).await.expect("run succeeds");
    assert_eq!(result.outputs_of::<String>(), vec!["kept".to_string()]);

    let sender = executor(Misaddressed);
    let reverse = executor(Reverse { id: "reverse" });
    let workflow = WorkflowBuilder::new()
        .add_edge(&sender, &reverse)
        .set_start_executor(&sender)
        .build()
        .expect("workflow builds");

    let result = workflow.run("abc".to_string()).await.expect("run succeeds");
    assert_eq!(result.outputs_of::<String>(), vec!["cba".to_string()]);
    let invoked = result
        .events
        .iter()
        .filter(|event| matches!(event, WorkflowEvent::ExecutorInvoked { .. }))
        .count();
    assert_eq!(invoked, 2);
}
