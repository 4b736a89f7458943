use std::error::Error;
use std::sync::Arc;

use agent_orchestra_rs::samples::{DoublingLoopExecutor, NumberDoubleExecutor};
use agent_orchestra_rs::{AgentExt, Executor, WorkflowBuilder};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let double: Arc<dyn Executor> =
        Arc::new(NumberDoubleExecutor::new("number_double_executor"));
    let single = WorkflowBuilder::new().set_start_executor(&double).build()?;
    let result = single.run("21".to_string()).await?;
    println!("single step: {:?}", result.outputs_of::<String>());

    let first: Arc<dyn Executor> =
        Arc::new(DoublingLoopExecutor::new("number_double_executor"));
    let second: Arc<dyn Executor> =
        Arc::new(DoublingLoopExecutor::new("number_double_executor2"));
    let cycle = WorkflowBuilder::new()
        .name("doubling")
        .add_edge(&first, &second)
        .add_edge(&second, &first)
        .set_start_executor(&first)
        .build()?;

    let agent = cycle.as_agent();
    let response = agent.run_text("1", None).await?;
    println!("loop finished with {response}");
    Ok(())
}
