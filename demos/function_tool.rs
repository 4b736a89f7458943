use std::error::Error;

use agent_orchestra_rs::{ApprovalMode, FunctionTool, ToolError};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, JsonSchema)]
struct WeatherArgs {
    /// City to look up
    location: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let weather = FunctionTool::typed(
        "get_weather",
        "Get the weather for a location.",
        |args: WeatherArgs| async move {
            if args.location.is_empty() {
                return Err(ToolError::Execution("location is empty".to_string()));
            }
            Ok(format!("The weather in {} is cloudy with a high of 15C.", args.location))
        },
    )?;
    println!("{}", serde_json::to_string_pretty(weather.json_schema())?);
    println!("{}", weather.invoke(json!({"location": "Amsterdam"})).await?);

    match weather.invoke(json!({"city": "Amsterdam"})).await {
        Ok(value) => println!("unexpected: {value}"),
        Err(err) => println!("rejected: {err}"),
    }

    let guarded = weather.clone().approval_mode(ApprovalMode::AlwaysRequire);
    println!("requires approval: {}", guarded.requires_approval());
    println!("{}", guarded.invoke_approved(json!({"location": "Oslo"})).await?);
    Ok(())
}
