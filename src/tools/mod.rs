pub mod math;

use std::future::Future;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use schemars::JsonSchema;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{SchemaError, ToolError};
use crate::llm::ToolDefinition;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ApprovalMode {
    #[default]
    NeverRequire,
    AlwaysRequire,
}

type ToolHandler = dyn Fn(Value) -> BoxFuture<'static, Result<Value, ToolError>> + Send + Sync;

/// A function the model may call: name, description, JSON schema for the
/// arguments and an async handler.
#[derive(Clone)]
pub struct FunctionTool {
    name: String,
    description: String,
    json_schema: Value,
    approval_mode: ApprovalMode,
    handler: Arc<ToolHandler>,
}

impl std::fmt::Debug for FunctionTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionTool")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("json_schema", &self.json_schema)
            .field("approval_mode", &self.approval_mode)
            .finish()
    }
}

impl FunctionTool {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            json_schema: serde_json::json!({
                "type": "object",
                "properties": {},
                "required": [],
                "additionalProperties": true,
            }),
            approval_mode: ApprovalMode::NeverRequire,
            handler: Arc::new(|_args| {
                Box::pin(async {
                    Err(ToolError::Execution(
                        "tool handler not configured".to_string(),
                    ))
                })
            }),
        }
    }

    /// Builds a tool whose argument schema is derived from `A` and whose
    /// handler receives the arguments already deserialised.
    pub fn typed<A, R, F, Fut>(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: F,
    ) -> Result<Self, SchemaError>
    where
        A: DeserializeOwned + JsonSchema + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, ToolError>> + Send + 'static,
    {
        let name = name.into();
        let schema = Value::from(schemars::schema_for!(A));
        let handler = Arc::new(handler);
        let tool_name = name.clone();

        Ok(Self::new(name, description)
            .with_schema(schema)?
            .with_handler(move |args| {
                let handler = Arc::clone(&handler);
                let tool_name = tool_name.clone();
                async move {
                    let parsed = serde_json::from_value::<A>(args).map_err(|err| {
                        ToolError::InvalidArguments {
                            tool: tool_name,
                            message: err.to_string(),
                        }
                    })?;
                    let output = handler(parsed).await?;
                    serde_json::to_value(output).map_err(|err| ToolError::Execution(err.to_string()))
                }
            }))
    }

    pub fn with_schema(mut self, schema: Value) -> Result<Self, SchemaError> {
        validate_schema(&schema)?;
        self.json_schema = schema;
        Ok(self)
    }

    pub fn with_handler<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
    {
        self.handler = Arc::new(move |args| Box::pin(handler(args)));
        self
    }

    pub fn approval_mode(mut self, approval_mode: ApprovalMode) -> Self {
        self.approval_mode = approval_mode;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn json_schema(&self) -> &Value {
        &self.json_schema
    }

    pub fn requires_approval(&self) -> bool {
        self.approval_mode == ApprovalMode::AlwaysRequire
    }

    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.json_schema.clone(),
        }
    }

    pub async fn invoke(&self, args: Value) -> Result<Value, ToolError> {
        if self.requires_approval() {
            return Err(ToolError::ApprovalRequired(self.name.clone()));
        }
        self.invoke_approved(args).await
    }

    /// Runs the handler without the approval check.
    pub async fn invoke_approved(&self, args: Value) -> Result<Value, ToolError> {
        validate_arguments(self.name(), &self.json_schema, &args)?;
        (self.handler)(args).await
    }
}

/// Renders a tool result for the model: strings verbatim, anything else as JSON.
pub fn result_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn validate_schema(schema: &Value) -> Result<(), SchemaError> {
    let schema_obj = schema.as_object().ok_or(SchemaError::SchemaNotObject)?;

    let root_type = schema_obj
        .get("type")
        .and_then(Value::as_str)
        .ok_or(SchemaError::RootTypeMustBeObject)?;

    if root_type != "object" {
        return Err(SchemaError::RootTypeMustBeObject);
    }

    if let Some(required) = schema_obj.get("required") {
        let required_arr = required.as_array().ok_or(SchemaError::InvalidRequired)?;
        if required_arr.iter().any(|item| !item.is_string()) {
            return Err(SchemaError::InvalidRequired);
        }
    }

    Ok(())
}

fn validate_arguments(tool_name: &str, schema: &Value, args: &Value) -> Result<(), ToolError> {
    let invalid = |message: String| ToolError::InvalidArguments {
        tool: tool_name.to_string(),
        message,
    };

    let args_obj = args
        .as_object()
        .ok_or_else(|| invalid("arguments must be a JSON object".to_string()))?;

    let schema_obj = schema
        .as_object()
        .ok_or_else(|| invalid("tool schema must be a JSON object".to_string()))?;

    if let Some(required) = schema_obj.get("required").and_then(Value::as_array) {
        for field_name in required.iter().filter_map(Value::as_str) {
            if !args_obj.contains_key(field_name) {
                return Err(invalid(format!("missing required field: {field_name}")));
            }
        }
    }

    let properties = schema_obj
        .get("properties")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    if schema_obj
        .get("additionalProperties")
        .and_then(Value::as_bool)
        == Some(false)
    {
        if let Some(key) = args_obj.keys().find(|key| !properties.contains_key(*key)) {
            return Err(invalid(format!("unknown field: {key}")));
        }
    }

    for (key, value) in args_obj {
        let Some(type_name) = properties
            .get(key)
            .and_then(|field_schema| field_schema.get("type"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        if !value_matches_type(value, type_name) {
            return Err(invalid(format!("field '{key}' must be of type {type_name}")));
        }
    }

    Ok(())
}

fn value_matches_type(value: &Value, type_name: &str) -> bool {
    match type_name {
        "string" => value.is_string(),
        "integer" => value.as_i64().is_some() || value.as_u64().is_some(),
        "number" => value.as_f64().is_some(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;
    use serde_json::json;

    use super::*;

    fn echo_tool() -> FunctionTool {
        FunctionTool::new("echo", "echo the value")
            .with_schema(json!({
                "type": "object",
                "properties": {"value": {"type": "string"}},
                "required": ["value"],
                "additionalProperties": false
            }))
            .expect("schema valid")
            .with_handler(|args| async move { Ok(args["value"].clone()) })
    }

    #[test]
    fn schema_validation_rejects_non_object_root() {
        let result = FunctionTool::new("bad", "bad").with_schema(json!({"type": "string"}));
        assert!(matches!(result, Err(SchemaError::RootTypeMustBeObject)));
    }

    #[tokio::test]
    async fn argument_validation_reports_missing_required() {
        let err = echo_tool().invoke(json!({})).await.expect_err("should fail");
        assert!(err.to_string().contains("missing required field"));
    }

    #[tokio::test]
    async fn argument_validation_rejects_unknown_fields_and_wrong_types() {
        let tool = echo_tool();

        let unknown = tool
            .invoke(json!({"value": "a", "extra": 1}))
            .await
            .expect_err("unknown field");
        assert!(unknown.to_string().contains("unknown field: extra"));

        let wrong_type = tool.invoke(json!({"value": 3})).await.expect_err("wrong type");
        assert!(wrong_type.to_string().contains("must be of type string"));
    }

    #[tokio::test]
    async fn approval_required_tools_do_not_run_unapproved() {
        let tool = echo_tool().approval_mode(ApprovalMode::AlwaysRequire);

        let err = tool.invoke(json!({"value": "x"})).await.expect_err("needs approval");
        assert!(matches!(err, ToolError::ApprovalRequired(name) if name == "echo"));

        let value = tool
            .invoke_approved(json!({"value": "x"}))
            .await
            .expect("approved call runs");
        assert_eq!(value, json!("x"));
    }

    #[tokio::test]
    async fn typed_tool_derives_schema_and_parses_arguments() {
        #[derive(Deserialize, JsonSchema)]
        struct Greeting {
            name: String,
            times: u32,
        }

        let tool = FunctionTool::typed("greet", "greet someone", |args: Greeting| async move {
            Ok(args.name.repeat(args.times as usize))
        })
        .expect("schema valid");

        assert_eq!(tool.json_schema()["type"], "object");
        assert_eq!(tool.definition().name, "greet");

        let value = tool
            .invoke(json!({"name": "ab", "times": 2}))
            .await
            .expect("typed call");
        assert_eq!(result_text(&value), "abab");

        let err = tool
            .invoke(json!({"name": "ab", "times": "two"}))
            .await
            .expect_err("bad type");
        assert!(matches!(err, ToolError::InvalidArguments { .. }));
    }
}
