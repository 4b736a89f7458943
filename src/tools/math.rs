//! Small arithmetic tools used by the agent samples.

use num_bigint::BigInt;
use schemars::JsonSchema;
use serde::Deserialize;

use crate::error::SchemaError;
use crate::tools::FunctionTool;

pub const INVALID_INTEGER_MESSAGE: &str = "Please provide a valid integer.";

/// `"The square of {n} is {n*n}."` for any integer, or the fallback
/// message when the input is not an integer.
pub fn square_message(number_string: &str) -> String {
    match number_string.trim().parse::<BigInt>() {
        Ok(number) => {
            let square = &number * &number;
            format!("The square of {number} is {square}.")
        }
        Err(_) => INVALID_INTEGER_MESSAGE.to_string(),
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SquareArgs {
    /// number for square.
    pub number_string: String,
}

/// Tool taking `number_string` and answering with [`square_message`].
pub fn get_square() -> Result<FunctionTool, SchemaError> {
    FunctionTool::typed(
        "get_square",
        "Get the square of a given number.",
        |args: SquareArgs| async move {
            tracing::info!(number_string = %args.number_string, "calculating square");
            Ok(square_message(&args.number_string))
        },
    )
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddArgs {
    /// First number
    pub a: i64,
    /// Second number
    pub b: i64,
}

/// Adds two integers.
pub fn add() -> Result<FunctionTool, SchemaError> {
    FunctionTool::typed("add", "Add two numbers", |args: AddArgs| async move {
        Ok(args.a.saturating_add(args.b))
    })
}

pub fn all_tools() -> Result<Vec<FunctionTool>, SchemaError> {
    Ok(vec![get_square()?, add()?])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ToolError;

    #[tokio::test]
    async fn square_of_five() {
        let value = get_square()
            .expect("schema valid")
            .invoke(json!({"number_string": "5"}))
            .await
            .expect("tool runs");

        assert_eq!(value, json!("The square of 5 is 25."));
    }

    #[tokio::test]
    async fn non_integer_argument_returns_fallback() {
        for input in ["five", "2.5", ""] {
            let value = get_square()
                .expect("schema valid")
                .invoke(json!({"number_string": input}))
                .await
                .expect("tool never fails on bad numbers");
            assert_eq!(value, json!(INVALID_INTEGER_MESSAGE));
        }
    }

    #[test]
    fn square_message_handles_negative_and_large_integers() {
        assert_eq!(square_message("-3"), "The square of -3 is 9.");
        assert_eq!(square_message(" 12 "), "The square of 12 is 144.");
        assert_eq!(
            square_message("4000000000"),
            "The square of 4000000000 is 16000000000000000000."
        );
        assert_eq!(
            square_message("99999999999999999999"),
            "The square of 99999999999999999999 is 9999999999999999999800000000000000000001."
        );
    }

    #[tokio::test]
    async fn non_string_argument_is_rejected_before_the_handler() {
        let err = get_square()
            .expect("schema valid")
            .invoke(json!({"number_string": 5}))
            .await
            .expect_err("schema requires a string");

        assert!(matches!(err, ToolError::InvalidArguments { tool, .. } if tool == "get_square"));
    }

    #[tokio::test]
    async fn add_tool_sums_integers() {
        let tool = add().expect("schema valid");
        let value = tool.invoke(json!({"a": 3, "b": 5})).await.expect("adds");
        assert_eq!(value, json!(8));
    }

    #[test]
    fn all_tools_have_unique_names() {
        let tools = all_tools().expect("schemas valid");
        let names = tools.iter().map(FunctionTool::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["get_square", "add"]);
    }
}
