use std::fmt::{self, Display};
use std::future::ready;

use flash_agent_core::tool::{Error as ToolError, Tool, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::schema_of;

/// Input of the arithmetic tools.
#[derive(Clone, Copy, Debug, Deserialize, JsonSchema)]
pub struct ArithmeticInput {
    /// The first operand.
    pub a: f64,
    /// The second operand.
    pub b: f64,
}

/// The four basic arithmetic operations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `a + b`
    Add,
    /// `a - b`
    Subtract,
    /// `a * b`
    Multiply,
    /// `a / b`
    Divide,
}

impl Operation {
    /// All operations, in the order the calculator registers them.
    pub const ALL: [Operation; 4] = [
        Operation::Add,
        Operation::Subtract,
        Operation::Multiply,
        Operation::Divide,
    ];

    /// Returns the tool name.
    pub fn name(self) -> &'static str {
        match self {
            Operation::Add => "add",
            Operation::Subtract => "subtract",
            Operation::Multiply => "multiply",
            Operation::Divide => "divide",
        }
    }

    fn description(self) -> &'static str {
        match self {
            Operation::Add => "Adds given two numbers",
            Operation::Subtract => "Subtracts given two numbers",
            Operation::Multiply => "Multiplies given two numbers",
            Operation::Divide => "Performs division between two numbers",
        }
    }

    fn operand_descriptions(self) -> (&'static str, &'static str) {
        match self {
            Operation::Add => ("first number to add", "second number to add"),
            Operation::Subtract => (
                "first number to subtract from",
                "second number to subtract",
            ),
            Operation::Multiply => {
                ("first number to multiply", "second number to multiply")
            }
            Operation::Divide => ("dividend", "divisor"),
        }
    }

    /// Applies the operation.
    ///
    /// Dividing by zero is an error rather than an infinity, which JSON
    /// cannot carry back to the model.
    pub fn apply(self, a: f64, b: f64) -> Result<f64, ToolError> {
        match self {
            Operation::Add => Ok(a + b),
            Operation::Subtract => Ok(a - b),
            Operation::Multiply => Ok(a * b),
            Operation::Divide if b == 0.0 => {
                Err(ToolError::execution_error().with_reason("Division by zero"))
            }
            Operation::Divide => Ok(a / b),
        }
    }
}

impl Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A tool performing one [`Operation`].
pub struct ArithmeticTool {
    operation: Operation,
    parameter_schema: Value,
}

impl ArithmeticTool {
    /// Creates a tool for the given operation.
    pub fn new(operation: Operation) -> Self {
        let mut parameter_schema = schema_of::<ArithmeticInput>();
        let (a, b) = operation.operand_descriptions();
        for (field, description) in [("a", a), ("b", b)] {
            let pointer = format!("/properties/{field}");
            if let Some(property) = parameter_schema
                .pointer_mut(&pointer)
                .and_then(Value::as_object_mut)
            {
                property.insert("description".to_owned(), description.into());
            }
        }
        Self {
            operation,
            parameter_schema,
        }
    }

    /// Creates the four calculator tools.
    pub fn all() -> [ArithmeticTool; 4] {
        Operation::ALL.map(ArithmeticTool::new)
    }
}

impl Tool for ArithmeticTool {
    type Input = ArithmeticInput;

    fn name(&self) -> &str {
        self.operation.name()
    }

    fn description(&self) -> &str {
        self.operation.description()
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        debug!("{} tool called with {input:?}", self.operation);
        let result = self
            .operation
            .apply(input.a, input.b)
            .map(|value| value.to_string());
        ready(result)
    }
}

#[cfg(test)]
mod tests {
    use flash_agent_core::tool::ErrorKind;

    use super::*;

    #[test]
    fn test_operations() {
        assert_eq!(Operation::Add.apply(2.0, 3.0), Ok(5.0));
        assert_eq!(Operation::Subtract.apply(5.0, 2.0), Ok(3.0));
        assert_eq!(Operation::Multiply.apply(4.0, 5.0), Ok(20.0));
        assert_eq!(Operation::Divide.apply(6.0, 3.0), Ok(2.0));
        assert_eq!(Operation::Divide.apply(1.0, 4.0), Ok(0.25));
    }

    #[test]
    fn test_divide_by_zero() {
        let err = Operation::Divide.apply(1.0, 0.0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExecutionError);
        assert_eq!(err.reason(), "Division by zero");
    }

    #[tokio::test]
    async fn test_execute() {
        let tool = ArithmeticTool::new(Operation::Multiply);
        let output = tool.execute(ArithmeticInput { a: 4.0, b: 5.0 }).await;
        assert_eq!(output, Ok("20".to_owned()));

        let output = ArithmeticTool::new(Operation::Add)
            .execute(ArithmeticInput { a: 0.1, b: 0.2 })
            .await;
        assert_eq!(output, Ok((0.1f64 + 0.2).to_string()));
    }

    #[test]
    fn test_schema() {
        let tools = ArithmeticTool::all();
        let names: Vec<_> = tools.iter().map(|tool| tool.name()).collect();
        assert_eq!(names, ["add", "subtract", "multiply", "divide"]);

        let schema = tools[3].parameter_schema();
        assert_eq!(schema["type"], "object");
        assert_eq!(schema["properties"]["a"]["description"], "dividend");
        assert_eq!(schema["properties"]["b"]["description"], "divisor");
        assert!(schema.get("$schema").is_none());
        let required = schema["required"].as_array().unwrap();
        assert_eq!(required.len(), 2);
    }
}
