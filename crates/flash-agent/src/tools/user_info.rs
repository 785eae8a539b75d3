use std::future::ready;

use flash_agent_core::tool::{Tool, ToolResult};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::Value;

use super::schema_of;

/// The signed-in user, known to the program but never sent to the model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UserInfo {
    /// Display name.
    pub name: String,
    /// User id.
    pub uid: u64,
}

/// Input of [`FetchUserAgeTool`]. The tool takes no arguments.
#[derive(Deserialize, JsonSchema)]
pub struct FetchUserAgeInput {}

/// Answers questions about the user's age from the local [`UserInfo`].
pub struct FetchUserAgeTool {
    user: UserInfo,
    parameter_schema: Value,
}

impl FetchUserAgeTool {
    /// Creates a tool for the given user.
    pub fn new(user: UserInfo) -> Self {
        Self {
            user,
            parameter_schema: schema_of::<FetchUserAgeInput>(),
        }
    }
}

impl Tool for FetchUserAgeTool {
    type Input = FetchUserAgeInput;

    fn name(&self) -> &str {
        "fetch_user_age"
    }

    fn description(&self) -> &str {
        "Fetch the age of the user. Call this function to get user's age \
         information."
    }

    fn parameter_schema(&self) -> &Value {
        &self.parameter_schema
    }

    fn execute(
        &self,
        _input: Self::Input,
    ) -> impl Future<Output = ToolResult> + Send + 'static {
        debug!("fetching the age of user {}", self.user.uid);
        ready(Ok(format!("The user {} is 47 years old", self.user.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetch_user_age() {
        let tool = FetchUserAgeTool::new(UserInfo {
            name: "Rohaan".to_owned(),
            uid: 123,
        });
        let output = tool.execute(FetchUserAgeInput {}).await.unwrap();
        assert_eq!(output, "The user Rohaan is 47 years old");
        assert_eq!(tool.parameter_schema()["type"], "object");
    }
}
