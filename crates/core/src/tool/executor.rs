use std::future::ready;
use std::sync::Arc;

use flash_agent_model::{ModelTool, ToolCallRequest};

use crate::tool::{Error, ToolFuture, ToolObject};

/// An executor that handles tool call requests from the model.
///
/// Tools keep the order they were registered in, so the model sees the
/// same tool list on every turn.
#[derive(Clone, Default)]
pub struct Executor {
    tools: Vec<Arc<dyn ToolObject>>,
}

impl Executor {
    pub fn with_tools(tools: Vec<Arc<dyn ToolObject>>) -> Self {
        let mut executor = Self::default();
        for tool in tools {
            executor.add(tool);
        }
        executor
    }

    pub fn add(&mut self, tool: Arc<dyn ToolObject>) {
        if let Some(existing) =
            self.tools.iter_mut().find(|t| t.name() == tool.name())
        {
            warn!("tool `{}` is registered twice, replacing", tool.name());
            *existing = tool;
            return;
        }
        self.tools.push(tool);
    }

    #[inline]
    pub fn definitions(&self) -> impl Iterator<Item = ModelTool> + '_ {
        self.tools.iter().map(|tool| tool.definition())
    }

    #[inline]
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tools.iter().map(|tool| tool.name())
    }

    /// Spawns every request with `spawner`.
    ///
    /// A request for an unknown tool still gets a future, which resolves to
    /// a `NotFound` error, so every call id receives a result.
    pub fn handle_requests<S>(&self, requests: Vec<ToolCallRequest>, spawner: S)
    where
        S: FnMut(String, ToolFuture),
    {
        let mut spawner = spawner;

        let span = debug_span!("tool executor");
        let _enter = span.enter();
        for req in requests {
            let id = req.id;
            let Some(tool) = self.tools.iter().find(|t| t.name() == req.name)
            else {
                warn!("tool not found: {}", req.name);
                let err = Error::not_found()
                    .with_reason(format!("Tool `{}` not found", req.name));
                spawner(id, Box::pin(ready(Err(err))));
                continue;
            };
            let arguments = req.arguments;
            trace!("spawning a tool ({id}) with args: {arguments:?}");
            spawner(id, tool.execute(arguments));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use serde::Deserialize;
    use serde_json::{Value, json};

    use super::*;
    use crate::tool::{AnyTool, ErrorKind, Tool, ToolResult};

    static SCHEMA: LazyLock<Value> = LazyLock::new(|| {
        json!({
            "type": "object",
            "properties": { "text": { "type": "string" } },
            "required": ["text"],
        })
    });

    #[derive(Deserialize)]
    struct EchoInput {
        text: String,
    }

    struct EchoTool;

    impl Tool for EchoTool {
        type Input = EchoInput;

        fn name(&self) -> &str {
            "echo"
        }

        fn description(&self) -> &str {
            "Echoes the text"
        }

        fn parameter_schema(&self) -> &Value {
            &SCHEMA
        }

        fn execute(
            &self,
            input: Self::Input,
        ) -> impl Future<Output = ToolResult> + Send + 'static {
            ready(Ok(input.text))
        }
    }

    fn request(id: &str, name: &str, arguments: Value) -> ToolCallRequest {
        ToolCallRequest {
            id: id.to_owned(),
            name: name.to_owned(),
            arguments,
        }
    }

    #[tokio::test]
    async fn test_handle_requests() {
        let executor =
            Executor::with_tools(vec![Arc::new(AnyTool(EchoTool))]);
        assert_eq!(executor.names().collect::<Vec<_>>(), ["echo"]);
        assert_eq!(executor.definitions().next().unwrap().parameters, *SCHEMA);

        let requests = vec![
            request("tool:1", "echo", json!({ "text": "hi" })),
            request("tool:2", "echo", json!({ "txt": "hi" })),
            request("tool:3", "read_file", json!({})),
        ];

        let mut spawned = vec![];
        executor.handle_requests(requests, |id, future| {
            spawned.push((id, future));
        });
        assert_eq!(spawned.len(), 3);

        let mut results = vec![];
        for (id, future) in spawned {
            results.push((id, future.await));
        }
        assert_eq!(results[0], ("tool:1".to_owned(), Ok("hi".to_owned())));
        assert_eq!(
            results[1].1.as_ref().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            results[2].1.as_ref().unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }
}
