//! Conversation-related types.

use flash_agent_model::{ModelMessage, ToolCallResult};

/// Who produced a conversation item.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Role {
    /// The user input.
    User,
    /// A model reply, possibly requesting tool calls.
    Assistant,
    /// The result of a tool call.
    Tool,
}

/// Represents a conversation.
#[derive(Clone, Default, Debug)]
pub struct Conversation {
    pub(crate) items: Vec<Item>,
}

impl Conversation {
    /// Returns the items of the conversation, oldest first.
    #[inline]
    pub fn items(&self) -> &[Item] {
        &self.items
    }

    /// Returns the number of items.
    #[inline]
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Returns `true` if the conversation has no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Iterates over the user inputs and the text replies, skipping tool
    /// traffic.
    pub fn messages(&self) -> impl Iterator<Item = (Role, &str)> {
        self.items
            .iter()
            .filter(|item| match item.role {
                Role::User => true,
                Role::Assistant => !item.has_tool_calls,
                Role::Tool => false,
            })
            .map(|item| (item.role, item.transcript.as_str()))
    }
}

/// An item in the conversation.
#[derive(Clone, Debug)]
pub struct Item {
    pub(crate) msg: ModelMessage,
    pub(crate) role: Role,
    pub(crate) transcript: String,
    pub(crate) agent_name: Option<String>,
    pub(crate) has_tool_calls: bool,
}

impl Item {
    pub(crate) fn user(input: String) -> Self {
        Self {
            msg: ModelMessage::User(input.clone()),
            role: Role::User,
            transcript: input,
            agent_name: None,
            has_tool_calls: false,
        }
    }

    pub(crate) fn assistant(
        msg: ModelMessage,
        transcript: String,
        agent_name: &str,
        has_tool_calls: bool,
    ) -> Self {
        Self {
            msg,
            role: Role::Assistant,
            transcript,
            agent_name: Some(agent_name.to_owned()),
            has_tool_calls,
        }
    }

    pub(crate) fn tool_result(id: String, content: String) -> Self {
        Self {
            msg: ModelMessage::Tool(ToolCallResult {
                id,
                content: content.clone(),
            }),
            role: Role::Tool,
            transcript: content,
            agent_name: None,
            has_tool_calls: false,
        }
    }

    /// Returns who produced this item.
    #[inline]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns the transcript of this item.
    ///
    /// The transcript is a string representation of the message item,
    /// which can be exported later. But transcript alone is not enough
    /// to reconstruct the message item.
    #[inline]
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Returns the name of the agent that produced an assistant item.
    #[inline]
    pub fn agent_name(&self) -> Option<&str> {
        self.agent_name.as_deref()
    }

    /// Returns `true` if this is an assistant item requesting tool calls.
    #[inline]
    pub fn has_tool_calls(&self) -> bool {
        self.has_tool_calls
    }

    #[inline]
    pub(crate) fn involves_tools(&self) -> bool {
        self.role == Role::Tool || self.has_tool_calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_skip_tool_traffic() {
        let conversation = Conversation {
            items: vec![
                Item::user("What is 2 + 3?".to_owned()),
                Item::assistant(
                    ModelMessage::Assistant(String::new()),
                    String::new(),
                    "Assistant",
                    true,
                ),
                Item::tool_result("call_0".to_owned(), "5".to_owned()),
                Item::assistant(
                    ModelMessage::Assistant("It is 5.".to_owned()),
                    "It is 5.".to_owned(),
                    "Assistant",
                    false,
                ),
            ],
        };

        let messages: Vec<_> = conversation.messages().collect();
        assert_eq!(
            messages,
            [(Role::User, "What is 2 + 3?"), (Role::Assistant, "It is 5.")]
        );
        assert_eq!(conversation.items()[3].agent_name(), Some("Assistant"));
        assert!(conversation.items()[2].involves_tools());
    }
}
