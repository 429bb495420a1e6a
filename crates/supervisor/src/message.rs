//! Conversions between the durable `ThreadMessage` row shape and the
//! wire-format `Message` the chat client understands, grounded in the
//! reference gateway's `transcript_lines_to_messages` /
//! `build_assistant_tool_message` (`runtime/mod.rs`).
//!
//! Storage convention for `ThreadMessage.content` (a free-form JSON
//! column):
//!   - `System` / `User` / `Summary`: a JSON string, the plain text.
//!   - `Assistant`: `{"text": string, "tool_calls": [ToolCall, ...]}`;
//!     `tool_calls` is omitted (or empty) for a terminal text answer.
//!   - `Tool`: `{"tool_call_id": string, "content": string}`.

use serde_json::{json, Value};

use foreman_domain::entities::{MessageRole, ThreadMessage};
use foreman_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall};

pub fn thread_messages_to_chat_messages(messages: &[ThreadMessage]) -> Vec<Message> {
    messages.iter().filter_map(thread_message_to_chat).collect()
}

fn thread_message_to_chat(message: &ThreadMessage) -> Option<Message> {
    match message.role {
        MessageRole::System => Some(Message {
            role: Role::System,
            content: MessageContent::Text(text_content(&message.content)),
        }),
        MessageRole::User => Some(Message {
            role: Role::User,
            content: MessageContent::Text(text_content(&message.content)),
        }),
        MessageRole::Summary => Some(Message {
            role: Role::System,
            content: MessageContent::Text(text_content(&message.content)),
        }),
        MessageRole::Assistant => {
            let text = message.content.get("text").and_then(Value::as_str).unwrap_or("");
            let tool_calls = message
                .content
                .get("tool_calls")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let mut parts = Vec::new();
            if !text.is_empty() {
                parts.push(ContentPart::Text { text: text.to_string() });
            }
            for call in &tool_calls {
                parts.push(ContentPart::ToolUse {
                    id: call.get("call_id").and_then(Value::as_str).unwrap_or_default().to_string(),
                    name: call.get("tool_name").and_then(Value::as_str).unwrap_or_default().to_string(),
                    input: call.get("arguments").cloned().unwrap_or(Value::Null),
                });
            }
            Some(Message {
                role: Role::Assistant,
                content: MessageContent::Parts(parts),
            })
        }
        MessageRole::Tool => {
            let call_id = message.content.get("tool_call_id").and_then(Value::as_str)?;
            let content = message.content.get("content").and_then(Value::as_str).unwrap_or("");
            Some(Message::tool_result(call_id, content))
        }
    }
}

fn text_content(value: &Value) -> String {
    value.as_str().map(str::to_string).unwrap_or_else(|| value.to_string())
}

/// Build the content payload for an assistant message that issued one
/// or more tool calls, in the storage convention above.
pub fn assistant_tool_call_content(text: &str, tool_calls: &[ToolCall]) -> Value {
    json!({
        "text": text,
        "tool_calls": tool_calls.iter().map(|tc| json!({
            "call_id": tc.call_id,
            "tool_name": tc.tool_name,
            "arguments": tc.arguments,
        })).collect::<Vec<_>>(),
    })
}

/// Content payload for a terminal assistant answer (no tool calls).
pub fn assistant_text_content(text: &str) -> Value {
    json!({ "text": text, "tool_calls": [] })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn msg(role: MessageRole, content: Value) -> ThreadMessage {
        ThreadMessage {
            id: 1,
            thread_id: 1,
            run_id: None,
            role,
            content,
            worker_job_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn user_message_round_trips_as_text() {
        let tm = msg(MessageRole::User, json!("hello"));
        let out = thread_messages_to_chat_messages(&[tm]);
        assert_eq!(out[0].content.text(), Some("hello"));
    }

    #[test]
    fn assistant_with_tool_calls_becomes_parts() {
        let content = assistant_tool_call_content(
            "checking",
            &[ToolCall {
                call_id: "c1".into(),
                tool_name: "exec".into(),
                arguments: json!({"command": "ls"}),
            }],
        );
        let tm = msg(MessageRole::Assistant, content);
        let out = thread_messages_to_chat_messages(&[tm]);
        match &out[0].content {
            MessageContent::Parts(parts) => assert_eq!(parts.len(), 2),
            _ => panic!("expected parts"),
        }
    }

    #[test]
    fn tool_message_becomes_tool_result() {
        let tm = msg(
            MessageRole::Tool,
            json!({"tool_call_id": "c1", "content": "42\n[EVIDENCE:run_id=1,job_id=2]"}),
        );
        let out = thread_messages_to_chat_messages(&[tm]);
        assert_eq!(out[0].role, Role::Tool);
    }
}
