//! Thread compaction: collapse old messages into a summary once the
//! estimated context budget is exceeded, grounded in the reference
//! gateway's `runtime/compact.rs` (turn-count based there; this
//! engine's [`foreman_domain::config::CompactionConfig`] is
//! token-budget based, so the threshold check differs but the
//! summarize-then-mark-boundary shape is the same).

use foreman_domain::config::CompactionConfig;
use foreman_domain::entities::{MessageRole, ThreadMessage};

use crate::chat::{collect_stream_text, ChatClient, ChatError, ChatRequest};

/// Rough token estimate (chars / 4) used only to decide whether to
/// compact, never fed back as real usage accounting.
fn estimate_tokens(messages: &[ThreadMessage]) -> u32 {
    let chars: usize = messages
        .iter()
        .map(|m| m.content.to_string().chars().count())
        .sum();
    (chars / 4) as u32
}

pub fn should_compact(messages: &[ThreadMessage], config: &CompactionConfig) -> bool {
    config.auto
        && messages.len() > config.keep_last_messages
        && estimate_tokens(messages) > config.context_budget_tokens
}

/// Split into (to_compact, to_keep), keeping the last `keep_last` messages
/// verbatim.
pub fn split_for_compaction(messages: &[ThreadMessage], keep_last: usize) -> (&[ThreadMessage], &[ThreadMessage]) {
    let keep_from = messages.len().saturating_sub(keep_last);
    (&messages[..keep_from], &messages[keep_from..])
}

fn build_conversation_text(messages: &[ThreadMessage]) -> String {
    let mut buf = String::new();
    for message in messages {
        let role_label = match message.role {
            MessageRole::User => "User",
            MessageRole::Assistant => "Assistant",
            MessageRole::Tool => "Tool",
            MessageRole::System => "System",
            MessageRole::Summary => "Summary",
        };
        buf.push_str(role_label);
        buf.push_str(": ");
        let content = message.content.to_string();
        if content.chars().count() > 2000 {
            let head: String = content.chars().take(1000).collect();
            buf.push_str(&head);
            buf.push_str(" [...] ");
        } else {
            buf.push_str(&content);
        }
        buf.push('\n');
    }
    buf
}

/// Summarize `to_compact` via the chat client. The returned text is a
/// plain summary, not yet wrapped as a `ThreadMessage` — the caller
/// decides how to persist it (a `Summary`-role message plus a
/// `compacted_through_message_id` marker on the thread).
pub async fn generate_summary(
    client: &dyn ChatClient,
    to_compact: &[ThreadMessage],
) -> Result<String, ChatError> {
    let conversation = build_conversation_text(to_compact);
    let prompt = format!(
        "Summarize the following conversation history into a concise summary \
         that preserves the current goal, key decisions, open questions, and \
         any pending worker/tool state. Be concise, present tense, no greetings.\n\n\
         CONVERSATION:\n{conversation}"
    );
    let req = ChatRequest {
        messages: vec![foreman_domain::tool::Message::user(prompt)],
        tools: vec![],
        model: None,
        temperature: Some(0.1),
        max_tokens: Some(2000),
    };
    let stream = client.chat_stream(&req).await?;
    collect_stream_text(stream).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn msg(id: i64, role: MessageRole, content: &str) -> ThreadMessage {
        ThreadMessage {
            id,
            thread_id: 1,
            run_id: None,
            role,
            content: json!(content),
            worker_job_id: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn should_not_compact_under_budget() {
        let config = CompactionConfig {
            auto: true,
            context_budget_tokens: 100_000,
            keep_last_messages: 12,
        };
        let messages = vec![msg(1, MessageRole::User, "hi")];
        assert!(!should_compact(&messages, &config));
    }

    #[test]
    fn should_compact_over_budget() {
        let config = CompactionConfig {
            auto: true,
            context_budget_tokens: 10,
            keep_last_messages: 1,
        };
        let messages: Vec<_> = (0..20)
            .map(|i| msg(i, MessageRole::User, &"x".repeat(200)))
            .collect();
        assert!(should_compact(&messages, &config));
    }

    #[test]
    fn disabled_auto_never_compacts() {
        let config = CompactionConfig {
            auto: false,
            context_budget_tokens: 1,
            keep_last_messages: 0,
        };
        let messages: Vec<_> = (0..20)
            .map(|i| msg(i, MessageRole::User, &"x".repeat(200)))
            .collect();
        assert!(!should_compact(&messages, &config));
    }

    #[test]
    fn split_keeps_last_n_messages() {
        let messages: Vec<_> = (0..5).map(|i| msg(i, MessageRole::User, "m")).collect();
        let (to_compact, to_keep) = split_for_compaction(&messages, 2);
        assert_eq!(to_compact.len(), 3);
        assert_eq!(to_keep.len(), 2);
        assert_eq!(to_keep[0].id, 3);
    }
}
