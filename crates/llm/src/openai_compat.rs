//! Adapter for any OpenAI-compatible chat completions endpoint — OpenAI
//! itself, Azure OpenAI, Ollama, vLLM, LM Studio, and anything else that
//! speaks the `/chat/completions` wire format. This is the only concrete
//! `ChatClient` the gateway ships; spec.md treats the LLM provider as an
//! external collaborator, so one well-tested adapter covering the common
//! self-hosted and hosted cases stands in for the full multi-provider
//! router a production deployment would eventually add.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use foreman_domain::config::{AuthMode, ProviderConfig, ProviderKind};
use foreman_domain::tool::{ContentPart, Message, MessageContent, Role, ToolDefinition};
use foreman_domain::stream::{BoxStream, StreamEvent, Usage};
use foreman_domain::{Error, Result as DomainResult};
use foreman_supervisor::{ChatClient, ChatError, ChatRequest};

use crate::auth::AuthRotator;
use crate::sse::sse_response_stream;

pub struct OpenAiCompatClient {
    id: String,
    base_url: String,
    auth: Arc<AuthRotator>,
    auth_header: String,
    auth_prefix: String,
    default_model: String,
    client: reqwest::Client,
    is_azure: bool,
}

impl OpenAiCompatClient {
    /// Accepts `ProviderKind::OpenaiCompat` and `ProviderKind::AzureOpenai`
    /// — both speak the same wire format, differing only in URL shape and
    /// auth header.
    pub fn from_config(cfg: &ProviderConfig, timeout_ms: u64) -> DomainResult<Self> {
        if !matches!(cfg.kind, ProviderKind::OpenaiCompat | ProviderKind::AzureOpenai) {
            return Err(Error::Config(format!(
                "provider '{}': kind {:?} is not supported by the openai_compat adapter",
                cfg.id, cfg.kind
            )));
        }
        if cfg.auth.mode == AuthMode::None {
            return Err(Error::Config(format!(
                "provider '{}': auth.mode = none is not supported (no credential to send)",
                cfg.id
            )));
        }

        let is_azure = cfg.kind == ProviderKind::AzureOpenai;
        let auth = Arc::new(AuthRotator::from_auth_config(&cfg.auth)?);

        let auth_header = cfg.auth.header.clone().unwrap_or_else(|| {
            if is_azure { "api-key".into() } else { "Authorization".into() }
        });
        let auth_prefix = cfg.auth.prefix.clone().unwrap_or_else(|| {
            if is_azure { String::new() } else { "Bearer ".into() }
        });
        let default_model = cfg.default_model.clone().unwrap_or_else(|| "gpt-4o".into());

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| Error::Http(e.to_string()))?;

        Ok(Self {
            id: cfg.id.clone(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth,
            auth_header,
            auth_prefix,
            default_model,
            client,
            is_azure,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    fn authed_post(&self, url: &str) -> (reqwest::RequestBuilder, String) {
        let key = self.auth.next_key();
        let header_value = format!("{}{}", self.auth_prefix, key);
        let builder = self
            .client
            .post(url)
            .header(&self.auth_header, header_value)
            .header("Content-Type", "application/json");
        (builder, key)
    }

    fn effective_model(&self, req: &ChatRequest) -> String {
        req.model.clone().unwrap_or_else(|| self.default_model.clone())
    }

    fn chat_url(&self, req: &ChatRequest) -> String {
        if self.is_azure {
            format!(
                "{}/openai/deployments/{}/chat/completions?api-version=2024-10-21",
                self.base_url,
                self.effective_model(req)
            )
        } else {
            format!("{}/chat/completions", self.base_url)
        }
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().map(msg_to_openai).collect();
        let mut body = serde_json::json!({
            "messages": messages,
            "stream": true,
            "stream_options": { "include_usage": true },
        });
        if !self.is_azure {
            body["model"] = Value::String(self.effective_model(req));
        }
        if !req.tools.is_empty() {
            body["tools"] = Value::Array(req.tools.iter().map(tool_to_openai).collect());
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        if let Some(max) = req.max_tokens {
            body["max_tokens"] = serde_json::json!(max);
        }
        body
    }
}

#[async_trait::async_trait]
impl ChatClient for OpenAiCompatClient {
    async fn chat_stream(&self, req: &ChatRequest) -> Result<BoxStream<'static, StreamEvent>, ChatError> {
        let url = self.chat_url(req);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, %url, "openai_compat chat stream request");

        let (builder, key) = self.authed_post(&url);
        let resp = match builder.json(&body).send().await {
            Ok(resp) => resp,
            Err(e) => {
                self.auth.mark_failed(&key);
                return Err(ChatError::Provider(e.to_string()));
            }
        };

        let status = resp.status();
        if !status.is_success() {
            self.auth.mark_failed(&key);
            let text = resp.text().await.unwrap_or_default();
            return Err(ChatError::Provider(format!("HTTP {} - {}", status.as_u16(), text)));
        }

        let mut state = ToolCallAssembly::default();
        Ok(sse_response_stream(resp, move |data| state.parse(data)))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Request message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

fn msg_to_openai(msg: &Message) -> Value {
    match msg.role {
        Role::Tool => tool_result_to_openai(msg),
        Role::Assistant => assistant_to_openai(msg),
        _ => serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        }),
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({"role": "assistant"});
    let mut text_parts: Vec<String> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t.clone()),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text.clone()),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": { "name": name, "arguments": input.to_string() },
                        }));
                    }
                    _ => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_result_to_openai(msg: &Message) -> Value {
    match &msg.content {
        MessageContent::Parts(parts) => {
            for part in parts {
                if let ContentPart::ToolResult { tool_use_id, content, .. } = part {
                    return serde_json::json!({
                        "role": "tool",
                        "tool_call_id": tool_use_id,
                        "content": content,
                    });
                }
            }
            serde_json::json!({"role": "tool", "tool_call_id": "", "content": ""})
        }
        MessageContent::Text(t) => serde_json::json!({
            "role": "tool",
            "tool_call_id": "",
            "content": t,
        }),
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Streaming response parsing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Accumulates tool-call argument fragments across SSE chunks, keyed by
/// the OpenAI `tool_calls[].index`. The engine's `StreamEvent` contract
/// wants whole parsed arguments in `ToolCallFinished` — unlike the raw
/// OpenAI wire format, which dribbles them out one JSON-string fragment
/// per chunk — so this is where that reassembly happens, once, rather
/// than in every caller of `chat_stream`.
#[derive(Default)]
struct ToolCallAssembly {
    calls: HashMap<u64, PendingCall>,
    order: Vec<u64>,
}

struct PendingCall {
    call_id: String,
    tool_name: String,
    args: String,
}

impl ToolCallAssembly {
    fn parse(&mut self, data: &str) -> Vec<StreamEvent> {
        if data.trim() == "[DONE]" {
            let mut events = self.flush_tool_calls();
            events.push(StreamEvent::Done { usage: None, finish_reason: Some("stop".into()) });
            return events;
        }

        let v: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(e) => return vec![StreamEvent::Error { message: e.to_string() }],
        };

        let choice = v.get("choices").and_then(|c| c.as_array()).and_then(|a| a.first());

        let Some(choice) = choice else {
            // Usage-only chunk (stream_options.include_usage on the last frame).
            if let Some(usage) = v.get("usage").and_then(parse_usage) {
                return vec![StreamEvent::Done { usage: Some(usage), finish_reason: None }];
            }
            return Vec::new();
        };

        let delta = choice.get("delta").unwrap_or(&Value::Null);
        let mut events = Vec::new();

        if let Some(tc_arr) = delta.get("tool_calls").and_then(|v| v.as_array()) {
            for tc in tc_arr {
                let index = tc.get("index").and_then(|v| v.as_u64()).unwrap_or(0);
                if let Some(id) = tc.get("id").and_then(|v| v.as_str()) {
                    let name = tc
                        .get("function")
                        .and_then(|f| f.get("name"))
                        .and_then(|v| v.as_str())
                        .unwrap_or("")
                        .to_string();
                    self.order.push(index);
                    self.calls.insert(index, PendingCall { call_id: id.to_string(), tool_name: name.clone(), args: String::new() });
                    events.push(StreamEvent::ToolCallStarted { call_id: id.to_string(), tool_name: name });
                }
                if let Some(args) = tc
                    .get("function")
                    .and_then(|f| f.get("arguments"))
                    .and_then(|v| v.as_str())
                {
                    if let Some(pending) = self.calls.get_mut(&index) {
                        pending.args.push_str(args);
                        events.push(StreamEvent::ToolCallDelta { call_id: pending.call_id.clone(), delta: args.to_string() });
                    }
                }
            }
        }

        if let Some(text) = delta.get("content").and_then(|v| v.as_str()) {
            if !text.is_empty() {
                events.push(StreamEvent::Token { text: text.to_string() });
            }
        }

        if let Some(fr) = choice.get("finish_reason").and_then(|f| f.as_str()) {
            events.extend(self.flush_tool_calls());
            let usage = v.get("usage").and_then(parse_usage);
            events.push(StreamEvent::Done { usage, finish_reason: Some(fr.to_string()) });
        }

        events
    }

    fn flush_tool_calls(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        for index in self.order.drain(..) {
            if let Some(call) = self.calls.remove(&index) {
                let arguments: Value = serde_json::from_str(&call.args).unwrap_or(Value::Object(Default::default()));
                events.push(StreamEvent::ToolCallFinished {
                    call_id: call.call_id,
                    tool_name: call.tool_name,
                    arguments,
                });
            }
        }
        events
    }
}

fn parse_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_delta_emits_token_event() {
        let mut assembly = ToolCallAssembly::default();
        let events = assembly.parse(r#"{"choices":[{"delta":{"content":"hi"},"index":0}]}"#);
        assert!(matches!(events.as_slice(), [StreamEvent::Token { text }] if text == "hi"));
    }

    #[test]
    fn tool_call_assembles_fragmented_arguments() {
        let mut assembly = ToolCallAssembly::default();
        let started = assembly.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"spawn_worker","arguments":""}}]},"index":0}]}"#,
        );
        assert!(matches!(started.as_slice(), [StreamEvent::ToolCallStarted { call_id, .. }] if call_id == "c1"));

        let delta1 = assembly.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"{\"runner_id\":"}}]},"index":0}]}"#,
        );
        assert!(matches!(delta1.as_slice(), [StreamEvent::ToolCallDelta { .. }]));

        let delta2 = assembly.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"r1\"}"}}]},"index":0}]}"#,
        );
        assert!(matches!(delta2.as_slice(), [StreamEvent::ToolCallDelta { .. }]));

        let finished = assembly.parse(r#"{"choices":[{"delta":{},"finish_reason":"tool_calls","index":0}]}"#);
        let StreamEvent::ToolCallFinished { call_id, tool_name, arguments } = &finished[0] else {
            panic!("expected ToolCallFinished, got {finished:?}");
        };
        assert_eq!(call_id, "c1");
        assert_eq!(tool_name, "spawn_worker");
        assert_eq!(arguments["runner_id"], "r1");
        assert!(matches!(finished[1], StreamEvent::Done { .. }));
    }

    #[test]
    fn done_sentinel_flushes_pending_tool_calls() {
        let mut assembly = ToolCallAssembly::default();
        assembly.parse(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"t","arguments":"{}"}}]},"index":0}]}"#,
        );
        let events = assembly.parse("[DONE]");
        assert!(events.iter().any(|e| matches!(e, StreamEvent::ToolCallFinished { .. })));
        assert!(events.iter().any(|e| matches!(e, StreamEvent::Done { .. })));
    }

    #[test]
    fn usage_only_chunk_emits_done_with_usage() {
        let mut assembly = ToolCallAssembly::default();
        let events = assembly.parse(r#"{"usage":{"prompt_tokens":10,"completion_tokens":5,"total_tokens":15}}"#);
        assert!(matches!(events.as_slice(), [StreamEvent::Done { usage: Some(u), .. }] if u.total_tokens == 15));
    }
}
