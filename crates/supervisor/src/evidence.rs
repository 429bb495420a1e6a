//! Evidence mounting: just-in-time expansion of `[EVIDENCE:run_id=R,
//! job_id=J]` markers before an LLM call.
//!
//! The Thread only ever stores the compact marker (see
//! `foreman_dispatcher`'s resume path, which appends it alongside the
//! worker summary). Expansion happens here, on the outgoing message
//! list built for a single LLM call, and is never persisted — the full
//! worker output enters the request and is discarded once the call
//! returns.

use regex::Regex;
use std::sync::OnceLock;

use foreman_domain::tool::{Message, MessageContent};
use foreman_store::JobStore;

fn marker_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[EVIDENCE:run_id=(\d+),job_id=(\d+)\]").unwrap())
}

/// Replace every evidence marker found in `messages` with the full
/// worker output for that job, looked up fresh from storage. Messages
/// without a marker pass through unchanged (cloned).
pub async fn expand_evidence_markers(jobs: &JobStore, messages: &[Message]) -> Vec<Message> {
    let mut expanded = Vec::with_capacity(messages.len());
    for message in messages {
        let Some(text) = message.content.text() else {
            expanded.push(message.clone());
            continue;
        };
        if !marker_re().is_match(text) {
            expanded.push(message.clone());
            continue;
        }
        let replaced = expand_text(jobs, text).await;
        expanded.push(Message {
            role: message.role,
            content: MessageContent::Text(replaced),
        });
    }
    expanded
}

async fn expand_text(jobs: &JobStore, text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut last_end = 0;
    for caps in marker_re().captures_iter(text) {
        let whole = caps.get(0).unwrap();
        result.push_str(&text[last_end..whole.start()]);
        let job_id: i64 = caps[2].parse().unwrap_or(0);
        match jobs.get(job_id).await {
            Ok(Some(job)) => {
                let stdout = job.stdout.as_deref().unwrap_or("");
                let stderr = job.stderr.as_deref().unwrap_or("");
                result.push_str(&format!(
                    "[worker job {job_id} full output]\nstdout:\n{stdout}\nstderr:\n{stderr}"
                ));
            }
            Ok(None) => result.push_str(&format!("[worker job {job_id} output no longer available]")),
            Err(e) => {
                tracing::warn!(job_id, error = %e, "evidence expansion lookup failed");
                result.push_str(whole.as_str());
            }
        }
        last_end = whole.end();
    }
    result.push_str(&text[last_end..]);
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_regex_matches_expected_shape() {
        let caps = marker_re().captures("[EVIDENCE:run_id=5,job_id=9]").unwrap();
        assert_eq!(&caps[1], "5");
        assert_eq!(&caps[2], "9");
    }

    #[test]
    fn non_marker_text_does_not_match() {
        assert!(!marker_re().is_match("just a regular message"));
    }
}
