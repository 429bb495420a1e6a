use serde::Serialize;
use serde_json::Value;

/// Closed set of error categories a tool result can report.
///
/// Mirrors the original `tool_error(error_type=...)` helper so that a
/// caller (the supervisor's ReAct loop, a human inspecting the event
/// log) can branch on category without parsing `user_message` text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ValidationError,
    ExecutionError,
    RateLimited,
    ConnectorNotConfigured,
    InvalidCredentials,
    NotFound,
    MissingContext,
}

/// Uniform tool-result envelope returned by every tool invocation —
/// local tools dispatched in-process and `spawn_worker` results
/// relayed back from a runner alike.
///
/// Serialized by hand rather than via `#[serde(tag = "status")]`
/// because the two variants carry different field sets (`data` vs.
/// `error_type`/`user_message`/`details`), matching the original's
/// `tool_success(data)` / `tool_error(error_type, message, details)`
/// helper pair.
#[derive(Debug, Clone)]
pub enum ToolOutcome {
    Ok { data: Value },
    Err {
        error_type: ErrorType,
        user_message: String,
        details: Option<Value>,
    },
}

impl ToolOutcome {
    pub fn ok(data: Value) -> Self {
        ToolOutcome::Ok { data }
    }

    pub fn err(error_type: ErrorType, user_message: impl Into<String>) -> Self {
        ToolOutcome::Err {
            error_type,
            user_message: user_message.into(),
            details: None,
        }
    }

    pub fn err_with_details(
        error_type: ErrorType,
        user_message: impl Into<String>,
        details: Value,
    ) -> Self {
        ToolOutcome::Err {
            error_type,
            user_message: user_message.into(),
            details: Some(details),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, ToolOutcome::Ok { .. })
    }
}

impl Serialize for ToolOutcome {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        match self {
            ToolOutcome::Ok { data } => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", "ok")?;
                map.serialize_entry("data", data)?;
                map.end()
            }
            ToolOutcome::Err {
                error_type,
                user_message,
                details,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("error_type", error_type)?;
                map.serialize_entry("user_message", user_message)?;
                if let Some(d) = details {
                    map.serialize_entry("details", d)?;
                }
                map.end()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_outcome_serializes_flat() {
        let outcome = ToolOutcome::ok(json!({"exit_code": 0}));
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "ok");
        assert_eq!(v["data"]["exit_code"], 0);
    }

    #[test]
    fn err_outcome_omits_details_when_none() {
        let outcome = ToolOutcome::err(ErrorType::NotFound, "no such runner");
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["status"], "error");
        assert_eq!(v["error_type"], "not_found");
        assert!(v.get("details").is_none());
    }

    #[test]
    fn err_outcome_includes_details_when_present() {
        let outcome =
            ToolOutcome::err_with_details(ErrorType::RateLimited, "slow down", json!({"retry_after": 5}));
        let v = serde_json::to_value(&outcome).unwrap();
        assert_eq!(v["details"]["retry_after"], 5);
    }

    #[test]
    fn is_ok_distinguishes_variants() {
        assert!(ToolOutcome::ok(json!(null)).is_ok());
        assert!(!ToolOutcome::err(ErrorType::ExecutionError, "boom").is_ok());
    }
}
