//! Builder pattern for constructing a [`RunnerClient`].

use std::time::Duration;

use foreman_domain::capability::Capability;

use crate::client::RunnerClient;
use crate::reconnect::ReconnectBackoff;
use crate::types::RunnerSdkError;

/// Fluent builder for [`RunnerClient`].
///
/// # Example
///
/// ```rust,no_run
/// # use foreman_runner_sdk::RunnerClientBuilder;
/// # use foreman_domain::capability::Capability;
/// let client = RunnerClientBuilder::new()
///     .gateway_ws_url("ws://localhost:3210/v1/runners/ws")
///     .runner_id("mac-studio")
///     .token("secret")
///     .capability(Capability::ExecReadonly)
///     .heartbeat_interval(std::time::Duration::from_secs(30))
///     .build()
///     .unwrap();
/// ```
pub struct RunnerClientBuilder {
    pub(crate) gateway_ws_url: String,
    pub(crate) runner_id: String,
    pub(crate) token: String,
    pub(crate) capabilities: Vec<Capability>,
    pub(crate) version: String,
    pub(crate) heartbeat_interval: Duration,
    pub(crate) reconnect_backoff: ReconnectBackoff,
    pub(crate) max_concurrent_jobs: usize,
}

impl RunnerClientBuilder {
    pub fn new() -> Self {
        Self {
            gateway_ws_url: "ws://localhost:3210/v1/runners/ws".into(),
            runner_id: "unnamed-runner".into(),
            token: String::new(),
            capabilities: Vec::new(),
            version: "0.1.0".into(),
            heartbeat_interval: Duration::from_secs(30),
            reconnect_backoff: ReconnectBackoff::default(),
            max_concurrent_jobs: 4,
        }
    }

    /// Set the gateway WebSocket URL (e.g. `wss://gw.example.com/v1/runners/ws`).
    pub fn gateway_ws_url(mut self, url: impl Into<String>) -> Self {
        self.gateway_ws_url = url.into();
        self
    }

    /// Set the runner's stable unique identifier.
    pub fn runner_id(mut self, id: impl Into<String>) -> Self {
        self.runner_id = id.into();
        self
    }

    /// Set the device token issued by the gateway for this runner.
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    /// Advertise a capability this runner accepts jobs for.
    pub fn capability(mut self, cap: Capability) -> Self {
        self.capabilities.push(cap);
        self
    }

    /// Set all advertised capabilities at once.
    pub fn capabilities(mut self, caps: impl Into<Vec<Capability>>) -> Self {
        self.capabilities = caps.into();
        self
    }

    /// Set the runner version string reported in `Hello`.
    pub fn version(mut self, v: impl Into<String>) -> Self {
        self.version = v.into();
        self
    }

    /// Override the heartbeat interval (default 30s).
    pub fn heartbeat_interval(mut self, d: Duration) -> Self {
        self.heartbeat_interval = d;
        self
    }

    /// Override the reconnect backoff policy.
    pub fn reconnect_backoff(mut self, cfg: ReconnectBackoff) -> Self {
        self.reconnect_backoff = cfg;
        self
    }

    /// Maximum concurrent job executions (default 4).
    pub fn max_concurrent_jobs(mut self, n: usize) -> Self {
        self.max_concurrent_jobs = n;
        self
    }

    /// Build the [`RunnerClient`].
    pub fn build(self) -> Result<RunnerClient, RunnerSdkError> {
        if self.gateway_ws_url.is_empty() {
            return Err(RunnerSdkError::Config("gateway_ws_url is required".into()));
        }
        if self.token.is_empty() {
            return Err(RunnerSdkError::Config("token is required".into()));
        }
        if self.capabilities.is_empty() {
            return Err(RunnerSdkError::Config("at least one capability is required".into()));
        }

        Ok(RunnerClient {
            gateway_ws_url: self.gateway_ws_url,
            runner_id: self.runner_id,
            token: self.token,
            capabilities: self.capabilities,
            version: self.version,
            heartbeat_interval: self.heartbeat_interval,
            reconnect_backoff: self.reconnect_backoff,
            max_concurrent_jobs: self.max_concurrent_jobs,
        })
    }
}

impl Default for RunnerClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_requires_token() {
        let err = RunnerClientBuilder::new()
            .runner_id("r1")
            .capability(Capability::ExecReadonly)
            .build()
            .unwrap_err();
        assert!(matches!(err, RunnerSdkError::Config(_)));
    }

    #[test]
    fn build_requires_capability() {
        let err = RunnerClientBuilder::new().runner_id("r1").token("t").build().unwrap_err();
        assert!(matches!(err, RunnerSdkError::Config(_)));
    }

    #[test]
    fn build_succeeds_with_required_fields() {
        let client = RunnerClientBuilder::new()
            .runner_id("r1")
            .token("t")
            .capability(Capability::ExecReadonly)
            .build()
            .unwrap();
        assert_eq!(client.runner_id, "r1");
    }
}
