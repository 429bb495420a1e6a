//! API key resolution and round-robin rotation with failure cooldown.
//!
//! Generalizes `AuthConfig.keys` (round-robin) and the single `env`/`key`
//! fallback into one rotator so a provider adapter never has to special-case
//! "one key" vs "many keys".

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use foreman_domain::config::AuthConfig;
use foreman_domain::{Error, Result};

const COOLDOWN_SECS: u64 = 60;

struct KeySlot {
    key: String,
    failed_at: Option<Instant>,
}

/// Thread-safe round-robin key rotator with failure cooldown. Keys in
/// cooldown are skipped; if every key is cooling down, the one that
/// failed longest ago is handed out anyway.
pub struct AuthRotator {
    slots: Mutex<Vec<KeySlot>>,
    index: AtomicUsize,
    cooldown: Duration,
}

impl AuthRotator {
    fn new(keys: Vec<String>) -> Result<Self> {
        if keys.is_empty() {
            return Err(Error::Auth("no API key resolved for provider".into()));
        }
        Ok(Self {
            slots: Mutex::new(keys.into_iter().map(|key| KeySlot { key, failed_at: None }).collect()),
            index: AtomicUsize::new(0),
            cooldown: Duration::from_secs(COOLDOWN_SECS),
        })
    }

    /// Resolution order: `keys` (env var names, round-robin) takes
    /// precedence over the single `key`/`env` fields.
    pub fn from_auth_config(auth: &AuthConfig) -> Result<Self> {
        if !auth.keys.is_empty() {
            let mut resolved = Vec::with_capacity(auth.keys.len());
            for env_name in &auth.keys {
                let val = std::env::var(env_name).map_err(|_| {
                    Error::Auth(format!(
                        "environment variable '{env_name}' not set (from auth.keys)"
                    ))
                })?;
                resolved.push(val);
            }
            return Self::new(resolved);
        }
        Self::new(vec![resolve_single_key(auth)?])
    }

    pub fn next_key(&self) -> String {
        let mut slots = self.slots.lock().expect("AuthRotator lock poisoned");
        let len = slots.len();
        if len == 1 {
            return slots[0].key.clone();
        }
        let now = Instant::now();
        let start = self.index.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            if let Some(failed_at) = slots[idx].failed_at {
                if now.duration_since(failed_at) < self.cooldown {
                    continue;
                }
            }
            return slots[idx].key.clone();
        }
        slots
            .iter_mut()
            .min_by_key(|s| s.failed_at.unwrap_or(now))
            .map(|s| s.key.clone())
            .expect("slots is non-empty")
    }

    pub fn mark_failed(&self, key: &str) {
        let mut slots = self.slots.lock().expect("AuthRotator lock poisoned");
        if let Some(slot) = slots.iter_mut().find(|s| s.key == key) {
            slot.failed_at = Some(Instant::now());
        }
    }
}

/// Single-key resolution: plaintext `key` wins (discouraged), else `env`.
fn resolve_single_key(auth: &AuthConfig) -> Result<String> {
    if let Some(ref key) = auth.key {
        tracing::warn!("API key loaded from plaintext config field 'key' — prefer 'env'");
        return Ok(key.clone());
    }
    if let Some(ref env_var) = auth.env {
        return std::env::var(env_var)
            .map_err(|_| Error::Auth(format!("environment variable '{env_var}' not set or not valid UTF-8")));
    }
    Err(Error::Auth(
        "no API key configured: set 'key' or 'env' in AuthConfig".into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_plaintext_key() {
        let auth = AuthConfig { key: Some("sk-test".into()), ..Default::default() };
        let rotator = AuthRotator::from_auth_config(&auth).unwrap();
        assert_eq!(rotator.next_key(), "sk-test");
    }

    #[test]
    fn resolves_env_key() {
        let var = "FOREMAN_LLM_TEST_KEY_1";
        std::env::set_var(var, "env-secret");
        let auth = AuthConfig { env: Some(var.into()), ..Default::default() };
        let rotator = AuthRotator::from_auth_config(&auth).unwrap();
        assert_eq!(rotator.next_key(), "env-secret");
        std::env::remove_var(var);
    }

    #[test]
    fn no_auth_source_errors() {
        let auth = AuthConfig::default();
        assert!(AuthRotator::from_auth_config(&auth).is_err());
    }

    #[test]
    fn rotates_round_robin_across_keys() {
        let v1 = "FOREMAN_LLM_TEST_KEY_A";
        let v2 = "FOREMAN_LLM_TEST_KEY_B";
        std::env::set_var(v1, "key-a");
        std::env::set_var(v2, "key-b");
        let auth = AuthConfig { keys: vec![v1.into(), v2.into()], ..Default::default() };
        let rotator = AuthRotator::from_auth_config(&auth).unwrap();
        let first = rotator.next_key();
        let second = rotator.next_key();
        assert_ne!(first, second);
        std::env::remove_var(v1);
        std::env::remove_var(v2);
    }

    #[test]
    fn cooling_down_key_is_skipped() {
        let v1 = "FOREMAN_LLM_TEST_KEY_C";
        let v2 = "FOREMAN_LLM_TEST_KEY_D";
        std::env::set_var(v1, "key-c");
        std::env::set_var(v2, "key-d");
        let auth = AuthConfig { keys: vec![v1.into(), v2.into()], ..Default::default() };
        let rotator = AuthRotator::from_auth_config(&auth).unwrap();
        rotator.mark_failed("key-c");
        // Both next calls should avoid key-c while it's cooling down.
        for _ in 0..4 {
            assert_eq!(rotator.next_key(), "key-d");
        }
        std::env::remove_var(v1);
        std::env::remove_var(v2);
    }
}
