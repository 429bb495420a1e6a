//! Runner registration and device token persistence.

use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use foreman_domain::capability::Capability;
use foreman_domain::entities::{DeviceToken, Runner, RunnerStatus};
use foreman_domain::{Error, Result};

use crate::pool::Pool;
use crate::rows::{status_str, DeviceTokenRow, RunnerRow};

#[derive(Clone)]
pub struct RunnerStore {
    pool: Pool,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

impl RunnerStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub async fn register(
        &self,
        id: &str,
        owner_id: &str,
        name: &str,
        capabilities: &[Capability],
    ) -> Result<Runner> {
        let now = Utc::now();
        let status = status_str(&RunnerStatus::Offline)?;
        let capabilities_json = serde_json::to_value(capabilities)
            .map_err(|e| Error::Store(format!("encode capabilities: {e}")))?;
        let row: RunnerRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO runners (id, owner_id, name, status, capabilities, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6) \
                 RETURNING id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at",
            )
            .bind(id)
            .bind(owner_id)
            .bind(name)
            .bind(&status)
            .bind(&capabilities_json)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("register: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO runners (id, owner_id, name, status, capabilities, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 RETURNING id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at",
            )
            .bind(id)
            .bind(owner_id)
            .bind(name)
            .bind(&status)
            .bind(&capabilities_json)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("register: {e}")))?,
        };
        row.into_entity()
    }

    pub async fn get(&self, runner_id: &str) -> Result<Option<Runner>> {
        let row: Option<RunnerRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at \
                 FROM runners WHERE id = ?1",
            )
            .bind(runner_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at \
                 FROM runners WHERE id = $1",
            )
            .bind(runner_id)
            .fetch_optional(pool)
            .await
            .map_err(|e| Error::Store(format!("get: {e}")))?,
        };
        row.map(RunnerRow::into_entity).transpose()
    }

    pub async fn list_for_owner(&self, owner_id: &str) -> Result<Vec<Runner>> {
        let rows: Vec<RunnerRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at \
                 FROM runners WHERE owner_id = ?1 ORDER BY created_at",
            )
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("list_for_owner: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, owner_id, name, status, capabilities, last_heartbeat_at, created_at, revoked_at \
                 FROM runners WHERE owner_id = $1 ORDER BY created_at",
            )
            .bind(owner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("list_for_owner: {e}")))?,
        };
        rows.into_iter().map(RunnerRow::into_entity).collect()
    }

    pub async fn mark_online(&self, runner_id: &str) -> Result<()> {
        let status = status_str(&RunnerStatus::Online)?;
        self.set_status_and_heartbeat(runner_id, &status).await
    }

    pub async fn mark_offline(&self, runner_id: &str) -> Result<()> {
        let status = status_str(&RunnerStatus::Offline)?;
        self.set_status_and_heartbeat(runner_id, &status).await
    }

    async fn set_status_and_heartbeat(&self, runner_id: &str, status: &str) -> Result<()> {
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE runners SET status = ?1, last_heartbeat_at = ?2 WHERE id = ?3")
                    .bind(status)
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE runners SET status = $1, last_heartbeat_at = $2 WHERE id = $3")
                    .bind(status)
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("set_status_and_heartbeat: {e}")))?;
        Ok(())
    }

    pub async fn touch_heartbeat(&self, runner_id: &str) -> Result<()> {
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE runners SET last_heartbeat_at = ?1 WHERE id = ?2")
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE runners SET last_heartbeat_at = $1 WHERE id = $2")
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("touch_heartbeat: {e}")))?;
        Ok(())
    }

    pub async fn revoke(&self, runner_id: &str) -> Result<()> {
        let status = status_str(&RunnerStatus::Revoked)?;
        match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query("UPDATE runners SET status = ?1, revoked_at = ?2 WHERE id = ?3")
                    .bind(&status)
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query("UPDATE runners SET status = $1, revoked_at = $2 WHERE id = $3")
                    .bind(&status)
                    .bind(Utc::now())
                    .bind(runner_id)
                    .execute(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("revoke: {e}")))?;
        Ok(())
    }

    /// Issue a new device token for a runner. Returns the entity (whose
    /// `token_hash` is persisted) alongside the plaintext, which the
    /// caller must hand to the owner now — it is never recoverable
    /// after this call returns.
    pub async fn create_device_token(
        &self,
        runner_id: &str,
        owner_id: &str,
    ) -> Result<(DeviceToken, String)> {
        let plaintext = Uuid::new_v4().to_string();
        let token_hash = hash_token(&plaintext);
        let id = Uuid::new_v4();
        let now = Utc::now();
        let row: DeviceTokenRow = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "INSERT INTO device_tokens (id, runner_id, owner_id, token_hash, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5) \
                 RETURNING id, runner_id, owner_id, token_hash, created_at",
            )
            .bind(id)
            .bind(runner_id)
            .bind(owner_id)
            .bind(&token_hash)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_device_token: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "INSERT INTO device_tokens (id, runner_id, owner_id, token_hash, created_at) \
                 VALUES ($1, $2, $3, $4, $5) \
                 RETURNING id, runner_id, owner_id, token_hash, created_at",
            )
            .bind(id)
            .bind(runner_id)
            .bind(owner_id)
            .bind(&token_hash)
            .bind(now)
            .fetch_one(pool)
            .await
            .map_err(|e| Error::Store(format!("create_device_token: {e}")))?,
        };
        Ok((row.into_entity(), plaintext))
    }

    pub async fn list_device_tokens(&self, runner_id: &str) -> Result<Vec<DeviceToken>> {
        let rows: Vec<DeviceTokenRow> = match &self.pool {
            Pool::Sqlite(pool) => sqlx::query_as(
                "SELECT id, runner_id, owner_id, token_hash, created_at FROM device_tokens \
                 WHERE runner_id = ?1 ORDER BY created_at",
            )
            .bind(runner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("list_device_tokens: {e}")))?,
            Pool::Postgres(pool) => sqlx::query_as(
                "SELECT id, runner_id, owner_id, token_hash, created_at FROM device_tokens \
                 WHERE runner_id = $1 ORDER BY created_at",
            )
            .bind(runner_id)
            .fetch_all(pool)
            .await
            .map_err(|e| Error::Store(format!("list_device_tokens: {e}")))?,
        };
        Ok(rows.into_iter().map(DeviceTokenRow::into_entity).collect())
    }

    pub async fn revoke_device_token(&self, token_id: Uuid) -> Result<()> {
        match &self.pool {
            Pool::Sqlite(pool) => sqlx::query("DELETE FROM device_tokens WHERE id = ?1")
                .bind(token_id)
                .execute(pool)
                .await,
            Pool::Postgres(pool) => sqlx::query("DELETE FROM device_tokens WHERE id = $1")
                .bind(token_id)
                .execute(pool)
                .await,
        }
        .map_err(|e| Error::Store(format!("revoke_device_token: {e}")))?;
        Ok(())
    }

    /// Find the device token row matching `runner_id` whose stored hash
    /// equals `hash_token(presented)`, checked with constant-time
    /// comparison at the call site (`foreman_transport::token_eq`) —
    /// this just narrows the row set down to the one runner's tokens so
    /// the constant-time comparison only runs against real candidates.
    pub async fn find_device_token_hashes(&self, runner_id: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = match &self.pool {
            Pool::Sqlite(pool) => {
                sqlx::query_as("SELECT token_hash FROM device_tokens WHERE runner_id = ?1")
                    .bind(runner_id)
                    .fetch_all(pool)
                    .await
            }
            Pool::Postgres(pool) => {
                sqlx::query_as("SELECT token_hash FROM device_tokens WHERE runner_id = $1")
                    .bind(runner_id)
                    .fetch_all(pool)
                    .await
            }
        }
        .map_err(|e| Error::Store(format!("find_device_token_hashes: {e}")))?;
        Ok(rows.into_iter().map(|(hash,)| hash).collect())
    }

    pub fn hash_token(token: &str) -> String {
        hash_token(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_token_is_deterministic() {
        assert_eq!(RunnerStore::hash_token("abc"), RunnerStore::hash_token("abc"));
        assert_ne!(RunnerStore::hash_token("abc"), RunnerStore::hash_token("abd"));
    }

    #[test]
    fn runner_status_serializes_to_plain_snake_case_string() {
        assert_eq!(status_str(&RunnerStatus::Revoked).unwrap(), "revoked");
    }
}
