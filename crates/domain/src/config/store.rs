use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Persistence
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Which SQL dialect `foreman-store` should speak. Chosen explicitly
/// rather than inferred from `database_url` so that dialect-specific
/// query text (`FOR UPDATE SKIP LOCKED` vs. `UPDATE ... RETURNING`)
/// is selected once at startup, not re-sniffed per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreDialect {
    Sqlite,
    Postgres,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "d_dialect")]
    pub dialect: StoreDialect,
    #[serde(default = "d_database_url")]
    pub database_url: String,
    #[serde(default = "d_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            dialect: d_dialect(),
            database_url: d_database_url(),
            max_connections: d_max_connections(),
        }
    }
}

fn d_dialect() -> StoreDialect {
    StoreDialect::Sqlite
}
fn d_database_url() -> String {
    "sqlite://foreman.db".into()
}
fn d_max_connections() -> u32 {
    10
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_dialect_is_sqlite() {
        assert_eq!(StoreConfig::default().dialect, StoreDialect::Sqlite);
    }
}
