use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{PgPool, SqlitePool};

use foreman_domain::config::{StoreConfig, StoreDialect};
use foreman_domain::{Error, Result};

const SQLITE_MIGRATIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/sqlite");
const POSTGRES_MIGRATIONS: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/migrations/postgres");

/// The connected pool for whichever dialect `StoreConfig` selected.
///
/// Kept as an explicit two-variant enum rather than `sqlx::Any` so
/// every query site picks its dialect's exact SQL — claiming a job
/// with `FOR UPDATE SKIP LOCKED` on Postgres and an `UPDATE ...
/// RETURNING` loop on SQLite are different enough queries that
/// papering over them with one dialect-agnostic string would be worse
/// than writing both out.
#[derive(Clone)]
pub enum Pool {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

impl Pool {
    pub async fn connect(config: &StoreConfig) -> Result<Self> {
        match config.dialect {
            StoreDialect::Sqlite => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.database_url)
                    .await
                    .map_err(|e| Error::Store(format!("sqlite connect: {e}")))?;
                Migrator::new(std::path::Path::new(SQLITE_MIGRATIONS))
                    .await
                    .map_err(|e| Error::Store(format!("load sqlite migrations: {e}")))?
                    .run(&pool)
                    .await
                    .map_err(|e| Error::Store(format!("run sqlite migrations: {e}")))?;
                Ok(Pool::Sqlite(pool))
            }
            StoreDialect::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .connect(&config.database_url)
                    .await
                    .map_err(|e| Error::Store(format!("postgres connect: {e}")))?;
                Migrator::new(std::path::Path::new(POSTGRES_MIGRATIONS))
                    .await
                    .map_err(|e| Error::Store(format!("load postgres migrations: {e}")))?
                    .run(&pool)
                    .await
                    .map_err(|e| Error::Store(format!("run postgres migrations: {e}")))?;
                Ok(Pool::Postgres(pool))
            }
        }
    }

    pub fn dialect(&self) -> StoreDialect {
        match self {
            Pool::Sqlite(_) => StoreDialect::Sqlite,
            Pool::Postgres(_) => StoreDialect::Postgres,
        }
    }
}
