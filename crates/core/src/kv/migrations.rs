//! Schema versions of the state database, tracked in `PRAGMA user_version`.

use tokio_rusqlite::Connection;

use crate::Error;

/// Schema steps; step `n` moves the database to version `n + 1`.
const STEPS: &[&str] = &[include_str!("../../migrations/001_kv.sql")];

/// Version a fully migrated database reports.
pub const SCHEMA_VERSION: i64 = STEPS.len() as i64;

/// Bring the schema up to [`SCHEMA_VERSION`]. Each step commits on its own.
///
/// A database written by a newer build is refused rather than touched.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let current: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
        if current > SCHEMA_VERSION {
            return Err(Error::MigrationFailed(format!(
                "state database is at schema {current}, this build knows {SCHEMA_VERSION}"
            )));
        }

        for (version, sql) in (1..).zip(STEPS).skip(current.max(0) as usize) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("schema {version}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
            tracing::debug!(version, "state schema migrated");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn user_version(conn: &Connection) -> i64 {
        conn.call(|conn| conn.query_row("PRAGMA user_version", [], |row| row.get(0))).await.unwrap()
    }

    #[tokio::test]
    async fn test_fresh_database_reaches_current_schema() {
        let conn = Connection::open_in_memory().await.unwrap();
        run(&conn).await.unwrap();
        run(&conn).await.unwrap();

        assert_eq!(user_version(&conn).await, SCHEMA_VERSION);
        let has_kv: bool = conn
            .call(|conn| {
                conn.query_row(
                    "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='kv')",
                    [],
                    |row| row.get(0),
                )
            })
            .await
            .unwrap();
        assert!(has_kv);
    }

    #[tokio::test]
    async fn test_newer_schema_is_refused() {
        let conn = Connection::open_in_memory().await.unwrap();
        conn.call(|conn| conn.pragma_update(None, "user_version", SCHEMA_VERSION + 1)).await.unwrap();

        assert!(matches!(run(&conn).await, Err(Error::MigrationFailed(_))));
    }
}
