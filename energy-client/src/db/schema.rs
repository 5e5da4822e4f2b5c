use anyhow::Result;
use sqlx::SqlitePool;

pub const MEASUREMENTS_TABLE: &str = "energy_measurements";
pub const TIMESTAMP_INDEX: &str = "idx_timestamp";

const CREATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS energy_measurements (
    timestamp TEXT,
    voltage REAL,
    current REAL,
    power REAL,
    energy REAL,
    frequency REAL,
    pf REAL,
    cost REAL
)
"#;

const CREATE_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS idx_timestamp ON energy_measurements (timestamp)";

/// Create the measurement table and its timestamp index. Safe to run on every
/// startup.
pub async fn ensure_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(CREATE_TABLE).execute(pool).await?;
    sqlx::query(CREATE_INDEX).execute(pool).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connect_in_memory;

    #[tokio::test]
    async fn ensure_schema_is_idempotent() {
        let pool = connect_in_memory().await.unwrap();
        ensure_schema(&pool).await.unwrap();
        ensure_schema(&pool).await.unwrap();

        let names: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE tbl_name = ? ORDER BY name")
                .bind(MEASUREMENTS_TABLE)
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = names.iter().map(|(n,)| n.as_str()).collect();

        assert_eq!(names, vec![MEASUREMENTS_TABLE, TIMESTAMP_INDEX]);
    }

    #[tokio::test]
    async fn connect_creates_missing_parent_directory() {
        let dir = std::env::temp_dir().join(format!("energy-client-{}", std::process::id()));
        let path = dir.join("nested").join("energy_data.db");

        let pool = crate::db::connect(&path, 1).await.unwrap();
        ensure_schema(&pool).await.unwrap();
        pool.close().await;

        assert!(path.exists());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
