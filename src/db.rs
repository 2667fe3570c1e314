use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct Database {
    pub pool: PgPool,
}

impl Database {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        Ok(Self { pool })
    }

    /// Creates the runs and claims tables if they don't exist.
    /// Safe to run on every startup.
    pub async fn init_schema(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS runs (
                id UUID PRIMARY KEY,
                fingerprint VARCHAR(64),
                source VARCHAR(255) NOT NULL,
                payload_json JSONB NOT NULL,
                result_json JSONB,
                status VARCHAR(20) NOT NULL,
                priority VARCHAR(20),
                scheduled_at VARCHAR(50),
                error TEXT,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS runs_fingerprint_idx ON runs (fingerprint)")
            .execute(&self.pool)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS lead_claims (
                fingerprint VARCHAR(64) PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
