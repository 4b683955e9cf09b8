use tokio::sync::mpsc;
use tracing::error;

use crate::error::Result;
use crate::types::TickSummary;

/// Receives TickSummaries from the stream/tick path and persists them to
/// SQLite. Runs as a dedicated background task — never blocks tick production.
pub struct TickWriter {
    pool: sqlx::SqlitePool,
    tick_rx: mpsc::Receiver<TickSummary>,
}

impl TickWriter {
    pub fn new(pool: sqlx::SqlitePool, tick_rx: mpsc::Receiver<TickSummary>) -> Self {
        Self { pool, tick_rx }
    }

    pub async fn run(mut self) {
        while let Some(summary) = self.tick_rx.recv().await {
            if let Err(e) = self.write_tick(&summary).await {
                error!("DB write error: {e}");
            }
        }
    }

    async fn write_tick(&self, s: &TickSummary) -> Result<()> {
        let payload = serde_json::to_string(s)?;
        let created_at = crate::clock::now_ms();

        sqlx::query(
            r#"
            INSERT INTO tick_summaries (
                match_id, platform, window, tick, generated_at, volume, payload, created_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&s.match_id)
        .bind(s.platform.to_string())
        .bind(s.window.to_string())
        .bind(s.tick as i64)
        .bind(&s.generated_at)
        .bind(s.volume as i64)
        .bind(&payload)
        .bind(created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
