//! Data Access Layer
//!
//! PostgreSQL storage for scenario progress and XP. `Db` implements the core
//! `ProgressStore` trait, so the session logic never sees SQL.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool, types::Json};
use tenuraitee_core::{
    progress::{ProgressRecord, ProgressStore, UserStats},
    scoring,
    transcript::DialogueStep,
};

/// A wrapper around the `PgPool` to provide a clear data access interface.
#[derive(Clone)]
pub struct Db {
    pool: PgPool,
}

#[derive(FromRow)]
struct ProgressRow {
    user_id: String,
    scenario_id: String,
    score: i16,
    completed: bool,
    passed: bool,
    feedback: String,
    transcript: Json<Vec<DialogueStep>>,
}

impl TryFrom<ProgressRow> for ProgressRecord {
    type Error = anyhow::Error;

    fn try_from(row: ProgressRow) -> Result<Self> {
        Ok(Self {
            scenario_id: row.scenario_id.parse()?,
            score: u8::try_from(row.score.clamp(0, 100))?,
            user_id: row.user_id,
            completed: row.completed,
            passed: row.passed,
            feedback: row.feedback,
            transcript: row.transcript.0,
        })
    }
}

#[derive(FromRow)]
struct StatsRow {
    xp: i32,
    level: i32,
}

impl From<StatsRow> for UserStats {
    fn from(row: StatsRow) -> Self {
        Self {
            xp: row.xp.max(0) as u32,
            level: row.level.max(1) as u32,
        }
    }
}

impl Db {
    /// Creates a new `Db` instance.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Runs all pending `sqlx` migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ProgressStore for Db {
    /// Writes the record, adds XP and recomputes the level in one transaction.
    async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO scenario_progress
                (user_id, scenario_id, score, completed, passed, feedback, transcript)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (user_id, scenario_id) DO UPDATE
            SET score = EXCLUDED.score,
                completed = EXCLUDED.completed,
                passed = EXCLUDED.passed,
                feedback = EXCLUDED.feedback,
                transcript = EXCLUDED.transcript,
                updated_at = NOW()
            "#,
        )
        .bind(&record.user_id)
        .bind(record.scenario_id.as_str())
        .bind(i16::from(record.score))
        .bind(record.completed)
        .bind(record.passed)
        .bind(&record.feedback)
        .bind(Json(&record.transcript))
        .execute(&mut *tx)
        .await
        .context("Failed to upsert scenario progress")?;

        let total = sqlx::query_scalar::<_, i32>(
            r#"
            INSERT INTO user_stats (user_id, xp)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE
            SET xp = user_stats.xp + EXCLUDED.xp, updated_at = NOW()
            RETURNING xp
            "#,
        )
        .bind(&record.user_id)
        .bind(i32::try_from(xp)?)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to award XP")?;

        let level = scoring::level_for_xp(total.max(0) as u32);
        let row = sqlx::query_as::<_, StatsRow>(
            "UPDATE user_stats SET level = $2 WHERE user_id = $1 RETURNING xp, level",
        )
        .bind(&record.user_id)
        .bind(i32::try_from(level)?)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to update level")?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        let rows = sqlx::query_as::<_, ProgressRow>(
            r#"
            SELECT user_id, scenario_id, score, completed, passed, feedback, transcript
            FROM scenario_progress
            WHERE user_id = $1
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load scenario progress")?;

        rows.into_iter().map(ProgressRecord::try_from).collect()
    }

    async fn stats_for_user(&self, user_id: &str) -> Result<UserStats> {
        let row = sqlx::query_as::<_, StatsRow>(
            "SELECT xp, level FROM user_stats WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load user stats")?;
        Ok(row.map(UserStats::from).unwrap_or_default())
    }
}
