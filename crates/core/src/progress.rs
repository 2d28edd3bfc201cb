//! Progress Writer
//!
//! Persists the outcome of a finished call and awards XP. Storage sits
//! behind [`ProgressStore`] so the same logic runs against PostgreSQL in the
//! service and against [`InMemoryProgressStore`] in tests and local runs.

use crate::{
    scenario::{Scenario, ScenarioId},
    scoring,
    transcript::DialogueStep,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};

/// One row per (user, scenario). Re-completing a scenario overwrites it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub user_id: String,
    pub scenario_id: ScenarioId,
    pub score: u8,
    pub completed: bool,
    pub passed: bool,
    pub feedback: String,
    pub transcript: Vec<DialogueStep>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub xp: u32,
    pub level: u32,
}

impl Default for UserStats {
    fn default() -> Self {
        Self { xp: 0, level: 1 }
    }
}

/// Result of [`save_progress`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SaveOutcome {
    /// False when nothing was written (anonymous session).
    pub success: bool,
    pub passed: bool,
    pub passing_score: u8,
    pub xp_awarded: u32,
}

/// Storage for per-user scenario progress and XP.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Inserts or replaces the record for `(record.user_id, record.scenario_id)`
    /// and adds `xp` to the user's total, all or nothing. Returns the
    /// updated stats.
    async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats>;

    /// All records for a user, in no particular order.
    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>>;

    async fn stats_for_user(&self, user_id: &str) -> Result<UserStats>;
}

/// Saves a finished call and awards XP.
///
/// Anonymous sessions are not tracked: without a `user_id` this writes
/// nothing and reports `success: false`.
#[instrument(skip(store, scenario, transcript), fields(scenario = %scenario.id))]
pub async fn save_progress(
    store: &dyn ProgressStore,
    user_id: Option<&str>,
    scenario: &Scenario,
    transcript: &[DialogueStep],
    average_score: u8,
) -> Result<SaveOutcome> {
    let passing_score = scenario.passing_score;
    let passed = scoring::is_passing(average_score, passing_score);

    let Some(user_id) = user_id else {
        debug!("Anonymous session; progress not saved");
        return Ok(SaveOutcome {
            success: false,
            passed,
            passing_score,
            xp_awarded: 0,
        });
    };

    let feedback = if passed {
        format!("Passed {} with an average score of {average_score}.", scenario.title)
    } else {
        format!(
            "Completed {} with an average score of {average_score}; {passing_score} needed to pass.",
            scenario.title
        )
    };

    let xp_awarded = scoring::xp_award(average_score, passing_score);
    let record = ProgressRecord {
        user_id: user_id.to_string(),
        scenario_id: scenario.id,
        score: average_score,
        completed: true,
        passed,
        feedback,
        transcript: transcript.to_vec(),
    };
    let stats = store.record_completion(record, xp_awarded).await?;
    info!(user_id, average_score, passed, xp_awarded, xp = stats.xp, level = stats.level, "Progress saved");

    Ok(SaveOutcome {
        success: true,
        passed,
        passing_score,
        xp_awarded,
    })
}

/// A `ProgressStore` kept in process memory.
#[derive(Default)]
pub struct InMemoryProgressStore {
    records: Mutex<HashMap<(String, ScenarioId), ProgressRecord>>,
    stats: Mutex<HashMap<String, UserStats>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats> {
        // Both maps are locked before either is touched.
        let mut records = self.records.lock().await;
        let mut stats = self.stats.lock().await;

        let entry = stats.entry(record.user_id.clone()).or_default();
        entry.xp += xp;
        entry.level = scoring::level_for_xp(entry.xp);
        let updated = *entry;

        records.insert((record.user_id.clone(), record.scenario_id), record);
        Ok(updated)
    }

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        Ok(self
            .records
            .lock()
            .await
            .values()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn stats_for_user(&self, user_id: &str) -> Result<UserStats> {
        Ok(self
            .stats
            .lock()
            .await
            .get(user_id)
            .copied()
            .unwrap_or_default())
    }
}

/// Wraps a store with a per-user cache of progress records.
///
/// Entries expire after `ttl` and are dropped whenever that user's progress
/// is written through this wrapper.
pub struct CachedProgressStore {
    inner: Arc<dyn ProgressStore>,
    ttl: Duration,
    cache: Mutex<HashMap<String, (Instant, Vec<ProgressRecord>)>>,
}

impl CachedProgressStore {
    pub fn new(inner: Arc<dyn ProgressStore>, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl ProgressStore for CachedProgressStore {
    async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats> {
        let user_id = record.user_id.clone();
        let stats = self.inner.record_completion(record, xp).await?;
        self.cache.lock().await.remove(&user_id);
        Ok(stats)
    }

    async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
        if let Some((stored_at, records)) = self.cache.lock().await.get(user_id) {
            if stored_at.elapsed() < self.ttl {
                return Ok(records.clone());
            }
        }

        let records = self.inner.progress_for_user(user_id).await?;
        self.cache
            .lock()
            .await
            .insert(user_id.to_string(), (Instant::now(), records.clone()));
        Ok(records)
    }

    async fn stats_for_user(&self, user_id: &str) -> Result<UserStats> {
        self.inner.stats_for_user(user_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenario::{self, ScenarioId};
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    fn flight() -> &'static Scenario {
        scenario::find(ScenarioId::FlightCancellation)
    }

    #[tokio::test]
    async fn test_anonymous_save_is_a_noop() {
        let store = InMemoryProgressStore::new();
        let outcome = save_progress(&store, None, flight(), &[], 90).await.unwrap();

        assert!(!outcome.success);
        assert!(outcome.passed);
        assert_eq!(outcome.xp_awarded, 0);
        assert!(store.records.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_passing_save_awards_margin_xp() {
        let store = InMemoryProgressStore::new();
        let outcome = save_progress(&store, Some("agent-1"), flight(), &[], 80)
            .await
            .unwrap();

        assert_eq!(
            outcome,
            SaveOutcome {
                success: true,
                passed: true,
                passing_score: 70,
                xp_awarded: 30,
            }
        );
        let records = store.progress_for_user("agent-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].completed && records[0].passed);
        assert_eq!(records[0].score, 80);
        assert_eq!(store.stats_for_user("agent-1").await.unwrap().xp, 30);
    }

    #[tokio::test]
    async fn test_last_attempt_wins() {
        let store = InMemoryProgressStore::new();
        save_progress(&store, Some("agent-1"), flight(), &[], 95).await.unwrap();
        let outcome = save_progress(&store, Some("agent-1"), flight(), &[], 40)
            .await
            .unwrap();

        assert!(!outcome.passed);
        assert_eq!(outcome.xp_awarded, scoring::ATTEMPT_XP);
        let records = store.progress_for_user("agent-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].score, 40);
        assert!(!records[0].passed);

        let stats = store.stats_for_user("agent-1").await.unwrap();
        assert_eq!(stats.xp, 38 + scoring::ATTEMPT_XP);
        assert_eq!(stats.level, 1);
    }

    #[tokio::test]
    async fn test_stats_default_for_unknown_user() {
        let store = InMemoryProgressStore::new();
        assert_eq!(store.stats_for_user("nobody").await.unwrap(), UserStats::default());
    }

    struct CountingStore {
        inner: InMemoryProgressStore,
        reads: AtomicUsize,
    }

    #[async_trait]
    impl ProgressStore for CountingStore {
        async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats> {
            self.inner.record_completion(record, xp).await
        }

        async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
            self.reads.fetch_add(1, Ordering::SeqCst);
            self.inner.progress_for_user(user_id).await
        }

        async fn stats_for_user(&self, user_id: &str) -> Result<UserStats> {
            self.inner.stats_for_user(user_id).await
        }
    }

    /// Writes its record first and then fails the XP step, like a database
    /// whose transaction is rolled back.
    struct XpStepFails {
        inner: InMemoryProgressStore,
        fail_next: AtomicBool,
    }

    #[async_trait]
    impl ProgressStore for XpStepFails {
        async fn record_completion(&self, record: ProgressRecord, xp: u32) -> Result<UserStats> {
            if self.fail_next.swap(false, Ordering::SeqCst) {
                return Err(anyhow::anyhow!("could not update user_stats; rolled back"));
            }
            self.inner.record_completion(record, xp).await
        }

        async fn progress_for_user(&self, user_id: &str) -> Result<Vec<ProgressRecord>> {
            self.inner.progress_for_user(user_id).await
        }

        async fn stats_for_user(&self, user_id: &str) -> Result<UserStats> {
            self.inner.stats_for_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_failed_completion_writes_nothing_and_retry_awards_once() {
        let store = XpStepFails {
            inner: InMemoryProgressStore::new(),
            fail_next: AtomicBool::new(true),
        };

        assert!(save_progress(&store, Some("agent-1"), flight(), &[], 80).await.is_err());
        assert!(store.progress_for_user("agent-1").await.unwrap().is_empty());
        assert_eq!(store.stats_for_user("agent-1").await.unwrap().xp, 0);

        let outcome = save_progress(&store, Some("agent-1"), flight(), &[], 80)
            .await
            .unwrap();
        assert!(outcome.success);
        assert_eq!(store.progress_for_user("agent-1").await.unwrap().len(), 1);
        assert_eq!(store.stats_for_user("agent-1").await.unwrap().xp, 30);
    }

    #[tokio::test]
    async fn test_cache_serves_reads_until_written() {
        let counting = Arc::new(CountingStore {
            inner: InMemoryProgressStore::new(),
            reads: AtomicUsize::new(0),
        });
        let cached = CachedProgressStore::new(counting.clone(), Duration::from_secs(60));

        cached.progress_for_user("agent-1").await.unwrap();
        cached.progress_for_user("agent-1").await.unwrap();
        assert_eq!(counting.reads.load(Ordering::SeqCst), 1);

        save_progress(&cached, Some("agent-1"), flight(), &[], 75).await.unwrap();
        let records = cached.progress_for_user("agent-1").await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_cache_expires_after_ttl() {
        let counting = Arc::new(CountingStore {
            inner: InMemoryProgressStore::new(),
            reads: AtomicUsize::new(0),
        });
        let cached = CachedProgressStore::new(counting.clone(), Duration::ZERO);

        cached.progress_for_user("agent-1").await.unwrap();
        cached.progress_for_user("agent-1").await.unwrap();
        assert_eq!(counting.reads.load(Ordering::SeqCst), 2);
    }
}
