//! Shared Application State
//!
//! This module defines the `AppState` struct, which holds all shared,
//! clonable resources like the progress store, service clients, and the
//! registry of live simulations.

use crate::config::Config;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tenuraitee_core::{SessionServices, SimulationSession, progress::ProgressStore};
use tokio::{sync::RwLock, task::JoinHandle};
use tracing::{debug, info};
use uuid::Uuid;

struct RegistryEntry {
    session: Arc<SimulationSession>,
    last_seen: Instant,
}

/// Live simulations, keyed by the id handed out on creation.
///
/// A simulation that is not looked up for `idle_timeout` is dropped, either
/// by the periodic sweeper or the next time one is created.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<Uuid, RegistryEntry>>,
    idle_timeout: Duration,
}

impl SessionRegistry {
    pub fn new(idle_timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            idle_timeout,
        }
    }

    pub async fn insert(&self, session: SimulationSession) -> (Uuid, Arc<SimulationSession>) {
        self.evict_idle().await;

        let id = Uuid::new_v4();
        let session = Arc::new(session);
        self.sessions.write().await.insert(
            id,
            RegistryEntry {
                session: session.clone(),
                last_seen: Instant::now(),
            },
        );
        (id, session)
    }

    /// Looks up a simulation and marks it as recently used.
    pub async fn get(&self, id: Uuid) -> Option<Arc<SimulationSession>> {
        let mut sessions = self.sessions.write().await;
        let entry = sessions.get_mut(&id)?;
        entry.last_seen = Instant::now();
        Some(entry.session.clone())
    }

    pub async fn remove(&self, id: Uuid) -> Option<Arc<SimulationSession>> {
        self.sessions
            .write()
            .await
            .remove(&id)
            .map(|entry| entry.session)
    }

    /// Drops every simulation idle for longer than the timeout; returns how
    /// many were dropped.
    pub async fn evict_idle(&self) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, entry| entry.last_seen.elapsed() < self.idle_timeout);
        let evicted = before - sessions.len();
        if evicted > 0 {
            debug!(evicted, remaining = sessions.len(), "Evicted idle simulations");
        }
        evicted
    }

    /// Runs [`SessionRegistry::evict_idle`] every `every` until the task is aborted.
    pub fn spawn_sweeper(self: Arc<Self>, every: Duration) -> JoinHandle<()> {
        info!(?every, idle_timeout = ?self.idle_timeout, "Starting idle simulation sweeper");
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            loop {
                interval.tick().await;
                self.evict_idle().await;
            }
        })
    }
}

/// The shared application state, created once at startup and passed to all handlers.
/// All fields are public to be accessible from other modules.
#[derive(Clone)]
pub struct AppState {
    pub services: SessionServices,
    pub sessions: Arc<SessionRegistry>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn store(&self) -> &Arc<dyn ProgressStore> {
        &self.services.store
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tenuraitee_core::{generator::MockResponseGenerator, progress::InMemoryProgressStore};

    async fn session() -> SimulationSession {
        SimulationSession::new(
            None,
            SessionServices {
                generator: Arc::new(MockResponseGenerator),
                tts: None,
                store: Arc::new(InMemoryProgressStore::new()),
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_idle_simulations_are_evicted() {
        let registry = SessionRegistry::new(Duration::ZERO);
        let (id, _) = registry.insert(session().await).await;

        assert_eq!(registry.evict_idle().await, 1);
        assert!(registry.get(id).await.is_none());
    }

    #[tokio::test]
    async fn test_active_simulations_are_kept() {
        let registry = SessionRegistry::new(Duration::from_secs(1800));
        let (first, _) = registry.insert(session().await).await;
        let (second, _) = registry.insert(session().await).await;

        assert_eq!(registry.evict_idle().await, 0);
        assert!(registry.get(first).await.is_some());
        assert!(registry.remove(second).await.is_some());
        assert!(registry.get(second).await.is_none());
    }

    #[tokio::test]
    async fn test_creating_a_simulation_sweeps_idle_ones() {
        let registry = SessionRegistry::new(Duration::ZERO);
        let (stale, _) = registry.insert(session().await).await;
        let (fresh, _) = registry.insert(session().await).await;

        assert_ne!(stale, fresh);
        assert!(!registry.sessions.read().await.contains_key(&stale));
    }

    #[tokio::test]
    async fn test_sweeper_runs_periodically() {
        let registry = Arc::new(SessionRegistry::new(Duration::ZERO));
        registry.insert(session().await).await;

        let sweeper = registry.clone().spawn_sweeper(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(registry.sessions.read().await.is_empty());
        sweeper.abort();
    }
}
