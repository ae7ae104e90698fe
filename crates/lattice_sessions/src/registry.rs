//! Session registry (§5): a single reader/writer lock guarding the
//! `SessionId -> Session` map. All mutations take the writer lock; lookups
//! take the reader lock. Connection close never happens while holding
//! either lock — `drain_idle`/`drain_all` hand back the drained sessions
//! for the caller to cancel and close outside the lock.

use crate::session::Session;
use lattice_ids::SessionId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        self.sessions.write().await.insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &SessionId) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Mark-and-drain every session idle for at least `ttl` (§4.3 `ReapIdle`).
    /// The caller is responsible for cancelling each returned session's
    /// lifetime and closing its connection outside any lock.
    pub async fn drain_idle(&self, ttl: std::time::Duration) -> Vec<Arc<Session>> {
        let now = chrono::Utc::now();
        let mut guard = self.sessions.write().await;
        let idle_ids: Vec<SessionId> = guard
            .iter()
            .filter(|(_, session)| session.is_idle(now, ttl))
            .map(|(id, _)| id.clone())
            .collect();

        let mut drained = Vec::with_capacity(idle_ids.len());
        for id in idle_ids {
            if let Some(session) = guard.remove(&id) {
                session.mark_closing();
                drained.push(session);
            }
        }
        drained
    }

    /// Mark-and-drain every session unconditionally (§4.3 `CloseAll`), with
    /// the same release discipline as [`Self::drain_idle`].
    pub async fn drain_all(&self) -> Vec<Arc<Session>> {
        let mut guard = self.sessions.write().await;
        let drained: Vec<Arc<Session>> = guard.values().cloned().collect();
        for session in &drained {
            session.mark_closing();
        }
        guard.clear();
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lattice_db::{DbConnection, EnginePool};
    use lattice_ids::NotebookId;

    async fn make_session(id: SessionId) -> Arc<Session> {
        let conn = DbConnection::open_duckdb_memory().unwrap();
        let pool = EnginePool::new(conn, 1);
        let pinned = pool.acquire_pinned().await.unwrap();
        Arc::new(Session::new(id, NotebookId::new(), "alice".to_string(), pinned))
    }

    #[tokio::test]
    async fn drain_idle_only_removes_sessions_past_ttl() {
        let registry = SessionRegistry::new();
        let fresh = make_session(SessionId::new()).await;
        let fresh_id = fresh.id.clone();
        registry.insert(fresh).await;

        let drained = registry.drain_idle(std::time::Duration::from_secs(0)).await;
        assert_eq!(drained.len(), 1);
        assert_eq!(registry.len().await, 0);
        assert!(registry.get(&fresh_id).await.is_none());
    }

    #[tokio::test]
    async fn drain_idle_keeps_sessions_under_ttl() {
        let registry = SessionRegistry::new();
        let session = make_session(SessionId::new()).await;
        registry.insert(session).await;

        let drained = registry.drain_idle(std::time::Duration::from_secs(30 * 60)).await;
        assert!(drained.is_empty());
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn drain_all_empties_the_registry() {
        let registry = SessionRegistry::new();
        registry.insert(make_session(SessionId::new()).await).await;
        registry.insert(make_session(SessionId::new()).await).await;

        let drained = registry.drain_all().await;
        assert_eq!(drained.len(), 2);
        assert_eq!(registry.len().await, 0);
        for session in &drained {
            assert!(session.is_closing());
        }
    }
}
