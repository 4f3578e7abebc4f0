//! In-memory store of import sessions keyed by `imp_{uuid}` ids.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::error;
use uuid::Uuid;

use crate::api_client::ApprehensionSink;
use crate::apprehension::BulkImportSummary;
use crate::error::ImportResult;
use crate::session::{ImportSession, ImportStep, SessionSnapshot};

#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    inner: Arc<RwLock<HashMap<String, ImportSession>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a session under a fresh id and return the id.
    pub fn insert(&self, session: ImportSession) -> String {
        let id = format!("imp_{}", Uuid::new_v4().simple());
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.insert(id.clone(), session);
        tracing::debug!("SessionStore: stored '{}' ({} live)", id, store.len());
        id
    }

    pub fn get(&self, id: &str) -> Option<ImportSession> {
        let store = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        store.get(id).cloned()
    }

    /// Run `f` against a session under the write lock.
    ///
    /// Returns `None` when the id is unknown.
    pub fn update<T>(&self, id: &str, f: impl FnOnce(&mut ImportSession) -> T) -> Option<T> {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        store.get_mut(id).map(f)
    }

    pub fn remove(&self, id: &str) -> Option<ImportSession> {
        let mut store = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        let removed = store.remove(id);
        if removed.is_some() {
            tracing::debug!("SessionStore: removed '{}'", id);
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Submit a previewed session's records to `sink` and finish it.
    ///
    /// The submission runs on its own task, so dropping the returned future
    /// (a client disconnect) still moves the session to `Done`.
    pub async fn submit(
        &self,
        id: &str,
        sink: Arc<dyn ApprehensionSink>,
    ) -> Option<ImportResult<SessionSnapshot>> {
        let records = match self.update(id, |s| s.begin_import())? {
            Ok(records) => records,
            Err(e) => return Some(Err(e)),
        };

        let store = self.clone();
        let task_id = id.to_string();
        let task = tokio::spawn(async move {
            let outcome = sink.bulk_import(&records).await;
            store.finish(&task_id, outcome)
        });

        match task.await {
            Ok(result) => result,
            Err(e) => {
                error!("Import task for '{}' failed: {}", id, e);
                self.finish(id, Err(anyhow::anyhow!("Import request failed")))
            }
        }
    }

    fn finish(
        &self,
        id: &str,
        outcome: anyhow::Result<BulkImportSummary>,
    ) -> Option<ImportResult<SessionSnapshot>> {
        self.update(id, |s| -> ImportResult<SessionSnapshot> {
            if s.step() == ImportStep::Importing {
                s.finish(outcome)?;
            }
            Ok(s.snapshot(id))
        })
    }
}
