use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::SourceResult;
use crate::model::{Physician, PhysicianQuery};
use crate::source::PhysicianSource;

/// Time-bounded memo in front of a physician source. Only successful
/// searches are stored.
pub struct CachedSource<S> {
    inner: S,
    ttl: Duration,
    entries: Mutex<HashMap<PhysicianQuery, (Instant, Vec<Physician>)>>,
}

impl<S: PhysicianSource> CachedSource<S> {
    pub fn new(inner: S, ttl: Duration) -> Self {
        Self {
            inner,
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl<S: PhysicianSource> PhysicianSource for CachedSource<S> {
    async fn search(&self, query: &PhysicianQuery) -> SourceResult<Vec<Physician>> {
        if self.ttl.is_zero() {
            return self.inner.search(query).await;
        }

        {
            let mut entries = self.entries.lock().await;
            let now = Instant::now();
            entries.retain(|_, (stored_at, _)| now.duration_since(*stored_at) < self.ttl);
            if let Some((_, hit)) = entries.get(query) {
                tracing::debug!(key = ?query.key, "physician cache hit");
                return Ok(hit.clone());
            }
        }

        let fresh = self.inner.search(query).await?;
        self.entries
            .lock()
            .await
            .insert(query.clone(), (Instant::now(), fresh.clone()));
        Ok(fresh)
    }
}
