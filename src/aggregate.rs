use std::collections::HashSet;
use std::sync::Arc;

use futures::future::try_join_all;

use crate::error::SourceResult;
use crate::model::{Physician, PhysicianQuery, SearchKey};
use crate::selector::Selection;
use crate::source::PhysicianSource;

/// Fans search keys out to the physician source and merges the batches.
///
/// All per-key searches are dispatched together and joined. If any search
/// fails the whole aggregation fails; partial results are never returned.
#[derive(Clone)]
pub struct AggregationEngine {
    source: Arc<dyn PhysicianSource>,
    limit: u32,
}

impl AggregationEngine {
    pub fn new(source: Arc<dyn PhysicianSource>, limit: u32) -> Self {
        Self { source, limit }
    }

    pub async fn resolve(
        &self,
        selection: &Selection,
        specialty: Option<&str>,
    ) -> SourceResult<Vec<Physician>> {
        match selection {
            Selection::Sites(keys) => self.aggregate(keys, specialty).await,
            Selection::National => self.national(specialty).await,
        }
    }

    pub async fn aggregate(
        &self,
        keys: &[SearchKey],
        specialty: Option<&str>,
    ) -> SourceResult<Vec<Physician>> {
        let queries: Vec<PhysicianQuery> = keys
            .iter()
            .map(|key| PhysicianQuery {
                key: Some(key.clone()),
                specialty: normalize_specialty(specialty),
                limit: self.limit,
            })
            .collect();

        let batches = try_join_all(queries.iter().map(|q| self.source.search(q)))
            .await
            .inspect_err(|err| {
                tracing::error!(keys = keys.len(), error = %err, "physician aggregation aborted");
            })?;

        let fetched: usize = batches.iter().map(Vec::len).sum();
        let merged = merge_batches(batches);
        tracing::info!(
            keys = keys.len(),
            fetched,
            unique = merged.len(),
            "physician aggregation complete"
        );
        Ok(merged)
    }

    /// Single search with no location constraint.
    pub async fn national(&self, specialty: Option<&str>) -> SourceResult<Vec<Physician>> {
        let query = PhysicianQuery {
            key: None,
            specialty: normalize_specialty(specialty),
            limit: self.limit,
        };
        let found = self.source.search(&query).await?;
        Ok(merge_batches(vec![found]))
    }
}

/// Concatenates batches in the given order, keeping the first record seen
/// for each NPI.
pub fn merge_batches(batches: Vec<Vec<Physician>>) -> Vec<Physician> {
    let mut seen = HashSet::new();
    batches
        .into_iter()
        .flatten()
        .filter(|doc| seen.insert(doc.npi.clone()))
        .collect()
}

fn normalize_specialty(specialty: Option<&str>) -> Option<String> {
    specialty
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceError;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    fn doc(npi: &str, name: &str) -> Physician {
        Physician {
            npi: npi.to_string(),
            name: name.to_string(),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct Scripted {
        batches: HashMap<String, (u64, Vec<Physician>)>,
        failing: Vec<String>,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
        seen: Mutex<Vec<PhysicianQuery>>,
    }

    impl Scripted {
        fn on(mut self, city: &str, delay_ms: u64, docs: Vec<Physician>) -> Self {
            self.batches.insert(city.to_string(), (delay_ms, docs));
            self
        }

        fn failing(mut self, city: &str) -> Self {
            self.failing.push(city.to_string());
            self
        }
    }

    #[async_trait]
    impl PhysicianSource for Scripted {
        async fn search(&self, query: &PhysicianQuery) -> SourceResult<Vec<Physician>> {
            self.seen.lock().unwrap().push(query.clone());
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);

            let city = query
                .key
                .as_ref()
                .map(|k| k.city.clone())
                .unwrap_or_default();
            let (delay, docs) = self.batches.get(&city).cloned().unwrap_or_default();
            tokio::time::sleep(Duration::from_millis(delay)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if self.failing.contains(&city) {
                return Err(SourceError::Status {
                    status: 503,
                    body: "unavailable".to_string(),
                });
            }
            Ok(docs)
        }
    }

    fn keys() -> Vec<SearchKey> {
        vec![SearchKey::new("Dallas", "TX"), SearchKey::new("Houston", "TX")]
    }

    #[tokio::test(start_paused = true)]
    async fn merges_in_key_order_not_completion_order() {
        let source = Arc::new(
            Scripted::default()
                .on("Dallas", 200, vec![doc("1", "dallas-1"), doc("2", "dallas-2")])
                .on("Houston", 10, vec![doc("2", "houston-2"), doc("3", "houston-3")]),
        );
        let engine = AggregationEngine::new(source.clone(), 10);

        let merged = engine.aggregate(&keys(), None).await.unwrap();
        let npis: Vec<&str> = merged.iter().map(|d| d.npi.as_str()).collect();
        assert_eq!(npis, vec!["1", "2", "3"]);
        assert_eq!(merged[1].name, "dallas-2");
        assert_eq!(source.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn searches_run_concurrently() {
        let source = Arc::new(
            Scripted::default()
                .on("Dallas", 100, vec![doc("1", "a")])
                .on("Houston", 100, vec![doc("2", "b")])
                .on("Austin", 100, vec![doc("3", "c")]),
        );
        let engine = AggregationEngine::new(source.clone(), 10);
        let mut ks = keys();
        ks.push(SearchKey::new("Austin", "TX"));

        let started = tokio::time::Instant::now();
        engine.aggregate(&ks, None).await.unwrap();
        assert_eq!(source.peak.load(Ordering::SeqCst), 3);
        assert!(started.elapsed() < Duration::from_millis(150));
    }

    #[tokio::test]
    async fn any_failure_fails_the_whole_aggregation() {
        let source = Arc::new(
            Scripted::default()
                .on("Dallas", 0, vec![doc("1", "a")])
                .failing("Houston"),
        );
        let engine = AggregationEngine::new(source, 10);
        let err = engine.aggregate(&keys(), None).await.unwrap_err();
        assert!(matches!(err, SourceError::Status { status: 503, .. }));
    }

    #[tokio::test]
    async fn national_selection_issues_one_unlocated_search() {
        let source = Arc::new(Scripted::default());
        let engine = AggregationEngine::new(source.clone(), 25);
        engine
            .resolve(&Selection::National, Some("  Cardiology "))
            .await
            .unwrap();

        let seen = source.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].key, None);
        assert_eq!(seen[0].specialty.as_deref(), Some("Cardiology"));
        assert_eq!(seen[0].limit, 25);
    }

    #[tokio::test]
    async fn blank_specialty_is_no_constraint() {
        let source = Arc::new(Scripted::default());
        let engine = AggregationEngine::new(source.clone(), 10);
        engine.aggregate(&keys(), Some("   ")).await.unwrap();
        assert!(
            source
                .seen
                .lock()
                .unwrap()
                .iter()
                .all(|q| q.specialty.is_none())
        );
    }

    #[test]
    fn merge_never_emits_duplicate_npis() {
        let merged = merge_batches(vec![
            vec![doc("1", "a"), doc("1", "a-again")],
            vec![doc("2", "b"), doc("1", "a-late")],
            vec![],
        ]);
        let npis: Vec<&str> = merged.iter().map(|d| d.npi.as_str()).collect();
        assert_eq!(npis, vec!["1", "2"]);
        assert_eq!(merged[0].name, "a");
    }
}
