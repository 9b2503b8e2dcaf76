use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::error::SourceResult;
use crate::finder::TrialPhysicians;

/// Lifecycle of one trial's physician panel.
///
/// `Idle -> Loading -> Loaded | Failed`; toggling off from any other state
/// returns to `Idle`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PanelState {
    #[default]
    Idle,
    Loading,
    Loaded(Box<TrialPhysicians>),
    Failed { error: String },
}

#[derive(Debug)]
struct Panel {
    state: PanelState,
    generation: u64,
}

impl Panel {
    fn loading(generation: u64) -> Self {
        Self {
            state: PanelState::Loading,
            generation,
        }
    }

    /// Applies a finished fetch. Stale generations are dropped; returns
    /// whether the result was applied.
    fn complete(&mut self, generation: u64, result: SourceResult<TrialPhysicians>) -> bool {
        if generation != self.generation || !matches!(self.state, PanelState::Loading) {
            return false;
        }
        self.state = match result {
            Ok(found) => PanelState::Loaded(Box::new(found)),
            Err(err) => PanelState::Failed {
                error: err.to_string(),
            },
        };
        true
    }
}

/// Open panels only; an absent entry is `Idle`. Generations are unique
/// across all trials, so a fetch started before an entry was dropped can
/// never match a later entry for the same trial.
#[derive(Debug, Default)]
struct PanelTable {
    panels: HashMap<String, Panel>,
    generation: u64,
}

impl PanelTable {
    fn state(&self, nct_id: &str) -> PanelState {
        self.panels
            .get(nct_id)
            .map(|p| p.state.clone())
            .unwrap_or_default()
    }

    /// Returns the generation of the fetch to start when toggling on, `None`
    /// when toggling off. Toggling off forgets the panel, which invalidates
    /// any in-flight fetch.
    fn toggle(&mut self, nct_id: &str) -> Option<u64> {
        if self.panels.remove(nct_id).is_some() {
            return None;
        }
        Some(self.start(nct_id))
    }

    /// Starts a fresh fetch, replacing whatever was shown or in flight.
    fn start(&mut self, nct_id: &str) -> u64 {
        self.generation += 1;
        self.panels
            .insert(nct_id.to_string(), Panel::loading(self.generation));
        self.generation
    }

    fn complete(
        &mut self,
        nct_id: &str,
        generation: u64,
        result: SourceResult<TrialPhysicians>,
    ) -> bool {
        self.panels
            .get_mut(nct_id)
            .is_some_and(|p| p.complete(generation, result))
    }
}

/// Panels keyed by trial id. Fetches run as background tasks and report back
/// under the generation they were started with.
#[derive(Clone, Default)]
pub struct Panels {
    inner: Arc<Mutex<PanelTable>>,
}

impl Panels {
    pub async fn state(&self, nct_id: &str) -> PanelState {
        self.inner.lock().await.state(nct_id)
    }

    pub async fn toggle<F, Fut>(&self, nct_id: &str, fetch: F) -> PanelState
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SourceResult<TrialPhysicians>> + Send + 'static,
    {
        let mut table = self.inner.lock().await;
        if let Some(generation) = table.toggle(nct_id) {
            self.spawn_fetch(nct_id, generation, fetch());
        }
        table.state(nct_id)
    }

    /// Re-fetch regardless of the current state.
    pub async fn refresh<F, Fut>(&self, nct_id: &str, fetch: F) -> PanelState
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SourceResult<TrialPhysicians>> + Send + 'static,
    {
        let mut table = self.inner.lock().await;
        let generation = table.start(nct_id);
        self.spawn_fetch(nct_id, generation, fetch());
        table.state(nct_id)
    }

    fn spawn_fetch<Fut>(&self, nct_id: &str, generation: u64, fut: Fut)
    where
        Fut: Future<Output = SourceResult<TrialPhysicians>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        let nct_id = nct_id.to_string();
        tokio::spawn(async move {
            let result = fut.await;
            if !inner.lock().await.complete(&nct_id, generation, result) {
                tracing::debug!(nct_id = %nct_id, generation, "discarding stale physician fetch");
            }
        });
    }
}
