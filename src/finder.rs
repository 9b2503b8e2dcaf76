use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::aggregate::AggregationEngine;
use crate::cache::CachedSource;
use crate::cli::ClientArgs;
use crate::ctgov::{CtGovSource, TrialQuery, TrialSearch, TrialSource};
use crate::error::SourceResult;
use crate::filter::{ViewFilter, specialties};
use crate::geo::Geocoder;
use crate::http::build_client;
use crate::map::MapView;
use crate::model::{Physician, SearchKey, Trial};
use crate::nppes::NppesSource;
use crate::proximity::{
    Anchor, annotate_distance, map_anchor, radius_indicator_meters, within_radius,
};
use crate::selector::{LocationSelector, Selection};
use crate::source::PhysicianSource;

/// A trial together with the physicians aggregated for its sites.
#[derive(Debug, Clone, Serialize)]
pub struct TrialPhysicians {
    pub trial: Trial,
    pub searched: Vec<SearchKey>,
    pub national: bool,
    pub physicians: Vec<Physician>,
}

/// Filtered, distance-annotated rendering of a `TrialPhysicians`.
#[derive(Debug, Clone, Serialize)]
pub struct PhysicianView {
    pub nct_id: String,
    pub anchor: Anchor,
    pub radius_km: f64,
    pub radius_meters: f64,
    pub total: usize,
    pub physicians: Vec<Physician>,
    pub in_radius: Vec<Physician>,
    pub specialties: Vec<String>,
    pub map: MapView,
    pub failed: bool,
    pub error: Option<String>,
}

impl PhysicianView {
    pub fn build(found: &TrialPhysicians, filter: &ViewFilter, radius_km: f64) -> Self {
        let anchor = map_anchor(&found.trial.sites);
        let filtered = filter.apply(&found.physicians);
        let listed = annotate_distance(anchor.point, &filtered);
        let in_radius = within_radius(anchor.point, radius_km, &filtered);
        let map = MapView::build(anchor, radius_km, &found.trial.sites, &listed, &in_radius);

        Self {
            nct_id: found.trial.nct_id.clone(),
            anchor,
            radius_km,
            radius_meters: radius_indicator_meters(radius_km),
            total: found.physicians.len(),
            specialties: specialties(&found.physicians),
            physicians: listed,
            in_radius,
            map,
            failed: false,
            error: None,
        }
    }

    /// Empty view flagged as failed; the anchor still comes from the trial when known.
    pub fn failed(nct_id: &str, trial: Option<&Trial>, radius_km: f64, error: String) -> Self {
        let sites = trial.map(|t| t.sites.as_slice()).unwrap_or(&[]);
        let anchor = map_anchor(sites);
        Self {
            nct_id: nct_id.to_string(),
            anchor,
            radius_km,
            radius_meters: radius_indicator_meters(radius_km),
            total: 0,
            physicians: Vec::new(),
            in_radius: Vec::new(),
            specialties: Vec::new(),
            map: MapView::build(anchor, radius_km, sites, &[], &[]),
            failed: true,
            error: Some(error),
        }
    }
}

#[derive(Clone)]
pub struct PhysicianFinder {
    trials: Arc<dyn TrialSource>,
    engine: AggregationEngine,
    selector: LocationSelector,
    trial_limit: u32,
}

impl PhysicianFinder {
    pub fn new(
        trials: Arc<dyn TrialSource>,
        engine: AggregationEngine,
        selector: LocationSelector,
        trial_limit: u32,
    ) -> Self {
        Self {
            trials,
            engine,
            selector,
            trial_limit,
        }
    }

    /// Wires the live NPPES, MapQuest and ClinicalTrials.gov clients.
    pub fn from_args(args: &ClientArgs) -> anyhow::Result<Self> {
        let client = build_client(Duration::from_secs(args.timeout_secs.max(1)))?;
        let geocoder = Geocoder::new(
            client.clone(),
            &args.mapquest_url,
            args.mapquest_key.clone(),
        );
        let nppes = NppesSource::new(
            client.clone(),
            &args.nppes_base_url,
            &args.nppes_version,
            args.max_retries,
            geocoder,
        );
        let directory: Arc<dyn PhysicianSource> = Arc::new(CachedSource::new(
            nppes,
            Duration::from_secs(args.cache_ttl_secs),
        ));
        let trials = Arc::new(CtGovSource::new(
            client,
            &args.ctgov_base_url,
            args.max_retries,
        ));

        Ok(Self::new(
            trials,
            AggregationEngine::new(directory, args.physician_limit),
            LocationSelector::new(args.max_sites),
            args.trial_limit,
        ))
    }

    /// `Ok(None)` when the condition is blank: nothing is sent upstream.
    pub async fn search_trials(&self, mut query: TrialQuery) -> SourceResult<Option<TrialSearch>> {
        if query.condition.trim().is_empty() {
            return Ok(None);
        }
        if query.limit == 0 {
            query.limit = self.trial_limit;
        }
        self.trials.search(&query).await.map(Some)
    }

    pub async fn trial(&self, nct_id: &str) -> SourceResult<Trial> {
        self.trials.get(nct_id).await
    }

    pub async fn physicians_for(
        &self,
        trial: Trial,
        specialty: Option<&str>,
    ) -> SourceResult<TrialPhysicians> {
        let selection = self.selector.select(&trial.sites);
        let physicians = self.engine.resolve(&selection, specialty).await?;
        Ok(TrialPhysicians {
            national: selection == Selection::National,
            searched: selection.keys().to_vec(),
            trial,
            physicians,
        })
    }

    pub async fn physicians_for_id(
        &self,
        nct_id: &str,
        specialty: Option<&str>,
    ) -> SourceResult<TrialPhysicians> {
        let trial = self.trial(nct_id).await?;
        self.physicians_for(trial, specialty).await
    }

    /// Direct directory search; a missing city or region means a national search.
    pub async fn search_physicians(
        &self,
        city: Option<&str>,
        region: Option<&str>,
        specialty: Option<&str>,
    ) -> SourceResult<Vec<Physician>> {
        let city = city.map(str::trim).filter(|s| !s.is_empty());
        let region = region.map(str::trim).filter(|s| !s.is_empty());
        match (city, region) {
            (Some(city), Some(region)) => {
                self.engine
                    .aggregate(&[SearchKey::new(city, region)], specialty)
                    .await
            }
            _ => self.engine.national(specialty).await,
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use crate::error::SourceError;
    use crate::model::{GeoPoint, PhysicianQuery, TrialSite};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;

    pub fn site(city: &str, region: &str, country: &str, loc: Option<(f64, f64)>) -> TrialSite {
        TrialSite {
            city: Some(city.to_string()),
            region: Some(region.to_string()),
            country: Some(country.to_string()),
            location: loc.map(|(lat, lon)| GeoPoint::new(lat, lon)),
            ..Default::default()
        }
    }

    pub fn doc(npi: &str, city: &str, loc: Option<(f64, f64)>) -> Physician {
        Physician {
            npi: npi.to_string(),
            name: format!("Doc {npi}"),
            city: Some(city.to_string()),
            specialty: Some("Endocrinology".to_string()),
            location: loc.map(|(lat, lon)| GeoPoint::new(lat, lon)),
            ..Default::default()
        }
    }

    pub fn dallas_trial() -> Trial {
        Trial {
            nct_id: "NCT00000001".to_string(),
            title: "Diabetes study".to_string(),
            sites: vec![
                site("Dallas", "TX", "United States", Some((32.78, -96.80))),
                site("Houston", "TX", "United States", None),
                site("Paris", "", "France", Some((48.85, 2.35))),
            ],
            ..Default::default()
        }
    }

    #[derive(Default)]
    pub struct FakeDirectory {
        pub by_city: HashMap<String, Vec<Physician>>,
        pub national: Vec<Physician>,
        pub fail: bool,
        pub calls: Mutex<Vec<PhysicianQuery>>,
    }

    #[async_trait]
    impl PhysicianSource for FakeDirectory {
        async fn search(&self, query: &PhysicianQuery) -> SourceResult<Vec<Physician>> {
            self.calls.lock().unwrap().push(query.clone());
            if self.fail {
                return Err(SourceError::Network("connection refused".to_string()));
            }
            Ok(match &query.key {
                Some(key) => self.by_city.get(&key.city).cloned().unwrap_or_default(),
                None => self.national.clone(),
            })
        }
    }

    #[derive(Default)]
    pub struct FakeRegistry {
        pub trials: Vec<Trial>,
        pub searches: Mutex<usize>,
    }

    #[async_trait]
    impl TrialSource for FakeRegistry {
        async fn search(&self, _query: &TrialQuery) -> SourceResult<TrialSearch> {
            *self.searches.lock().unwrap() += 1;
            Ok(TrialSearch {
                total: self.trials.len() as u64,
                trials: self.trials.clone(),
            })
        }

        async fn get(&self, nct_id: &str) -> SourceResult<Trial> {
            self.trials
                .iter()
                .find(|t| t.nct_id == nct_id)
                .cloned()
                .ok_or_else(|| SourceError::Status {
                    status: 404,
                    body: format!("{nct_id} not found"),
                })
        }
    }

    pub fn dallas_directory() -> FakeDirectory {
        let mut by_city = HashMap::new();
        by_city.insert(
            "Dallas".to_string(),
            vec![
                doc("1", "DALLAS", Some((32.80, -96.79))),
                doc("2", "DALLAS", None),
            ],
        );
        by_city.insert(
            "Houston".to_string(),
            vec![
                doc("2", "HOUSTON", Some((29.76, -95.37))),
                doc("3", "NEW YORK", Some((40.71, -74.00))),
            ],
        );
        FakeDirectory {
            by_city,
            ..Default::default()
        }
    }

    pub fn finder(directory: Arc<FakeDirectory>, trials: Vec<Trial>) -> PhysicianFinder {
        PhysicianFinder::new(
            Arc::new(FakeRegistry {
                trials,
                ..Default::default()
            }),
            AggregationEngine::new(directory, 10),
            LocationSelector::new(3),
            20,
        )
    }
}
