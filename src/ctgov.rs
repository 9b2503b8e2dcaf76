use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::SourceResult;
use crate::http::get_json;
use crate::model::{GeoPoint, Trial, TrialSite};

#[derive(Debug, Clone, Default)]
pub struct TrialQuery {
    pub condition: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub specialty: Option<String>,
    pub limit: u32,
}

impl TrialQuery {
    /// Location text for `query.locn`, e.g. "Dallas, TX".
    fn location_text(&self) -> Option<String> {
        let parts: Vec<&str> = [self.city.as_deref(), self.region.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        (!parts.is_empty()).then(|| parts.join(", "))
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct TrialSearch {
    pub total: u64,
    pub trials: Vec<Trial>,
}

#[async_trait]
pub trait TrialSource: Send + Sync {
    async fn search(&self, query: &TrialQuery) -> SourceResult<TrialSearch>;
    async fn get(&self, nct_id: &str) -> SourceResult<Trial>;
}

/// ClinicalTrials.gov v2 client.
pub struct CtGovSource {
    client: Client,
    base_url: String,
    max_retries: u32,
}

impl CtGovSource {
    pub fn new(client: Client, base_url: impl Into<String>, max_retries: u32) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            max_retries,
        }
    }
}

#[async_trait]
impl TrialSource for CtGovSource {
    async fn search(&self, query: &TrialQuery) -> SourceResult<TrialSearch> {
        let mut params = vec![
            ("query.cond", query.condition.trim().to_string()),
            ("pageSize", query.limit.max(1).to_string()),
            ("countTotal", "true".to_string()),
        ];
        if let Some(locn) = query.location_text() {
            params.push(("query.locn", locn));
        }
        if let Some(term) = query.specialty.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            params.push(("query.term", term.to_string()));
        }

        let url = format!("{}/studies", self.base_url);
        let resp: StudiesResponse = get_json(&self.client, &url, &params, self.max_retries).await?;
        let trials: Vec<Trial> = resp.studies.into_iter().map(Trial::from).collect();
        tracing::info!(
            condition = query.condition.as_str(),
            returned = trials.len(),
            total = resp.total_count,
            "ClinicalTrials.gov search complete"
        );
        Ok(TrialSearch {
            total: resp.total_count.unwrap_or(trials.len() as u64),
            trials,
        })
    }

    async fn get(&self, nct_id: &str) -> SourceResult<Trial> {
        let url = format!("{}/studies/{}", self.base_url, nct_id.trim());
        let study: Study = get_json(&self.client, &url, &[], self.max_retries).await?;
        Ok(Trial::from(study))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudiesResponse {
    #[serde(default)]
    studies: Vec<Study>,
    total_count: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Study {
    #[serde(default)]
    protocol_section: ProtocolSection,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ProtocolSection {
    identification_module: IdentificationModule,
    status_module: StatusModule,
    description_module: DescriptionModule,
    conditions_module: ConditionsModule,
    sponsor_collaborators_module: SponsorModule,
    contacts_locations_module: ContactsLocationsModule,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct IdentificationModule {
    nct_id: String,
    brief_title: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatusModule {
    overall_status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct DescriptionModule {
    brief_summary: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConditionsModule {
    conditions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct SponsorModule {
    lead_sponsor: Option<LeadSponsor>,
}

#[derive(Debug, Default, Deserialize)]
struct LeadSponsor {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ContactsLocationsModule {
    locations: Vec<StudyLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StudyLocation {
    facility: Option<String>,
    status: Option<String>,
    city: Option<String>,
    state: Option<String>,
    country: Option<String>,
    geo_point: Option<StudyGeoPoint>,
}

#[derive(Debug, Default, Deserialize)]
struct StudyGeoPoint {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl From<Study> for Trial {
    fn from(study: Study) -> Self {
        let p = study.protocol_section;
        Trial {
            nct_id: p.identification_module.nct_id,
            title: p.identification_module.brief_title,
            status: p.status_module.overall_status,
            summary: p.description_module.brief_summary,
            conditions: p.conditions_module.conditions,
            sponsor: p.sponsor_collaborators_module.lead_sponsor.and_then(|s| s.name),
            sites: p
                .contacts_locations_module
                .locations
                .into_iter()
                .map(TrialSite::from)
                .collect(),
        }
    }
}

impl From<StudyLocation> for TrialSite {
    fn from(loc: StudyLocation) -> Self {
        TrialSite {
            facility: loc.facility,
            city: loc.city,
            region: loc.state,
            country: loc.country,
            location: loc.geo_point.and_then(|g| GeoPoint::from_parts(g.lat, g.lon)),
            status: loc.status,
        }
    }
}
