use async_trait::async_trait;
use futures::{StreamExt, stream};
use reqwest::Client;
use serde_json::Value;

use crate::constants::GEOCODE_CONCURRENCY;
use crate::error::{SourceError, SourceResult};
use crate::geo::{Geocoder, normalize_zip5};
use crate::http::get_json;
use crate::model::{Physician, PhysicianQuery};
use crate::source::PhysicianSource;

/// NPPES registry search restricted to individual providers (NPI-1).
pub struct NppesSource {
    client: Client,
    base_url: String,
    version: String,
    max_retries: u32,
    geocoder: Geocoder,
}

impl NppesSource {
    pub fn new(
        client: Client,
        base_url: impl Into<String>,
        version: impl Into<String>,
        max_retries: u32,
        geocoder: Geocoder,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            version: version.into(),
            max_retries,
            geocoder,
        }
    }

    fn query_params(&self, query: &PhysicianQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("version", self.version.clone()),
            ("enumeration_type", "NPI-1".to_string()),
            ("limit", query.limit.to_string()),
        ];
        match &query.key {
            Some(key) => {
                params.push(("city", key.city.clone()));
                params.push(("state", key.region.clone()));
            }
            None => {
                // Without a location the registry needs some other criterion.
                if let Some(spec) = query.specialty.as_deref().filter(|s| !s.trim().is_empty()) {
                    params.push(("taxonomy_description", spec.trim().to_string()));
                }
            }
        }
        params
    }
}

#[async_trait]
impl PhysicianSource for NppesSource {
    async fn search(&self, query: &PhysicianQuery) -> SourceResult<Vec<Physician>> {
        let params = self.query_params(query);
        let body: Value =
            match get_json(&self.client, &self.base_url, &params, self.max_retries).await {
                Ok(v) => v,
                Err(SourceError::Status { status, body }) => {
                    tracing::warn!(status, body = %body, "NPPES returned an error status; no results");
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            };

        if let Some(errors) = body.get("Errors") {
            tracing::warn!(errors = %errors, "NPPES rejected the search; no results");
            return Ok(Vec::new());
        }

        let raw_count = body
            .get("results")
            .and_then(|x| x.as_array())
            .map(Vec::len)
            .unwrap_or(0);
        let candidates = extract_physicians(&body, query.specialty.as_deref());
        tracing::info!(
            city = query.key.as_ref().map(|k| k.city.as_str()),
            state = query.key.as_ref().map(|k| k.region.as_str()),
            raw = raw_count,
            kept = candidates.len(),
            "NPPES search complete"
        );

        let physicians = stream::iter(candidates)
            .map(|mut doc| async move {
                if let Some(address) = full_address(&doc) {
                    doc.location = self.geocoder.geocode(&address).await;
                    if doc.location.is_none() {
                        tracing::debug!(npi = %doc.npi, address = %address, "physician has no coordinates");
                    }
                }
                doc
            })
            .buffered(GEOCODE_CONCURRENCY)
            .collect::<Vec<_>>()
            .await;

        Ok(physicians)
    }
}

/// Maps an NPPES response body into physicians, applying the client-side
/// specialty match. Records without a practice (LOCATION) address are skipped.
pub fn extract_physicians(body: &Value, specialty: Option<&str>) -> Vec<Physician> {
    let Some(results) = body.get("results").and_then(|x| x.as_array()) else {
        return Vec::new();
    };
    let specialty = specialty
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty());

    results
        .iter()
        .filter_map(|item| {
            let npi = value_string(item.get("number"))?;
            let taxonomies = item
                .get("taxonomies")
                .and_then(|x| x.as_array())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            if let Some(spec) = &specialty {
                let matched = taxonomies.iter().any(|t| {
                    str_field(t, "desc")
                        .map(|d| d.to_lowercase().contains(spec.as_str()))
                        .unwrap_or(false)
                });
                if !matched {
                    tracing::debug!(npi = %npi, specialty = spec.as_str(), "no taxonomy match");
                    return None;
                }
            }

            let Some(practice) = item
                .get("addresses")
                .and_then(|x| x.as_array())
                .and_then(|addrs| {
                    addrs.iter().find(|a| {
                        str_field(a, "address_purpose")
                            .map(|s| s.eq_ignore_ascii_case("LOCATION"))
                            .unwrap_or(false)
                    })
                })
            else {
                tracing::debug!(npi = %npi, "no practice address; skipping");
                return None;
            };

            let basic = item.get("basic");
            let primary = taxonomies
                .iter()
                .find(|t| t.get("primary").and_then(|x| x.as_bool()).unwrap_or(false))
                .or_else(|| taxonomies.first());
            let specialty_desc = primary
                .and_then(|t| str_field(t, "desc"))
                .or_else(|| basic.and_then(|b| str_field(b, "credential")))
                .map(str::to_string);

            let postal_code = str_field(practice, "postal_code")
                .map(|p| normalize_zip5(p).unwrap_or_else(|| p.to_string()));

            Some(Physician {
                npi,
                name: basic.map(display_name).unwrap_or_default(),
                specialty: specialty_desc,
                gender: basic
                    .and_then(|b| str_field(b, "gender"))
                    .map(str::to_string),
                address: str_field(practice, "address_1").map(str::to_string),
                city: str_field(practice, "city").map(str::to_string),
                region: str_field(practice, "state").map(str::to_string),
                postal_code,
                location: None,
                distance_km: None,
            })
        })
        .collect()
}

fn display_name(basic: &Value) -> String {
    if let Some(org) = str_field(basic, "organization_name") {
        return org.to_string();
    }
    let first = str_field(basic, "first_name").unwrap_or("");
    let last = str_field(basic, "last_name").unwrap_or("");
    format!("{first} {last}").trim().to_string()
}

fn full_address(doc: &Physician) -> Option<String> {
    let street = doc.address.as_deref()?;
    Some(format!(
        "{}, {}, {} {}",
        street,
        doc.city.as_deref().unwrap_or(""),
        doc.region.as_deref().unwrap_or(""),
        doc.postal_code.as_deref().unwrap_or("")
    ))
}

fn str_field<'a>(v: &'a Value, key: &str) -> Option<&'a str> {
    v.get(key)
        .and_then(|x| x.as_str())
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// NPPES reports `number` as either a JSON number or a string.
fn value_string(v: Option<&Value>) -> Option<String> {
    match v? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
