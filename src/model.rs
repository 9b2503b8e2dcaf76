use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees.
///
/// Absence of a coordinate is always `Option<GeoPoint>::None`; there is no
/// zero placeholder.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Builds a point only when both halves are known and finite.
    pub fn from_parts(lat: Option<f64>, lon: Option<f64>) -> Option<Self> {
        match (lat, lon) {
            (Some(lat), Some(lon)) if lat.is_finite() && lon.is_finite() => Some(Self { lat, lon }),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrialSite {
    pub facility: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub location: Option<GeoPoint>,
    pub status: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Physician {
    pub npi: String,
    pub name: String,
    pub specialty: Option<String>,
    pub gender: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub postal_code: Option<String>,
    pub location: Option<GeoPoint>,
    /// Great-circle distance from the current anchor; `None` means unknown.
    pub distance_km: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub nct_id: String,
    pub title: String,
    pub status: Option<String>,
    pub summary: Option<String>,
    pub conditions: Vec<String>,
    pub sponsor: Option<String>,
    pub sites: Vec<TrialSite>,
}

/// A normalized `(city, region)` pair used to query the physician directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SearchKey {
    pub city: String,
    pub region: String,
}

impl SearchKey {
    pub fn new(city: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            city: city.into(),
            region: region.into(),
        }
    }

    pub fn dedup_key(&self) -> (String, String) {
        (self.city.to_lowercase(), self.region.to_lowercase())
    }
}

/// One request to the physician directory. `key == None` is a national query.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PhysicianQuery {
    pub key: Option<SearchKey>,
    pub specialty: Option<String>,
    pub limit: u32,
}
