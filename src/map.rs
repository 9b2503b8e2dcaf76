use serde::Serialize;

use crate::model::{GeoPoint, Physician, TrialSite};
use crate::proximity::{Anchor, radius_indicator_meters};
use crate::selector::is_domestic;

#[derive(Debug, Clone, Serialize)]
pub struct SiteMarker {
    pub point: GeoPoint,
    pub facility: Option<String>,
    pub city: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PhysicianMarker {
    pub point: GeoPoint,
    pub npi: String,
    pub name: String,
    pub in_radius: bool,
}

/// Everything a map renderer needs: no data decisions are left to it.
#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub center: Anchor,
    pub radius_km: f64,
    pub radius_meters: f64,
    pub sites: Vec<SiteMarker>,
    pub physicians: Vec<PhysicianMarker>,
}

impl MapView {
    pub fn build(
        center: Anchor,
        radius_km: f64,
        sites: &[TrialSite],
        physicians: &[Physician],
        in_radius: &[Physician],
    ) -> Self {
        let sites = sites
            .iter()
            .filter(|s| is_domestic(s.country.as_deref()))
            .filter_map(|s| {
                Some(SiteMarker {
                    point: s.location?,
                    facility: s.facility.clone(),
                    city: s.city.clone(),
                })
            })
            .collect();

        let physicians = physicians
            .iter()
            .filter_map(|doc| {
                Some(PhysicianMarker {
                    point: doc.location?,
                    npi: doc.npi.clone(),
                    name: doc.name.clone(),
                    in_radius: in_radius.iter().any(|r| r.npi == doc.npi),
                })
            })
            .collect();

        Self {
            center,
            radius_km,
            radius_meters: radius_indicator_meters(radius_km),
            sites,
            physicians,
        }
    }
}
