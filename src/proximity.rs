use serde::{Deserialize, Serialize};

use crate::constants::{EARTH_RADIUS_KM, FALLBACK_ANCHOR_LAT, FALLBACK_ANCHOR_LON, KM_PER_MILE};
use crate::model::{GeoPoint, Physician, TrialSite};
use crate::selector::is_domestic;

/// Unit of a user-supplied radius. Unknown spellings are rejected by both
/// the CLI parser and the query-string deserializer.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum DistanceUnit {
    #[default]
    #[serde(alias = "kilometers")]
    #[value(alias = "kilometers")]
    Km,
    #[serde(alias = "mile", alias = "miles")]
    #[value(alias = "mile", alias = "miles")]
    Mi,
}

impl DistanceUnit {
    pub fn to_km(self, value: f64) -> f64 {
        match self {
            DistanceUnit::Km => value,
            DistanceUnit::Mi => value * KM_PER_MILE,
        }
    }
}

/// Haversine great-circle distance in kilometers.
pub fn haversine_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = (b.lat - a.lat).to_radians();
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Where the anchor for a trial's map came from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorSource {
    Site,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Anchor {
    pub point: GeoPoint,
    pub source: AnchorSource,
}

/// First domestic site with coordinates, otherwise the fixed fallback point.
pub fn map_anchor(sites: &[TrialSite]) -> Anchor {
    sites
        .iter()
        .filter(|s| is_domestic(s.country.as_deref()))
        .find_map(|s| s.location)
        .map(|point| Anchor {
            point,
            source: AnchorSource::Site,
        })
        .unwrap_or(Anchor {
            point: GeoPoint::new(FALLBACK_ANCHOR_LAT, FALLBACK_ANCHOR_LON),
            source: AnchorSource::Fallback,
        })
}

/// Copies `physicians` with `distance_km` filled in wherever coordinates are
/// known. Physicians without coordinates keep an unknown distance.
pub fn annotate_distance(center: GeoPoint, physicians: &[Physician]) -> Vec<Physician> {
    physicians
        .iter()
        .map(|doc| Physician {
            distance_km: doc
                .location
                .map(|p| round2(haversine_km(center, p))),
            ..doc.clone()
        })
        .collect()
}

/// Physicians provably within `radius_km` of `center`. Those without
/// coordinates are never included.
pub fn within_radius(center: GeoPoint, radius_km: f64, physicians: &[Physician]) -> Vec<Physician> {
    physicians
        .iter()
        .filter_map(|doc| {
            let dist = haversine_km(center, doc.location?);
            (dist <= radius_km).then(|| Physician {
                distance_km: Some(round2(dist)),
                ..doc.clone()
            })
        })
        .collect()
}

/// Radius for the circle overlay, in meters.
pub fn radius_indicator_meters(radius_km: f64) -> f64 {
    radius_km.max(0.0) * 1000.0
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(npi: &str, lat: Option<f64>, lon: Option<f64>) -> Physician {
        Physician {
            npi: npi.to_string(),
            location: GeoPoint::from_parts(lat, lon),
            ..Default::default()
        }
    }

    fn dallas() -> GeoPoint {
        GeoPoint::new(32.78, -96.80)
    }

    #[test]
    fn haversine_known_distances() {
        assert_eq!(haversine_km(dallas(), dallas()), 0.0);
        let nyc = GeoPoint::new(40.71, -74.00);
        let d = haversine_km(dallas(), nyc);
        assert!((2150.0..2250.0).contains(&d), "dallas-nyc was {d}");
    }

    #[test]
    fn radius_view_excludes_far_and_unlocated() {
        let docs = vec![
            at("near", Some(32.80), Some(-96.79)),
            at("nyc", Some(40.71), Some(-74.00)),
            at("unknown", None, None),
        ];
        let inside = within_radius(dallas(), 50.0, &docs);
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].npi, "near");
        let d = inside[0].distance_km.unwrap();
        assert!(d > 1.0 && d < 4.0, "near distance was {d}");

        // the list view is untouched
        assert_eq!(docs.len(), 3);
        assert!(docs.iter().all(|d| d.distance_km.is_none()));
    }

    #[test]
    fn annotate_leaves_unknown_distance_absent() {
        let docs = vec![at("near", Some(32.80), Some(-96.79)), at("unknown", None, Some(1.0))];
        let annotated = annotate_distance(dallas(), &docs);
        assert_eq!(annotated.len(), 2);
        assert!(annotated[0].distance_km.is_some());
        assert_eq!(annotated[1].distance_km, None);
    }

    #[test]
    fn anchor_prefers_first_domestic_site_with_coordinates() {
        let sites = vec![
            TrialSite {
                country: Some("France".into()),
                location: Some(GeoPoint::new(48.85, 2.35)),
                ..Default::default()
            },
            TrialSite {
                country: Some("United States".into()),
                location: None,
                ..Default::default()
            },
            TrialSite {
                country: Some("United States".into()),
                location: Some(GeoPoint::new(29.76, -95.37)),
                ..Default::default()
            },
        ];
        let anchor = map_anchor(&sites);
        assert_eq!(anchor.source, AnchorSource::Site);
        assert_eq!(anchor.point, GeoPoint::new(29.76, -95.37));
    }

    #[test]
    fn anchor_falls_back_to_fixed_point_not_zero() {
        let sites = vec![TrialSite {
            city: Some("Dallas".into()),
            region: Some("TX".into()),
            ..Default::default()
        }];
        let anchor = map_anchor(&sites);
        assert_eq!(anchor.source, AnchorSource::Fallback);
        assert_eq!(anchor.point, GeoPoint::new(39.5, -98.35));
    }

    #[test]
    fn miles_convert_at_the_boundary() {
        assert_eq!(DistanceUnit::default(), DistanceUnit::Km);
        assert!((DistanceUnit::Mi.to_km(10.0) - 16.09344).abs() < 1e-9);
        assert_eq!(DistanceUnit::Km.to_km(10.0), 10.0);
        assert_eq!(radius_indicator_meters(50.0), 50_000.0);
        assert_eq!(radius_indicator_meters(-3.0), 0.0);
    }

    #[test]
    fn unit_names_and_aliases() {
        use clap::ValueEnum;

        assert_eq!(DistanceUnit::from_str("miles", true), Ok(DistanceUnit::Mi));
        assert_eq!(DistanceUnit::from_str("KM", true), Ok(DistanceUnit::Km));
        assert!(DistanceUnit::from_str("ft", true).is_err());

        let unit: DistanceUnit = serde_json::from_str("\"mile\"").unwrap();
        assert_eq!(unit, DistanceUnit::Mi);
        assert!(serde_json::from_str::<DistanceUnit>("\"feet\"").is_err());
    }
}
