use reqwest::Client;
use serde::Deserialize;

use crate::http::get_json;
use crate::model::GeoPoint;

pub fn normalize_zip5(s: &str) -> Option<String> {
    let mut digits = String::with_capacity(5);
    for ch in s.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            if digits.len() == 5 {
                break;
            }
        } else if !digits.is_empty() {
            break;
        }
    }
    if digits.len() == 5 {
        Some(digits)
    } else {
        None
    }
}

#[derive(Debug, Deserialize)]
struct GeocodeResponse {
    #[serde(default)]
    results: Vec<GeocodeResult>,
}

#[derive(Debug, Deserialize)]
struct GeocodeResult {
    #[serde(default)]
    locations: Vec<GeocodeLocation>,
}

#[derive(Debug, Deserialize)]
struct GeocodeLocation {
    #[serde(rename = "latLng")]
    lat_lng: Option<LatLng>,
}

#[derive(Debug, Deserialize)]
struct LatLng {
    lat: f64,
    lng: f64,
}

/// MapQuest address geocoder. Without an API key every lookup resolves to
/// `None` and the physician simply has no coordinates.
#[derive(Clone)]
pub struct Geocoder {
    client: Client,
    url: String,
    key: Option<String>,
}

impl Geocoder {
    pub fn new(client: Client, url: impl Into<String>, key: Option<String>) -> Self {
        let key = key.filter(|k| !k.trim().is_empty());
        if key.is_none() {
            tracing::warn!("MAPQUEST_API_KEY is not set; physician geocoding is disabled");
        }
        Self {
            client,
            url: url.into(),
            key,
        }
    }

    #[cfg(test)]
    pub fn disabled(client: Client) -> Self {
        Self {
            client,
            url: String::new(),
            key: None,
        }
    }

    pub async fn geocode(&self, address: &str) -> Option<GeoPoint> {
        let key = self.key.as_ref()?;
        let query = [
            ("key", key.clone()),
            ("location", address.to_string()),
        ];
        match get_json::<GeocodeResponse>(&self.client, &self.url, &query, 0).await {
            Ok(resp) => {
                let point = point_from_response(&resp);
                if point.is_none() {
                    tracing::warn!(address, "MapQuest could not geocode address");
                }
                point
            }
            Err(err) => {
                tracing::error!(address, error = %err, "MapQuest geocode failed");
                None
            }
        }
    }
}

/// MapQuest answers (0,0) for addresses it cannot resolve.
fn point_from_response(resp: &GeocodeResponse) -> Option<GeoPoint> {
    let ll = resp
        .results
        .first()?
        .locations
        .first()?
        .lat_lng
        .as_ref()?;
    if ll.lat == 0.0 && ll.lng == 0.0 {
        return None;
    }
    GeoPoint::from_parts(Some(ll.lat), Some(ll.lng))
}
