use std::io::Write;

use anyhow::{Context, Result};
use csv::WriterBuilder;
use serde::Serialize;

use crate::model::Physician;

#[derive(Debug, Serialize)]
struct PhysicianRow<'a> {
    npi: &'a str,
    name: &'a str,
    specialty: &'a str,
    gender: &'a str,
    address: &'a str,
    city: &'a str,
    state: &'a str,
    postal_code: &'a str,
    lat: Option<f64>,
    lon: Option<f64>,
    distance_km: Option<f64>,
}

const HEADER: [&str; 11] = [
    "npi",
    "name",
    "specialty",
    "gender",
    "address",
    "city",
    "state",
    "postal_code",
    "lat",
    "lon",
    "distance_km",
];

impl<'a> From<&'a Physician> for PhysicianRow<'a> {
    fn from(doc: &'a Physician) -> Self {
        Self {
            npi: &doc.npi,
            name: &doc.name,
            specialty: doc.specialty.as_deref().unwrap_or(""),
            gender: doc.gender.as_deref().unwrap_or(""),
            address: doc.address.as_deref().unwrap_or(""),
            city: doc.city.as_deref().unwrap_or(""),
            state: doc.region.as_deref().unwrap_or(""),
            postal_code: doc.postal_code.as_deref().unwrap_or(""),
            lat: doc.location.map(|p| p.lat),
            lon: doc.location.map(|p| p.lon),
            distance_km: doc.distance_km,
        }
    }
}

/// Writes one header row and one row per physician. Fields containing the
/// delimiter, quotes or newlines are quoted.
pub fn write_physicians_csv<W: Write>(out: W, physicians: &[Physician]) -> Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_writer(out);
    writer
        .write_record(HEADER)
        .context("Failed writing physician CSV header")?;
    for doc in physicians {
        writer
            .serialize(PhysicianRow::from(doc))
            .with_context(|| format!("Failed writing physician CSV row for {}", doc.npi))?;
    }
    writer
        .flush()
        .context("Failed flushing physician CSV writer")?;
    Ok(())
}

pub fn physicians_csv_string(physicians: &[Physician]) -> Result<String> {
    let mut buf = Vec::new();
    write_physicians_csv(&mut buf, physicians)?;
    String::from_utf8(buf).context("physician CSV was not UTF-8")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;

    #[test]
    fn embedded_comma_survives_round_trip() {
        let docs = vec![Physician {
            npi: "1".into(),
            name: "A,B".into(),
            ..Default::default()
        }];
        let out = physicians_csv_string(&docs).unwrap();
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some(HEADER.join(",").as_str()));
        assert_eq!(lines.next(), Some("1,\"A,B\",,,,,,,,,"));

        let mut reader = csv::Reader::from_reader(out.as_bytes());
        let row = reader.records().next().unwrap().unwrap();
        assert_eq!(&row[1], "A,B");
    }

    #[test]
    fn quotes_and_coordinates() {
        let docs = vec![Physician {
            npi: "2".into(),
            name: "Dr. \"Q\"".into(),
            city: Some("DALLAS".into()),
            location: Some(GeoPoint::new(32.8, -96.79)),
            distance_km: Some(2.34),
            ..Default::default()
        }];
        let out = physicians_csv_string(&docs).unwrap();
        let row = out.lines().nth(1).unwrap();
        assert_eq!(row, "2,\"Dr. \"\"Q\"\"\",,,,DALLAS,,,32.8,-96.79,2.34");
    }

    #[test]
    fn empty_list_is_header_only() {
        let out = physicians_csv_string(&[]).unwrap();
        assert_eq!(out, format!("{}\n", HEADER.join(",")));
    }
}
