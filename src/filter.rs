use std::collections::BTreeSet;

use serde::Deserialize;

use crate::model::Physician;

/// User refinements over an aggregated physician list. Blank fields are no
/// constraint; set fields combine with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewFilter {
    pub specialty: Option<String>,
    pub city: Option<String>,
    pub gender: Option<String>,
}

impl ViewFilter {
    pub fn apply(&self, physicians: &[Physician]) -> Vec<Physician> {
        let specialty = active(self.specialty.as_deref());
        let city = active(self.city.as_deref()).map(str::to_lowercase);
        let gender = active(self.gender.as_deref());

        physicians
            .iter()
            .filter(|doc| {
                specialty.is_none_or(|want| doc.specialty.as_deref() == Some(want))
            })
            .filter(|doc| {
                city.as_deref().is_none_or(|want| {
                    doc.city
                        .as_deref()
                        .map(|c| c.to_lowercase().contains(want))
                        .unwrap_or(false)
                })
            })
            .filter(|doc| gender.is_none_or(|want| doc.gender.as_deref() == Some(want)))
            .cloned()
            .collect()
    }
}

/// Distinct non-empty specialties, for the specialty picker.
pub fn specialties(physicians: &[Physician]) -> Vec<String> {
    physicians
        .iter()
        .filter_map(|doc| active(doc.specialty.as_deref()))
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

fn active(s: Option<&str>) -> Option<&str> {
    s.filter(|s| !s.trim().is_empty())
}
