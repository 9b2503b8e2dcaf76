use std::collections::HashSet;

use crate::constants::NON_DOMESTIC_COUNTRIES;
use crate::model::{SearchKey, TrialSite};

/// Result of site selection. `National` tells the caller to issue a single
/// search with no location constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Sites(Vec<SearchKey>),
    National,
}

impl Selection {
    pub fn keys(&self) -> &[SearchKey] {
        match self {
            Selection::Sites(keys) => keys,
            Selection::National => &[],
        }
    }
}

#[derive(Debug, Clone)]
pub struct LocationSelector {
    max_sites: usize,
}

impl LocationSelector {
    pub fn new(max_sites: usize) -> Self {
        Self {
            max_sites: max_sites.max(1),
        }
    }

    pub fn select(&self, sites: &[TrialSite]) -> Selection {
        let mut seen = HashSet::new();
        let keys: Vec<SearchKey> = sites
            .iter()
            .filter(|s| is_domestic(s.country.as_deref()))
            .filter_map(|s| {
                let city = non_blank(s.city.as_deref())?;
                let region = non_blank(s.region.as_deref())?;
                Some(SearchKey::new(city, region))
            })
            .filter(|k| seen.insert(k.dedup_key()))
            .take(self.max_sites)
            .collect();

        if keys.is_empty() {
            Selection::National
        } else {
            Selection::Sites(keys)
        }
    }
}

/// A missing country is treated as domestic; free-text countries are matched
/// against the denylist by case-insensitive substring.
pub fn is_domestic(country: Option<&str>) -> bool {
    let Some(country) = country else {
        return true;
    };
    let country = country.to_lowercase();
    !NON_DOMESTIC_COUNTRIES
        .iter()
        .any(|denied| country.contains(&denied.to_lowercase()))
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}
