use std::fs::File;

use anyhow::{Context, Result, anyhow};

use crate::cli::LookupArgs;
use crate::ctgov::TrialQuery;
use crate::export::write_physicians_csv;
use crate::filter::ViewFilter;
use crate::finder::{PhysicianFinder, PhysicianView};
use crate::model::Physician;

pub async fn run(args: LookupArgs) -> Result<()> {
    let finder = PhysicianFinder::from_args(&args.client)?;

    let trial = match args.nct_id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(nct_id) => finder
            .trial(nct_id)
            .await
            .with_context(|| format!("Failed loading trial {nct_id}"))?,
        None => {
            let search = finder
                .search_trials(TrialQuery {
                    condition: args.condition.clone(),
                    city: args.city.clone(),
                    region: args.state.clone(),
                    specialty: args.specialty.clone(),
                    limit: 0,
                })
                .await
                .context("Trial search failed")?
                .ok_or_else(|| anyhow!("--condition must not be blank"))?;
            println!("Found {} trials ({} total).", search.trials.len(), search.total);
            for t in &search.trials {
                println!(
                    "  {}  [{}]  {}",
                    t.nct_id,
                    t.status.as_deref().unwrap_or("-"),
                    t.title
                );
            }
            search
                .trials
                .into_iter()
                .next()
                .ok_or_else(|| anyhow!("No trials found for {:?}", args.condition))?
        }
    };

    println!(
        "Resolving physicians for {} ({} sites)...",
        trial.nct_id,
        trial.sites.len()
    );
    let nct_id = trial.nct_id.clone();
    let found = finder
        .physicians_for(trial, args.specialty.as_deref())
        .await
        .with_context(|| format!("Failed to load physicians for {nct_id}"))?;

    if found.national {
        println!("No domestic site with city and state; searched nationally.");
    } else {
        let keys: Vec<String> = found
            .searched
            .iter()
            .map(|k| format!("{}, {}", k.city, k.region))
            .collect();
        println!("Searched sites: {}", keys.join(" | "));
    }

    let filter = ViewFilter {
        specialty: args.filter_specialty.clone(),
        city: args.filter_city.clone(),
        gender: args.filter_gender.clone(),
    };
    let radius_km = args.unit.to_km(args.radius);
    let view = PhysicianView::build(&found, &filter, radius_km);

    println!(
        "Anchor {:.4},{:.4} ({:?}); {} of {} physicians listed, {} within {:.1} km.",
        view.anchor.point.lat,
        view.anchor.point.lon,
        view.anchor.source,
        view.physicians.len(),
        view.total,
        view.in_radius.len(),
        radius_km
    );

    let listed = if args.within_radius {
        &view.in_radius
    } else {
        &view.physicians
    };
    for doc in listed {
        println!("{}", format_row(doc));
    }

    if let Some(path) = &args.csv {
        let file =
            File::create(path).with_context(|| format!("Failed creating {}", path.display()))?;
        write_physicians_csv(file, listed)?;
        println!("Wrote {}", path.display());
    }
    Ok(())
}

fn format_row(doc: &Physician) -> String {
    let distance = doc
        .distance_km
        .map(|d| format!("{d:>8.2} km"))
        .unwrap_or_else(|| "       ? km".to_string());
    format!(
        "  {}  {}  {:<32}  {:<40}  {}, {}",
        distance,
        doc.npi,
        doc.name,
        doc.specialty.as_deref().unwrap_or("-"),
        doc.city.as_deref().unwrap_or("-"),
        doc.region.as_deref().unwrap_or("-"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GeoPoint;

    #[test]
    fn row_shows_unknown_distance() {
        let doc = Physician {
            npi: "1".into(),
            name: "JANE DOE".into(),
            city: Some("DALLAS".into()),
            region: Some("TX".into()),
            ..Default::default()
        };
        let row = format_row(&doc);
        assert!(row.contains("? km"));
        assert!(row.contains("DALLAS, TX"));

        let doc = Physician {
            location: Some(GeoPoint::new(32.8, -96.79)),
            distance_km: Some(2.5),
            ..doc
        };
        assert!(format_row(&doc).contains("2.50 km"));
    }
}
