use std::net::SocketAddr;

use anyhow::Context;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use crate::cli::ServeArgs;
use crate::constants::DEFAULT_RADIUS_KM;
use crate::ctgov::TrialQuery;
use crate::export::physicians_csv_string;
use crate::filter::ViewFilter;
use crate::finder::{PhysicianFinder, PhysicianView};
use crate::model::{Physician, Trial};
use crate::panel::{PanelState, Panels};
use crate::proximity::DistanceUnit;

#[derive(Clone)]
struct AppState {
    finder: PhysicianFinder,
    panels: Panels,
}

pub async fn run(opts: ServeArgs) -> anyhow::Result<()> {
    let finder = PhysicianFinder::from_args(&opts.client).context("build upstream clients")?;
    let state = AppState {
        finder,
        panels: Panels::default(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(state).layer(cors);

    let addr: SocketAddr = format!("{}:{}", opts.host, opts.port)
        .parse()
        .context("parse host:port")?;

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/api/trials", get(api_trial_search))
        .route("/api/trials/:nct_id", get(api_trial_detail))
        .route("/api/trials/:nct_id/physicians", get(api_trial_physicians))
        .route("/api/trials/:nct_id/physicians.csv", get(api_trial_physicians_csv))
        .route("/api/trials/:nct_id/panel", get(api_panel))
        .route("/api/trials/:nct_id/panel/toggle", post(api_panel_toggle))
        .route("/api/trials/:nct_id/panel/refresh", post(api_panel_refresh))
        .route("/api/physicians", get(api_physician_search))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct TrialSearchParams {
    condition: Option<String>,
    city: Option<String>,
    state: Option<String>,
    specialty: Option<String>,
    limit: Option<u32>,
}

#[derive(Debug, Serialize)]
struct TrialSearchResponse {
    condition: String,
    city: Option<String>,
    state: Option<String>,
    /// True when required input was missing and nothing was searched.
    prompt: bool,
    failed: bool,
    error: Option<String>,
    total: u64,
    trials: Vec<Trial>,
}

async fn api_trial_search(
    State(st): State<AppState>,
    Query(p): Query<TrialSearchParams>,
) -> impl IntoResponse {
    let query = TrialQuery {
        condition: p.condition.clone().unwrap_or_default(),
        city: p.city.clone(),
        region: p.state.clone(),
        specialty: p.specialty.clone(),
        limit: p.limit.unwrap_or(0),
    };
    let mut resp = TrialSearchResponse {
        condition: query.condition.clone(),
        city: p.city,
        state: p.state,
        prompt: false,
        failed: false,
        error: None,
        total: 0,
        trials: Vec::new(),
    };

    match st.finder.search_trials(query).await {
        Ok(Some(search)) => {
            resp.total = search.total;
            resp.trials = search.trials;
        }
        Ok(None) => resp.prompt = true,
        Err(e) => {
            tracing::warn!(error = %e, "trial search failed");
            resp.failed = true;
            resp.error = Some(e.to_string());
        }
    }
    Json(resp)
}

async fn api_trial_detail(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
) -> impl IntoResponse {
    match st.finder.trial(&nct_id).await {
        Ok(trial) => Json(trial).into_response(),
        Err(e) => (StatusCode::BAD_GATEWAY, e.to_string()).into_response(),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ViewParams {
    /// Condition / specialty term sent to the physician directory.
    term: Option<String>,
    /// Exact specialty to keep in the list.
    specialty: Option<String>,
    city: Option<String>,
    gender: Option<String>,
    radius: Option<f64>,
    /// Unknown units fail extraction with 400.
    unit: Option<DistanceUnit>,
}

impl ViewParams {
    fn filter(&self) -> ViewFilter {
        ViewFilter {
            specialty: self.specialty.clone(),
            city: self.city.clone(),
            gender: self.gender.clone(),
        }
    }

    fn radius_km(&self) -> f64 {
        let radius = self
            .radius
            .filter(|r| r.is_finite() && *r >= 0.0)
            .unwrap_or(DEFAULT_RADIUS_KM);
        self.unit.unwrap_or_default().to_km(radius)
    }
}

async fn trial_view(st: &AppState, nct_id: &str, p: &ViewParams) -> PhysicianView {
    let radius_km = p.radius_km();
    let trial = match st.finder.trial(nct_id).await {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!(nct_id, error = %e, "trial lookup failed");
            return PhysicianView::failed(nct_id, None, radius_km, e.to_string());
        }
    };
    match st
        .finder
        .physicians_for(trial.clone(), p.term.as_deref())
        .await
    {
        Ok(found) => PhysicianView::build(&found, &p.filter(), radius_km),
        Err(e) => PhysicianView::failed(nct_id, Some(&trial), radius_km, e.to_string()),
    }
}

async fn api_trial_physicians(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
    Query(p): Query<ViewParams>,
) -> impl IntoResponse {
    Json(trial_view(&st, &nct_id, &p).await)
}

async fn api_trial_physicians_csv(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
    Query(p): Query<ViewParams>,
) -> impl IntoResponse {
    let view = trial_view(&st, &nct_id, &p).await;
    if view.failed {
        let msg = view.error.unwrap_or_else(|| "failed to load physicians".to_string());
        return (StatusCode::BAD_GATEWAY, msg).into_response();
    }
    match physicians_csv_string(&view.physicians) {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"physicians-{nct_id}.csv\""),
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

#[derive(Debug, Serialize)]
struct PanelResponse {
    nct_id: String,
    panel: PanelState,
    view: Option<PhysicianView>,
}

fn panel_response(nct_id: String, panel: PanelState, p: &ViewParams) -> PanelResponse {
    let view = match &panel {
        PanelState::Loaded(found) => Some(PhysicianView::build(found, &p.filter(), p.radius_km())),
        _ => None,
    };
    PanelResponse {
        nct_id,
        panel,
        view,
    }
}

async fn api_panel(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
    Query(p): Query<ViewParams>,
) -> impl IntoResponse {
    let panel = st.panels.state(&nct_id).await;
    Json(panel_response(nct_id, panel, &p))
}

async fn api_panel_toggle(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
    Query(p): Query<ViewParams>,
) -> impl IntoResponse {
    let finder = st.finder.clone();
    let id = nct_id.clone();
    let term = p.term.clone();
    let panel = st
        .panels
        .toggle(&nct_id, move || async move {
            finder.physicians_for_id(&id, term.as_deref()).await
        })
        .await;
    Json(panel_response(nct_id, panel, &p))
}

async fn api_panel_refresh(
    State(st): State<AppState>,
    AxumPath(nct_id): AxumPath<String>,
    Query(p): Query<ViewParams>,
) -> impl IntoResponse {
    let finder = st.finder.clone();
    let id = nct_id.clone();
    let term = p.term.clone();
    let panel = st
        .panels
        .refresh(&nct_id, move || async move {
            finder.physicians_for_id(&id, term.as_deref()).await
        })
        .await;
    Json(panel_response(nct_id, panel, &p))
}

#[derive(Debug, Deserialize)]
struct PhysicianSearchParams {
    city: Option<String>,
    state: Option<String>,
    specialty: Option<String>,
}

#[derive(Debug, Serialize)]
struct PhysicianSearchResponse {
    count: usize,
    failed: bool,
    error: Option<String>,
    results: Vec<Physician>,
}

async fn api_physician_search(
    State(st): State<AppState>,
    Query(p): Query<PhysicianSearchParams>,
) -> impl IntoResponse {
    let resp = match st
        .finder
        .search_physicians(
            p.city.as_deref(),
            p.state.as_deref(),
            p.specialty.as_deref(),
        )
        .await
    {
        Ok(results) => PhysicianSearchResponse {
            count: results.len(),
            failed: false,
            error: None,
            results,
        },
        Err(e) => {
            tracing::warn!(error = %e, "physician search failed");
            PhysicianSearchResponse {
                count: 0,
                failed: true,
                error: Some(e.to_string()),
                results: Vec::new(),
            }
        }
    };
    Json(resp)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn radius_defaults_and_converts_miles() {
        assert_eq!(ViewParams::default().radius_km(), DEFAULT_RADIUS_KM);
        let p = ViewParams {
            radius: Some(10.0),
            unit: Some(DistanceUnit::Mi),
            ..Default::default()
        };
        assert!((p.radius_km() - 16.09344).abs() < 1e-9);
        let p = ViewParams {
            radius: Some(-5.0),
            ..Default::default()
        };
        assert_eq!(p.radius_km(), DEFAULT_RADIUS_KM);
    }

    #[test]
    fn view_params_reject_unknown_units() {
        let uri: axum::http::Uri = "/api/trials/NCT1/physicians?radius=10&unit=miles".parse().unwrap();
        let Query(p) = Query::<ViewParams>::try_from_uri(&uri).unwrap();
        assert_eq!(p.unit, Some(DistanceUnit::Mi));

        let uri: axum::http::Uri = "/api/trials/NCT1/physicians?radius=10&unit=feet".parse().unwrap();
        assert!(Query::<ViewParams>::try_from_uri(&uri).is_err());
    }

    #[test]
    fn panel_response_renders_view_only_when_loaded() {
        let resp = panel_response("NCT1".into(), PanelState::Loading, &ViewParams::default());
        assert!(resp.view.is_none());

        let found = crate::finder::TrialPhysicians {
            trial: crate::finder::testing::dallas_trial(),
            searched: Vec::new(),
            national: false,
            physicians: vec![crate::finder::testing::doc("1", "DALLAS", Some((32.80, -96.79)))],
        };
        let resp = panel_response(
            "NCT1".into(),
            PanelState::Loaded(Box::new(found)),
            &ViewParams::default(),
        );
        let view = resp.view.unwrap();
        assert_eq!(view.in_radius.len(), 1);
        let json = serde_json::to_value(&resp.panel).unwrap();
        assert_eq!(json["state"], "loaded");
    }
}
