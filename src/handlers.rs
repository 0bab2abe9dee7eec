use crate::config::{AnalyticsSettings, ServerInput, ServerView};
use crate::errors::AppError;
use crate::jobs::{run_analytics, start_import};
use crate::models::{
    AnalyticsRun, DashboardResponse, ImportAccepted, ImportRequest, ProgressResponse, QuiltQuery,
    ServerSlot,
};
use crate::progress::{render_fragment, ProgressView, ServerProgress};
use crate::quilt::{build_view, PosterList, PosterTile, QuiltView, MAX_CONTAINER_SIZE};
use crate::state::AppState;
use crate::stats::top_posters;
use crate::storage::persist_data;
use crate::ui::{render_dashboard, render_index};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Html,
    Json,
};
use tracing::info;

const QUILT_POSTERS: usize = 60;

pub async fn index(State(state): State<AppState>) -> Html<String> {
    let last_run = state.data.lock().await.latest_run().cloned();
    let progress = render_fragment(&rendered_progress(&state).await);
    Html(render_index(state.renderer.theme(), last_run.as_ref(), &progress))
}

pub async fn dashboard_page(State(state): State<AppState>) -> Result<Html<String>, AppError> {
    let data = state.data.lock().await;
    let cache = state.cache.lock().await;
    let Some(cached) = cache.as_ref() else {
        return Ok(Html(render_dashboard(state.renderer.theme(), None, &[])));
    };
    let Some(run) = data.runs.iter().find(|run| run.id == cached.run_id) else {
        return Ok(Html(render_dashboard(state.renderer.theme(), None, &[])));
    };

    let charts = cached
        .dashboard
        .charts()
        .iter()
        .map(|spec| state.renderer.render_svg(spec))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Html(render_dashboard(
        state.renderer.theme(),
        Some((run, &cached.dashboard)),
        &charts,
    )))
}

pub async fn progress_fragment(State(state): State<AppState>) -> Html<String> {
    Html(render_fragment(&rendered_progress(&state).await))
}

pub async fn get_progress(State(state): State<AppState>) -> Json<ProgressResponse> {
    Json(ProgressResponse {
        servers: progress_snapshot(&state).await,
    })
}

pub async fn get_settings(State(state): State<AppState>) -> Json<AnalyticsSettings> {
    Json(state.data.lock().await.settings.clone())
}

pub async fn put_settings(
    State(state): State<AppState>,
    Json(settings): Json<AnalyticsSettings>,
) -> Result<Json<AnalyticsSettings>, AppError> {
    let errors = settings.validate();
    if !errors.is_empty() {
        return Err(AppError::bad_request(errors.join(" ")));
    }

    let mut data = state.data.lock().await;
    data.settings = settings.clone();
    persist_data(&state.data_path, &data).await?;
    state.invalidate_cache().await;

    info!(?settings, "updated analytics settings");
    Ok(Json(settings))
}

pub async fn list_servers(State(state): State<AppState>) -> Json<Vec<ServerView>> {
    let data = state.data.lock().await;
    Json(data.servers.iter().map(|server| server.masked()).collect())
}

pub async fn upsert_server(
    State(state): State<AppState>,
    Json(input): Json<ServerInput>,
) -> Result<Json<ServerView>, AppError> {
    let config = input
        .into_config()
        .map_err(|errors| AppError::bad_request(errors.join(" ")))?;

    let mut data = state.data.lock().await;
    let taken = data
        .servers
        .iter()
        .any(|server| server.slot != config.slot && server.name.eq_ignore_ascii_case(&config.name));
    if taken {
        return Err(AppError::bad_request("Server names must be unique."));
    }

    let view = config.masked();
    data.upsert_server(config);
    persist_data(&state.data_path, &data).await?;
    state.invalidate_cache().await;

    info!(slot = ?view.slot, name = %view.name, "saved server config");
    Ok(Json(view))
}

pub async fn delete_server(
    State(state): State<AppState>,
    Path(slot): Path<String>,
) -> Result<StatusCode, AppError> {
    let slot = parse_slot(&slot)?;

    let mut data = state.data.lock().await;
    if state.jobs.lock().await.is_running(slot) {
        return Err(AppError::conflict("An import for this server is still running."));
    }
    if !data.remove_server(slot) {
        return Err(AppError::not_found(format!("Server {slot:?} is not configured.")));
    }
    persist_data(&state.data_path, &data).await?;
    state.invalidate_cache().await;
    state.jobs.lock().await.remove(slot);

    info!(slot = ?slot, "removed server config");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn import_history(
    State(state): State<AppState>,
    Json(request): Json<ImportRequest>,
) -> Result<(StatusCode, Json<ImportAccepted>), AppError> {
    let slot = parse_slot(&request.server)?;
    let accepted = start_import(&state, slot, request.rows).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

pub async fn create_run(
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<AnalyticsRun>), AppError> {
    let run = run_analytics(&state).await?;
    Ok((StatusCode::CREATED, Json(run)))
}

pub async fn latest_run(State(state): State<AppState>) -> Result<Json<AnalyticsRun>, AppError> {
    let data = state.data.lock().await;
    data.latest_run()
        .cloned()
        .map(Json)
        .ok_or_else(|| AppError::not_found("No analytics run yet."))
}

pub async fn get_dashboard(
    State(state): State<AppState>,
) -> Result<Json<DashboardResponse>, AppError> {
    let data = state.data.lock().await;
    let cache = state.cache.lock().await;
    let cached = cache
        .as_ref()
        .ok_or_else(|| AppError::not_found("No cached analytics run."))?;
    let run = data
        .runs
        .iter()
        .find(|run| run.id == cached.run_id)
        .cloned()
        .ok_or_else(|| AppError::not_found("No cached analytics run."))?;

    Ok(Json(DashboardResponse {
        run,
        summary: cached.dashboard.summary.clone(),
        charts: cached.dashboard.charts(),
        history: cached.dashboard.history.clone(),
    }))
}

pub async fn get_posters(State(state): State<AppState>) -> Json<PosterList> {
    Json(PosterList {
        posters: current_posters(&state).await,
    })
}

pub async fn get_quilt(
    State(state): State<AppState>,
    Query(query): Query<QuiltQuery>,
) -> Result<Json<QuiltView>, AppError> {
    for (name, value) in [("width", query.width), ("height", query.height)] {
        if !(0.0..=MAX_CONTAINER_SIZE).contains(&value) {
            return Err(AppError::bad_request(format!(
                "{name} must be between 0 and {MAX_CONTAINER_SIZE}."
            )));
        }
    }

    let posters = current_posters(&state).await;
    Ok(Json(build_view(state.quilt.config(), &posters, query.width, query.height)))
}

async fn progress_snapshot(state: &AppState) -> Vec<ServerProgress> {
    let names = state.data.lock().await.server_names();
    state.jobs.lock().await.snapshot(&names)
}

async fn rendered_progress(state: &AppState) -> Vec<ProgressView> {
    let names = state.data.lock().await.server_names();
    state.jobs.lock().await.render(&names)
}

/// Posters loaded at startup, else the most played titles from imported history.
async fn current_posters(state: &AppState) -> Vec<PosterTile> {
    if !state.quilt.posters().is_empty() {
        return state.quilt.posters().to_vec();
    }
    let data = state.data.lock().await;
    top_posters(&data.records, &data.servers, QUILT_POSTERS)
}

fn parse_slot(value: &str) -> Result<ServerSlot, AppError> {
    ServerSlot::parse(value).ok_or_else(|| AppError::bad_request("Server slot must be 'A' or 'B'."))
}
