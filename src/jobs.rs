use crate::errors::AppError;
use crate::models::{AnalyticsRun, HistoryRow, ImportAccepted, ServerSlot};
use crate::progress::{render_all, JobStatus, ProgressView, ServerProgress};
use crate::state::AppState;
use crate::stats::{build_dashboard, Dashboard, ServerNames};
use crate::storage::persist_data;
use chrono::Utc;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

pub const PAGE_SIZE: usize = 1000;

/// Latest import progress per server slot, plus the views last rendered from it.
#[derive(Debug, Default)]
pub struct JobBoard {
    servers: BTreeMap<ServerSlot, ServerProgress>,
    views: Vec<ProgressView>,
}

impl JobBoard {
    pub fn is_running(&self, slot: ServerSlot) -> bool {
        self.servers
            .get(&slot)
            .is_some_and(|progress| progress.status == JobStatus::Running)
    }

    pub fn progress_mut(&mut self, slot: ServerSlot, name: &str) -> &mut ServerProgress {
        let progress = self
            .servers
            .entry(slot)
            .or_insert_with(|| ServerProgress::idle(name));
        progress.name = name.to_string();
        progress
    }

    pub fn update(&mut self, slot: ServerSlot, apply: impl FnOnce(&mut ServerProgress)) {
        if let Some(progress) = self.servers.get_mut(&slot) {
            apply(progress);
        }
    }

    pub fn remove(&mut self, slot: ServerSlot) {
        self.servers.remove(&slot);
    }

    /// One snapshot per named server; servers never imported into are idle.
    pub fn snapshot(&self, servers: &ServerNames) -> Vec<ServerProgress> {
        servers
            .iter()
            .map(|(slot, name)| match self.servers.get(slot) {
                Some(progress) => ServerProgress {
                    name: name.clone(),
                    ..progress.clone()
                },
                None => ServerProgress::idle(name.clone()),
            })
            .collect()
    }

    /// Renders the current snapshot against the previous render, so a
    /// server without a known total keeps its last fill.
    pub fn render(&mut self, servers: &ServerNames) -> Vec<ProgressView> {
        let views = render_all(&self.snapshot(servers), &self.views);
        self.views.clone_from(&views);
        views
    }
}

#[derive(Debug, Clone)]
pub struct CachedRun {
    pub run_id: u64,
    pub dashboard: Dashboard,
}

pub async fn start_import(
    state: &AppState,
    slot: ServerSlot,
    rows: Vec<HistoryRow>,
) -> Result<ImportAccepted, AppError> {
    let name = {
        let data = state.data.lock().await;
        data.server(slot)
            .map(|server| server.name.clone())
            .ok_or_else(|| AppError::unprocessable(format!("Server {slot:?} is not configured.")))?
    };

    {
        let mut jobs = state.jobs.lock().await;
        if jobs.is_running(slot) {
            return Err(AppError::conflict(format!(
                "An import for {name} is already running."
            )));
        }
        let progress = jobs.progress_mut(slot, &name);
        progress.start("Importing history", Some(rows.len() as u64));
        progress.inserted = Some(0);
        progress.skipped = Some(0);
    }

    info!(server = %name, rows = rows.len(), "starting history import");
    let accepted = ImportAccepted {
        server: slot,
        rows: rows.len(),
    };

    let task_state = state.clone();
    tokio::spawn(async move {
        import_rows(task_state, slot, name, rows).await;
    });

    Ok(accepted)
}

async fn import_rows(state: AppState, slot: ServerSlot, name: String, rows: Vec<HistoryRow>) {
    match import_pages(&state, slot, &rows).await {
        Ok((inserted, skipped)) => {
            info!(server = %name, inserted, skipped, "history import complete");
            state.jobs.lock().await.update(slot, |progress| {
                progress.succeed(format!("Imported {} rows", rows.len()));
            });
        }
        Err(err) => {
            error!(server = %name, error = %err.message, "history import failed");
            state
                .jobs
                .lock()
                .await
                .update(slot, |progress| progress.fail(err.message));
        }
    }
}

async fn import_pages(
    state: &AppState,
    slot: ServerSlot,
    rows: &[HistoryRow],
) -> Result<(u64, u64), AppError> {
    let mut inserted = 0u64;
    let mut skipped = 0u64;
    let mut fetched = 0u64;

    for (index, page) in rows.chunks(PAGE_SIZE).enumerate() {
        {
            let mut data = state.data.lock().await;
            let mut known = data.known_row_ids();
            let before = inserted;
            for row in page {
                let (Some(row_id), Some(record)) = (row.row_id, row.to_record(slot)) else {
                    continue;
                };
                if known.insert(row_id) {
                    data.records.push(record);
                    inserted += 1;
                } else {
                    skipped += 1;
                }
            }
            if inserted > before {
                persist_data(&state.data_path, &data).await?;
                // Cleared under the data lock so a concurrent run cannot cache stale output.
                state.invalidate_cache().await;
            }
        }

        fetched += page.len() as u64;
        debug!(page = index + 1, fetched, inserted, skipped, "imported history page");
        state.jobs.lock().await.update(slot, |progress| {
            progress.step = format!("Imported page {}", index + 1);
            progress.fetched = fetched;
            progress.inserted = Some(inserted);
            progress.skipped = Some(skipped);
        });
        tokio::task::yield_now().await;
    }

    Ok((inserted, skipped))
}

/// Computes the dashboard, records the run, and caches the result by run id.
pub async fn run_analytics(state: &AppState) -> Result<AnalyticsRun, AppError> {
    let mut data = state.data.lock().await;
    let mut run = AnalyticsRun::start(data.next_run_id(), Utc::now());

    if data.servers.is_empty() {
        let message = "No server configuration found";
        warn!(run = run.id, "analytics run failed: {message}");
        run.fail(message, Utc::now());
        data.push_run(run);
        persist_data(&state.data_path, &data).await?;
        return Err(AppError::unprocessable(message));
    }

    let dashboard = build_dashboard(&data);
    if let Err(err) = dashboard.charts().iter().try_for_each(|chart| chart.validate()) {
        run.fail(err.to_string(), Utc::now());
        data.push_run(run);
        persist_data(&state.data_path, &data).await?;
        return Err(err.into());
    }

    run.succeed(dashboard.summary.clone(), Utc::now());
    data.push_run(run.clone());
    persist_data(&state.data_path, &data).await?;
    *state.cache.lock().await = Some(CachedRun {
        run_id: run.id,
        dashboard,
    });

    info!(
        run = run.id,
        plays = run.total_plays.unwrap_or(0),
        users = run.total_users.unwrap_or(0),
        "analytics run complete"
    );
    Ok(run)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServerConfig;
    use crate::models::AppData;
    use std::path::PathBuf;
    use std::time::Duration;

    fn temp_path(name: &str) -> PathBuf {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("multiplex_stats_jobs_{name}_{}_{nanos}.json", std::process::id()))
    }

    fn server(slot: ServerSlot, name: &str) -> ServerConfig {
        ServerConfig {
            slot,
            name: name.to_string(),
            ip_address: "10.0.0.2:8181".to_string(),
            api_key: "0123456789abcdef".to_string(),
            use_ssl: false,
            verify_ssl: false,
        }
    }

    fn history(row_id: u64) -> HistoryRow {
        HistoryRow {
            row_id: Some(row_id),
            started: Some(Utc::now().timestamp() - 3600),
            user: Some("alice".to_string()),
            media_type: Some("movie".to_string()),
            full_title: Some(format!("Movie {row_id}")),
            grandparent_title: None,
            play_duration: Some(5400),
            duration: None,
            thumb: None,
        }
    }

    async fn wait_for_terminal(state: &AppState, slot: ServerSlot) -> ServerProgress {
        for _ in 0..200 {
            let names = state.data.lock().await.server_names();
            let snapshot = state.jobs.lock().await.snapshot(&names);
            if let Some(progress) = snapshot.into_iter().find(|p| p.status.is_terminal()) {
                return progress;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("import for {slot:?} never finished");
    }

    #[test]
    fn snapshot_lists_idle_servers() {
        let mut board = JobBoard::default();
        board.progress_mut(ServerSlot::B, "Old name").start("Importing", None);
        let names = ServerNames::from([
            (ServerSlot::A, "Apollo".to_string()),
            (ServerSlot::B, "Zeus".to_string()),
        ]);
        let snapshot = board.snapshot(&names);
        assert_eq!(snapshot[0].status, JobStatus::Idle);
        assert_eq!(snapshot[1].name, "Zeus");
        assert!(board.is_running(ServerSlot::B));
    }

    #[test]
    fn repeated_renders_hold_fill_without_total() {
        let names = ServerNames::from([(ServerSlot::A, "Apollo".to_string())]);
        let mut board = JobBoard::default();
        let progress = board.progress_mut(ServerSlot::A, "Apollo");
        progress.start("Importing history", Some(200));
        progress.fetched = 50;
        assert_eq!(board.render(&names)[0].fill_width, "25%");

        board.update(ServerSlot::A, |progress| {
            progress.total = None;
            progress.fetched = 120;
        });
        let held = board.render(&names);
        assert_eq!(held[0].fill_width, "25%");
        assert_eq!(held[0].count_text, "120");
    }

    #[tokio::test]
    async fn import_skips_known_row_ids_and_clears_cache() {
        let path = temp_path("import");
        let mut data = AppData::default();
        data.upsert_server(server(ServerSlot::A, "Apollo"));
        data.records.push(history(1).to_record(ServerSlot::A).unwrap());
        let state = AppState::new(path.clone(), data);

        run_analytics(&state).await.unwrap();
        assert!(state.cache.lock().await.is_some());

        let rows = (1..=1500).map(history).collect();
        let accepted = start_import(&state, ServerSlot::A, rows).await.unwrap();
        assert_eq!(accepted.rows, 1500);

        let progress = wait_for_terminal(&state, ServerSlot::A).await;
        assert_eq!(progress.status, JobStatus::Success);
        assert_eq!(progress.fetched, 1500);
        assert_eq!(progress.inserted, Some(1499));
        assert_eq!(progress.skipped, Some(1));
        assert_eq!(state.data.lock().await.records.len(), 1500);
        assert!(state.cache.lock().await.is_none());
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn import_requires_configured_server() {
        let state = AppState::new(temp_path("unconfigured"), AppData::default());
        let err = start_import(&state, ServerSlot::B, vec![history(1)]).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn run_without_servers_is_recorded_as_failed() {
        let path = temp_path("no_servers");
        let state = AppState::new(path.clone(), AppData::default());
        let err = run_analytics(&state).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNPROCESSABLE_ENTITY);

        let data = state.data.lock().await;
        let run = data.latest_run().unwrap();
        assert_eq!(run.status, JobStatus::Failed);
        assert_eq!(run.error_message.as_deref(), Some("No server configuration found"));
        assert!(state.cache.lock().await.is_none());
        let _ = std::fs::remove_file(&path);
    }
}
