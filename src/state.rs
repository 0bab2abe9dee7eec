use crate::chart::{ChartRenderer, Theme};
use crate::jobs::{CachedRun, JobBoard};
use crate::models::AppData;
use crate::quilt::{HeroQuilt, QuiltConfig};
use std::{path::PathBuf, sync::Arc};
use tokio::sync::Mutex;
use tracing::debug;

/// Lock order when more than one is held: `data`, then `jobs` or `cache`.
#[derive(Clone)]
pub struct AppState {
    pub data_path: PathBuf,
    pub data: Arc<Mutex<AppData>>,
    pub jobs: Arc<Mutex<JobBoard>>,
    pub cache: Arc<Mutex<Option<CachedRun>>>,
    pub renderer: Arc<ChartRenderer>,
    pub quilt: Arc<HeroQuilt>,
}

impl AppState {
    pub fn new(data_path: PathBuf, data: AppData) -> Self {
        Self::with_quilt(data_path, data, HeroQuilt::new(QuiltConfig::default()))
    }

    pub fn with_quilt(data_path: PathBuf, data: AppData, quilt: HeroQuilt) -> Self {
        Self {
            data_path,
            data: Arc::new(Mutex::new(data)),
            jobs: Arc::new(Mutex::new(JobBoard::default())),
            cache: Arc::new(Mutex::new(None)),
            renderer: Arc::new(ChartRenderer::new(Theme::default())),
            quilt: Arc::new(quilt),
        }
    }

    pub async fn invalidate_cache(&self) {
        if let Some(cached) = self.cache.lock().await.take() {
            debug!(run = cached.run_id, "dropped cached dashboard");
        }
    }
}
