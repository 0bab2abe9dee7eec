//! Hero poster quilt: a tiled mosaic that always overflows its container.

use crate::errors::FetchError;
use crate::format::escape_html;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub const MIN_TILE_HEIGHT: f64 = 60.0;
pub const POSTER_ASPECT: f64 = 2.0 / 3.0;
/// Largest container edge, in pixels, a layout is computed for.
pub const MAX_CONTAINER_SIZE: f64 = 16_384.0;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PosterTile {
    pub poster_url: String,
    #[serde(default)]
    pub title: Option<String>,
}

impl PosterTile {
    pub fn is_usable(&self) -> bool {
        !self.poster_url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosterList {
    pub posters: Vec<PosterTile>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuiltConfig {
    pub rows: u32,
    pub gap: f64,
    pub min_height: f64,
    pub overflow_columns: u32,
    pub resize_delay: Duration,
}

impl Default for QuiltConfig {
    fn default() -> Self {
        Self {
            rows: 3,
            gap: 10.0,
            min_height: 420.0,
            overflow_columns: 3,
            resize_delay: Duration::from_millis(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QuiltLayout {
    pub rows: u32,
    pub columns: u32,
    pub tile_width: f64,
    pub tile_height: f64,
    pub gap: f64,
    pub tile_count: usize,
}

pub fn compute_layout(config: &QuiltConfig, width: f64, height: f64) -> QuiltLayout {
    let rows = config.rows.max(1);
    let gap = config.gap.max(0.0);
    let width = if width.is_finite() {
        width.clamp(0.0, MAX_CONTAINER_SIZE)
    } else {
        0.0
    };
    let height = if height.is_finite() {
        height.clamp(config.min_height, MAX_CONTAINER_SIZE.max(config.min_height))
    } else {
        config.min_height
    };

    let tile_height = ((height - gap * f64::from(rows - 1)) / f64::from(rows)).max(MIN_TILE_HEIGHT);
    let tile_width = (tile_height * POSTER_ASPECT).round();

    // Overflow columns hide the trailing edge during resize; the floor keeps
    // the grid wider than the container even when gaps are large.
    let visible = (width / (tile_width + gap)).ceil() as u32;
    let floor = (width / tile_width).ceil() as u32;
    let columns = visible.saturating_add(config.overflow_columns).max(floor);

    QuiltLayout {
        rows,
        columns,
        tile_width,
        tile_height,
        gap,
        tile_count: columns as usize * rows as usize,
    }
}

/// Assigns posters to tiles by index modulo the usable poster count.
pub fn fill_tiles(posters: &[PosterTile], tile_count: usize) -> Vec<PosterTile> {
    let usable: Vec<&PosterTile> = posters.iter().filter(|poster| poster.is_usable()).collect();
    if usable.is_empty() {
        return Vec::new();
    }
    (0..tile_count)
        .map(|index| usable[index % usable.len()].clone())
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QuiltView {
    pub layout: QuiltLayout,
    pub tiles: Vec<TileView>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TileView {
    pub index: usize,
    pub row: u32,
    pub column: u32,
    pub x: f64,
    pub y: f64,
    pub poster_url: String,
    pub title: Option<String>,
}

pub fn build_view(config: &QuiltConfig, posters: &[PosterTile], width: f64, height: f64) -> QuiltView {
    let layout = compute_layout(config, width, height);
    let columns = layout.columns.max(1) as usize;
    let tiles = fill_tiles(posters, layout.tile_count)
        .into_iter()
        .enumerate()
        .map(|(index, poster)| {
            let row = (index / columns) as u32;
            let column = (index % columns) as u32;
            TileView {
                index,
                row,
                column,
                x: f64::from(column) * (layout.tile_width + layout.gap),
                y: f64::from(row) * (layout.tile_height + layout.gap),
                poster_url: poster.poster_url,
                title: poster.title,
            }
        })
        .collect();

    QuiltView { layout, tiles }
}

impl QuiltView {
    pub fn to_html(&self) -> String {
        let layout = &self.layout;
        let mut html = format!(
            r#"<div class="quilt-grid" data-rows="{}" data-columns="{}">"#,
            layout.rows, layout.columns
        );
        for tile in &self.tiles {
            let title = tile.title.as_deref().unwrap_or("");
            let _ = write!(
                html,
                r#"<img class="quilt-tile" src="{}" alt="{}" loading="lazy" style="left:{:.0}px;top:{:.0}px;width:{:.0}px;height:{:.0}px">"#,
                escape_html(&tile.poster_url),
                escape_html(title),
                tile.x,
                tile.y,
                layout.tile_width,
                layout.tile_height,
            );
        }
        html.push_str("</div>");
        html
    }
}

/// One-shot client for a `{posters: [...]}` endpoint.
#[derive(Debug, Clone)]
pub struct PosterClient {
    http: reqwest::Client,
    url: String,
}

impl PosterClient {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn fetch(&self) -> Result<Vec<PosterTile>, FetchError> {
        let request_error = |source| FetchError::Request {
            url: self.url.clone(),
            source,
        };

        let response = self.http.get(&self.url).send().await.map_err(request_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: self.url.clone(),
                status: status.as_u16(),
            });
        }

        let list: PosterList = response.json().await.map_err(request_error)?;
        Ok(list.posters)
    }
}

#[derive(Debug, Clone)]
pub struct HeroQuilt {
    config: QuiltConfig,
    posters: Vec<PosterTile>,
}

impl HeroQuilt {
    pub fn new(config: QuiltConfig) -> Self {
        Self::with_posters(config, Vec::new())
    }

    pub fn with_posters(config: QuiltConfig, posters: Vec<PosterTile>) -> Self {
        Self { config, posters }
    }

    /// Fetches posters once. Failures are logged and leave the quilt empty.
    pub async fn load(config: QuiltConfig, client: &PosterClient) -> Self {
        match client.fetch().await {
            Ok(posters) => {
                info!(url = client.url(), posters = posters.len(), "loaded hero posters");
                Self::with_posters(config, posters)
            }
            Err(err) => {
                warn!(url = client.url(), error = %err, "failed to load hero posters");
                Self::new(config)
            }
        }
    }

    pub fn config(&self) -> &QuiltConfig {
        &self.config
    }

    pub fn posters(&self) -> &[PosterTile] {
        &self.posters
    }

    pub fn layout(&self, width: f64, height: f64) -> QuiltView {
        build_view(&self.config, &self.posters, width, height)
    }
}

/// Runs at most one delayed task; scheduling a new one aborts the pending one.
#[derive(Debug)]
pub struct Debouncer {
    delay: Duration,
    pending: Option<JoinHandle<()>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
        }
    }

    pub fn schedule<F>(&mut self, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let delay = self.delay;
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        }));
    }

    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// A quilt bound to one container; resizes are coalesced before relayout.
pub struct QuiltSession {
    quilt: Arc<HeroQuilt>,
    debouncer: Debouncer,
    view_tx: watch::Sender<Option<QuiltView>>,
}

impl QuiltSession {
    pub fn new(quilt: HeroQuilt) -> Self {
        let (view_tx, _) = watch::channel(None);
        Self {
            debouncer: Debouncer::new(quilt.config().resize_delay),
            quilt: Arc::new(quilt),
            view_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<QuiltView>> {
        self.view_tx.subscribe()
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        let quilt = Arc::clone(&self.quilt);
        let view_tx = self.view_tx.clone();
        self.debouncer.schedule(async move {
            let view = quilt.layout(width, height);
            debug!(
                width,
                height,
                columns = view.layout.columns,
                tiles = view.tiles.len(),
                "recomputed quilt layout"
            );
            view_tx.send_replace(Some(view));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn posters(urls: &[&str]) -> Vec<PosterTile> {
        urls.iter()
            .map(|url| PosterTile {
                poster_url: url.to_string(),
                title: None,
            })
            .collect()
    }

    #[test]
    fn layout_follows_tile_formula() {
        let config = QuiltConfig {
            rows: 3,
            gap: 10.0,
            min_height: 420.0,
            overflow_columns: 3,
            resize_delay: Duration::from_millis(120),
        };
        let layout = compute_layout(&config, 1280.0, 640.0);
        assert_eq!(layout.tile_height, (640.0 - 20.0) / 3.0);
        assert_eq!(layout.tile_width, 138.0);
        assert_eq!(layout.columns, (1280.0_f64 / 148.0).ceil() as u32 + 3);
        assert_eq!(layout.tile_count, layout.columns as usize * 3);
    }

    #[test]
    fn layout_respects_minimum_height_and_tile_floor() {
        let config = QuiltConfig::default();
        let short = compute_layout(&config, 800.0, 100.0);
        assert_eq!(short.tile_height, (420.0 - 20.0) / 3.0);

        let tiny = QuiltConfig {
            rows: 12,
            min_height: 0.0,
            ..QuiltConfig::default()
        };
        let layout = compute_layout(&tiny, 800.0, 200.0);
        assert_eq!(layout.tile_height, MIN_TILE_HEIGHT);
        assert_eq!(layout.tile_width, 40.0);
    }

    #[test]
    fn grid_always_overflows_container() {
        let config = QuiltConfig {
            gap: 40.0,
            ..QuiltConfig::default()
        };
        for width in [420.0, 800.0, 1366.0, 1920.0, 3840.0, 7680.0] {
            for height in [420.0, 600.0, 900.0, 1440.0] {
                let layout = compute_layout(&config, width, height);
                assert_eq!(layout.columns as usize * layout.rows as usize, layout.tile_count);
                let needed = width / layout.tile_width * f64::from(layout.rows);
                assert!(
                    layout.tile_count as f64 >= needed,
                    "{width}x{height} under-fills: {} < {needed}",
                    layout.tile_count
                );
            }
        }
    }

    #[test]
    fn oversized_and_non_finite_containers_stay_bounded() {
        let config = QuiltConfig::default();
        let capped = compute_layout(&config, MAX_CONTAINER_SIZE, 600.0);
        for width in [1e12, f64::MAX, f64::INFINITY] {
            assert_eq!(compute_layout(&config, width, 600.0), capped);
        }

        let tall = compute_layout(&config, 800.0, 1e12);
        assert_eq!(tall, compute_layout(&config, 800.0, MAX_CONTAINER_SIZE));

        let empty = compute_layout(&config, f64::NAN, f64::NAN);
        assert_eq!(empty.columns, config.overflow_columns);
        assert_eq!(empty.tile_height, (config.min_height - 20.0) / 3.0);

        let view = build_view(&config, &posters(&["p1"]), 1e8, 600.0);
        assert_eq!(view.tiles.len(), capped.tile_count);
        assert!(view.tiles.len() < 1_000);
    }

    #[test]
    fn posters_repeat_modulo_list_length() {
        let filled = fill_tiles(&posters(&["p1", "p2"]), 7);
        let urls: Vec<&str> = filled.iter().map(|tile| tile.poster_url.as_str()).collect();
        assert_eq!(urls, vec!["p1", "p2", "p1", "p2", "p1", "p2", "p1"]);
    }

    #[test]
    fn unusable_posters_leave_mosaic_empty() {
        assert!(fill_tiles(&[], 9).is_empty());
        assert!(fill_tiles(&posters(&["", "  "]), 9).is_empty());
        let filled = fill_tiles(&posters(&["", "p2"]), 3);
        assert!(filled.iter().all(|tile| tile.poster_url == "p2"));
    }

    #[test]
    fn view_places_tiles_row_major() {
        let quilt = HeroQuilt::with_posters(QuiltConfig::default(), posters(&["p1", "p2", "p3"]));
        let view = quilt.layout(600.0, 420.0);
        assert_eq!(view.tiles.len(), view.layout.tile_count);
        let columns = view.layout.columns as usize;
        let second_row = &view.tiles[columns];
        assert_eq!((second_row.row, second_row.column), (1, 0));
        assert_eq!(second_row.y, view.layout.tile_height + view.layout.gap);
        assert!(view.to_html().contains(r#"class="quilt-tile" src="p1""#));
    }

    #[tokio::test(start_paused = true)]
    async fn debouncer_runs_only_the_last_task() {
        let runs = Arc::new(AtomicUsize::new(0));
        let last = Arc::new(AtomicUsize::new(0));
        let mut debouncer = Debouncer::new(Duration::from_millis(120));

        for id in 1..=3 {
            let runs = Arc::clone(&runs);
            let last = Arc::clone(&last);
            debouncer.schedule(async move {
                runs.fetch_add(1, Ordering::SeqCst);
                last.store(id, Ordering::SeqCst);
            });
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(debouncer.is_pending());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(last.load(Ordering::SeqCst), 3);
        assert!(!debouncer.is_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn session_relayouts_after_resizes_settle() {
        let quilt = HeroQuilt::with_posters(QuiltConfig::default(), posters(&["p1"]));
        let expected = quilt.layout(1600.0, 500.0);
        let mut session = QuiltSession::new(quilt);
        let rx = session.subscribe();

        session.resize(800.0, 500.0);
        session.resize(1200.0, 500.0);
        session.resize(1600.0, 500.0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.borrow().is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.borrow().as_ref(), Some(&expected));
    }
}
