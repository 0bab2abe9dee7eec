//! Per-server job progress: snapshots, their rendered view, and a poller.

use crate::errors::FetchError;
use crate::format::{escape_html, format_count};
use crate::models::ProgressResponse;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Success,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Running => "Running",
            Self::Success => "Complete",
            Self::Failed => "Failed",
        }
    }

    fn css_class(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerProgress {
    pub name: String,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub step: String,
    #[serde(default)]
    pub fetched: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inserted: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServerProgress {
    pub fn idle(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status: JobStatus::Idle,
            step: "Waiting".to_string(),
            fetched: 0,
            total: None,
            inserted: None,
            skipped: None,
            error: None,
        }
    }

    pub fn start(&mut self, step: impl Into<String>, total: Option<u64>) {
        self.status = JobStatus::Running;
        self.step = step.into();
        self.fetched = 0;
        self.total = total;
        self.inserted = None;
        self.skipped = None;
        self.error = None;
    }

    pub fn succeed(&mut self, step: impl Into<String>) {
        self.status = JobStatus::Success;
        self.step = step.into();
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.status = JobStatus::Failed;
        self.step = "Failed".to_string();
        self.error = Some(message.into());
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressView {
    pub name: String,
    pub status: JobStatus,
    pub status_label: String,
    pub badge: String,
    pub step: String,
    pub fill_percent: f64,
    pub fill_width: String,
    pub fill_class: String,
    pub count_text: String,
    pub import_text: Option<String>,
    pub error_line: Option<String>,
}

/// Renders one snapshot. Without a usable total the previous fill is held.
pub fn render_progress(progress: &ServerProgress, previous: Option<&ProgressView>) -> ProgressView {
    let fill_percent = match (progress.status, progress.total) {
        (JobStatus::Success, _) => 100.0,
        (_, Some(total)) if total > 0 => {
            (progress.fetched as f64 / total as f64 * 100.0).min(100.0)
        }
        _ => previous.map(|view| view.fill_percent).unwrap_or(0.0),
    };

    let count_text = match progress.total {
        Some(total) => format!("{} / {}", format_count(progress.fetched), format_count(total)),
        None => format_count(progress.fetched),
    };

    let import_text = if progress.inserted.is_some() || progress.skipped.is_some() {
        Some(format!(
            "({} new, {} duplicates)",
            format_count(progress.inserted.unwrap_or(0)),
            format_count(progress.skipped.unwrap_or(0))
        ))
    } else {
        None
    };

    let error_line = match progress.status {
        JobStatus::Failed => Some(
            progress
                .error
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        ),
        _ => None,
    };

    let fill_class = if progress.status == JobStatus::Failed {
        "progress-fill progress-fill-error"
    } else {
        "progress-fill"
    };

    ProgressView {
        name: progress.name.clone(),
        status: progress.status,
        status_label: progress.status.label().to_string(),
        badge: format!("status-badge status-{}", progress.status.css_class()),
        step: progress.step.clone(),
        fill_percent,
        fill_width: percent_width(fill_percent),
        fill_class: fill_class.to_string(),
        count_text,
        import_text,
        error_line,
    }
}

/// Renders every snapshot, pairing each with the previous view of the same name.
pub fn render_all(progress: &[ServerProgress], previous: &[ProgressView]) -> Vec<ProgressView> {
    let by_name: HashMap<&str, &ProgressView> = previous
        .iter()
        .map(|view| (view.name.as_str(), view))
        .collect();
    progress
        .iter()
        .map(|server| render_progress(server, by_name.get(server.name.as_str()).copied()))
        .collect()
}

fn percent_width(percent: f64) -> String {
    let text = format!("{percent:.1}");
    let text = text.strip_suffix(".0").unwrap_or(&text);
    format!("{text}%")
}

impl ProgressView {
    pub fn to_html(&self) -> String {
        let mut html = format!(
            concat!(
                r#"<div class="progress-block" data-server="{name}">"#,
                r#"<div class="progress-header"><span class="progress-name">{name}</span>"#,
                r#"<span class="{badge}">{label}</span></div>"#,
                r#"<div class="progress-step">{step}</div>"#,
                r#"<div class="progress-track"><div class="{fill_class}" style="width: {width}"></div></div>"#,
                r#"<div class="progress-count">{count}"#,
            ),
            name = escape_html(&self.name),
            badge = self.badge,
            label = escape_html(&self.status_label),
            step = escape_html(&self.step),
            fill_class = self.fill_class,
            width = self.fill_width,
            count = self.count_text,
        );
        if let Some(import_text) = &self.import_text {
            html.push(' ');
            html.push_str(import_text);
        }
        html.push_str("</div>");
        if let Some(error) = &self.error_line {
            html.push_str(r#"<div class="progress-error">"#);
            html.push_str(&escape_html(error));
            html.push_str("</div>");
        }
        html.push_str("</div>");
        html
    }
}

pub fn render_fragment(views: &[ProgressView]) -> String {
    views.iter().map(ProgressView::to_html).collect()
}

pub trait StatusSource {
    async fn fetch(&self) -> Result<Vec<ServerProgress>, FetchError>;
}

/// Reads `ServerProgress` snapshots from a `/api/progress`-shaped endpoint.
#[derive(Debug, Clone)]
pub struct HttpStatusSource {
    http: reqwest::Client,
    url: String,
}

impl HttpStatusSource {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

impl StatusSource for HttpStatusSource {
    async fn fetch(&self) -> Result<Vec<ServerProgress>, FetchError> {
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

        let body: ProgressResponse = response.json().await.map_err(request_error)?;
        Ok(body.servers)
    }
}

pub struct ProgressPoller<S> {
    source: S,
    views: Vec<ProgressView>,
    snapshots: Vec<ServerProgress>,
}

impl<S: StatusSource> ProgressPoller<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            views: Vec::new(),
            snapshots: Vec::new(),
        }
    }

    pub fn views(&self) -> &[ProgressView] {
        &self.views
    }

    pub fn snapshots(&self) -> &[ServerProgress] {
        &self.snapshots
    }

    /// True once at least one snapshot arrived and every server is terminal.
    pub fn is_settled(&self) -> bool {
        !self.snapshots.is_empty()
            && self
                .snapshots
                .iter()
                .all(|server| server.status.is_terminal())
    }

    /// Polls once. A failed fetch is logged and the previous views are kept.
    pub async fn poll_once(&mut self) -> &[ProgressView] {
        match self.source.fetch().await {
            Ok(snapshots) => {
                self.views = render_all(&snapshots, &self.views);
                self.snapshots = snapshots;
                debug!(servers = self.snapshots.len(), "polled job progress");
            }
            Err(err) => warn!(error = %err, "progress poll failed"),
        }
        &self.views
    }

    pub async fn run<F>(&mut self, period: Duration, mut on_update: F)
    where
        F: FnMut(&[ProgressView]),
    {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            on_update(self.poll_once().await);
            if self.is_settled() {
                break;
            }
        }
    }
}
