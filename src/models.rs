use crate::chart::ChartSpec;
use crate::config::{AnalyticsSettings, ServerConfig};
use crate::progress::{JobStatus, ServerProgress};
use crate::stats::{HistoryEntry, Summary};
use chrono::{DateTime, Local, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Number of analytics runs kept in the state file.
const RUN_HISTORY: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ServerSlot {
    A,
    B,
}

impl ServerSlot {
    pub const ALL: [ServerSlot; 2] = [ServerSlot::A, ServerSlot::B];

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            _ => None,
        }
    }

    pub fn default_name(self) -> &'static str {
        match self {
            Self::A => "Server A",
            Self::B => "Server B",
        }
    }
}

/// Media types the per-category aggregates know about. Anything else is
/// kept on the record but only counted in overall totals.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum MediaKind {
    Tv,
    Movie,
}

impl MediaKind {
    pub const ALL: [MediaKind; 2] = [MediaKind::Tv, MediaKind::Movie];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "episode" | "tv" => Some(Self::Tv),
            "movie" => Some(Self::Movie),
            _ => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Tv => "TV",
            Self::Movie => "Movies",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub row_id: Option<u64>,
    pub date: NaiveDate,
    pub server: ServerSlot,
    pub user: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show: Option<String>,
    pub media_type: String,
    #[serde(default)]
    pub duration: u64,
    /// Plex image path; browsers reach it through the server's image proxy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumb: Option<String>,
}

impl PlayRecord {
    pub fn kind(&self) -> Option<MediaKind> {
        MediaKind::parse(&self.media_type)
    }

    /// Show name for episodes, falling back to the full title.
    pub fn show_title(&self) -> &str {
        self.show
            .as_deref()
            .filter(|show| !show.trim().is_empty())
            .unwrap_or(&self.title)
    }
}

/// One row of Tautulli `get_history` output, as pushed to the import endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryRow {
    #[serde(default)]
    pub row_id: Option<u64>,
    #[serde(default)]
    pub started: Option<i64>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub full_title: Option<String>,
    #[serde(default)]
    pub grandparent_title: Option<String>,
    #[serde(default)]
    pub play_duration: Option<u64>,
    #[serde(default)]
    pub duration: Option<u64>,
    #[serde(default)]
    pub thumb: Option<String>,
}

impl HistoryRow {
    pub fn to_record(&self, server: ServerSlot) -> Option<PlayRecord> {
        self.to_record_in(server, &Local)
    }

    /// Converts the row, placing `started` on a calendar date in `tz`. Rows
    /// without a row id or start time cannot be deduplicated and are dropped.
    pub fn to_record_in<Tz: TimeZone>(&self, server: ServerSlot, tz: &Tz) -> Option<PlayRecord> {
        let row_id = self.row_id?;
        let started = DateTime::<Utc>::from_timestamp(self.started?, 0)?;

        Some(PlayRecord {
            row_id: Some(row_id),
            date: started.with_timezone(tz).date_naive(),
            server,
            user: self.user.clone().unwrap_or_default(),
            title: self.full_title.clone().unwrap_or_default(),
            show: self
                .grandparent_title
                .clone()
                .filter(|title| !title.trim().is_empty()),
            media_type: self.media_type.clone().unwrap_or_default(),
            duration: self.play_duration.or(self.duration).unwrap_or(0),
            thumb: self.thumb.clone().filter(|thumb| !thumb.trim().is_empty()),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct ImportRequest {
    pub server: String,
    pub rows: Vec<HistoryRow>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImportAccepted {
    pub server: ServerSlot,
    pub rows: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyticsRun {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub error_message: Option<String>,
    pub total_plays: Option<u64>,
    pub total_users: Option<u64>,
    pub summary: Option<Summary>,
}

impl AnalyticsRun {
    pub fn start(id: u64, now: DateTime<Utc>) -> Self {
        Self {
            id,
            started_at: now,
            completed_at: None,
            status: JobStatus::Running,
            error_message: None,
            total_plays: None,
            total_users: None,
            summary: None,
        }
    }

    pub fn succeed(&mut self, summary: Summary, now: DateTime<Utc>) {
        self.status = JobStatus::Success;
        self.completed_at = Some(now);
        self.total_plays = Some(summary.total_plays);
        self.total_users = Some(summary.total_users);
        self.summary = Some(summary);
    }

    pub fn fail(&mut self, message: impl Into<String>, now: DateTime<Utc>) {
        self.status = JobStatus::Failed;
        self.completed_at = Some(now);
        self.error_message = Some(message.into());
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppData {
    #[serde(default)]
    pub servers: Vec<ServerConfig>,
    #[serde(default)]
    pub settings: AnalyticsSettings,
    #[serde(default)]
    pub records: Vec<PlayRecord>,
    #[serde(default)]
    pub runs: Vec<AnalyticsRun>,
}

impl AppData {
    pub fn server(&self, slot: ServerSlot) -> Option<&ServerConfig> {
        self.servers.iter().find(|server| server.slot == slot)
    }

    pub fn server_names(&self) -> BTreeMap<ServerSlot, String> {
        self.servers
            .iter()
            .map(|server| (server.slot, server.name.clone()))
            .collect()
    }

    pub fn upsert_server(&mut self, config: ServerConfig) {
        self.servers.retain(|server| server.slot != config.slot);
        self.servers.push(config);
        self.servers.sort_by_key(|server| server.slot);
    }

    pub fn remove_server(&mut self, slot: ServerSlot) -> bool {
        let before = self.servers.len();
        self.servers.retain(|server| server.slot != slot);
        before != self.servers.len()
    }

    pub fn known_row_ids(&self) -> HashSet<u64> {
        self.records.iter().filter_map(|record| record.row_id).collect()
    }

    pub fn next_run_id(&self) -> u64 {
        self.runs.iter().map(|run| run.id).max().unwrap_or(0) + 1
    }

    pub fn push_run(&mut self, run: AnalyticsRun) {
        self.runs.push(run);
        if self.runs.len() > RUN_HISTORY {
            let excess = self.runs.len() - RUN_HISTORY;
            self.runs.drain(..excess);
        }
    }

    pub fn latest_run(&self) -> Option<&AnalyticsRun> {
        self.runs.iter().max_by_key(|run| run.id)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub servers: Vec<ServerProgress>,
}

#[derive(Debug, Serialize)]
pub struct DashboardResponse {
    pub run: AnalyticsRun,
    pub summary: Summary,
    pub charts: Vec<ChartSpec>,
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Deserialize)]
pub struct QuiltQuery {
    pub width: f64,
    pub height: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn row(row_id: Option<u64>, started: Option<i64>) -> HistoryRow {
        HistoryRow {
            row_id,
            started,
            user: Some("alice".to_string()),
            media_type: Some("episode".to_string()),
            full_title: Some("Severance - Good News About Hell".to_string()),
            grandparent_title: Some("Severance".to_string()),
            play_duration: Some(3000),
            duration: Some(3300),
            thumb: Some(" ".to_string()),
        }
    }

    #[test]
    fn history_row_dates_follow_the_target_zone() {
        let new_york = FixedOffset::west_opt(5 * 3600).unwrap();
        let record = row(Some(7), Some(0)).to_record_in(ServerSlot::A, &new_york).unwrap();
        assert_eq!(record.date, NaiveDate::from_ymd_opt(1969, 12, 31).unwrap());
        assert_eq!(record.kind(), Some(MediaKind::Tv));
        assert_eq!(record.show_title(), "Severance");
        assert_eq!(record.duration, 3000);
        assert_eq!(record.thumb, None);
    }

    #[test]
    fn history_rows_without_identity_are_dropped() {
        assert!(row(None, Some(0)).to_record_in(ServerSlot::A, &Utc).is_none());
        assert!(row(Some(1), None).to_record_in(ServerSlot::A, &Utc).is_none());
    }

    #[test]
    fn media_kinds_parse_tautulli_names() {
        assert_eq!(MediaKind::parse("movie"), Some(MediaKind::Movie));
        assert_eq!(MediaKind::parse("Episode"), Some(MediaKind::Tv));
        assert_eq!(MediaKind::parse("track"), None);
    }

    #[test]
    fn run_history_is_capped() {
        let mut data = AppData::default();
        for _ in 0..RUN_HISTORY + 5 {
            let id = data.next_run_id();
            data.push_run(AnalyticsRun::start(id, Utc::now()));
        }
        assert_eq!(data.runs.len(), RUN_HISTORY);
        assert_eq!(data.latest_run().map(|run| run.id), Some((RUN_HISTORY + 5) as u64));
    }
}
