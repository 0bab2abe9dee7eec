use crate::chart::{ChartKind, ChartSeries, ChartSpec};
use crate::config::{AnalyticsSettings, ServerConfig};
use crate::models::{AppData, MediaKind, PlayRecord, ServerSlot};
use crate::quilt::PosterTile;
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub type ServerNames = BTreeMap<ServerSlot, String>;

const SERIES_COLORS: [(ServerSlot, MediaKind, &str); 4] = [
    (ServerSlot::A, MediaKind::Tv, "#E6B413"),
    (ServerSlot::A, MediaKind::Movie, "#FFE548"),
    (ServerSlot::B, MediaKind::Tv, "#e36414"),
    (ServerSlot::B, MediaKind::Movie, "#f18a3d"),
];

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StackedSeries {
    pub categories: Vec<String>,
    pub series: Vec<NamedSeries>,
    pub totals: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedSeries {
    pub name: String,
    pub server: ServerSlot,
    pub media: MediaKind,
    pub data: Vec<u64>,
}

impl StackedSeries {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    pub fn series_named(&self, name: &str) -> Option<&NamedSeries> {
        self.series.iter().find(|series| series.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Share {
    pub label: String,
    pub count: u64,
    /// Percentage of the total, 0..=100.
    pub share: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Ranked {
    pub label: String,
    pub count: u64,
    pub by_server: BTreeMap<ServerSlot, u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerTotal {
    pub server: ServerSlot,
    pub name: String,
    pub plays: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total_plays: u64,
    pub total_users: u64,
    pub total_movies: u64,
    pub total_shows: u64,
    pub servers: Vec<ServerTotal>,
    pub history_days: u32,
    #[serde(default)]
    pub generated_at: DateTime<Utc>,
}

/// One row of the dashboard's viewing history table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub date: NaiveDate,
    pub server: String,
    pub user: String,
    pub media_type: String,
    pub title: String,
    pub show: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dashboard {
    pub servers: ServerNames,
    pub history_days: u32,
    pub daily: StackedSeries,
    pub monthly: StackedSeries,
    pub category: Vec<Share>,
    pub server_share: Vec<Share>,
    pub users: Vec<Ranked>,
    pub movies: Vec<Ranked>,
    pub shows: Vec<Ranked>,
    pub summary: Summary,
    pub history: Vec<HistoryEntry>,
}

pub fn build_dashboard(data: &AppData) -> Dashboard {
    build_dashboard_at(Local::now().date_naive(), Utc::now(), data)
}

pub fn build_dashboard_at(today: NaiveDate, generated_at: DateTime<Utc>, data: &AppData) -> Dashboard {
    let settings: &AnalyticsSettings = &data.settings;
    let servers = active_servers(&data.server_names(), &data.records);
    let history = within_days(&data.records, today, settings.history_days);

    Dashboard {
        daily: daily_series(&data.records, &servers, today, settings.daily_trend_days),
        monthly: monthly_series(&data.records, &servers, today, settings.monthly_trend_months),
        category: category_shares(&history),
        server_share: server_shares(&history, &servers),
        users: top_users(&history, settings.top_users as usize),
        movies: top_movies(&history, settings.top_movies as usize),
        shows: top_shows(&history, settings.top_tv_shows as usize),
        summary: summarize(&history, &servers, settings.history_days, generated_at),
        history: history_table(&data.records, &servers, today, settings.history_table_days),
        history_days: settings.history_days,
        servers,
    }
}

/// Configured servers plus any slot that shows up in the records.
pub fn active_servers(configured: &ServerNames, records: &[PlayRecord]) -> ServerNames {
    let mut servers = configured.clone();
    for record in records {
        servers
            .entry(record.server)
            .or_insert_with(|| record.server.default_name().to_string());
    }
    servers
}

/// Records dated in the trailing `days` ending at `today`, inclusive.
pub fn within_days(records: &[PlayRecord], today: NaiveDate, days: u32) -> Vec<PlayRecord> {
    let start = window_start(today, days);
    records
        .iter()
        .filter(|record| record.date >= start && record.date <= today)
        .cloned()
        .collect()
}

pub fn daily_series(
    records: &[PlayRecord],
    servers: &ServerNames,
    today: NaiveDate,
    days: u32,
) -> StackedSeries {
    let days = days.max(1);
    let start = window_start(today, days);
    let categories = (0..days)
        .map(|offset| date_key(start + Duration::days(i64::from(offset))))
        .collect();

    stack(records, servers, categories, |record| {
        if record.date < start || record.date > today {
            return None;
        }
        usize::try_from((record.date - start).num_days()).ok()
    })
}

pub fn monthly_series(
    records: &[PlayRecord],
    servers: &ServerNames,
    today: NaiveDate,
    months: u32,
) -> StackedSeries {
    let months = i64::from(months.max(1));
    let end = month_index(today);
    let start = end - (months - 1);
    let categories = (start..=end).map(month_label).collect();

    stack(records, servers, categories, |record| {
        let index = month_index(record.date);
        if record.date > today || index < start || index > end {
            return None;
        }
        usize::try_from(index - start).ok()
    })
}

fn stack(
    records: &[PlayRecord],
    servers: &ServerNames,
    categories: Vec<String>,
    bucket_of: impl Fn(&PlayRecord) -> Option<usize>,
) -> StackedSeries {
    let mut counts: BTreeMap<(ServerSlot, MediaKind), Vec<u64>> = BTreeMap::new();
    for slot in servers.keys() {
        for kind in MediaKind::ALL {
            counts.insert((*slot, kind), vec![0; categories.len()]);
        }
    }

    let mut matched = false;
    for record in records {
        let Some(kind) = record.kind() else { continue };
        let Some(index) = bucket_of(record) else { continue };
        if let Some(bucket) = counts
            .get_mut(&(record.server, kind))
            .and_then(|data| data.get_mut(index))
        {
            *bucket += 1;
            matched = true;
        }
    }

    if !matched {
        return StackedSeries::default();
    }

    let totals = (0..categories.len())
        .map(|index| counts.values().map(|data| data[index]).sum())
        .collect();

    let series = counts
        .into_iter()
        .map(|((server, media), data)| NamedSeries {
            name: series_name(&servers[&server], media),
            server,
            media,
            data,
        })
        .collect();

    StackedSeries {
        categories,
        series,
        totals,
    }
}

pub fn series_name(server_name: &str, media: MediaKind) -> String {
    format!("{server_name} - {}", media.label())
}

pub fn category_shares(records: &[PlayRecord]) -> Vec<Share> {
    let mut counts: BTreeMap<MediaKind, u64> = BTreeMap::new();
    for kind in records.iter().filter_map(PlayRecord::kind) {
        *counts.entry(kind).or_insert(0) += 1;
    }

    shares(
        counts
            .into_iter()
            .map(|(kind, count)| (kind.label().to_string(), count))
            .collect(),
    )
}

pub fn server_shares(records: &[PlayRecord], servers: &ServerNames) -> Vec<Share> {
    let mut counts: BTreeMap<ServerSlot, u64> = BTreeMap::new();
    for record in records {
        *counts.entry(record.server).or_insert(0) += 1;
    }

    shares(
        counts
            .into_iter()
            .map(|(slot, count)| (server_label(servers, slot), count))
            .collect(),
    )
}

fn shares(counts: Vec<(String, u64)>) -> Vec<Share> {
    let total: u64 = counts.iter().map(|(_, count)| count).sum();
    if total == 0 {
        return Vec::new();
    }

    counts
        .into_iter()
        .map(|(label, count)| Share {
            label,
            count,
            share: count as f64 / total as f64 * 100.0,
        })
        .collect()
}

pub fn top_movies(records: &[PlayRecord], limit: usize) -> Vec<Ranked> {
    rank(
        records
            .iter()
            .filter(|record| record.kind() == Some(MediaKind::Movie))
            .map(|record| (record.title.as_str(), record.server)),
        limit,
    )
}

pub fn top_shows(records: &[PlayRecord], limit: usize) -> Vec<Ranked> {
    rank(
        records
            .iter()
            .filter(|record| record.kind() == Some(MediaKind::Tv))
            .map(|record| (record.show_title(), record.server)),
        limit,
    )
}

pub fn top_users(records: &[PlayRecord], limit: usize) -> Vec<Ranked> {
    rank(
        records
            .iter()
            .map(|record| (record.user.as_str(), record.server)),
        limit,
    )
}

/// Counts plays per label, highest first, ties broken by label so the output
/// does not depend on input order.
fn rank<'a>(plays: impl Iterator<Item = (&'a str, ServerSlot)>, limit: usize) -> Vec<Ranked> {
    let mut grouped: HashMap<&str, BTreeMap<ServerSlot, u64>> = HashMap::new();
    for (label, server) in plays {
        *grouped.entry(label).or_default().entry(server).or_insert(0) += 1;
    }

    let mut ranked: Vec<Ranked> = grouped
        .into_iter()
        .map(|(label, by_server)| Ranked {
            label: label.to_string(),
            count: by_server.values().sum(),
            by_server,
        })
        .collect();

    ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
    ranked.truncate(limit);
    ranked
}

pub fn summarize(
    records: &[PlayRecord],
    servers: &ServerNames,
    history_days: u32,
    generated_at: DateTime<Utc>,
) -> Summary {
    let users: BTreeSet<&str> = records.iter().map(|record| record.user.as_str()).collect();
    let movies: BTreeSet<&str> = records
        .iter()
        .filter(|record| record.kind() == Some(MediaKind::Movie))
        .map(|record| record.title.as_str())
        .collect();
    let shows: BTreeSet<&str> = records
        .iter()
        .filter(|record| record.kind() == Some(MediaKind::Tv))
        .map(PlayRecord::show_title)
        .collect();

    let server_totals = servers
        .iter()
        .map(|(slot, name)| ServerTotal {
            server: *slot,
            name: name.clone(),
            plays: records.iter().filter(|record| record.server == *slot).count() as u64,
        })
        .collect();

    Summary {
        total_plays: records.len() as u64,
        total_users: users.len() as u64,
        total_movies: movies.len() as u64,
        total_shows: shows.len() as u64,
        servers: server_totals,
        history_days,
        generated_at,
    }
}

/// Plays in the trailing `days`, newest first.
pub fn history_table(
    records: &[PlayRecord],
    servers: &ServerNames,
    today: NaiveDate,
    days: u32,
) -> Vec<HistoryEntry> {
    let mut rows: Vec<HistoryEntry> = within_days(records, today, days)
        .into_iter()
        .map(|record| HistoryEntry {
            date: record.date,
            server: server_label(servers, record.server),
            user: record.user,
            media_type: record.media_type,
            title: record.title,
            show: record.show.unwrap_or_default(),
        })
        .collect();

    rows.sort_by(|a, b| {
        b.date
            .cmp(&a.date)
            .then_with(|| a.server.cmp(&b.server))
            .then_with(|| a.user.cmp(&b.user))
            .then_with(|| a.title.cmp(&b.title))
    });
    rows
}

/// Most watched titles that carry art, for the landing page quilt. Each
/// title uses its smallest `(server, thumb)` pair, proxied through that
/// server; titles whose server is no longer configured are left out.
pub fn top_posters(records: &[PlayRecord], servers: &[ServerConfig], limit: usize) -> Vec<PosterTile> {
    let mut plays: HashMap<&str, (u64, (ServerSlot, &str))> = HashMap::new();
    for record in records {
        let Some(thumb) = record.thumb.as_deref() else { continue };
        let title = match record.kind() {
            Some(MediaKind::Tv) => record.show_title(),
            _ => record.title.as_str(),
        };
        let art = (record.server, thumb);
        let entry = plays.entry(title).or_insert((0, art));
        entry.0 += 1;
        entry.1 = entry.1.min(art);
    }

    let mut ranked: Vec<(&str, u64, (ServerSlot, &str))> = plays
        .into_iter()
        .map(|(title, (count, art))| (title, count, art))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    ranked
        .into_iter()
        .filter_map(|(title, _, (slot, thumb))| {
            let server = servers.iter().find(|server| server.slot == slot)?;
            Some(PosterTile {
                poster_url: server.image_proxy_url(thumb)?,
                title: Some(title.to_string()),
            })
        })
        .take(limit)
        .collect()
}

impl Dashboard {
    pub fn charts(&self) -> Vec<ChartSpec> {
        let days = self.history_days;
        vec![
            stacked_chart(
                "daily",
                "Daily Play Counts by Server and Media Type",
                &self.daily,
            ),
            stacked_chart(
                "monthly",
                "Monthly Play Counts by Server and Media Type",
                &self.monthly,
            ),
            self.users_chart(),
            ranked_chart(
                "movies",
                format!("Most Popular Movies - {days} days"),
                &self.movies,
            ),
            ranked_chart(
                "tv",
                format!("Most Popular TV Shows - {days} days"),
                &self.shows,
            ),
            pie_chart(
                "category",
                format!("Breakdown by Category - {days} days"),
                &self.category,
                |share| match share.label.as_str() {
                    "TV" => "#e36414",
                    _ => "#e6b413",
                },
            ),
            pie_chart(
                "server",
                format!("Server Distribution - {days} days"),
                &self.server_share,
                |share| {
                    if self.servers.get(&ServerSlot::B) == Some(&share.label) {
                        "#e36414"
                    } else {
                        "#E6B413"
                    }
                },
            ),
        ]
    }

    fn users_chart(&self) -> ChartSpec {
        let series = if self.users.is_empty() {
            Vec::new()
        } else {
            self.servers
                .iter()
                .map(|(slot, name)| ChartSeries {
                    name: name.clone(),
                    data: self
                        .users
                        .iter()
                        .map(|user| user.by_server.get(slot).copied().unwrap_or(0))
                        .collect(),
                    color: Some(
                        match slot {
                            ServerSlot::A => "#E6B413",
                            ServerSlot::B => "#e36414",
                        }
                        .to_string(),
                    ),
                    point_colors: Vec::new(),
                })
                .collect()
        };

        ChartSpec {
            id: "users".to_string(),
            kind: ChartKind::StackedBar,
            title: format!("Number of Plays by User - {} days", self.history_days),
            categories: self.users.iter().map(|user| user.label.clone()).collect(),
            series,
        }
    }
}

fn stacked_chart(id: &str, title: &str, stacked: &StackedSeries) -> ChartSpec {
    ChartSpec {
        id: id.to_string(),
        kind: ChartKind::StackedBar,
        title: title.to_string(),
        categories: stacked.categories.clone(),
        series: stacked
            .series
            .iter()
            .map(|series| ChartSeries {
                name: series.name.clone(),
                data: series.data.clone(),
                color: SERIES_COLORS
                    .iter()
                    .find(|(slot, kind, _)| *slot == series.server && *kind == series.media)
                    .map(|(_, _, color)| color.to_string()),
                point_colors: Vec::new(),
            })
            .collect(),
    }
}

fn ranked_chart(id: &str, title: String, ranked: &[Ranked]) -> ChartSpec {
    let series = if ranked.is_empty() {
        Vec::new()
    } else {
        vec![ChartSeries {
            name: "Plays".to_string(),
            data: ranked.iter().map(|entry| entry.count).collect(),
            color: None,
            point_colors: Vec::new(),
        }]
    };

    ChartSpec {
        id: id.to_string(),
        kind: ChartKind::GradientBar,
        title,
        categories: ranked.iter().map(|entry| entry.label.clone()).collect(),
        series,
    }
}

fn pie_chart(
    id: &str,
    title: String,
    shares: &[Share],
    color_of: impl Fn(&Share) -> &'static str,
) -> ChartSpec {
    let series = if shares.is_empty() {
        Vec::new()
    } else {
        vec![ChartSeries {
            name: "Plays".to_string(),
            data: shares.iter().map(|share| share.count).collect(),
            color: None,
            point_colors: shares.iter().map(|share| color_of(share).to_string()).collect(),
        }]
    };

    ChartSpec {
        id: id.to_string(),
        kind: ChartKind::Pie,
        title,
        categories: shares.iter().map(|share| share.label.clone()).collect(),
        series,
    }
}

fn server_label(servers: &ServerNames, slot: ServerSlot) -> String {
    servers
        .get(&slot)
        .cloned()
        .unwrap_or_else(|| slot.default_name().to_string())
}

fn window_start(today: NaiveDate, days: u32) -> NaiveDate {
    today - Duration::days(i64::from(days.max(1)) - 1)
}

fn date_key(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn month_index(date: NaiveDate) -> i64 {
    i64::from(date.year()) * 12 + i64::from(date.month0())
}

fn month_label(index: i64) -> String {
    format!("{:04}-{:02}", index.div_euclid(12), index.rem_euclid(12) + 1)
}
