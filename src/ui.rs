use crate::chart::Theme;
use crate::format::{escape_html, format_count, format_timestamp};
use crate::models::AnalyticsRun;
use crate::progress::JobStatus;
use crate::stats::{Dashboard, HistoryEntry, Summary};
use std::fmt::Write as _;

pub fn render_index(theme: &Theme, last_run: Option<&AnalyticsRun>, progress_html: &str) -> String {
    let (last_run_text, last_run_status) = match last_run {
        Some(run) => {
            let stamp = run.completed_at.unwrap_or(run.started_at).to_rfc3339();
            (format_timestamp(Some(&stamp)), run.status.label())
        }
        None => (format_timestamp(None), JobStatus::Idle.label()),
    };

    INDEX_HTML
        .replace("{{THEME_CSS}}", &theme_css(theme))
        .replace("{{BASE_CSS}}", BASE_CSS)
        .replace("{{LAST_RUN}}", &escape_html(&last_run_text))
        .replace("{{LAST_STATUS}}", last_run_status)
        .replace("{{PROGRESS}}", progress_html)
}

pub fn render_dashboard(
    theme: &Theme,
    run: Option<(&AnalyticsRun, &Dashboard)>,
    charts: &[String],
) -> String {
    let body = match run {
        Some((run, dashboard)) => {
            let stamp = run.completed_at.unwrap_or(run.started_at).to_rfc3339();
            let generated = dashboard.summary.generated_at.to_rfc3339();
            let mut body = format!(
                r#"<p class="meta">Run #{} completed {} &middot; generated {}</p>"#,
                run.id,
                escape_html(&format_timestamp(Some(&stamp))),
                escape_html(&format_timestamp(Some(&generated)))
            );
            body.push_str(&summary_cards(&dashboard.summary));
            body.push_str(r#"<section class="charts">"#);
            for chart in charts {
                let _ = write!(body, r#"<figure class="chart">{chart}</figure>"#);
            }
            body.push_str("</section>");
            body.push_str(&history_table(&dashboard.history));
            body
        }
        None => r#"<p class="empty">No analytics run yet. Import history and start a run from the home page.</p>"#
            .to_string(),
    };

    DASHBOARD_HTML
        .replace("{{THEME_CSS}}", &theme_css(theme))
        .replace("{{BASE_CSS}}", BASE_CSS)
        .replace("{{BODY}}", &body)
}

fn summary_cards(summary: &Summary) -> String {
    let mut cards = String::from(r#"<section class="cards">"#);
    let mut card = |label: &str, value: u64| {
        let _ = write!(
            cards,
            r#"<div class="card"><span class="label">{}</span><span class="value">{}</span></div>"#,
            escape_html(label),
            format_count(value)
        );
    };
    card(&format!("Plays ({} days)", summary.history_days), summary.total_plays);
    card("Users", summary.total_users);
    card("Movies", summary.total_movies);
    card("TV Shows", summary.total_shows);
    for server in &summary.servers {
        card(&server.name, server.plays);
    }
    cards.push_str("</section>");
    cards
}

fn history_table(rows: &[HistoryEntry]) -> String {
    let mut table = String::from(r#"<section class="history"><h2>Recent plays</h2>"#);
    if rows.is_empty() {
        table.push_str(r#"<p class="empty">No plays in this window.</p></section>"#);
        return table;
    }
    table.push_str(
        "<table><thead><tr><th>Date</th><th>Server</th><th>User</th><th>Type</th><th>Title</th><th>Show</th></tr></thead><tbody>",
    );
    for row in rows {
        let _ = write!(
            table,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            row.date.format("%Y-%m-%d"),
            escape_html(&row.server),
            escape_html(&row.user),
            escape_html(&row.media_type),
            escape_html(&row.title),
            escape_html(&row.show),
        );
    }
    table.push_str("</tbody></table></section>");
    table
}

fn theme_css(theme: &Theme) -> String {
    format!(
        ":root {{ --bg: {}; --surface: {}; --ink: {}; --muted: {}; --grid: {}; --accent: {}; --error: {}; --font: {}; }}",
        theme.background,
        theme.surface,
        theme.text,
        theme.muted_text,
        theme.grid,
        theme.accent,
        theme.error,
        theme.font_family,
    )
}

const BASE_CSS: &str = r#"
    * { box-sizing: border-box; }
    body { margin: 0; background: var(--bg); color: var(--ink); font-family: var(--font); }
    a { color: var(--accent); }
    main { width: min(1100px, 100%); margin: 0 auto; padding: 28px 18px 48px; display: grid; gap: 24px; }
    h1 { margin: 0; font-size: 28px; letter-spacing: 0.02em; }
    .meta, .empty { color: var(--muted); }
    .cards { display: grid; grid-template-columns: repeat(auto-fit, minmax(150px, 1fr)); gap: 12px; }
    .card { background: var(--surface); border-radius: 12px; padding: 14px; display: grid; gap: 6px; }
    .card .label { color: var(--muted); font-size: 13px; }
    .card .value { font-size: 24px; font-weight: 600; }
"#;

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>MultiPlex Stats</title>
  <style>
    {{THEME_CSS}}
    {{BASE_CSS}}
    .hero { position: relative; overflow: hidden; min-height: 420px; height: 60vh; border-radius: 0 0 24px 24px; }
    .quilt-grid { position: absolute; inset: 0; }
    .quilt-tile { position: absolute; object-fit: cover; border-radius: 6px; opacity: 0.85; }
    .hero-overlay { position: absolute; inset: 0; display: grid; place-content: center; gap: 12px; text-align: center;
      background: linear-gradient(180deg, rgba(0, 0, 0, 0.2), var(--bg)); }
    .actions { display: flex; gap: 12px; justify-content: center; }
    button { font: inherit; border: none; border-radius: 999px; padding: 10px 20px; cursor: pointer; background: var(--accent); color: #111; }
    .progress-block { background: var(--surface); border-radius: 12px; padding: 14px; display: grid; gap: 8px; }
    .progress-header { display: flex; justify-content: space-between; }
    .status-badge { font-size: 12px; padding: 2px 10px; border-radius: 999px; background: var(--grid); }
    .status-running { background: var(--accent); color: #111; }
    .status-failed { background: var(--error); }
    .progress-step, .progress-count { color: var(--muted); font-size: 13px; }
    .progress-track { height: 8px; border-radius: 999px; background: var(--grid); overflow: hidden; }
    .progress-fill { height: 100%; background: var(--accent); transition: width 300ms ease; }
    .progress-fill-error { background: var(--error); }
    .progress-error { color: var(--error); font-size: 13px; }
    #status { min-height: 20px; color: var(--muted); }
  </style>
</head>
<body>
  <section class="hero" id="hero">
    <div class="quilt-grid" id="quilt"></div>
    <div class="hero-overlay">
      <h1>MultiPlex Stats</h1>
      <p class="meta">Last run: <span id="last-run">{{LAST_RUN}}</span> (<span id="last-status">{{LAST_STATUS}}</span>)</p>
      <div class="actions">
        <button id="run">Run analytics</button>
        <a href="/dashboard">Open dashboard</a>
      </div>
      <div id="status"></div>
    </div>
  </section>
  <main>
    <section id="progress">{{PROGRESS}}</section>
  </main>

  <script>
    const hero = document.getElementById('hero');
    const quilt = document.getElementById('quilt');
    const progress = document.getElementById('progress');
    const statusEl = document.getElementById('status');
    let resizeTimer = null;
    let pollTimer = null;

    const setStatus = (text) => {
      statusEl.textContent = text;
    };

    const warn = (what) => (err) => console.warn(`${what} refresh failed`, err);

    const drawQuilt = async () => {
      const width = Math.round(hero.clientWidth);
      const height = Math.round(hero.clientHeight);
      const res = await fetch(`/api/quilt?width=${width}&height=${height}`);
      if (!res.ok) {
        console.warn(`quilt request failed: ${res.status}`);
        return;
      }
      const view = await res.json();
      const { tile_width, tile_height } = view.layout;
      quilt.replaceChildren(...view.tiles.map((tile) => {
        const img = document.createElement('img');
        img.className = 'quilt-tile';
        img.src = tile.poster_url;
        img.alt = tile.title || '';
        img.loading = 'lazy';
        img.style.left = `${tile.x}px`;
        img.style.top = `${tile.y}px`;
        img.style.width = `${tile_width}px`;
        img.style.height = `${tile_height}px`;
        return img;
      }));
    };

    window.addEventListener('resize', () => {
      clearTimeout(resizeTimer);
      resizeTimer = setTimeout(() => drawQuilt().catch(warn('quilt')), 120);
    });

    const pollProgress = async () => {
      const res = await fetch('/progress');
      if (res.ok) {
        progress.innerHTML = await res.text();
      }
      if (progress.querySelector('.status-running')) {
        pollTimer = setTimeout(() => pollProgress().catch(warn('progress')), 2000);
      } else {
        pollTimer = null;
      }
    };

    document.getElementById('run').addEventListener('click', async () => {
      setStatus('Running analytics...');
      const res = await fetch('/api/runs', { method: 'POST' });
      if (!res.ok) {
        setStatus(await res.text());
        return;
      }
      window.location.href = '/dashboard';
    });

    drawQuilt().catch(warn('quilt'));
    if (progress.querySelector('.status-running') && pollTimer === null) {
      pollProgress().catch(warn('progress'));
    }
  </script>
</body>
</html>
"#;

const DASHBOARD_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8" />
  <meta name="viewport" content="width=device-width, initial-scale=1.0" />
  <title>MultiPlex Stats - Dashboard</title>
  <style>
    {{THEME_CSS}}
    {{BASE_CSS}}
    .charts { display: grid; gap: 18px; }
    .chart { margin: 0; background: var(--surface); border-radius: 12px; padding: 8px; overflow-x: auto; }
    .chart svg { display: block; max-width: 100%; height: auto; }
    .history { background: var(--surface); border-radius: 12px; padding: 14px; overflow-x: auto; }
    .history h2 { margin: 0 0 10px; font-size: 18px; }
    .history table { width: 100%; border-collapse: collapse; font-size: 14px; }
    .history th { text-align: left; color: var(--muted); font-weight: 500; }
    .history th, .history td { padding: 6px 8px; border-bottom: 1px solid var(--grid); }
  </style>
</head>
<body>
  <main>
    <header><h1>MultiPlex Stats</h1><a href="/">Home</a></header>
    {{BODY}}
  </main>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AppData, ServerSlot};
    use crate::stats::{build_dashboard_at, ServerTotal};
    use chrono::{NaiveDate, TimeZone, Utc};

    #[test]
    fn index_without_runs_says_never() {
        let html = render_index(&Theme::default(), None, "");
        assert!(html.contains(r#"<span id="last-run">Never</span>"#));
        assert!(html.contains("--accent: #E6B413"));
        assert!(!html.contains("{{"));
    }

    #[test]
    fn index_script_reports_failed_refreshes() {
        let html = render_index(&Theme::default(), None, "");
        assert!(!html.contains(".catch(() => {})"));
        assert!(html.contains("console.warn"));
    }

    fn empty_dashboard() -> Dashboard {
        let today = NaiveDate::from_ymd_opt(2026, 3, 10).unwrap();
        build_dashboard_at(today, Utc::now(), &AppData::default())
    }

    #[test]
    fn dashboard_lists_summary_and_charts() {
        let mut run = AnalyticsRun::start(3, Utc::now());
        let mut dashboard = empty_dashboard();
        dashboard.summary = Summary {
            total_plays: 12_345,
            total_users: 7,
            total_movies: 40,
            total_shows: 12,
            servers: vec![ServerTotal {
                server: ServerSlot::A,
                name: "Apollo".to_string(),
                plays: 12_345,
            }],
            history_days: 60,
            generated_at: Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap(),
        };
        run.succeed(dashboard.summary.clone(), Utc::now());

        let html = render_dashboard(&Theme::default(), Some((&run, &dashboard)), &["<svg></svg>".to_string()]);
        assert!(html.contains("Run #3"));
        assert!(html.contains("12,345"));
        let generated = format_timestamp(Some(&dashboard.summary.generated_at.to_rfc3339()));
        assert!(html.contains(&format!("generated {generated}")));
        assert!(html.contains(r#"<figure class="chart"><svg></svg></figure>"#));
        assert!(html.contains("No plays in this window."));
    }

    #[test]
    fn dashboard_renders_escaped_history_rows() {
        let mut run = AnalyticsRun::start(4, Utc::now());
        let mut dashboard = empty_dashboard();
        dashboard.history = vec![HistoryEntry {
            date: NaiveDate::from_ymd_opt(2026, 3, 9).unwrap(),
            server: "Zeus".to_string(),
            user: "<bob>".to_string(),
            media_type: "episode".to_string(),
            title: "Lost - Pilot".to_string(),
            show: "Lost".to_string(),
        }];
        run.succeed(dashboard.summary.clone(), Utc::now());

        let html = render_dashboard(&Theme::default(), Some((&run, &dashboard)), &[]);
        assert!(html.contains(
            "<tr><td>2026-03-09</td><td>Zeus</td><td>&lt;bob&gt;</td><td>episode</td><td>Lost - Pilot</td><td>Lost</td></tr>"
        ));
        assert!(!html.contains("No plays in this window."));
    }
}
