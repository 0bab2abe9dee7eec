//! Chart specs and the renderer that turns them into view-models and SVG.
//!
//! The renderer is built once with a [`Theme`] and keeps no other state, so
//! the same `ChartSpec` always renders the same output.

use crate::format::{escape_html, format_count, format_percent};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt::Write as _;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChartKind {
    StackedBar,
    GradientBar,
    Pie,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSpec {
    pub id: String,
    pub kind: ChartKind,
    pub title: String,
    pub categories: Vec<String>,
    pub series: Vec<ChartSeries>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartSeries {
    pub name: String,
    pub data: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    /// Per-point colors; empty, or one per data point.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub point_colors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChartError {
    #[error("series `{series}` in chart `{chart}` has {actual} points for {expected} categories")]
    LengthMismatch {
        chart: String,
        series: String,
        expected: usize,
        actual: usize,
    },

    #[error("series `{series}` in chart `{chart}` has {actual} point colors for {expected} points")]
    ColorMismatch {
        chart: String,
        series: String,
        expected: usize,
        actual: usize,
    },

    #[error("chart `{chart}` needs exactly one series, got {count}")]
    SeriesCount { chart: String, count: usize },
}

impl ChartSpec {
    pub fn validate(&self) -> Result<(), ChartError> {
        let single_series = matches!(self.kind, ChartKind::GradientBar | ChartKind::Pie);
        let empty = self.categories.is_empty() && self.series.is_empty();
        if single_series && !empty && self.series.len() != 1 {
            return Err(ChartError::SeriesCount {
                chart: self.id.clone(),
                count: self.series.len(),
            });
        }

        for series in &self.series {
            if series.data.len() != self.categories.len() {
                return Err(ChartError::LengthMismatch {
                    chart: self.id.clone(),
                    series: series.name.clone(),
                    expected: self.categories.len(),
                    actual: series.data.len(),
                });
            }
            if !series.point_colors.is_empty() && series.point_colors.len() != series.data.len() {
                return Err(ChartError::ColorMismatch {
                    chart: self.id.clone(),
                    series: series.name.clone(),
                    expected: series.data.len(),
                    actual: series.point_colors.len(),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Theme {
    pub background: String,
    pub surface: String,
    pub text: String,
    pub muted_text: String,
    pub grid: String,
    pub accent: String,
    pub error: String,
    pub font_family: String,
    pub palette: Vec<String>,
    pub gradient: (String, String),
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            background: "#141414".to_string(),
            surface: "#1f1f1f".to_string(),
            text: "#e6e6e6".to_string(),
            muted_text: "#9a9a9a".to_string(),
            grid: "#333333".to_string(),
            accent: "#E6B413".to_string(),
            error: "#d9534f".to_string(),
            font_family: "\"Inter\", \"Segoe UI\", sans-serif".to_string(),
            palette: ["#E6B413", "#FFE548", "#e36414", "#f18a3d", "#7cb5ec", "#90ed7d"]
                .into_iter()
                .map(String::from)
                .collect(),
            gradient: ("#ff9800".to_string(), "#ed542c".to_string()),
        }
    }
}

impl Theme {
    fn palette_color(&self, index: usize) -> String {
        if self.palette.is_empty() {
            return self.accent.clone();
        }
        self.palette[index % self.palette.len()].clone()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderOptions {
    pub width: f64,
    pub height: f64,
    pub bar_min_height: f64,
    pub bar_row_height: f64,
    pub bar_padding: f64,
    /// Pie slices at or below this share (percent) get no inline label.
    pub pie_label_threshold: f64,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            width: 960.0,
            height: 380.0,
            bar_min_height: 400.0,
            bar_row_height: 26.0,
            bar_padding: 110.0,
            pie_label_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedChart {
    pub id: String,
    pub title: String,
    pub width: f64,
    pub height: f64,
    pub body: ChartBody,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChartBody {
    Empty,
    Stacked {
        columns: Vec<Column>,
        legend: Vec<LegendEntry>,
        max_total: u64,
    },
    Bars {
        bars: Vec<Bar>,
    },
    Pie {
        slices: Vec<Slice>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Column {
    pub label: String,
    pub x: f64,
    pub width: f64,
    pub total: u64,
    pub total_label: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Segment {
    pub series: String,
    pub value: u64,
    pub stack_total: u64,
    pub y: f64,
    pub height: f64,
    pub color: String,
    pub tooltip: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegendEntry {
    pub name: String,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Bar {
    pub label: String,
    pub value: u64,
    pub value_label: String,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Slice {
    pub label: String,
    pub value: u64,
    pub share: f64,
    pub start_angle: f64,
    pub end_angle: f64,
    pub color: String,
    pub percent_label: Option<String>,
}

const PLOT_LEFT: f64 = 56.0;
const PLOT_RIGHT: f64 = 16.0;
const PLOT_TOP: f64 = 48.0;
const PLOT_BOTTOM: f64 = 72.0;
const BAR_LABEL_WIDTH: f64 = 220.0;
const BAR_VALUE_WIDTH: f64 = 64.0;

pub struct ChartRenderer {
    theme: Theme,
    options: RenderOptions,
}

impl ChartRenderer {
    pub fn new(theme: Theme) -> Self {
        Self::with_options(theme, RenderOptions::default())
    }

    pub fn with_options(theme: Theme, options: RenderOptions) -> Self {
        Self { theme, options }
    }

    pub fn theme(&self) -> &Theme {
        &self.theme
    }

    pub fn render(&self, spec: &ChartSpec) -> Result<RenderedChart, ChartError> {
        spec.validate()?;

        let mut height = self.options.height;
        let body = if spec.categories.is_empty() {
            ChartBody::Empty
        } else {
            match spec.kind {
                ChartKind::StackedBar => self.stacked(spec),
                ChartKind::GradientBar => {
                    height = self.bar_chart_height(spec.categories.len());
                    self.bars(spec, height)
                }
                ChartKind::Pie => self.pie(spec),
            }
        };

        Ok(RenderedChart {
            id: spec.id.clone(),
            title: spec.title.clone(),
            width: self.options.width,
            height,
            body,
        })
    }

    pub fn render_svg(&self, spec: &ChartSpec) -> Result<String, ChartError> {
        Ok(self.to_svg(&self.render(spec)?))
    }

    /// `max(min_height, count * row_height + padding)`
    pub fn bar_chart_height(&self, count: usize) -> f64 {
        let options = &self.options;
        (count as f64 * options.bar_row_height + options.bar_padding).max(options.bar_min_height)
    }

    fn series_color(&self, series: &ChartSeries, index: usize) -> String {
        series
            .color
            .clone()
            .unwrap_or_else(|| self.theme.palette_color(index))
    }

    fn stacked(&self, spec: &ChartSpec) -> ChartBody {
        let count = spec.categories.len();
        let plot_width = self.options.width - PLOT_LEFT - PLOT_RIGHT;
        let plot_height = self.options.height - PLOT_TOP - PLOT_BOTTOM;
        let baseline = PLOT_TOP + plot_height;
        let slot = plot_width / count as f64;
        let bar_width = slot * 0.7;

        let totals: Vec<u64> = (0..count)
            .map(|index| spec.series.iter().map(|series| series.data[index]).sum())
            .collect();
        let max_total = totals.iter().copied().max().unwrap_or(0);
        let scale = plot_height / max_total.max(1) as f64;

        let columns = spec
            .categories
            .iter()
            .enumerate()
            .map(|(index, label)| {
                let mut running = 0u64;
                let mut segments = Vec::new();
                for (series_index, series) in spec.series.iter().enumerate() {
                    let value = series.data[index];
                    if value == 0 {
                        continue;
                    }
                    running += value;
                    segments.push(Segment {
                        series: series.name.clone(),
                        value,
                        stack_total: running,
                        y: baseline - running as f64 * scale,
                        height: value as f64 * scale,
                        color: self.series_color(series, series_index),
                        tooltip: format!(
                            "{}: {}\nTotal: {}",
                            series.name,
                            format_count(value),
                            format_count(running)
                        ),
                    });
                }

                Column {
                    label: label.clone(),
                    x: PLOT_LEFT + index as f64 * slot + (slot - bar_width) / 2.0,
                    width: bar_width,
                    total: totals[index],
                    total_label: format_count(totals[index]),
                    segments,
                }
            })
            .collect();

        let legend = spec
            .series
            .iter()
            .enumerate()
            .map(|(index, series)| LegendEntry {
                name: series.name.clone(),
                color: self.series_color(series, index),
            })
            .collect();

        ChartBody::Stacked {
            columns,
            legend,
            max_total,
        }
    }

    fn bars(&self, spec: &ChartSpec, height: f64) -> ChartBody {
        let data = &spec.series[0].data;
        let max = data.iter().copied().max().unwrap_or(0);
        let min = data.iter().copied().min().unwrap_or(0);
        let plot_width = self.options.width - BAR_LABEL_WIDTH - BAR_VALUE_WIDTH;
        let row = (height - PLOT_TOP - 16.0) / data.len() as f64;
        let (low, high) = &self.theme.gradient;

        let bars = spec
            .categories
            .iter()
            .zip(data)
            .enumerate()
            .map(|(index, (label, value))| {
                let ratio = if max > min {
                    (value - min) as f64 / (max - min) as f64
                } else {
                    0.0
                };
                Bar {
                    label: label.clone(),
                    value: *value,
                    value_label: format_count(*value),
                    y: PLOT_TOP + index as f64 * row + row * 0.15,
                    width: if max == 0 {
                        0.0
                    } else {
                        *value as f64 / max as f64 * plot_width
                    },
                    height: row * 0.7,
                    color: interpolate_color(low, high, ratio),
                }
            })
            .collect();

        ChartBody::Bars { bars }
    }

    fn pie(&self, spec: &ChartSpec) -> ChartBody {
        let series = &spec.series[0];
        let total: u64 = series.data.iter().sum();
        if total == 0 {
            return ChartBody::Empty;
        }

        let mut angle = -PI / 2.0;
        let slices = spec
            .categories
            .iter()
            .zip(&series.data)
            .enumerate()
            .filter(|(_, (_, value))| **value > 0)
            .map(|(index, (label, value))| {
                let share = *value as f64 / total as f64 * 100.0;
                let start_angle = angle;
                angle += share / 100.0 * 2.0 * PI;
                Slice {
                    label: label.clone(),
                    value: *value,
                    share,
                    start_angle,
                    end_angle: angle,
                    color: series
                        .point_colors
                        .get(index)
                        .cloned()
                        .unwrap_or_else(|| self.theme.palette_color(index)),
                    percent_label: (share > self.options.pie_label_threshold)
                        .then(|| format_percent(share)),
                }
            })
            .collect();

        ChartBody::Pie { slices }
    }

    pub fn to_svg(&self, chart: &RenderedChart) -> String {
        let theme = &self.theme;
        let mut svg = String::new();
        let _ = write!(
            svg,
            r#"<svg class="chart" id="chart-{id}" viewBox="0 0 {w:.0} {h:.0}" role="img" aria-label="{title}" font-family="{font}">"#,
            id = escape_html(&chart.id),
            w = chart.width,
            h = chart.height,
            title = escape_html(&chart.title),
            font = escape_html(&theme.font_family),
        );
        let _ = write!(
            svg,
            r#"<rect width="100%" height="100%" fill="{}" rx="12"/><text x="{:.1}" y="28" fill="{}" font-size="16" font-weight="600" text-anchor="middle">{}</text>"#,
            theme.surface,
            chart.width / 2.0,
            theme.text,
            escape_html(&chart.title),
        );

        match &chart.body {
            ChartBody::Empty => {
                let _ = write!(
                    svg,
                    r#"<text x="{:.1}" y="{:.1}" fill="{}" font-size="14" text-anchor="middle">No data</text>"#,
                    chart.width / 2.0,
                    chart.height / 2.0,
                    theme.muted_text,
                );
            }
            ChartBody::Stacked {
                columns, legend, ..
            } => self.stacked_svg(&mut svg, chart, columns, legend),
            ChartBody::Bars { bars } => self.bars_svg(&mut svg, bars),
            ChartBody::Pie { slices } => self.pie_svg(&mut svg, chart, slices),
        }

        svg.push_str("</svg>");
        svg
    }

    fn stacked_svg(&self, svg: &mut String, chart: &RenderedChart, columns: &[Column], legend: &[LegendEntry]) {
        let theme = &self.theme;
        let baseline = chart.height - PLOT_BOTTOM;
        let _ = write!(
            svg,
            r#"<line x1="{PLOT_LEFT}" y1="{baseline:.1}" x2="{:.1}" y2="{baseline:.1}" stroke="{}"/>"#,
            chart.width - PLOT_RIGHT,
            theme.grid,
        );

        let label_every = columns.len().div_ceil(31).max(1);
        for (index, column) in columns.iter().enumerate() {
            let center = column.x + column.width / 2.0;
            for segment in &column.segments {
                let _ = write!(
                    svg,
                    r#"<rect x="{:.1}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}"><title>{}</title></rect>"#,
                    column.x,
                    segment.y,
                    column.width,
                    segment.height,
                    segment.color,
                    escape_html(&segment.tooltip),
                );
            }
            if column.total > 0 {
                let top = column.segments.last().map(|segment| segment.y).unwrap_or(baseline);
                let _ = write!(
                    svg,
                    r#"<text x="{center:.1}" y="{:.1}" fill="{}" font-size="10" text-anchor="middle">{}</text>"#,
                    top - 4.0,
                    theme.text,
                    column.total_label,
                );
            }
            if index % label_every == 0 {
                let _ = write!(
                    svg,
                    r#"<text x="{center:.1}" y="{:.1}" fill="{}" font-size="10" text-anchor="end" transform="rotate(-45 {center:.1} {:.1})">{}</text>"#,
                    baseline + 14.0,
                    theme.muted_text,
                    baseline + 14.0,
                    escape_html(&column.label),
                );
            }
        }

        let mut x = PLOT_LEFT;
        let y = chart.height - 12.0;
        for entry in legend {
            let _ = write!(
                svg,
                r#"<rect x="{x:.1}" y="{:.1}" width="10" height="10" fill="{}"/><text x="{:.1}" y="{y:.1}" fill="{}" font-size="11">{}</text>"#,
                y - 9.0,
                entry.color,
                x + 14.0,
                theme.text,
                escape_html(&entry.name),
            );
            x += 24.0 + entry.name.chars().count() as f64 * 6.5;
        }
    }

    fn bars_svg(&self, svg: &mut String, bars: &[Bar]) {
        let theme = &self.theme;
        for bar in bars {
            let middle = bar.y + bar.height / 2.0 + 4.0;
            let _ = write!(
                svg,
                r#"<text x="{:.1}" y="{middle:.1}" fill="{}" font-size="11" text-anchor="end">{}</text><rect x="{BAR_LABEL_WIDTH}" y="{:.1}" width="{:.1}" height="{:.1}" fill="{}" rx="3"><title>{}: {}</title></rect><text x="{:.1}" y="{middle:.1}" fill="{}" font-size="11">{}</text>"#,
                BAR_LABEL_WIDTH - 8.0,
                theme.text,
                escape_html(&bar.label),
                bar.y,
                bar.width,
                bar.height,
                bar.color,
                escape_html(&bar.label),
                bar.value_label,
                BAR_LABEL_WIDTH + bar.width + 6.0,
                theme.text,
                bar.value_label,
            );
        }
    }

    fn pie_svg(&self, svg: &mut String, chart: &RenderedChart, slices: &[Slice]) {
        let theme = &self.theme;
        let cx = chart.width / 2.0;
        let cy = (chart.height + PLOT_TOP) / 2.0;
        let radius = (chart.height - PLOT_TOP) / 2.0 - 48.0;

        for slice in slices {
            let tooltip = format!(
                "{}: {} ({})",
                slice.label,
                format_count(slice.value),
                format_percent(slice.share)
            );
            if slices.len() == 1 {
                let _ = write!(
                    svg,
                    r#"<circle cx="{cx:.1}" cy="{cy:.1}" r="{radius:.1}" fill="{}"><title>{}</title></circle>"#,
                    slice.color,
                    escape_html(&tooltip),
                );
            } else {
                let (x1, y1) = polar(cx, cy, radius, slice.start_angle);
                let (x2, y2) = polar(cx, cy, radius, slice.end_angle);
                let large_arc = u8::from(slice.end_angle - slice.start_angle > PI);
                let _ = write!(
                    svg,
                    r#"<path d="M {cx:.1} {cy:.1} L {x1:.1} {y1:.1} A {radius:.1} {radius:.1} 0 {large_arc} 1 {x2:.1} {y2:.1} Z" fill="{}" stroke="{}"><title>{}</title></path>"#,
                    slice.color,
                    theme.surface,
                    escape_html(&tooltip),
                );
            }

            let middle = (slice.start_angle + slice.end_angle) / 2.0;
            if let Some(percent) = &slice.percent_label {
                let (lx, ly) = polar(cx, cy, radius * 0.6, middle);
                let _ = write!(
                    svg,
                    r#"<text x="{lx:.1}" y="{ly:.1}" fill="{}" font-size="12" text-anchor="middle">{percent}</text>"#,
                    theme.background,
                );
            }
            let (ox, oy) = polar(cx, cy, radius + 18.0, middle);
            let anchor = if ox >= cx { "start" } else { "end" };
            let _ = write!(
                svg,
                r#"<text x="{ox:.1}" y="{oy:.1}" fill="{}" font-size="12" text-anchor="{anchor}">{}</text>"#,
                theme.text,
                escape_html(&slice.label),
            );
        }
    }
}

fn polar(cx: f64, cy: f64, radius: f64, angle: f64) -> (f64, f64) {
    (cx + radius * angle.cos(), cy + radius * angle.sin())
}

fn parse_hex(color: &str) -> Option<(u8, u8, u8)> {
    let hex = color.strip_prefix('#')?;
    if hex.len() != 6 {
        return None;
    }
    let channel = |range: std::ops::Range<usize>| u8::from_str_radix(hex.get(range)?, 16).ok();
    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// Linear blend between two `#rrggbb` colors; `ratio` is clamped to 0..=1.
pub fn interpolate_color(from: &str, to: &str, ratio: f64) -> String {
    let (Some(a), Some(b)) = (parse_hex(from), parse_hex(to)) else {
        return from.to_string();
    };
    let ratio = ratio.clamp(0.0, 1.0);
    let mix = |x: u8, y: u8| (f64::from(x) + (f64::from(y) - f64::from(x)) * ratio) as u8;
    format!("#{:02x}{:02x}{:02x}", mix(a.0, b.0), mix(a.1, b.1), mix(a.2, b.2))
}
