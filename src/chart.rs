use anyhow::{anyhow, Result};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, SecondsFormat, Utc};
use plotters::prelude::*;

use crate::stats_log::LogEntry;

const WIDTH: u32 = 960;
const HEIGHT: u32 = 540;
const LABEL_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Visible time range. Without an end the chart runs to the last entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartWindow {
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl ChartWindow {
    /// Default start is the last 24 hours.
    pub fn resolve(
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Self {
        ChartWindow {
            start: start.unwrap_or(now - Duration::days(1)),
            end,
        }
    }

    fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && self.end.map_or(true, |end| at <= end)
    }
}

/// Quick-pick link shown above the chart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preset {
    pub label: &'static str,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
}

impl Preset {
    pub fn query(&self) -> String {
        match self.end {
            Some(end) => format!("?start={}&end={}", query_time(self.start), query_time(end)),
            None => format!("?start={}", query_time(self.start)),
        }
    }
}

// `Z` suffix keeps the value free of `+`, which would decode as a space
fn query_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn midnight(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

fn first_of_month(year: i32, month: u32) -> NaiveDate {
    let (year, month) = if month > 12 { (year + 1, 1) } else { (year, month) };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(NaiveDate::MIN)
}

/// Calendar ranges around `now`, plus everything since the first entry.
pub fn presets(now: DateTime<Utc>, first: Option<DateTime<Utc>>) -> Vec<Preset> {
    let today = now.date_naive();
    let start_of_day = midnight(today);
    let start_of_week =
        start_of_day - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let month = first_of_month(today.year(), today.month());
    let next_month = first_of_month(today.year(), today.month() + 1);
    let year = first_of_month(today.year(), 1);
    let next_year = first_of_month(today.year() + 1, 1);

    vec![
        Preset {
            label: "24h",
            start: now - Duration::days(1),
            end: Some(now),
        },
        Preset {
            label: "Heute",
            start: start_of_day,
            end: Some(start_of_day + Duration::days(1)),
        },
        Preset {
            label: "Diese Woche",
            start: start_of_week,
            end: Some(start_of_week + Duration::days(7)),
        },
        Preset {
            label: "Dieser Monat",
            start: midnight(month),
            end: Some(midnight(next_month)),
        },
        Preset {
            label: "Dieses Jahr",
            start: midnight(year),
            end: Some(midnight(next_year)),
        },
        Preset {
            label: "Seit Anbeginn der Zeit",
            start: first.unwrap_or(now - Duration::days(1)),
            end: None,
        },
    ]
}

fn draw_err<E: std::fmt::Display>(e: E) -> anyhow::Error {
    anyhow!("Chart drawing failed: {}", e)
}

/// Dual-axis line chart: minutes on the left (blue), episodes on the right (red).
pub fn render_svg(entries: &[LogEntry], window: &ChartWindow) -> Result<String> {
    let visible: Vec<&LogEntry> = entries.iter().filter(|e| window.contains(e.at)).collect();

    let x_end = window
        .end
        .or_else(|| visible.last().map(|e| e.at))
        .filter(|end| *end > window.start)
        .unwrap_or(window.start + Duration::hours(1));
    let x_range = window.start..x_end;

    let max_minutes = visible.iter().map(|e| e.minutes).max().unwrap_or(0);
    let max_episodes = visible.iter().map(|e| e.episodes).max().unwrap_or(0);

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(draw_err)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("Podcastminuten", ("sans-serif", 22))
            .margin(12)
            .x_label_area_size(70)
            .y_label_area_size(60)
            .right_y_label_area_size(60)
            .build_cartesian_2d(x_range.clone(), 0u64..headroom(max_minutes))
            .map_err(draw_err)?
            .set_secondary_coord(x_range, 0u64..headroom(max_episodes));

        chart
            .configure_mesh()
            .x_labels(6)
            .x_label_formatter(&|t: &DateTime<Utc>| t.format(LABEL_FORMAT).to_string())
            .x_desc("Datum")
            .y_desc("Minuten")
            .draw()
            .map_err(draw_err)?;
        chart
            .configure_secondary_axes()
            .y_desc("Episoden")
            .draw()
            .map_err(draw_err)?;

        chart
            .draw_series(LineSeries::new(
                visible.iter().map(|e| (e.at, e.minutes)),
                &BLUE,
            ))
            .map_err(draw_err)?;
        chart
            .draw_secondary_series(LineSeries::new(
                visible.iter().map(|e| (e.at, e.episodes)),
                &RED,
            ))
            .map_err(draw_err)?;

        root.present().map_err(draw_err)?;
    }

    Ok(svg)
}

fn headroom(max: u64) -> u64 {
    max + max / 20 + 1
}

/// Full page: preset links above the inline chart.
pub fn render_page(entries: &[LogEntry], window: &ChartWindow, now: DateTime<Utc>) -> Result<String> {
    let svg = render_svg(entries, window)?;
    let links: Vec<String> = presets(now, entries.first().map(|e| e.at))
        .iter()
        .map(|p| format!("        <a href=\"{}\">{}</a>", p.query(), p.label))
        .collect();

    Ok(format!(
        "<html><body>\n    <h1>Podcastzeiten</h1>\n    <p>\n{}\n    </p>\n    {}\n</body></html>\n",
        links.join("\n"),
        svg
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, h, 0, 0).unwrap()
    }

    fn entry(d: u32, h: u32, episodes: u64, minutes: u64) -> LogEntry {
        LogEntry {
            at: at(d, h),
            episodes,
            minutes,
        }
    }

    #[test]
    fn default_window_is_last_day() {
        let now = at(9, 12);
        let w = ChartWindow::resolve(None, None, now);
        assert_eq!(w.start, at(8, 12));
        assert_eq!(w.end, None);
    }

    #[test]
    fn presets_follow_the_calendar() {
        // 2024-03-13 is a Wednesday
        let now = at(13, 15);
        let p = presets(now, Some(at(1, 6)));
        let by_label = |l: &str| p.iter().find(|x| x.label == l).unwrap().clone();

        assert_eq!(by_label("Heute").start, at(13, 0));
        assert_eq!(by_label("Heute").end, Some(at(14, 0)));
        assert_eq!(by_label("Diese Woche").start, at(11, 0));
        assert_eq!(by_label("Diese Woche").end, Some(at(18, 0)));
        assert_eq!(by_label("Dieser Monat").start, at(1, 0));
        assert_eq!(
            by_label("Dieser Monat").end,
            Some(Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(
            by_label("Dieses Jahr").end,
            Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap())
        );
        assert_eq!(by_label("Seit Anbeginn der Zeit").start, at(1, 6));
    }

    #[test]
    fn december_rolls_into_next_year() {
        let now = Utc.with_ymd_and_hms(2023, 12, 31, 23, 0, 0).unwrap();
        let p = presets(now, None);
        assert_eq!(
            p[3].end,
            Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn preset_query_has_no_plus_sign() {
        let p = &presets(at(13, 15), None)[0];
        assert_eq!(p.query(), "?start=2024-03-12T15:00:00Z&end=2024-03-13T15:00:00Z");
    }

    #[test]
    fn renders_svg_with_axes() {
        let entries = vec![entry(8, 10, 12, 600), entry(8, 16, 10, 480), entry(9, 8, 14, 700)];
        let window = ChartWindow::resolve(Some(at(8, 0)), None, at(9, 12));
        let svg = render_svg(&entries, &window).unwrap();

        assert!(svg.contains("<svg"));
        assert!(svg.contains("Podcastminuten"));
        assert!(svg.contains("Minuten"));
        assert!(svg.contains("Episoden"));
        assert!(svg.contains("<polyline"));
    }

    #[test]
    fn empty_window_still_renders() {
        let window = ChartWindow::resolve(None, None, at(9, 12));
        let svg = render_svg(&[], &window).unwrap();
        assert!(svg.contains("Datum"));
    }

    #[test]
    fn page_links_every_preset() {
        let entries = vec![entry(8, 10, 12, 600)];
        let window = ChartWindow::resolve(Some(at(8, 0)), Some(at(9, 0)), at(9, 12));
        let page = render_page(&entries, &window, at(9, 12)).unwrap();
        assert_eq!(page.matches("<a href=\"?start=").count(), 6);
        assert!(page.contains("<svg"));
    }
}
