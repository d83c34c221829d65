use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::parser::Totals;

/// One line of the stats log: `timestamp;episodes;minutes`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub episodes: u64,
    pub minutes: u64,
}

pub fn format_line(at: DateTime<Utc>, totals: &Totals) -> String {
    format!(
        "{};{};{}\n",
        at.to_rfc3339_opts(SecondsFormat::Micros, false),
        totals.episodes,
        totals.minutes
    )
}

/// Append one line. Earlier lines are never touched.
pub fn append(path: &Path, at: DateTime<Utc>, totals: &Totals) -> Result<()> {
    let to_err = |source| Error::LogAppend {
        path: path.display().to_string(),
        source,
    };

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(to_err)?;
    file.write_all(format_line(at, totals).as_bytes())
        .map_err(to_err)?;
    Ok(())
}

/// Read every parseable line, oldest first as written. A missing log is empty.
pub fn read(path: &Path) -> Result<Vec<LogEntry>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(Error::LogRead {
                path: path.display().to_string(),
                source,
            })
        }
    };

    let entries = content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .filter_map(|(i, line)| {
            let entry = parse_line(line);
            if entry.is_none() {
                debug!("Skipping stats log line {}: {:?}", i + 1, line);
            }
            entry
        })
        .collect();
    Ok(entries)
}

pub fn parse_line(line: &str) -> Option<LogEntry> {
    let mut cols = line.trim().split(';');
    let at = parse_timestamp(cols.next()?)?;
    let episodes = parse_count(cols.next()?)?;
    let minutes = parse_count(cols.next()?)?;
    Some(LogEntry {
        at,
        episodes,
        minutes,
    })
}

/// RFC 3339, or a naive ISO-8601 date-time taken as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// Older logs carry thousands separators
fn parse_count(s: &str) -> Option<u64> {
    s.trim().replace(',', "").parse().ok()
}
