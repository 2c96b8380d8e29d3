//! Per-timestep efficacy reports and their shared history.

use std::sync::Arc;

use chrono::{Local, TimeZone, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::sim::message::Timestamp;

/// Row timestamp layout: `MM/DD/YY HH:MM`.
pub const DATE_TIME_FORMAT: &str = "%m/%d/%y %H:%M";

/// Time zone used to render row timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clock {
    #[default]
    Local,
    Utc,
}

impl Clock {
    pub fn from_local_time(local_time: bool) -> Self {
        if local_time { Clock::Local } else { Clock::Utc }
    }
}

/// Formats a simulation timestamp for CSV rows and published maps.
///
/// Falls back to the raw seconds when the instant cannot be represented.
pub fn format_timestamp(timestamp: Timestamp, clock: Clock) -> String {
    let secs = timestamp.seconds();
    let formatted = match clock {
        Clock::Local => Local
            .timestamp_opt(secs, 0)
            .earliest()
            .map(|t| t.format(DATE_TIME_FORMAT).to_string()),
        Clock::Utc => Utc
            .timestamp_opt(secs, 0)
            .earliest()
            .map(|t| t.format(DATE_TIME_FORMAT).to_string()),
    };
    formatted.unwrap_or_else(|| timestamp.to_string())
}

/// One value per section column; `None` renders as an empty cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub cells: Vec<Option<f64>>,
}

impl ReportRow {
    /// Row of `width` empty cells.
    pub fn empty(width: usize) -> Self {
        Self {
            cells: vec![None; width],
        }
    }

    /// JSON object with the formatted `timestamp` plus every filled cell.
    pub fn to_json_map(&self, sections: &[String], date_time: &str) -> Map<String, Value> {
        let mut map = Map::new();
        map.insert("timestamp".to_string(), Value::from(date_time));
        for (section, cell) in sections.iter().zip(&self.cells) {
            if let Some(value) = cell {
                map.insert(section.clone(), Value::from(*value));
            }
        }
        map
    }
}

/// Efficacy, load, and DER rows of one simulation timestep.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimestepReport {
    pub timestamp: Timestamp,
    pub date_time: String,
    pub efficacy: ReportRow,
    pub load: ReportRow,
    pub der: ReportRow,
}

impl TimestepReport {
    pub fn new(timestamp: Timestamp, date_time: String, width: usize) -> Self {
        Self {
            timestamp,
            date_time,
            efficacy: ReportRow::empty(width),
            load: ReportRow::empty(width),
            der: ReportRow::empty(width),
        }
    }
}

/// Shared, append-only record of processed timesteps.
#[derive(Debug, Clone, Default)]
pub struct ReportHistory {
    inner: Arc<RwLock<Vec<TimestepReport>>>,
}

impl ReportHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, report: TimestepReport) {
        self.inner.write().push(report);
    }

    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    pub fn latest(&self) -> Option<TimestepReport> {
        self.inner.read().last().cloned()
    }

    /// Reports whose timestamp lies in `from..=to`.
    pub fn range(&self, from: Timestamp, to: Timestamp) -> Vec<TimestepReport> {
        self.inner
            .read()
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect()
    }
}
