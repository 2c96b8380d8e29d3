//! API response and query types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::report::{ReportRow, TimestepReport};

/// Run identity, column layout, and the most recent report.
#[derive(Debug, Serialize)]
pub struct StateResponse {
    pub simulation_id: String,
    /// Section columns in CSV order.
    pub sections: Vec<String>,
    /// Number of timesteps processed so far.
    pub report_count: usize,
    /// Latest report, `null` before the first timestep.
    pub latest: Option<ReportRecord>,
}

/// One timestep keyed by section name.
///
/// Sections without loads map to `null`, matching the empty CSV cells.
#[derive(Debug, Serialize)]
pub struct ReportRecord {
    pub timestamp: i64,
    pub date_time: String,
    pub efficacy: BTreeMap<String, Option<f64>>,
    pub load: BTreeMap<String, Option<f64>>,
    pub der: BTreeMap<String, Option<f64>>,
}

impl ReportRecord {
    pub fn new(report: &TimestepReport, sections: &[String]) -> Self {
        Self {
            timestamp: report.timestamp.seconds(),
            date_time: report.date_time.clone(),
            efficacy: by_section(&report.efficacy, sections),
            load: by_section(&report.load, sections),
            der: by_section(&report.der, sections),
        }
    }
}

fn by_section(row: &ReportRow, sections: &[String]) -> BTreeMap<String, Option<f64>> {
    sections.iter().cloned().zip(row.cells.iter().copied()).collect()
}

/// Optional range query parameters for the efficacy endpoint.
#[derive(Debug, Deserialize)]
pub struct EfficacyQuery {
    /// Start timestamp in seconds (inclusive).
    pub from: Option<i64>,
    /// End timestamp in seconds (inclusive).
    pub to: Option<i64>,
}

/// Error response body for 400-class errors.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::message::Timestamp;

    #[test]
    fn record_maps_cells_to_sections() {
        let mut report = TimestepReport::new(Timestamp(60), "01/01/70 00:01".to_string(), 2);
        report.efficacy.cells = vec![Some(0.8), None];
        report.load.cells = vec![Some(100.0), None];
        report.der.cells = vec![Some(-20.0), None];
        let sections = vec!["sw1".to_string(), "sw2".to_string()];

        let record = ReportRecord::new(&report, &sections);
        assert_eq!(record.timestamp, 60);
        assert_eq!(record.efficacy["sw1"], Some(0.8));
        assert_eq!(record.efficacy["sw2"], None);
        assert_eq!(record.der["sw1"], Some(-20.0));
        assert_eq!(record.load.len(), 2);
    }
}
