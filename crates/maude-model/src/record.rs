use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp format for `extraction_timestamp`: local time, microseconds, no offset.
pub const EXTRACTION_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

/// An MDR report key as it appears in a MAUDE detail-page URL (`MDRFOI__ID=...`).
///
/// The value is kept verbatim; the openFDA API queries it as `mdr_report_key`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MdrId(String);

impl MdrId {
    /// Returns `None` for an empty value. Anything else is kept verbatim.
    pub fn new(raw: impl Into<String>) -> Option<Self> {
        let raw = raw.into();
        if raw.is_empty() {
            None
        } else {
            Some(Self(raw))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MdrId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One record retrieved from the device-event API, with extraction metadata.
///
/// Field order here is the field order in the JSON output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedRecord {
    /// Local time the record was fetched (e.g., "2025-03-04T09:15:27.123456").
    pub extraction_timestamp: String,
    /// The identifier that was requested.
    pub mdrfoi_id: String,
    /// First element of the API's `results` array, untouched.
    pub raw_data: serde_json::Value,
}

impl ExtractedRecord {
    /// Wrap a raw API result, stamping it with the current local time.
    pub fn new(id: &MdrId, raw_data: serde_json::Value) -> Self {
        Self {
            extraction_timestamp: chrono::Local::now()
                .format(EXTRACTION_TIME_FORMAT)
                .to_string(),
            mdrfoi_id: id.to_string(),
            raw_data,
        }
    }
}

/// Counts for a finished batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionSummary {
    pub requested: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl ExtractionSummary {
    pub fn record_success(&mut self) {
        self.requested += 1;
        self.succeeded += 1;
    }

    pub fn record_failure(&mut self) {
        self.requested += 1;
        self.failed += 1;
    }

    /// Percentage of requested identifiers that produced a record.
    pub fn success_rate(&self) -> f64 {
        if self.requested == 0 {
            return 0.0;
        }
        self.succeeded as f64 / self.requested as f64 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mdr_id_rejects_empty_only() {
        assert!(MdrId::new("").is_none());
        assert_eq!(MdrId::new(" 12345").unwrap().as_str(), " 12345");
        assert_eq!(MdrId::new("12345").unwrap().to_string(), "12345");
    }

    #[test]
    fn test_record_field_order() {
        let id = MdrId::new("9876543").unwrap();
        let record = ExtractedRecord::new(&id, json!({"report_number": "3001-2024-0001"}));
        let json = serde_json::to_string(&record).unwrap();

        let ts = json.find("extraction_timestamp").unwrap();
        let mid = json.find("mdrfoi_id").unwrap();
        let raw = json.find("raw_data").unwrap();
        assert!(ts < mid && mid < raw);
        assert!(json.contains(r#""mdrfoi_id":"9876543""#));
    }

    #[test]
    fn test_timestamp_format() {
        let id = MdrId::new("1").unwrap();
        let record = ExtractedRecord::new(&id, json!({}));
        let parsed = chrono::NaiveDateTime::parse_from_str(
            &record.extraction_timestamp,
            EXTRACTION_TIME_FORMAT,
        );
        assert!(parsed.is_ok(), "unexpected timestamp {}", record.extraction_timestamp);
        // microsecond precision, no offset
        let frac = record.extraction_timestamp.rsplit('.').next().unwrap();
        assert_eq!(frac.len(), 6);
    }

    #[test]
    fn test_summary_rate() {
        let mut summary = ExtractionSummary::default();
        assert_eq!(summary.success_rate(), 0.0);

        summary.record_success();
        summary.record_success();
        summary.record_success();
        summary.record_failure();
        assert_eq!(summary.requested, 4);
        assert_eq!(summary.succeeded + summary.failed, summary.requested);
        assert!((summary.success_rate() - 75.0).abs() < f64::EPSILON);
    }
}
