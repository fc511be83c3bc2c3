//! In-memory telemetry source for testing and offline replay

use crate::processing::telemetry::ProbeRecord;
use crate::telemetry::{check_window, TelemetryError, TelemetryResult, TelemetrySource};

/// Serves a fixed set of probe records
pub struct MockTelemetrySource {
    id: String,
    records: Vec<ProbeRecord>,
    connected: bool,
    fetch_count: usize,
}

impl MockTelemetrySource {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            records: Vec::new(),
            connected: true,
            fetch_count: 0,
        }
    }

    pub fn with_records(mut self, records: Vec<ProbeRecord>) -> Self {
        self.records = records;
        self
    }

    /// Decode a JSON array of probe records
    pub fn from_json_str(id: impl Into<String>, json: &str) -> TelemetryResult<Self> {
        let records: Vec<ProbeRecord> = serde_json::from_str(json).map_err(|e| TelemetryError::InvalidRecord {
            details: e.to_string(),
        })?;
        Ok(Self::new(id).with_records(records))
    }

    pub fn add_record(&mut self, record: ProbeRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[ProbeRecord] {
        &self.records
    }

    /// Simulate connection loss
    pub fn disconnect(&mut self) {
        self.connected = false;
    }

    pub fn reconnect(&mut self) {
        self.connected = true;
    }

    /// Number of successful fetches served
    pub fn fetch_count(&self) -> usize {
        self.fetch_count
    }
}

impl TelemetrySource for MockTelemetrySource {
    fn fetch(&mut self, start_ms: u64, end_ms: u64) -> TelemetryResult<Vec<ProbeRecord>> {
        if !self.connected {
            return Err(TelemetryError::ConnectionLost {
                source_id: self.id.clone(),
            });
        }
        check_window(start_ms, end_ms)?;

        self.fetch_count += 1;
        Ok(self
            .records
            .iter()
            .filter(|r| r.first_seen <= end_ms && r.last_seen >= start_ms)
            .cloned()
            .collect())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}
