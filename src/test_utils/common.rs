use std::collections::HashMap;
use std::collections::HashSet;

use parking_lot::Mutex;

use crate::ActionLogger;
use crate::ActionRecord;
use crate::LogOperation;

/// Keeps every record so tests can assert on what was logged
#[derive(Debug, Default)]
pub struct RecordingActionLogger {
    records: Mutex<Vec<ActionRecord>>,
}

impl RecordingActionLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        self.records.lock().clone()
    }

    /// `(operation, entity name)` pairs in logging order
    pub fn operations(&self) -> Vec<(LogOperation, String)> {
        self.records
            .lock()
            .iter()
            .map(|r| (r.operation, r.entity_name.clone()))
            .collect()
    }
}

impl ActionLogger for RecordingActionLogger {
    fn log_action(
        &self,
        record: ActionRecord,
    ) {
        self.records.lock().push(record);
    }
}

pub fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn names(list: &[&str]) -> HashSet<String> {
    list.iter().map(|n| n.to_string()).collect()
}
