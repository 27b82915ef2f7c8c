//! Record store: the loaded batch plus grouping, filtering and ordering.
//!
//! Records are addressed by `RecordId` (their batch index). Reloading
//! replaces the whole batch, so no cache survives a reload.

use crate::error::{Result, TraceError};
use crate::log::{Level, LogParser, LogRecord, RecordId};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

static ERROR_TERMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(error|exception|failed|failure|traceback|panic(?:ked)?|fatal)\b")
        .expect("error terms pattern")
});

#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<LogRecord>,
}

/// Records sharing a span path or target.
#[derive(Debug, Clone, Serialize)]
pub struct RecordGroup {
    pub key: String,
    pub records: Vec<RecordId>,
    /// Most severe level in the group.
    pub max_level: Level,
}

impl RecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the batch. On `BatchEmpty` the previous batch is kept.
    pub fn load(&mut self, parser: &LogParser, text: &str) -> Result<usize> {
        let records = parser.parse_batch(text)?;
        info!(records = records.len(), "loaded log batch");
        self.records = records;
        Ok(self.records.len())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, id: RecordId) -> Result<&LogRecord> {
        self.records.get(id.0).ok_or(TraceError::UnknownRecord(id))
    }

    pub fn get_mut(&mut self, id: RecordId) -> Result<&mut LogRecord> {
        self.records
            .get_mut(id.0)
            .ok_or(TraceError::UnknownRecord(id))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RecordId, &LogRecord)> {
        self.records
            .iter()
            .enumerate()
            .map(|(i, r)| (RecordId(i), r))
    }

    /// Records at or above `min` severity, in batch order.
    pub fn at_least(&self, min: Level) -> Vec<RecordId> {
        self.iter()
            .filter(|(_, r)| r.level >= min)
            .map(|(id, _)| id)
            .collect()
    }

    /// Batch order stably sorted by timestamp. ISO-8601 strings order
    /// lexicographically; records without one sort first.
    pub fn chronological(&self) -> Vec<RecordId> {
        let mut ids: Vec<RecordId> = self.iter().map(|(id, _)| id).collect();
        ids.sort_by(|a, b| {
            self.records[a.0]
                .timestamp
                .cmp(&self.records[b.0].timestamp)
        });
        ids
    }

    /// Groups keyed by span path (or target), records in batch order.
    pub fn groups(&self) -> Vec<RecordGroup> {
        let mut by_key: BTreeMap<String, Vec<RecordId>> = BTreeMap::new();
        for (id, r) in self.iter() {
            by_key.entry(r.group_key()).or_default().push(id);
        }

        by_key
            .into_iter()
            .map(|(key, records)| {
                let max_level = records
                    .iter()
                    .map(|id| self.records[id.0].level)
                    .max()
                    .unwrap_or(Level::Trace);
                RecordGroup {
                    key,
                    records,
                    max_level,
                }
            })
            .collect()
    }

    /// Likely starting points for an investigation: ERROR records and any
    /// record whose message names a failure.
    pub fn error_records(&self) -> Vec<RecordId> {
        self.iter()
            .filter(|(_, r)| r.level == Level::Error || ERROR_TERMS_RE.is_match(&r.message))
            .map(|(id, _)| id)
            .collect()
    }

    /// Cleaned text of every record, in batch order.
    pub fn lines(&self) -> Vec<String> {
        self.records
            .iter()
            .map(|r| crate::log::strip_ansi(&r.raw_text).trim().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BATCH: &str = "\
2025-04-20T03:16:52Z INFO api::orders: order placed
2025-04-20T03:16:50Z DEBUG loop:tick{n=1}: polled
2025-04-20T03:16:51Z ERROR api::orders: payment declined
not a structured line, request failed
2025-04-20T03:16:53Z DEBUG loop:tick{n=2}: polled";

    fn store() -> RecordStore {
        let mut s = RecordStore::new();
        s.load(&LogParser::new(), BATCH).unwrap();
        s
    }

    #[test]
    fn severity_filter() {
        assert_eq!(store().at_least(Level::Info), vec![RecordId(0), RecordId(2), RecordId(3)]);
    }

    #[test]
    fn chronological_order_is_stable() {
        let ids = store().chronological();
        assert_eq!(
            ids,
            vec![RecordId(3), RecordId(1), RecordId(2), RecordId(0), RecordId(4)]
        );
    }

    #[test]
    fn groups_by_span_path_and_target() {
        let groups = store().groups();
        let keys: Vec<_> = groups.iter().map(|g| g.key.as_str()).collect();
        assert_eq!(keys, vec!["api::orders", "loop:tick", "root"]);
        assert_eq!(groups[0].records, vec![RecordId(0), RecordId(2)]);
        assert_eq!(groups[0].max_level, Level::Error);
    }

    #[test]
    fn error_records_include_failure_messages() {
        assert_eq!(store().error_records(), vec![RecordId(2), RecordId(3)]);
    }

    #[test]
    fn empty_reload_keeps_previous_batch() {
        let mut s = store();
        assert!(matches!(
            s.load(&LogParser::new(), "\n\n"),
            Err(TraceError::BatchEmpty)
        ));
        assert_eq!(s.len(), 5);
    }

    #[test]
    fn unknown_record_is_an_error() {
        assert!(matches!(
            store().get(RecordId(99)),
            Err(TraceError::UnknownRecord(RecordId(99)))
        ));
    }
}
