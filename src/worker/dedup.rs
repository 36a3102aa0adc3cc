use std::collections::HashMap;

use crate::ledger::SubmissionRecord;

/// Task ids this process has successfully submitted, with their receipts.
///
/// Lives for one process lifetime only; nothing is persisted. An id enters
/// the set only through [`ProcessedSet::record`], which takes a
/// [`SubmissionRecord`] and therefore a confirmed transaction reference.
#[derive(Debug, Default)]
pub struct ProcessedSet {
    records: HashMap<u64, SubmissionRecord>,
}

impl ProcessedSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, task_id: u64) -> bool {
        self.records.contains_key(&task_id)
    }

    pub fn get(&self, task_id: u64) -> Option<&SubmissionRecord> {
        self.records.get(&task_id)
    }

    /// Record a submission. Returns false (and keeps the first receipt) if
    /// the id was already present.
    pub fn record(&mut self, record: SubmissionRecord) -> bool {
        if record.tx_hash.is_empty() || self.records.contains_key(&record.task_id) {
            return false;
        }
        self.records.insert(record.task_id, record);
        true
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// All receipts ordered by task id.
    pub fn records(&self) -> Vec<SubmissionRecord> {
        let mut records: Vec<SubmissionRecord> = self.records.values().cloned().collect();
        records.sort_by_key(|r| r.task_id);
        records
    }
}
