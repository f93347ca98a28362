//! Per-record-type origin priority lists

use crate::records::{capabilities, RecordType};
use std::collections::HashMap;

/// Ordered origin ids per record type, highest priority first
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OriginPriorities {
    lists: HashMap<RecordType, Vec<i64>>,
}

impl OriginPriorities {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the list for a record type, dropping duplicate ids
    pub fn set(&mut self, record_type: RecordType, origin_ids: Vec<i64>) {
        let mut list = Vec::with_capacity(origin_ids.len());
        for id in origin_ids {
            if !list.contains(&id) {
                list.push(id);
            }
        }
        self.lists.insert(record_type, list);
    }

    /// Priority list for a record type; empty when none is configured
    pub fn get(&self, record_type: RecordType) -> &[i64] {
        self.lists
            .get(&record_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Append an origin at the lowest priority if it is not listed yet
    ///
    /// Only record types with priority-resolved aggregates keep lists.
    /// Returns true when the list changed.
    pub fn append_if_absent(&mut self, record_type: RecordType, origin_id: i64) -> bool {
        if !capabilities(record_type).priority_sum {
            return false;
        }
        let list = self.lists.entry(record_type).or_default();
        if list.contains(&origin_id) {
            return false;
        }
        list.push(origin_id);
        true
    }

    /// Rank of an origin: its list position, or the list length when absent
    pub fn rank(list: &[i64], origin_id: i64) -> usize {
        list.iter()
            .position(|id| *id == origin_id)
            .unwrap_or(list.len())
    }
}
