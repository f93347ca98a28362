//! Priority-based reconciliation of overlapping interval records
//!
//! Each group is cut at every record boundary that falls inside it. Every
//! resulting sub-window belongs to exactly one record: the covering record
//! whose origin ranks highest, ties going to the record seen first. A SUM
//! takes the winner's value pro rata to the share of its interval that the
//! sub-window represents, so an origin keeps the parts of its interval that
//! no higher-ranked origin covers.
//!
//! ```text
//! A (rank 0):  |======|
//! B (rank 1):      |=========|
//! attributed:  |AAAAAA|BBBBBB|
//! ```

use crate::aggregation::error::AggregationResult;
use crate::aggregation::priority_list::OriginPriorities;
use crate::aggregation::types::PriorityAggregationParams;
use crate::records::{read_zone_offset, ZoneOffset, APP_INFO_ID_COLUMN};
use crate::storage::Row;
use std::collections::BTreeMap;

/// Resolved value of one group before it is shaped into a result
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GroupValue {
    pub value: f64,
    pub zone_offset: Option<ZoneOffset>,
}

#[derive(Debug, Clone, Copy)]
struct Contribution {
    seq: usize,
    rank: usize,
    start: i64,
    end: i64,
    value: f64,
    zone_offset: ZoneOffset,
}

impl Contribution {
    fn len(&self) -> i64 {
        self.end - self.start
    }

    fn covers(&self, from: i64, to: i64) -> bool {
        self.start <= from && self.end >= to
    }
}

/// Per-record bookkeeping inside one group
#[derive(Debug, Default, Clone, Copy)]
struct Attribution {
    millis: i64,
    share: f64,
    won: bool,
}

pub struct PriorityRecordsAggregator<'a> {
    group_splits: &'a [i64],
    priority_list: &'a [i64],
    params: PriorityAggregationParams,
    zone_offset_column: &'a str,
}

impl<'a> PriorityRecordsAggregator<'a> {
    pub fn new(
        group_splits: &'a [i64],
        priority_list: &'a [i64],
        params: PriorityAggregationParams,
        zone_offset_column: &'a str,
    ) -> Self {
        Self {
            group_splits,
            priority_list,
            params,
            zone_offset_column,
        }
    }

    /// Resolve time-ordered raw rows into one value per non-empty group
    pub fn calculate(&self, rows: &[Row]) -> AggregationResult<BTreeMap<usize, GroupValue>> {
        let contributions = self.read_contributions(rows)?;
        let mut results = BTreeMap::new();

        for (group, window) in self.group_splits.windows(2).enumerate() {
            if let Some(value) = self.resolve_group(&contributions, window[0], window[1]) {
                results.insert(group, value);
            }
        }

        tracing::debug!(
            rows = rows.len(),
            groups = results.len(),
            "Resolved priority aggregation"
        );
        Ok(results)
    }

    fn read_contributions(&self, rows: &[Row]) -> AggregationResult<Vec<Contribution>> {
        let mut contributions = Vec::with_capacity(rows.len());
        for (seq, row) in rows.iter().enumerate() {
            let origin = row.get_i64(APP_INFO_ID_COLUMN)?;
            let zone_offset = read_zone_offset(row, self.zone_offset_column)?;
            contributions.push(Contribution {
                seq,
                rank: OriginPriorities::rank(self.priority_list, origin),
                start: row.get_i64(self.params.start_time_column)?,
                end: row.get_i64(self.params.end_time_column)?,
                value: row.get_f64(self.params.value_column)?,
                zone_offset,
            });
        }
        Ok(contributions)
    }

    fn resolve_group(
        &self,
        contributions: &[Contribution],
        group_start: i64,
        group_end: i64,
    ) -> Option<GroupValue> {
        let members: Vec<&Contribution> = contributions
            .iter()
            .filter(|c| {
                if c.len() == 0 {
                    c.start >= group_start && c.start < group_end
                } else {
                    c.start < group_end && c.end > group_start
                }
            })
            .collect();
        if members.is_empty() {
            return None;
        }

        let mut boundaries = vec![group_start, group_end];
        for member in &members {
            for point in [member.start, member.end] {
                if point > group_start && point < group_end {
                    boundaries.push(point);
                }
            }
        }
        boundaries.sort_unstable();
        boundaries.dedup();

        let mut attributions = vec![Attribution::default(); members.len()];

        for window in boundaries.windows(2) {
            let (from, to) = (window[0], window[1]);
            let winner = members
                .iter()
                .enumerate()
                .filter(|(_, m)| m.len() > 0 && m.covers(from, to))
                .min_by_key(|(_, m)| (m.rank, m.seq));

            if let Some((index, member)) = winner {
                let attribution = &mut attributions[index];
                attribution.millis += to - from;
                attribution.share += member.value * (to - from) as f64 / member.len() as f64;
                attribution.won = true;
            }
        }

        // Instantaneous records count in full unless a higher ranked interval covers them
        for (index, member) in members.iter().enumerate() {
            if member.len() > 0 {
                continue;
            }
            let suppressed = members.iter().any(|m| {
                m.len() > 0
                    && m.rank < member.rank
                    && m.start <= member.start
                    && m.end > member.start
            });
            if !suppressed {
                attributions[index].share += member.value;
                attributions[index].won = true;
            }
        }

        let winners: Vec<(usize, &Contribution)> = members
            .iter()
            .enumerate()
            .filter(|(i, _)| attributions[*i].won)
            .map(|(i, m)| (i, *m))
            .collect();
        if winners.is_empty() {
            return None;
        }

        let value = winners.iter().map(|(i, _)| attributions[*i].share).sum();

        // Bulk of the attributed time decides the offset; ties keep the earliest row
        let mut dominant: Option<(i64, &Contribution)> = None;
        for (index, member) in &winners {
            let millis = attributions[*index].millis;
            if dominant.map_or(true, |(best, _)| millis > best) {
                dominant = Some((millis, *member));
            }
        }

        Some(GroupValue {
            value,
            zone_offset: dominant.map(|(_, m)| m.zone_offset),
        })
    }
}
