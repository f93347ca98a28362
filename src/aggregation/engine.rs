//! Multi-aggregation requests
//!
//! Runs several aggregation types over the same range and grouping and pairs
//! every group index with its wall-clock interval.

use crate::aggregation::error::{AggregationError, AggregationResult};
use crate::aggregation::priority_list::OriginPriorities;
use crate::aggregation::request::{AggregateTableRequest, GroupBy};
use crate::aggregation::types::{AggregateResult, AggregationType};
use crate::records::TimeRange;
use crate::storage::QueryExecutor;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// What to aggregate, over which range and origins
#[derive(Debug, Clone)]
pub struct AggregateRequest {
    pub aggregations: Vec<AggregationType>,
    pub time_range: TimeRange,
    /// Package names to include; empty means every origin
    pub data_origins: Vec<String>,
    pub group_by: Option<GroupBy>,
}

impl AggregateRequest {
    pub fn new(aggregations: Vec<AggregationType>, time_range: TimeRange) -> Self {
        Self {
            aggregations,
            time_range,
            data_origins: Vec::new(),
            group_by: None,
        }
    }

    /// Builder method: restrict to these package names
    pub fn data_origins(mut self, origins: Vec<String>) -> Self {
        self.data_origins = origins;
        self
    }

    /// Builder method: group into fixed-width buckets
    pub fn group_by(mut self, group_by: GroupBy) -> Self {
        self.group_by = Some(group_by);
        self
    }
}

/// Results for one time bucket
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateGroup {
    pub interval: TimeRange,
    /// Only aggregations with data in this bucket are present
    pub results: BTreeMap<AggregationType, AggregateResult>,
}

impl AggregateGroup {
    pub fn get(&self, aggregation: AggregationType) -> Option<&AggregateResult> {
        self.results.get(&aggregation)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateResponse {
    pub groups: Vec<AggregateGroup>,
}

impl AggregateResponse {
    /// Result of an ungrouped request, or of the first bucket
    pub fn get(&self, aggregation: AggregationType) -> Option<&AggregateResult> {
        self.groups.first().and_then(|g| g.get(aggregation))
    }
}

/// Evaluate every aggregation in `request`
pub fn aggregate(
    executor: &dyn QueryExecutor,
    priorities: &OriginPriorities,
    request: &AggregateRequest,
) -> AggregationResult<AggregateResponse> {
    if request.aggregations.is_empty() {
        return Err(AggregationError::InvalidRequest(
            "no aggregation types requested".to_string(),
        ));
    }

    let origin_filter = if request.data_origins.is_empty() {
        None
    } else {
        Some(executor.origin_ids(&request.data_origins)?)
    };

    let mut groups: Vec<AggregateGroup> = Vec::new();

    for aggregation in &request.aggregations {
        let mut table_request = AggregateTableRequest::new(*aggregation, request.time_range)?;
        if let Some(ids) = &origin_filter {
            table_request = table_request.with_origin_filter(ids.clone());
        }
        if let Some(group_by) = request.group_by {
            table_request = table_request.with_group_by(group_by)?;
        }

        if groups.is_empty() {
            groups = table_request
                .group_split_intervals()
                .into_iter()
                .map(|interval| AggregateGroup {
                    interval,
                    results: BTreeMap::new(),
                })
                .collect();
        }

        for (index, result) in table_request.execute(executor, priorities)? {
            if let Some(group) = groups.get_mut(index) {
                group.results.insert(*aggregation, result);
            }
        }
    }

    Ok(AggregateResponse { groups })
}
