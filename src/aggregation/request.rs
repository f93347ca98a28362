//! Aggregation over a single record table
//!
//! An [`AggregateTableRequest`] turns one aggregation type, a time range, an
//! optional origin filter and an optional grouping into query text, and turns
//! the rows that come back into one result per group.
//!
//! Groups are fixed-width buckets starting at the range start. The bucket
//! count is `ceil((end - start) / delta)` and the last bucket is clipped to the
//! range end. The same splits drive the SQL `CASE` expression, result sizing
//! and [`AggregateTableRequest::group_split_intervals`].

use crate::aggregation::error::{AggregationError, AggregationResult};
use crate::aggregation::priority::PriorityRecordsAggregator;
use crate::aggregation::priority_list::OriginPriorities;
use crate::aggregation::types::{
    AggregateParams, AggregateResult, AggregateValue, AggregationContext, AggregationType,
};
use crate::records::{read_zone_offset, RecordHelper, TimeRange, APP_INFO_ID_COLUMN};
use crate::storage::{QueryExecutor, Row};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Column holding the group index in grouped direct queries
pub const GROUP_BY_COLUMN: &str = "category";

/// Upper bound on buckets per request
pub const MAX_GROUPS: usize = 10_000;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Calendar bucket width
///
/// Months count as 30 days and years as 365 days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period {
    Days(u32),
    Weeks(u32),
    Months(u32),
    Years(u32),
}

impl Period {
    /// Bucket width in milliseconds, `None` when it does not fit in an `i64`
    pub fn delta_millis(&self) -> Option<i64> {
        let (count, days) = match self {
            Period::Days(n) => (*n, 1),
            Period::Weeks(n) => (*n, 7),
            Period::Months(n) => (*n, 30),
            Period::Years(n) => (*n, 365),
        };
        i64::from(count)
            .checked_mul(days)?
            .checked_mul(MILLIS_PER_DAY)
    }
}

/// Bucket width for grouped aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupBy {
    Duration(chrono::Duration),
    Period(Period),
}

impl GroupBy {
    /// Build from the two optional grouping inputs; exactly one must be set
    pub fn from_parts(
        period: Option<Period>,
        duration: Option<chrono::Duration>,
    ) -> AggregationResult<Self> {
        match (period, duration) {
            (Some(period), None) => Ok(GroupBy::Period(period)),
            (None, Some(duration)) => Ok(GroupBy::Duration(duration)),
            (Some(_), Some(_)) => Err(AggregationError::InvalidGrouping(
                "set either a period or a duration, not both".to_string(),
            )),
            (None, None) => Err(AggregationError::InvalidGrouping(
                "either a period or a duration is required".to_string(),
            )),
        }
    }

    pub fn delta_millis(&self) -> Option<i64> {
        match self {
            GroupBy::Duration(duration) => Some(duration.num_milliseconds()),
            GroupBy::Period(period) => period.delta_millis(),
        }
    }
}

/// Boundaries of the buckets covering `range`
fn compute_group_splits(range: &TimeRange, delta: Option<i64>) -> Vec<i64> {
    match delta {
        None => vec![range.start, range.end],
        Some(delta) => {
            let mut splits = vec![range.start];
            let mut current = range.start;
            while current < range.end {
                current = current.saturating_add(delta).min(range.end);
                splits.push(current);
            }
            splits
        }
    }
}

/// One aggregation over one record table
#[derive(Debug, Clone)]
pub struct AggregateTableRequest {
    aggregation: AggregationType,
    helper: RecordHelper,
    params: AggregateParams,
    time_range: TimeRange,
    origin_ids: Option<Vec<i64>>,
    group_by: Option<GroupBy>,
    group_splits: Vec<i64>,
}

impl AggregateTableRequest {
    /// Create an ungrouped request over `time_range`
    pub fn new(aggregation: AggregationType, time_range: TimeRange) -> AggregationResult<Self> {
        let helper = RecordHelper::for_type(aggregation.record_type());
        let params = helper
            .aggregate_params(aggregation)
            .ok_or(AggregationError::UnsupportedAggregation(aggregation))?;

        Ok(Self {
            aggregation,
            helper,
            params,
            time_range,
            origin_ids: None,
            group_by: None,
            group_splits: compute_group_splits(&time_range, None),
        })
    }

    /// Builder method: keep only rows from these origins
    ///
    /// An empty list matches nothing.
    pub fn with_origin_filter(mut self, origin_ids: Vec<i64>) -> Self {
        self.origin_ids = Some(origin_ids);
        self
    }

    /// Builder method: split the range into fixed-width buckets
    pub fn with_group_by(mut self, group_by: GroupBy) -> AggregationResult<Self> {
        let delta = group_by.delta_millis().ok_or_else(|| {
            AggregationError::InvalidGrouping(format!("bucket width overflows: {:?}", group_by))
        })?;
        if delta <= 0 {
            return Err(AggregationError::InvalidGrouping(format!(
                "bucket width must be positive, got {} ms",
                delta
            )));
        }

        let span = self
            .time_range
            .end
            .checked_sub(self.time_range.start)
            .ok_or_else(|| {
                AggregationError::InvalidGrouping(format!(
                    "range {}..{} is too wide to group",
                    self.time_range.start, self.time_range.end
                ))
            })?;
        let groups = span / delta + i64::from(span % delta != 0);
        if groups > MAX_GROUPS as i64 {
            return Err(AggregationError::InvalidGrouping(format!(
                "{} buckets exceed the limit of {}",
                groups, MAX_GROUPS
            )));
        }

        self.group_splits = compute_group_splits(&self.time_range, Some(delta));
        self.group_by = Some(group_by);

        tracing::debug!(
            aggregation = %self.aggregation,
            delta_ms = delta,
            groups = self.group_count(),
            start = self.time_range.start,
            end = self.time_range.end,
            "Configured aggregation grouping"
        );
        Ok(self)
    }

    pub fn aggregation(&self) -> AggregationType {
        self.aggregation
    }

    pub fn time_range(&self) -> TimeRange {
        self.time_range
    }

    pub fn group_count(&self) -> usize {
        self.group_splits.len().saturating_sub(1)
    }

    pub fn group_splits(&self) -> &[i64] {
        &self.group_splits
    }

    /// `[start, end)` interval of every group, in index order
    pub fn group_split_intervals(&self) -> Vec<TimeRange> {
        self.group_splits
            .windows(2)
            .map(|w| TimeRange {
                start: w[0],
                end: w[1],
            })
            .collect()
    }

    fn uses_raw_rows(&self) -> bool {
        self.params.priority.is_some() || self.helper.is_derived(self.aggregation)
    }

    /// Query producing the rows for this aggregation
    pub fn aggregation_command(&self) -> String {
        let mut columns: Vec<String> = if self.uses_raw_rows() {
            self.params
                .columns_to_aggregate
                .iter()
                .map(|c| c.to_string())
                .collect()
        } else {
            let function = self
                .aggregation
                .operation()
                .sql_function()
                .unwrap_or("SUM");
            self.params
                .columns_to_aggregate
                .iter()
                .map(|c| format!("{}({}) AS {}", function, c, c))
                .collect()
        };

        if self.params.priority.is_some() {
            columns.push(APP_INFO_ID_COLUMN.to_string());
        }
        columns.push(self.params.zone_offset_column.to_string());
        columns.push(self.params.time_column.to_string());
        if let Some(end) = self.params.end_time_column {
            columns.push(end.to_string());
        }

        let grouped = self.group_by.is_some() && !self.uses_raw_rows();
        if grouped {
            columns.push(self.case_expression());
        }

        let mut sql = format!(
            "SELECT {} FROM {}{}",
            columns.join(", "),
            self.params.table_name,
            self.where_clause()
        );
        if grouped {
            sql.push_str(&format!(" GROUP BY {}", GROUP_BY_COLUMN));
        }
        sql.push_str(&format!(" ORDER BY {} ASC", self.params.time_column));

        tracing::debug!(sql = %sql, "Built aggregation query");
        sql
    }

    /// Query listing the origins with data in range
    pub fn metadata_command(&self) -> String {
        format!(
            "SELECT DISTINCT {app} FROM {table}{filter} ORDER BY {app} ASC",
            app = APP_INFO_ID_COLUMN,
            table = self.params.table_name,
            filter = self.where_clause()
        )
    }

    fn case_expression(&self) -> String {
        let time = self.params.time_column;
        let whens: Vec<String> = self
            .group_splits
            .windows(2)
            .enumerate()
            .map(|(k, w)| {
                format!(
                    "WHEN {t} >= {} AND {t} < {} THEN {}",
                    w[0],
                    w[1],
                    k,
                    t = time
                )
            })
            .collect();
        format!("CASE {} END AS {}", whens.join(" "), GROUP_BY_COLUMN)
    }

    fn where_clause(&self) -> String {
        let mut conditions = Vec::new();

        if let Some(ids) = &self.origin_ids {
            let ids: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
            conditions.push(format!("{} IN ({})", APP_INFO_ID_COLUMN, ids.join(", ")));
        }

        // Interval records match when start < filter end and end >= filter start
        let lower_column = self.params.end_time_column.unwrap_or(self.params.time_column);
        conditions.push(format!("{} >= {}", lower_column, self.time_range.start));
        conditions.push(format!(
            "{} < {}",
            self.params.time_column, self.time_range.end
        ));

        format!(" WHERE {}", conditions.join(" AND "))
    }

    /// Turn fetched rows into results keyed by group index
    ///
    /// Groups without data are absent, except for derived aggregates which
    /// report every group.
    pub fn on_results_fetched(
        &self,
        rows: &[Row],
        priority_list: &[i64],
    ) -> AggregationResult<BTreeMap<usize, AggregateResult>> {
        self.on_results_fetched_with(rows, priority_list, &[])
    }

    /// Like [`Self::on_results_fetched`], handing `added_values` to derived formulas
    pub fn on_results_fetched_with(
        &self,
        rows: &[Row],
        priority_list: &[i64],
        added_values: &[f64],
    ) -> AggregationResult<BTreeMap<usize, AggregateResult>> {
        if self.helper.is_derived(self.aggregation) {
            self.derived_results(rows, added_values)
        } else if let Some(priority) = self.params.priority {
            if priority_list.is_empty() {
                return Err(AggregationError::MissingPriorityList(
                    self.helper.record_type(),
                ));
            }
            let aggregator = PriorityRecordsAggregator::new(
                &self.group_splits,
                priority_list,
                priority,
                self.params.zone_offset_column,
            );
            let kind = self.aggregation.result_kind();
            Ok(aggregator
                .calculate(rows)?
                .into_iter()
                .map(|(group, resolved)| {
                    (
                        group,
                        AggregateResult::new(
                            AggregateValue::from_f64(kind, resolved.value),
                            resolved.zone_offset,
                        ),
                    )
                })
                .collect())
        } else {
            self.direct_results(rows)
        }
    }

    fn derived_results(
        &self,
        rows: &[Row],
        added_values: &[f64],
    ) -> AggregationResult<BTreeMap<usize, AggregateResult>> {
        let context = AggregationContext {
            time_column: self.params.time_column,
            zone_offset_column: self.params.zone_offset_column,
            group_splits: &self.group_splits,
            added_values,
        };
        let values = self
            .helper
            .derive_aggregate(rows, &context, self.aggregation)?
            .ok_or(AggregationError::UnsupportedAggregation(self.aggregation))?;

        let zone_offset = match rows.first() {
            Some(row) => Some(read_zone_offset(row, self.params.zone_offset_column)?),
            None => None,
        };
        let kind = self.aggregation.result_kind();

        Ok(values
            .into_iter()
            .enumerate()
            .map(|(group, value)| {
                (
                    group,
                    AggregateResult::new(AggregateValue::from_f64(kind, value), zone_offset),
                )
            })
            .collect())
    }

    fn direct_results(&self, rows: &[Row]) -> AggregationResult<BTreeMap<usize, AggregateResult>> {
        let mut results = BTreeMap::new();
        let grouped = self.group_by.is_some();

        for row in rows {
            let group = if grouped {
                match row.get_opt_i64(GROUP_BY_COLUMN)? {
                    Some(group) if group >= 0 && (group as usize) < self.group_count() => {
                        group as usize
                    }
                    _ => continue,
                }
            } else {
                // An aggregate over zero rows still yields one row of NULLs
                if row.is_null(self.params.time_column) {
                    continue;
                }
                0
            };

            if let Some(result) = self.helper.compute_aggregate(row, self.aggregation)? {
                results.insert(group, result);
            }
        }

        Ok(results)
    }

    /// Run the queries against `executor` and assemble the results
    pub fn execute(
        &self,
        executor: &dyn QueryExecutor,
        priorities: &OriginPriorities,
    ) -> AggregationResult<BTreeMap<usize, AggregateResult>> {
        let mut origin_ids = Vec::new();
        let added_values = match self.added_request() {
            Some(added) => added.added_values(executor, priorities, &mut origin_ids)?,
            None => Vec::new(),
        };

        let rows = executor.query(&self.aggregation_command())?;
        let mut results = self.on_results_fetched_with(
            &rows,
            priorities.get(self.helper.record_type()),
            &added_values,
        )?;

        self.collect_origin_ids(executor, &mut origin_ids)?;
        origin_ids.sort_unstable();
        origin_ids.dedup();
        let package_names = executor.package_names(&origin_ids)?;
        for result in results.values_mut() {
            result.data_origins = package_names.clone();
        }

        tracing::debug!(
            aggregation = %self.aggregation,
            rows = rows.len(),
            groups = results.len(),
            origins = package_names.len(),
            "Aggregation finished"
        );
        Ok(results)
    }

    /// Request for the aggregation a derived formula adds, sharing range,
    /// origin filter and groups
    fn added_request(&self) -> Option<AggregateTableRequest> {
        let aggregation = self.aggregation.added_aggregation()?;
        let helper = RecordHelper::for_type(aggregation.record_type());
        let params = helper.aggregate_params(aggregation)?;
        Some(AggregateTableRequest {
            aggregation,
            helper,
            params,
            time_range: self.time_range,
            origin_ids: self.origin_ids.clone(),
            group_by: self.group_by,
            group_splits: self.group_splits.clone(),
        })
    }

    /// Dense per-group values of this request, zero where a group has no data
    fn added_values(
        &self,
        executor: &dyn QueryExecutor,
        priorities: &OriginPriorities,
        origin_ids: &mut Vec<i64>,
    ) -> AggregationResult<Vec<f64>> {
        let mut values = vec![0.0; self.group_count()];
        let rows = executor.query(&self.aggregation_command())?;
        if rows.is_empty() {
            return Ok(values);
        }

        let results = self.on_results_fetched(&rows, priorities.get(self.helper.record_type()))?;
        for (group, result) in results {
            if let Some(value) = values.get_mut(group) {
                *value = result.value.as_f64();
            }
        }
        self.collect_origin_ids(executor, origin_ids)?;
        Ok(values)
    }

    fn collect_origin_ids(
        &self,
        executor: &dyn QueryExecutor,
        origin_ids: &mut Vec<i64>,
    ) -> AggregationResult<()> {
        for row in executor.query(&self.metadata_command())? {
            origin_ids.push(row.get_i64(APP_INFO_ID_COLUMN)?);
        }
        Ok(())
    }
}
