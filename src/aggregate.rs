//! Grouped, ranked aggregates over order lines

use std::fmt;
use std::str::FromStr;

use polars::prelude::{col, len, DataFrame, DataType, Expr, IdxSize, IntoLazy, LazyFrame, SortMultipleOptions};
use tracing::debug;

use crate::data::{lines_frame, OrderLine, CATEGORY, CUSTOMER_ID, CUSTOMER_STATE, TOTAL_PRICE};
use crate::error::RfmError;
use crate::window::Window;

/// Rows kept by the truncated modes
pub const TOP_N: usize = 10;

/// The four named aggregations behind the dashboard bar charts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationMode {
    /// Revenue per category
    ProductPerformance,
    /// Spend per customer
    CustomerSpending,
    /// Order lines per customer state
    CustomerDemographic,
    /// Products sold per category, untruncated
    ProductCount,
}

impl AggregationMode {
    pub const ALL: [AggregationMode; 4] = [
        AggregationMode::ProductPerformance,
        AggregationMode::CustomerSpending,
        AggregationMode::CustomerDemographic,
        AggregationMode::ProductCount,
    ];

    pub fn name(self) -> &'static str {
        match self {
            AggregationMode::ProductPerformance => "product_performance",
            AggregationMode::CustomerSpending => "customer_spending",
            AggregationMode::CustomerDemographic => "customer_demographic",
            AggregationMode::ProductCount => "product_count",
        }
    }

    /// Output name of the grouping column
    pub fn key_column(self) -> &'static str {
        match self {
            AggregationMode::ProductPerformance | AggregationMode::ProductCount => CATEGORY,
            AggregationMode::CustomerSpending => CUSTOMER_ID,
            AggregationMode::CustomerDemographic => CUSTOMER_STATE,
        }
    }

    /// Output name of the reduced measure column
    pub fn measure_column(self) -> &'static str {
        match self {
            AggregationMode::ProductPerformance | AggregationMode::CustomerSpending => "total_price",
            AggregationMode::CustomerDemographic => "customer_count",
            AggregationMode::ProductCount => "product_count",
        }
    }

    pub fn limit(self) -> Option<usize> {
        match self {
            AggregationMode::ProductCount => None,
            _ => Some(TOP_N),
        }
    }

    /// Reduction of one group, named after the measure column
    fn reduction(self) -> Expr {
        match self {
            AggregationMode::ProductPerformance | AggregationMode::CustomerSpending => col(TOTAL_PRICE).sum(),
            AggregationMode::CustomerDemographic | AggregationMode::ProductCount => len(),
        }
        .alias(self.measure_column())
    }
}

impl fmt::Display for AggregationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AggregationMode {
    type Err = RfmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AggregationMode::ALL
            .into_iter()
            .find(|mode| mode.name() == s)
            .ok_or_else(|| RfmError::UnknownMode(s.to_string()))
    }
}

/// Reduced value of one group
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measure {
    Total(f64),
    Count(usize),
}

impl Measure {
    pub fn as_f64(self) -> f64 {
        match self {
            Measure::Total(total) => total,
            Measure::Count(count) => count as f64,
        }
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Measure::Total(total) => write!(f, "{:.2}", total),
            Measure::Count(count) => write!(f, "{}", count),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub key: String,
    pub measure: Measure,
}

/// Ranked output of one aggregation, measure descending
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateTable {
    pub mode: AggregationMode,
    pub rows: Vec<AggregateRow>,
}

impl AggregateTable {
    pub fn key_column(&self) -> &'static str {
        self.mode.key_column()
    }

    pub fn measure_column(&self) -> &'static str {
        self.mode.measure_column()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sum of every measure in the table
    pub fn measure_total(&self) -> f64 {
        self.rows.iter().map(|row| row.measure.as_f64()).sum()
    }
}

/// Aggregate an already-windowed order-line frame
///
/// Groups are ranked by measure descending; equal measures are ordered by
/// group key ascending. Rows without a key for the mode (no category) are
/// dropped before grouping.
pub fn aggregate(lines: LazyFrame, mode: AggregationMode) -> Result<AggregateTable, RfmError> {
    let key = mode.key_column();
    let measure = mode.measure_column();

    let mut ranked = lines
        .filter(col(key).is_not_null())
        .group_by([col(key)])
        .agg([mode.reduction()])
        .sort_by_exprs(
            [col(measure), col(key)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        );
    if let Some(limit) = mode.limit() {
        ranked = ranked.limit(limit as IdxSize);
    }
    let df = ranked.collect()?;

    let rows = table_rows(&df, mode)?;
    debug!(mode = %mode, kept = rows.len(), "aggregate");
    Ok(AggregateTable { mode, rows })
}

fn table_rows(df: &DataFrame, mode: AggregationMode) -> Result<Vec<AggregateRow>, RfmError> {
    let keys = df.column(mode.key_column())?.str()?;
    let measures = df.column(mode.measure_column())?;

    let rows = match mode {
        AggregationMode::ProductPerformance | AggregationMode::CustomerSpending => keys
            .into_no_null_iter()
            .zip(measures.f64()?.into_no_null_iter())
            .map(|(key, total)| AggregateRow {
                key: key.to_string(),
                measure: Measure::Total(total),
            })
            .collect(),
        AggregationMode::CustomerDemographic | AggregationMode::ProductCount => {
            let counts = measures.cast(&DataType::UInt64)?;
            keys.into_no_null_iter()
                .zip(counts.u64()?.into_no_null_iter())
                .map(|(key, count)| AggregateRow {
                    key: key.to_string(),
                    measure: Measure::Count(count as usize),
                })
                .collect()
        }
    };
    Ok(rows)
}

/// Window the order lines, then aggregate them
pub fn aggregate_window(lines: &[OrderLine], window: &Window, mode: AggregationMode) -> Result<AggregateTable, RfmError> {
    aggregate(window.filter_frame(lines_frame(lines)?.lazy()), mode)
}
