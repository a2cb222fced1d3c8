//! Ledger records and CSV loading using Polars

use std::path::Path;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use tracing::{debug, info};

use crate::error::RfmError;

/// Column names shared by both ledger tables
pub const ORDER_ID: &str = "order_id";
pub const PURCHASE_TIMESTAMP: &str = "order_purchase_timestamp";
pub const TOTAL_REVENUE: &str = "total_revenue";
pub const CUSTOMER_ID: &str = "customer_unique_id";
pub const CATEGORY: &str = "category_name_english";
pub const PRODUCT_ID: &str = "product_id";
pub const TOTAL_PRICE: &str = "total_price";
pub const CUSTOMER_STATE: &str = "customer_state";

/// Calendar day of the purchase, days from the common era (frames only)
pub const PURCHASE_DAY: &str = "purchase_day";

pub(crate) const MICROS_PER_DAY: i64 = 86_400_000_000;

/// Anything carrying a purchase timestamp can be windowed.
pub trait Timestamped {
    fn purchased_at(&self) -> NaiveDateTime;
}

/// One row per order, used for the daily revenue report
#[derive(Debug, Clone, PartialEq)]
pub struct OrderSummary {
    pub order_id: String,
    pub purchased_at: NaiveDateTime,
    pub total_revenue: f64,
}

/// One row per order line item, used for aggregates and RFM
#[derive(Debug, Clone, PartialEq)]
pub struct OrderLine {
    pub order_id: String,
    /// Opaque, stable across a customer's orders
    pub customer_id: String,
    pub purchased_at: NaiveDateTime,
    /// English category name; `None` when the product has no category
    pub category: Option<String>,
    pub product_id: String,
    pub total_price: f64,
    /// Region code of the customer
    pub customer_state: String,
}

impl Timestamped for OrderSummary {
    fn purchased_at(&self) -> NaiveDateTime {
        self.purchased_at
    }
}

impl Timestamped for OrderLine {
    fn purchased_at(&self) -> NaiveDateTime {
        self.purchased_at
    }
}

/// Both input tables, loaded once and windowed per query
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    pub summaries: Vec<OrderSummary>,
    pub lines: Vec<OrderLine>,
}

impl Ledger {
    pub fn new(summaries: Vec<OrderSummary>, lines: Vec<OrderLine>) -> Self {
        Self { summaries, lines }
    }

    /// Load the order-summary and order-line CSV files
    ///
    /// # Arguments
    /// * `summary_path` - CSV with `order_id`, `order_purchase_timestamp`, `total_revenue`
    /// * `lines_path` - CSV with the line-item columns (see [`load_order_lines`])
    pub fn load(summary_path: impl AsRef<Path>, lines_path: impl AsRef<Path>) -> crate::Result<Self> {
        let summaries = load_order_summaries(summary_path)?;
        let lines = load_order_lines(lines_path)?;
        info!(
            summaries = summaries.len(),
            lines = lines.len(),
            "ledger loaded"
        );
        Ok(Self { summaries, lines })
    }

    pub fn summaries_frame(&self) -> PolarsResult<DataFrame> {
        summaries_frame(&self.summaries)
    }

    pub fn lines_frame(&self) -> PolarsResult<DataFrame> {
        lines_frame(&self.lines)
    }
}

/// Order summaries as a typed frame.
///
/// Timestamps are epoch microseconds in `order_purchase_timestamp`, with the
/// calendar day alongside in `purchase_day`.
pub fn summaries_frame(summaries: &[OrderSummary]) -> PolarsResult<DataFrame> {
    df!(
        ORDER_ID => summaries.iter().map(|s| s.order_id.as_str()).collect::<Vec<_>>(),
        PURCHASE_TIMESTAMP => summaries.iter().map(|s| to_micros(s.purchased_at)).collect::<Vec<_>>(),
        PURCHASE_DAY => summaries.iter().map(|s| s.purchased_at.num_days_from_ce()).collect::<Vec<_>>(),
        TOTAL_REVENUE => summaries.iter().map(|s| s.total_revenue).collect::<Vec<_>>()
    )
}

/// Order lines as a typed frame; a missing category is null
pub fn lines_frame(lines: &[OrderLine]) -> PolarsResult<DataFrame> {
    df!(
        ORDER_ID => lines.iter().map(|l| l.order_id.as_str()).collect::<Vec<_>>(),
        CUSTOMER_ID => lines.iter().map(|l| l.customer_id.as_str()).collect::<Vec<_>>(),
        PURCHASE_TIMESTAMP => lines.iter().map(|l| to_micros(l.purchased_at)).collect::<Vec<_>>(),
        PURCHASE_DAY => lines.iter().map(|l| l.purchased_at.num_days_from_ce()).collect::<Vec<_>>(),
        CATEGORY => lines.iter().map(|l| l.category.as_deref()).collect::<Vec<_>>(),
        PRODUCT_ID => lines.iter().map(|l| l.product_id.as_str()).collect::<Vec<_>>(),
        TOTAL_PRICE => lines.iter().map(|l| l.total_price).collect::<Vec<_>>(),
        CUSTOMER_STATE => lines.iter().map(|l| l.customer_state.as_str()).collect::<Vec<_>>()
    )
}

pub(crate) fn to_micros(ts: NaiveDateTime) -> i64 {
    ts.and_utc().timestamp_micros()
}

pub(crate) fn from_micros(micros: i64) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_micros(micros).map(|ts| ts.naive_utc())
}

/// Read selected columns of a CSV file as text.
///
/// Typing is done by hand afterwards so that a bad value is reported with
/// its row and column instead of silently becoming null.
fn read_text_columns(path: &Path, columns: &[&str]) -> crate::Result<DataFrame> {
    let selection: Vec<Expr> = columns.iter().map(|name| col(*name)).collect();
    let df = LazyCsvReader::new(path)
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .finish()?
        .select(selection)
        .collect()?;

    debug!(path = %path.display(), rows = df.height(), "csv read");
    Ok(df)
}

fn text_column<'a>(df: &'a DataFrame, name: &str) -> crate::Result<Vec<Option<&'a str>>> {
    Ok(df.column(name)?.str()?.into_iter().collect())
}

/// Load the one-row-per-order table
pub fn load_order_summaries(path: impl AsRef<Path>) -> crate::Result<Vec<OrderSummary>> {
    let df = read_text_columns(path.as_ref(), &[ORDER_ID, PURCHASE_TIMESTAMP, TOTAL_REVENUE])?;

    let order_ids = text_column(&df, ORDER_ID)?;
    let timestamps = text_column(&df, PURCHASE_TIMESTAMP)?;
    let revenues = text_column(&df, TOTAL_REVENUE)?;

    let mut summaries = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        summaries.push(OrderSummary {
            order_id: required(order_ids[row], row, ORDER_ID)?.to_string(),
            purchased_at: parse_timestamp_cell(timestamps[row], row)?,
            total_revenue: parse_amount(revenues[row], row, TOTAL_REVENUE)?,
        });
    }
    Ok(summaries)
}

/// Load the line-item table
///
/// Expected columns: `order_id`, `customer_unique_id`,
/// `order_purchase_timestamp`, `category_name_english`, `product_id`,
/// `total_price`, `customer_state`. Extra columns are ignored.
pub fn load_order_lines(path: impl AsRef<Path>) -> crate::Result<Vec<OrderLine>> {
    let df = read_text_columns(
        path.as_ref(),
        &[
            ORDER_ID,
            CUSTOMER_ID,
            PURCHASE_TIMESTAMP,
            CATEGORY,
            PRODUCT_ID,
            TOTAL_PRICE,
            CUSTOMER_STATE,
        ],
    )?;

    let order_ids = text_column(&df, ORDER_ID)?;
    let customer_ids = text_column(&df, CUSTOMER_ID)?;
    let timestamps = text_column(&df, PURCHASE_TIMESTAMP)?;
    let categories = text_column(&df, CATEGORY)?;
    let product_ids = text_column(&df, PRODUCT_ID)?;
    let prices = text_column(&df, TOTAL_PRICE)?;
    let states = text_column(&df, CUSTOMER_STATE)?;

    let mut lines = Vec::with_capacity(df.height());
    for row in 0..df.height() {
        lines.push(OrderLine {
            order_id: required(order_ids[row], row, ORDER_ID)?.to_string(),
            customer_id: required(customer_ids[row], row, CUSTOMER_ID)?.to_string(),
            purchased_at: parse_timestamp_cell(timestamps[row], row)?,
            category: categories[row]
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string),
            product_id: required(product_ids[row], row, PRODUCT_ID)?.to_string(),
            total_price: parse_amount(prices[row], row, TOTAL_PRICE)?,
            customer_state: required(states[row], row, CUSTOMER_STATE)?.to_string(),
        });
    }
    Ok(lines)
}

fn required<'a>(cell: Option<&'a str>, row: usize, column: &'static str) -> Result<&'a str, RfmError> {
    match cell.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(RfmError::MissingValue { row, column }),
    }
}

fn parse_timestamp_cell(cell: Option<&str>, row: usize) -> Result<NaiveDateTime, RfmError> {
    let value = required(cell, row, PURCHASE_TIMESTAMP)?;
    parse_timestamp(value).ok_or_else(|| RfmError::MalformedTimestamp {
        row,
        value: value.to_string(),
    })
}

fn parse_amount(cell: Option<&str>, row: usize, column: &'static str) -> Result<f64, RfmError> {
    let value = required(cell, row, column)?;
    match value.parse::<f64>() {
        Ok(amount) if amount.is_finite() && amount >= 0.0 => Ok(amount),
        _ => Err(RfmError::InvalidAmount {
            row,
            column,
            value: value.to_string(),
        }),
    }
}

/// Parse a purchase timestamp.
///
/// Accepts `YYYY-MM-DD HH:MM:SS`, `YYYY-MM-DDTHH:MM:SS` and a bare
/// `YYYY-MM-DD` (midnight). Returns `None` when nothing matches.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S"] {
        if let Ok(ts) = NaiveDateTime::parse_from_str(value, format) {
            return Some(ts);
        }
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .map(|date| date.and_time(NaiveTime::MIN))
}
