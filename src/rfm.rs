//! Per-customer Recency / Frequency / Monetary rollups

use chrono::NaiveDateTime;
use polars::prelude::{col, len, lit, DataFrame, DataType, IntoLazy, LazyFrame, SortMultipleOptions};
use tracing::debug;

use crate::data::{from_micros, lines_frame, OrderLine, CUSTOMER_ID, MICROS_PER_DAY, PURCHASE_TIMESTAMP, TOTAL_PRICE};
use crate::error::RfmError;
use crate::window::Window;

const LAST_PURCHASE: &str = "last_purchase";
const RECENCY: &str = "recency";
const FREQUENCY: &str = "frequency";
const MONETARY: &str = "monetary";

/// Raw RFM metrics for one customer within one window
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerRfm {
    /// Full customer unique id; shorten only for display
    pub customer_id: String,
    pub last_purchase: NaiveDateTime,
    /// Whole days from the last purchase to the start of the window end
    /// day, truncated toward zero
    pub recency: i64,
    /// Order-line rows in the window (not distinct orders)
    pub frequency: usize,
    pub monetary: f64,
}

/// Compute the RFM table for every customer with at least one order line in
/// the window, ordered by customer id.
///
/// # Arguments
/// * `lines` - Order lines, unfiltered
/// * `window` - Inclusive date range; recency is measured to `window.end`
///
/// # Returns
/// * One `CustomerRfm` per customer, or `JoinMismatch` if the rollups disagree
pub fn build_customer_rfm(lines: &[OrderLine], window: &Window) -> Result<Vec<CustomerRfm>, RfmError> {
    customer_rfm(window.filter_frame(lines_frame(lines)?.lazy()), window)
}

/// RFM table of an already-windowed order-line frame
pub fn customer_rfm(lines: LazyFrame, window: &Window) -> Result<Vec<CustomerRfm>, RfmError> {
    let table = Rollups::new(lines, window).join()?;
    debug!(window = %window, customers = table.len(), "rfm built");
    Ok(table)
}

/// The three per-customer rollups, each its own grouped frame
struct Rollups {
    recency: LazyFrame,
    frequency: LazyFrame,
    monetary: LazyFrame,
}

impl Rollups {
    fn new(lines: LazyFrame, window: &Window) -> Self {
        // f64 -> i64 cast truncates, so purchases on the end day give 0
        let elapsed_days = ((lit(window.end_micros()) - col(LAST_PURCHASE)).cast(DataType::Float64)
            / lit(MICROS_PER_DAY as f64))
        .cast(DataType::Int64);

        let recency = lines
            .clone()
            .group_by([col(CUSTOMER_ID)])
            .agg([col(PURCHASE_TIMESTAMP).max().alias(LAST_PURCHASE)])
            .with_column(elapsed_days.alias(RECENCY));
        let frequency = lines
            .clone()
            .group_by([col(CUSTOMER_ID)])
            .agg([len().alias(FREQUENCY)]);
        let monetary = lines
            .group_by([col(CUSTOMER_ID)])
            .agg([col(TOTAL_PRICE).sum().alias(MONETARY)]);

        Self {
            recency,
            frequency,
            monetary,
        }
    }

    /// Left join anchored on the recency rollup.
    ///
    /// A null frequency or monetary after the join is an integrity fault,
    /// never a zero.
    fn join(self) -> Result<Vec<CustomerRfm>, RfmError> {
        let joined = self
            .recency
            .left_join(self.frequency, col(CUSTOMER_ID), col(CUSTOMER_ID))
            .left_join(self.monetary, col(CUSTOMER_ID), col(CUSTOMER_ID))
            .sort_by_exprs([col(CUSTOMER_ID)], SortMultipleOptions::default())
            .collect()?;
        customer_rows(&joined)
    }
}

fn customer_rows(joined: &DataFrame) -> Result<Vec<CustomerRfm>, RfmError> {
    let ids = joined.column(CUSTOMER_ID)?.str()?;
    let last_purchase = joined.column(LAST_PURCHASE)?.i64()?;
    let recency = joined.column(RECENCY)?.i64()?;
    let frequency = joined.column(FREQUENCY)?.cast(&DataType::UInt64)?;
    let frequency = frequency.u64()?;
    let monetary = joined.column(MONETARY)?.f64()?;

    (0..joined.height())
        .map(|i| {
            let customer_id = ids.get(i).unwrap_or_default().to_string();
            let missing = |rollup: &'static str| RfmError::JoinMismatch {
                customer_id: customer_id.clone(),
                rollup,
            };
            let frequency = frequency.get(i).ok_or_else(|| missing("frequency"))?;
            let monetary = monetary.get(i).ok_or_else(|| missing("monetary"))?;
            let recency = recency.get(i).ok_or_else(|| missing("recency"))?;
            let last_purchase = last_purchase
                .get(i)
                .and_then(from_micros)
                .ok_or_else(|| missing("recency"))?;
            Ok(CustomerRfm {
                customer_id,
                last_purchase,
                recency,
                frequency: frequency as usize,
                monetary,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::parse_timestamp;

    fn line(customer: &str, order: &str, price: f64, ts: &str) -> OrderLine {
        OrderLine {
            order_id: order.to_string(),
            customer_id: customer.to_string(),
            purchased_at: parse_timestamp(ts).unwrap(),
            category: Some("toys".to_string()),
            product_id: "p1".to_string(),
            total_price: price,
            customer_state: "SP".to_string(),
        }
    }

    fn scenario() -> Vec<OrderLine> {
        vec![
            line("customer-a", "o1", 100.0, "2018-01-05"),
            line("customer-b", "o2", 50.0, "2018-01-01"),
            line("customer-b", "o3", 150.0, "2018-01-08"),
            line("customer-c", "o4", 500.0, "2018-01-09"),
            line("customer-d", "o5", 75.0, "2017-12-01"),
        ]
    }

    fn window() -> Window {
        Window::parse("2018-01-01", "2018-01-10").unwrap()
    }

    #[test]
    fn test_scenario_metrics() {
        let table = build_customer_rfm(&scenario(), &window()).unwrap();

        let rows: Vec<(&str, i64, usize, f64)> = table
            .iter()
            .map(|r| (r.customer_id.as_str(), r.recency, r.frequency, r.monetary))
            .collect();
        assert_eq!(
            rows,
            vec![
                ("customer-a", 5, 1, 100.0),
                ("customer-b", 2, 2, 200.0),
                ("customer-c", 1, 1, 500.0),
            ]
        );
    }

    #[test]
    fn test_full_customer_id_is_kept() {
        let table = build_customer_rfm(&scenario(), &window()).unwrap();
        assert!(table.iter().all(|r| r.customer_id.starts_with("customer-")));
    }

    #[test]
    fn test_frequency_counts_rows_not_orders() {
        let lines = vec![
            line("c1", "o1", 10.0, "2018-01-02 08:00:00"),
            line("c1", "o1", 15.0, "2018-01-02 08:00:00"),
        ];
        let table = build_customer_rfm(&lines, &window()).unwrap();
        assert_eq!(table[0].frequency, 2);
        assert_eq!(table[0].monetary, 25.0);
    }

    #[test]
    fn test_recency_truncates_intra_day_purchases() {
        // 4 days and 10 hours before the end day starts
        let lines = vec![line("c1", "o1", 10.0, "2018-01-05 14:00:00")];
        let table = build_customer_rfm(&lines, &window()).unwrap();
        assert_eq!(table[0].recency, 4);
        assert_eq!(table[0].last_purchase, parse_timestamp("2018-01-05 14:00:00").unwrap());
    }

    #[test]
    fn test_recency_uses_latest_purchase() {
        let lines = vec![
            line("c1", "o1", 10.0, "2018-01-02 09:30:00"),
            line("c1", "o2", 10.0, "2018-01-07 23:59:59"),
        ];
        let table = build_customer_rfm(&lines, &window()).unwrap();
        assert_eq!(table[0].recency, 2);
    }

    #[test]
    fn test_recency_on_window_end_day_is_zero() {
        let lines = vec![line("c1", "o1", 10.0, "2018-01-10 22:15:00")];
        let table = build_customer_rfm(&lines, &window()).unwrap();
        assert_eq!(table[0].recency, 0);
    }

    #[test]
    fn test_empty_window() {
        let empty = Window::parse("2019-01-01", "2019-01-31").unwrap();
        assert!(build_customer_rfm(&scenario(), &empty).unwrap().is_empty());

        let inverted = Window::parse("2018-01-10", "2018-01-01").unwrap();
        assert!(build_customer_rfm(&scenario(), &inverted).unwrap().is_empty());
    }

    #[test]
    fn test_join_mismatch_is_an_error() {
        let frame = window().filter_frame(lines_frame(&scenario()).unwrap().lazy());
        let mut rollups = Rollups::new(frame, &window());
        rollups.frequency = rollups.frequency.filter(col(CUSTOMER_ID).neq(lit("customer-b")));

        assert_eq!(
            rollups.join(),
            Err(RfmError::JoinMismatch {
                customer_id: "customer-b".to_string(),
                rollup: "frequency",
            })
        );
    }

    #[test]
    fn test_monetary_rollup_gap_is_an_error() {
        let frame = window().filter_frame(lines_frame(&scenario()).unwrap().lazy());
        let mut rollups = Rollups::new(frame, &window());
        rollups.monetary = rollups.monetary.filter(col(CUSTOMER_ID).neq(lit("customer-a")));

        assert!(matches!(
            rollups.join(),
            Err(RfmError::JoinMismatch { rollup: "monetary", .. })
        ));
    }
}
