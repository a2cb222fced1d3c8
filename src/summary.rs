//! Headline metrics and leaderboards for one window

use chrono::NaiveDate;
use polars::prelude::{col, IntoLazy, SortMultipleOptions};
use tracing::info;

use crate::aggregate::{aggregate, AggregateTable, AggregationMode};
use crate::data::{summaries_frame, Ledger, OrderSummary, PURCHASE_DAY, TOTAL_REVENUE};
use crate::error::RfmError;
use crate::rfm::{customer_rfm, CustomerRfm};
use crate::score::{round2, RfmScorer, ScoredCustomer};
use crate::window::Window;

/// Rows in each RFM leaderboard
pub const LEADERBOARD_SIZE: usize = 5;

/// Order count and revenue over the window
#[derive(Debug, Clone, PartialEq)]
pub struct DailyReport {
    pub orders: Vec<OrderSummary>,
    pub total_orders: usize,
    pub revenue: f64,
    /// `None` when the window holds no orders
    pub average_order_value: Option<f64>,
    /// Revenue per calendar day, oldest first
    pub revenue_by_day: Vec<(NaiveDate, f64)>,
}

impl DailyReport {
    pub fn new(summaries: &[OrderSummary], window: &Window) -> Result<Self, RfmError> {
        let orders: Vec<OrderSummary> = window.filter(summaries).into_iter().cloned().collect();

        let by_day = window
            .filter_frame(summaries_frame(summaries)?.lazy())
            .group_by([col(PURCHASE_DAY)])
            .agg([col(TOTAL_REVENUE).sum()])
            .sort_by_exprs([col(PURCHASE_DAY)], SortMultipleOptions::default())
            .collect()?;
        let days = by_day.column(PURCHASE_DAY)?.i32()?;
        let totals = by_day.column(TOTAL_REVENUE)?.f64()?;
        let revenue_by_day: Vec<(NaiveDate, f64)> = days
            .into_no_null_iter()
            .zip(totals.into_no_null_iter())
            .filter_map(|(day, total)| NaiveDate::from_num_days_from_ce_opt(day).map(|date| (date, total)))
            .collect();

        let revenue: f64 = revenue_by_day.iter().map(|(_, total)| total).sum();
        let total_orders = orders.len();
        let average_order_value = (total_orders > 0).then(|| revenue / total_orders as f64);

        Ok(Self {
            orders,
            total_orders,
            revenue,
            average_order_value,
            revenue_by_day,
        })
    }
}

/// Headline numbers derived from the `product_count` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProductSummary {
    pub categories: usize,
    pub products_sold: usize,
}

impl ProductSummary {
    pub fn from_counts(table: &AggregateTable) -> Self {
        Self {
            categories: table.len(),
            products_sold: table.measure_total() as usize,
        }
    }
}

/// Headline numbers derived from the `customer_demographic` table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DemographicSummary {
    pub total_customers: usize,
    pub total_states: usize,
}

impl DemographicSummary {
    pub fn from_counts(table: &AggregateTable) -> Self {
        Self {
            total_customers: table.measure_total() as usize,
            total_states: table.len(),
        }
    }
}

/// Averages and top-5 leaderboards of the raw RFM table
#[derive(Debug, Clone, PartialEq)]
pub struct RfmSummary {
    pub average_recency: Option<f64>,
    pub average_frequency: Option<f64>,
    pub average_monetary: Option<f64>,
    /// Most recent buyers first
    pub by_recency: Vec<CustomerRfm>,
    pub by_frequency: Vec<CustomerRfm>,
    pub by_monetary: Vec<CustomerRfm>,
}

impl RfmSummary {
    pub fn new(customers: &[CustomerRfm]) -> Self {
        Self {
            average_recency: mean(customers.iter().map(|c| c.recency as f64)),
            average_frequency: mean(customers.iter().map(|c| c.frequency as f64)),
            average_monetary: mean(customers.iter().map(|c| c.monetary)),
            by_recency: leaderboard(customers, |a, b| a.recency.cmp(&b.recency)),
            by_frequency: leaderboard(customers, |a, b| b.frequency.cmp(&a.frequency)),
            by_monetary: leaderboard(customers, |a, b| b.monetary.total_cmp(&a.monetary)),
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(sum, count), value| (sum + value, count + 1));
    (count > 0).then(|| round2(sum / count as f64))
}

fn leaderboard<F>(customers: &[CustomerRfm], compare: F) -> Vec<CustomerRfm>
where
    F: Fn(&CustomerRfm, &CustomerRfm) -> std::cmp::Ordering,
{
    let mut ranked: Vec<&CustomerRfm> = customers.iter().collect();
    ranked.sort_by(|a, b| compare(a, b).then_with(|| a.customer_id.cmp(&b.customer_id)));
    ranked.into_iter().take(LEADERBOARD_SIZE).cloned().collect()
}

/// Everything the reporting view shows for one window
#[derive(Debug, Clone, PartialEq)]
pub struct Dashboard {
    pub window: Window,
    pub daily: DailyReport,
    pub product_counts: AggregateTable,
    pub product_summary: ProductSummary,
    pub product_revenue: AggregateTable,
    pub customer_spending: AggregateTable,
    pub demographics: AggregateTable,
    pub demographic_summary: DemographicSummary,
    pub customers: Vec<CustomerRfm>,
    pub rfm_summary: RfmSummary,
    pub ranking: Vec<ScoredCustomer>,
}

impl Dashboard {
    /// Run every computation for the window.
    ///
    /// Fails as a whole on a data-integrity fault; nothing partial is returned.
    pub fn build(ledger: &Ledger, window: Window, scorer: &RfmScorer) -> Result<Self, RfmError> {
        let daily = DailyReport::new(&ledger.summaries, &window)?;

        let lines = window.filter_frame(ledger.lines_frame()?.lazy()).cache();
        let product_counts = aggregate(lines.clone(), AggregationMode::ProductCount)?;
        let product_revenue = aggregate(lines.clone(), AggregationMode::ProductPerformance)?;
        let customer_spending = aggregate(lines.clone(), AggregationMode::CustomerSpending)?;
        let demographics = aggregate(lines.clone(), AggregationMode::CustomerDemographic)?;

        let customers = customer_rfm(lines, &window)?;
        let ranking = scorer.score(&customers)?;

        info!(
            window = %window,
            orders = daily.total_orders,
            customers = customers.len(),
            "dashboard built"
        );

        Ok(Self {
            window,
            product_summary: ProductSummary::from_counts(&product_counts),
            demographic_summary: DemographicSummary::from_counts(&demographics),
            rfm_summary: RfmSummary::new(&customers),
            daily,
            product_counts,
            product_revenue,
            customer_spending,
            demographics,
            customers,
            ranking,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{parse_timestamp, OrderLine};

    fn summary(id: &str, ts: &str, revenue: f64) -> OrderSummary {
        OrderSummary {
            order_id: id.to_string(),
            purchased_at: parse_timestamp(ts).unwrap(),
            total_revenue: revenue,
        }
    }

    fn customer(id: &str, recency: i64, frequency: usize, monetary: f64) -> CustomerRfm {
        CustomerRfm {
            customer_id: id.to_string(),
            last_purchase: parse_timestamp("2018-01-01").unwrap(),
            recency,
            frequency,
            monetary,
        }
    }

    fn window() -> Window {
        Window::parse("2018-01-01", "2018-01-31").unwrap()
    }

    #[test]
    fn test_daily_report() {
        let summaries = vec![
            summary("o1", "2018-01-02 09:00:00", 10.0),
            summary("o2", "2018-01-02 17:30:00", 30.0),
            summary("o3", "2018-01-05 12:00:00", 20.0),
            summary("o4", "2018-02-05 12:00:00", 99.0),
        ];
        let report = DailyReport::new(&summaries, &window()).unwrap();

        assert_eq!(report.total_orders, 3);
        assert_eq!(report.revenue, 60.0);
        assert_eq!(report.average_order_value, Some(20.0));

        assert_eq!(
            report.revenue_by_day,
            vec![
                (NaiveDate::from_ymd_opt(2018, 1, 2).unwrap(), 40.0),
                (NaiveDate::from_ymd_opt(2018, 1, 5).unwrap(), 20.0),
            ]
        );
    }

    #[test]
    fn test_daily_report_empty_window() {
        let summaries = vec![summary("o1", "2017-06-01", 10.0)];
        let report = DailyReport::new(&summaries, &window()).unwrap();

        assert_eq!(report.total_orders, 0);
        assert!(report.revenue_by_day.is_empty());
        assert_eq!(report.revenue, 0.0);
        assert_eq!(report.average_order_value, None);
    }

    #[test]
    fn test_rfm_summary_leaderboards() {
        let customers: Vec<CustomerRfm> = (0..8)
            .map(|i| customer(&format!("c{}", i), 10 - i as i64, 1 + i % 3, 100.0 * i as f64))
            .collect();
        let summary = RfmSummary::new(&customers);

        assert_eq!(summary.by_recency.len(), LEADERBOARD_SIZE);
        assert_eq!(summary.by_recency[0].customer_id, "c7");
        assert_eq!(summary.by_monetary[0].customer_id, "c7");
        // c2 and c5 share the top frequency of 3
        assert_eq!(summary.by_frequency[0].customer_id, "c2");
        assert_eq!(summary.by_frequency[1].customer_id, "c5");
        assert_eq!(summary.average_monetary, Some(350.0));
    }

    #[test]
    fn test_average_frequency_is_per_customer() {
        // ids share their displayed prefix but stay separate customers
        let customers = vec![customer("abcde111", 4, 1, 10.0), customer("abcde222", 2, 3, 30.0)];
        let summary = RfmSummary::new(&customers);

        assert_eq!(summary.average_frequency, Some(2.0));
        assert_eq!(summary.average_recency, Some(3.0));
    }

    #[test]
    fn test_rfm_summary_empty() {
        let summary = RfmSummary::new(&[]);
        assert_eq!(summary.average_recency, None);
        assert!(summary.by_monetary.is_empty());
    }

    #[test]
    fn test_dashboard_build() {
        let line = |customer: &str, category: &str, state: &str, price: f64, ts: &str| OrderLine {
            order_id: format!("{}-{}", customer, ts),
            customer_id: customer.to_string(),
            purchased_at: parse_timestamp(ts).unwrap(),
            category: Some(category.to_string()),
            product_id: format!("{}-p", category),
            total_price: price,
            customer_state: state.to_string(),
        };
        let ledger = Ledger::new(
            vec![summary("o1", "2018-01-03", 45.0), summary("o2", "2018-01-09", 20.0)],
            vec![
                line("alice", "toys", "SP", 25.0, "2018-01-03"),
                line("alice", "books", "SP", 20.0, "2018-01-03"),
                line("bob", "toys", "RJ", 20.0, "2018-01-09"),
            ],
        );

        let dashboard = Dashboard::build(&ledger, window(), &RfmScorer::default()).unwrap();

        assert_eq!(dashboard.daily.total_orders, 2);
        assert_eq!(dashboard.product_summary, ProductSummary { categories: 2, products_sold: 3 });
        assert_eq!(
            dashboard.demographic_summary,
            DemographicSummary { total_customers: 3, total_states: 2 }
        );
        assert_eq!(dashboard.customers.len(), 2);
        assert_eq!(dashboard.ranking.len(), 2);
        assert_eq!(dashboard.product_revenue.rows[0].key, "toys");
    }
}
