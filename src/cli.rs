//! Command-line interface definitions and argument parsing

use clap::Parser;

use crate::score::{MonetaryRank, RfmScorer, ScoringWeights};
use crate::window::Window;

/// RFM customer scoring and sales aggregates over an order ledger
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// CSV with one row per order (order_id, order_purchase_timestamp, total_revenue)
    #[arg(short, long, default_value = "sum_price_by_orderid.csv")]
    pub summary: String,

    /// CSV with one row per order line (customer, category, product, price, state)
    #[arg(short, long, default_value = "product_performance_df.csv")]
    pub lines: String,

    /// First day of the window, YYYY-MM-DD (default: earliest order)
    #[arg(long)]
    pub start: Option<String>,

    /// Last day of the window, YYYY-MM-DD (default: latest order)
    #[arg(long)]
    pub end: Option<String>,

    /// Rows shown in the customer ranking table
    #[arg(short, long, default_value = "10")]
    pub rows: usize,

    /// Derive the monetary percentile from the frequency rank, as legacy reports did
    #[arg(long)]
    pub legacy_monetary_rank: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Resolve the window, filling missing bounds from `default`
    ///
    /// Without a default (empty ledger) both bounds must be given.
    pub fn window(&self, default: Option<Window>) -> crate::Result<Window> {
        let start = match (&self.start, default) {
            (Some(start), _) => start.clone(),
            (None, Some(span)) => span.start.to_string(),
            (None, None) => anyhow::bail!("--start is required when the ledger is empty"),
        };
        let end = match (&self.end, default) {
            (Some(end), _) => end.clone(),
            (None, Some(span)) => span.end.to_string(),
            (None, None) => anyhow::bail!("--end is required when the ledger is empty"),
        };
        Ok(Window::parse(&start, &end)?)
    }

    pub fn scorer(&self) -> RfmScorer {
        let monetary_rank = if self.legacy_monetary_rank {
            MonetaryRank::LegacyFrequency
        } else {
            MonetaryRank::Monetary
        };
        RfmScorer::new(ScoringWeights::default(), monetary_rank)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(start: Option<&str>, end: Option<&str>) -> Args {
        Args {
            summary: "orders.csv".to_string(),
            lines: "lines.csv".to_string(),
            start: start.map(str::to_string),
            end: end.map(str::to_string),
            rows: 10,
            legacy_monetary_rank: false,
            verbose: false,
        }
    }

    #[test]
    fn test_window_resolution() {
        let span = Window::parse("2016-09-04", "2018-10-17").unwrap();

        let window = args(None, None).window(Some(span)).unwrap();
        assert_eq!(window, span);

        let window = args(Some("2018-01-01"), None).window(Some(span)).unwrap();
        assert_eq!(window, Window::parse("2018-01-01", "2018-10-17").unwrap());

        assert!(args(None, None).window(None).is_err());
        assert!(args(Some("01/01/2018"), None).window(Some(span)).is_err());
    }

    #[test]
    fn test_scorer_flag() {
        let mut a = args(None, None);
        assert_eq!(a.scorer().monetary_rank, MonetaryRank::Monetary);

        a.legacy_monetary_rank = true;
        assert_eq!(a.scorer().monetary_rank, MonetaryRank::LegacyFrequency);
    }

    #[test]
    fn test_parse_from_command_line() {
        let parsed = Args::try_parse_from([
            "rfmlens",
            "--summary",
            "a.csv",
            "--lines",
            "b.csv",
            "--start",
            "2018-01-01",
            "--legacy-monetary-rank",
        ])
        .unwrap();

        assert_eq!(parsed.summary, "a.csv");
        assert_eq!(parsed.start.as_deref(), Some("2018-01-01"));
        assert!(parsed.legacy_monetary_rank);
        assert_eq!(parsed.rows, 10);
    }

    #[test]
    fn test_verbose_flag() {
        assert!(!Args::try_parse_from(["rfmlens"]).unwrap().verbose);
        assert!(Args::try_parse_from(["rfmlens", "-v"]).unwrap().verbose);
        assert!(Args::try_parse_from(["rfmlens", "--verbose"]).unwrap().verbose);
    }
}
