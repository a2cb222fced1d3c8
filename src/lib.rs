//! rfmlens: customer-value (RFM) scoring and windowed sales aggregates
//!
//! Pure, in-memory computations over an e-commerce order ledger: a date
//! window filter, four ranked aggregations, per-customer Recency /
//! Frequency / Monetary rollups and a rank-normalized composite score.

pub mod aggregate;
pub mod cli;
pub mod data;
pub mod error;
pub mod report;
pub mod rfm;
pub mod score;
pub mod summary;
pub mod window;

// Re-export public items for easier access
pub use aggregate::{aggregate, aggregate_window, AggregateRow, AggregateTable, AggregationMode, Measure};
pub use cli::Args;
pub use data::{lines_frame, summaries_frame, Ledger, OrderLine, OrderSummary, Timestamped};
pub use error::RfmError;
pub use rfm::{build_customer_rfm, customer_rfm, CustomerRfm};
pub use score::{score_customers, MonetaryRank, RankPercentiles, RfmScorer, ScoredCustomer, ScoringWeights};
pub use summary::{Dashboard, DailyReport, DemographicSummary, ProductSummary, RfmSummary};
pub use window::Window;

/// Common result type used at the application boundary
pub type Result<T> = anyhow::Result<T>;
