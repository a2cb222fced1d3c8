//! Rank-normalized composite RFM scoring

use std::cmp::Ordering;

use ndarray::{arr1, Array1, Array2};
use polars::prelude::{col, df, Expr, IntoLazy, RankMethod, RankOptions};
use tracing::{debug, warn};

use crate::error::RfmError;
use crate::rfm::CustomerRfm;

const RECENCY: &str = "recency";
const FREQUENCY: &str = "frequency";
const MONETARY: &str = "monetary";

/// Which rank feeds the monetary percentile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonetaryRank {
    /// `M_rank / max(M_rank) * 100`
    #[default]
    Monetary,
    /// `F_rank / max(M_rank) * 100`, bug-compatible with legacy reports.
    /// The percentile can exceed 100 in this mode.
    LegacyFrequency,
}

/// Composite score weights and the final scale factor
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoringWeights {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
    /// Maps the 0..100 weighted percentile onto 0..5
    pub scale: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            recency: 0.15,
            frequency: 0.28,
            monetary: 0.57,
            scale: 0.05,
        }
    }
}

impl ScoringWeights {
    fn as_array(&self) -> Array1<f64> {
        arr1(&[self.recency, self.frequency, self.monetary])
    }
}

/// Normalized rank percentiles of one customer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankPercentiles {
    pub recency: f64,
    pub frequency: f64,
    pub monetary: f64,
}

/// A customer with its percentiles and composite score
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredCustomer {
    pub customer_id: String,
    pub recency: i64,
    pub frequency: usize,
    /// Rounded to 2 decimals
    pub monetary: f64,
    pub percentiles: RankPercentiles,
    /// Rounded to 2 decimals
    pub rfm_score: f64,
}

/// Scoring configuration
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RfmScorer {
    pub weights: ScoringWeights,
    pub monetary_rank: MonetaryRank,
}

impl RfmScorer {
    pub fn new(weights: ScoringWeights, monetary_rank: MonetaryRank) -> Self {
        Self { weights, monetary_rank }
    }

    /// Score every well-formed customer, best first.
    ///
    /// Rows with a non-finite monetary value or no orders are left out with
    /// a warning. Ties in score are ordered by customer id.
    pub fn score(&self, customers: &[CustomerRfm]) -> Result<Vec<ScoredCustomer>, RfmError> {
        let valid: Vec<&CustomerRfm> = customers
            .iter()
            .filter(|c| {
                let ok = c.monetary.is_finite() && c.frequency > 0 && c.recency >= 0;
                if !ok {
                    warn!(customer = %c.customer_id, "skipping malformed rfm row");
                }
                ok
            })
            .collect();

        if valid.is_empty() {
            return Ok(Vec::new());
        }

        let n = valid.len();
        let raw = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => valid[i].recency as f64,
            1 => valid[i].frequency as f64,
            _ => valid[i].monetary,
        });

        let ranks = rank_matrix(&raw)?;
        let r_rank = ranks.column(0).to_owned();
        let f_rank = ranks.column(1).to_owned();
        let m_rank = ranks.column(2).to_owned();

        let r_norm = normalize(&r_rank, &r_rank);
        let f_norm = normalize(&f_rank, &f_rank);
        let m_norm = match self.monetary_rank {
            MonetaryRank::Monetary => normalize(&m_rank, &m_rank),
            MonetaryRank::LegacyFrequency => normalize(&f_rank, &m_rank),
        };

        let percentiles = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => r_norm[i],
            1 => f_norm[i],
            _ => m_norm[i],
        });
        let scores = percentiles
            .dot(&self.weights.as_array())
            .mapv(|weighted| round2(weighted * self.weights.scale));

        let mut scored: Vec<ScoredCustomer> = valid
            .iter()
            .enumerate()
            .map(|(i, c)| ScoredCustomer {
                customer_id: c.customer_id.clone(),
                recency: c.recency,
                frequency: c.frequency,
                monetary: round2(c.monetary),
                percentiles: RankPercentiles {
                    recency: r_norm[i],
                    frequency: f_norm[i],
                    monetary: m_norm[i],
                },
                rfm_score: scores[i],
            })
            .collect();

        scored.sort_by(|a, b| {
            b.rfm_score
                .partial_cmp(&a.rfm_score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.customer_id.cmp(&b.customer_id))
        });

        debug!(
            customers = scored.len(),
            skipped = customers.len() - n,
            mode = ?self.monetary_rank,
            "rfm scored"
        );
        Ok(scored)
    }
}

/// Score with the default weights and the corrected monetary rank
pub fn score_customers(customers: &[CustomerRfm]) -> Result<Vec<ScoredCustomer>, RfmError> {
    RfmScorer::default().score(customers)
}

/// Ranks of the raw `[recency, frequency, monetary]` columns.
///
/// Recency ranks descending so the most recent buyer ranks highest;
/// frequency and monetary rank ascending.
fn rank_matrix(raw: &Array2<f64>) -> Result<Array2<f64>, RfmError> {
    let frame = df!(
        RECENCY => raw.column(0).to_vec(),
        FREQUENCY => raw.column(1).to_vec(),
        MONETARY => raw.column(2).to_vec()
    )?;
    let ranked = frame
        .lazy()
        .select([
            average_rank(RECENCY, true),
            average_rank(FREQUENCY, false),
            average_rank(MONETARY, false),
        ])
        .collect()?;

    let mut ranks = Array2::zeros(raw.raw_dim());
    for (j, name) in [RECENCY, FREQUENCY, MONETARY].into_iter().enumerate() {
        let column = ranked.column(name)?.f64()?;
        for (i, rank) in column.into_no_null_iter().enumerate() {
            ranks[[i, j]] = rank;
        }
    }
    Ok(ranks)
}

/// 1-based ranks; tied values share the mean of the positions they span
fn average_rank(name: &str, descending: bool) -> Expr {
    col(name).rank(
        RankOptions {
            method: RankMethod::Average,
            descending,
        },
        None,
    )
}

/// `ranks / max(reference) * 100`; callers guarantee a non-empty reference
fn normalize(ranks: &Array1<f64>, reference: &Array1<f64>) -> Array1<f64> {
    let max = reference.fold(f64::NEG_INFINITY, |acc, &r| acc.max(r));
    ranks.mapv(|r| r / max * 100.0)
}

/// Round half to even at 2 decimals
pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round_ties_even() / 100.0
}
