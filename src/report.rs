//! Plain-text rendering of a dashboard

use std::io::{self, Write};

use crate::aggregate::AggregateTable;
use crate::data::CUSTOMER_ID;
use crate::rfm::CustomerRfm;
use crate::score::ScoredCustomer;
use crate::summary::Dashboard;

/// Characters of the customer id shown in tables
pub const DISPLAY_ID_LEN: usize = 5;

/// Shortened customer id for display. Never use it as a key.
pub fn display_id(customer_id: &str) -> &str {
    match customer_id.char_indices().nth(DISPLAY_ID_LEN) {
        Some((end, _)) => &customer_id[..end],
        None => customer_id,
    }
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{:.2}", v))
}

/// Write a ranked aggregate table under its output column names
pub fn write_aggregate<W: Write>(out: &mut W, title: &str, table: &AggregateTable) -> io::Result<()> {
    writeln!(out, "\n--- {} ---", title)?;
    writeln!(out, "  {:<32} | {:>12}", table.key_column(), table.measure_column())?;
    writeln!(out, "  {:-<32}-+-{:->12}", "", "")?;
    if table.is_empty() {
        writeln!(out, "  (no data in window)")?;
    }
    let shorten = table.key_column() == CUSTOMER_ID;
    for row in &table.rows {
        let key = if shorten { display_id(&row.key) } else { row.key.as_str() };
        writeln!(out, "  {:<32} | {:>12}", key, row.measure)?;
    }
    Ok(())
}

fn write_leaderboard<W, F>(out: &mut W, title: &str, rows: &[CustomerRfm], value: F) -> io::Result<()>
where
    W: Write,
    F: Fn(&CustomerRfm) -> String,
{
    writeln!(out, "  {}:", title)?;
    for row in rows {
        writeln!(out, "    {:<6} {:>10}", display_id(&row.customer_id), value(row))?;
    }
    Ok(())
}

/// Write the scored ranking, top `limit` rows
pub fn write_ranking<W: Write>(out: &mut W, ranking: &[ScoredCustomer], limit: usize) -> io::Result<()> {
    writeln!(out, "\n--- Customer Ranking Based on RFM Analysis ---")?;
    writeln!(
        out,
        "  {:<18} | {:>7} | {:>9} | {:>10} | {:>9}",
        "customer_unique_id", "recency", "frequency", "monetary", "RFM_Score"
    )?;
    if ranking.is_empty() {
        writeln!(out, "  (no customers in window)")?;
    }
    for customer in ranking.iter().take(limit) {
        writeln!(
            out,
            "  {:<18} | {:>7} | {:>9} | {:>10.2} | {:>9.2}",
            display_id(&customer.customer_id),
            customer.recency,
            customer.frequency,
            customer.monetary,
            customer.rfm_score
        )?;
    }
    Ok(())
}

/// Write every dashboard section
pub fn write_dashboard<W: Write>(out: &mut W, dashboard: &Dashboard, ranking_rows: usize) -> io::Result<()> {
    writeln!(out, "=== E-Commerce Dashboard: {} ===", dashboard.window)?;

    let daily = &dashboard.daily;
    writeln!(out, "\n--- Daily Report ---")?;
    writeln!(out, "  Total Orders:        {}", daily.total_orders)?;
    writeln!(out, "  Revenue:             {:.2}", daily.revenue)?;
    writeln!(out, "  Average Order Value: {}", format_optional(daily.average_order_value))?;
    for (day, revenue) in &daily.revenue_by_day {
        writeln!(out, "    {} {:>12.2}", day, revenue)?;
    }

    writeln!(out, "\n--- Product Performance ---")?;
    writeln!(out, "  Total Product Sold:     {}", dashboard.product_summary.products_sold)?;
    writeln!(out, "  Total Product Category: {}", dashboard.product_summary.categories)?;
    let counts = &dashboard.product_counts;
    let top = AggregateTable {
        mode: counts.mode,
        rows: counts.rows.iter().take(10).cloned().collect(),
    };
    let bottom = AggregateTable {
        mode: counts.mode,
        rows: counts.rows[counts.len().saturating_sub(10)..].to_vec(),
    };
    write_aggregate(out, "Top 10 Products Sold", &top)?;
    write_aggregate(out, "Bottom 10 Products Sold", &bottom)?;
    write_aggregate(out, "Top 10 Categories by Revenue", &dashboard.product_revenue)?;
    write_aggregate(out, "Top 10 Customers by Spending", &dashboard.customer_spending)?;

    let rfm = &dashboard.rfm_summary;
    writeln!(out, "\n--- Best Customers Based on RFM Analysis ---")?;
    writeln!(out, "  Average Recency:   {}", format_optional(rfm.average_recency))?;
    writeln!(out, "  Average Frequency: {}", format_optional(rfm.average_frequency))?;
    writeln!(out, "  Average Monetary:  {}", format_optional(rfm.average_monetary))?;
    write_leaderboard(out, "Top 5 by Recency", &rfm.by_recency, |c| c.recency.to_string())?;
    write_leaderboard(out, "Top 5 by Frequency", &rfm.by_frequency, |c| c.frequency.to_string())?;
    write_leaderboard(out, "Top 5 by Monetary", &rfm.by_monetary, |c| format!("{:.2}", c.monetary))?;

    write_ranking(out, &dashboard.ranking, ranking_rows)?;

    writeln!(out, "\n--- Customer Demographics ---")?;
    writeln!(out, "  Total Customers: {}", dashboard.demographic_summary.total_customers)?;
    writeln!(out, "  Total States:    {}", dashboard.demographic_summary.total_states)?;
    write_aggregate(out, "Customer Distribution by State", &dashboard.demographics)?;

    Ok(())
}
