//! Query helpers for presenting computed balances.

use wb_calc::{BalanceResult, BalanceStatus, FlowCategory, FlowTotals};

/// Headline numbers of one period.
#[derive(Debug, Clone, PartialEq)]
pub struct BalanceSummary {
    pub label: String,
    pub inflow_m3: f64,
    pub outflow_m3: f64,
    pub storage_delta_m3: f64,
    pub balance_error_m3: f64,
    pub error_pct: f64,
    pub status: BalanceStatus,
    pub flag_count: usize,
    pub degraded: bool,
    pub integrity_issue_count: usize,
}

pub fn summarize(result: &BalanceResult) -> BalanceSummary {
    BalanceSummary {
        label: result.label.clone(),
        inflow_m3: result.inflows.total_m3,
        outflow_m3: result.outflows.total_m3,
        storage_delta_m3: result.storage.delta_m3,
        balance_error_m3: result.balance_error_m3,
        error_pct: result.error_pct,
        status: result.status,
        flag_count: result.quality.len(),
        degraded: result.quality.has_degraded(),
        integrity_issue_count: result.integrity.len(),
    }
}

/// `(category, m³)` rows in category order, transfers last.
pub fn category_rows<C: FlowCategory>(totals: &FlowTotals<C>) -> Vec<(String, f64)> {
    let mut rows: Vec<(bool, String, f64)> = totals
        .by_category
        .iter()
        .map(|(c, v)| (c.is_transfer(), category_name(c), *v))
        .collect();
    rows.sort_by_key(|(transfer, _, _)| *transfer);
    rows.into_iter().map(|(_, name, v)| (name, v)).collect()
}

fn category_name<C: FlowCategory>(category: &C) -> String {
    serde_json::to_value(category)
        .ok()
        .and_then(|v| v.as_str().map(str::to_owned))
        .unwrap_or_default()
}

/// One line per quality flag, degraded flags first.
pub fn flag_lines(result: &BalanceResult) -> Vec<String> {
    let mut flags: Vec<_> = result.quality.iter().collect();
    flags.sort_by_key(|f| !f.is_degraded());
    flags
        .into_iter()
        .map(|f| {
            if f.is_degraded() {
                format!("! {}", f)
            } else {
                format!("  {}", f)
            }
        })
        .collect()
}
