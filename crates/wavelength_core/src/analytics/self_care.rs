use crate::model::catalog::Catalog;
use crate::model::journal::JournalRecord;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Display text for strategy ids the catalog does not know.
pub const UNKNOWN_STRATEGY_TEXT: &str = "Unknown strategy";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StrategyTally {
    pub strategy_id: i64,
    pub text: String,
    pub count: u64,
    /// Share of entries that recorded any strategy, `0.0..=100.0`.
    pub percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SelfCareSummary {
    pub total_strategy_entries: u64,
    pub distinct_strategies: u64,
    /// `distinct_strategies / total_strategy_entries * 100`.
    pub diversity_score: f64,
    pub top_strategies: Vec<StrategyTally>,
}

pub(super) fn compute(catalog: &Catalog, records: &[JournalRecord], limit: usize) -> SelfCareSummary {
    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for strategy_id in records.iter().filter_map(|record| record.strategy_id) {
        *counts.entry(strategy_id).or_default() += 1;
    }

    let total_strategy_entries: u64 = counts.values().sum();
    if total_strategy_entries == 0 {
        return SelfCareSummary::default();
    }
    let distinct_strategies = counts.len() as u64;

    let mut unresolved = 0usize;
    let mut top_strategies: Vec<StrategyTally> = counts
        .into_iter()
        .map(|(strategy_id, count)| {
            let text = match catalog.strategy(strategy_id) {
                Some(info) => info.text.clone(),
                None => {
                    unresolved += 1;
                    UNKNOWN_STRATEGY_TEXT.to_string()
                }
            };
            StrategyTally {
                strategy_id,
                text,
                count,
                percentage: count as f64 / total_strategy_entries as f64 * 100.0,
            }
        })
        .collect();
    top_strategies.sort_by(|left, right| right.count.cmp(&left.count));
    top_strategies.truncate(limit);

    debug!(
        "event=analytics_self_care module=analytics status=ok strategy_entries={} distinct={} unresolved_strategies={}",
        total_strategy_entries, distinct_strategies, unresolved
    );

    SelfCareSummary {
        total_strategy_entries,
        distinct_strategies,
        diversity_score: distinct_strategies as f64 / total_strategy_entries as f64 * 100.0,
        top_strategies,
    }
}
