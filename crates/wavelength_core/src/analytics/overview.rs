use super::streak::{current_streak, inclusive_day_count, longest_streak};
use super::AnalyticsEngine;
use crate::model::catalog::{Catalog, CurriculumInfo, Dosage};
use crate::model::journal::JournalRecord;
use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use log::debug;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

const DOMINANT_WINDOW_DAYS: u64 = 7;

/// Headline metrics for one date window.
///
/// Ratios are fractions in `0.0..=1.0`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalyticsOverview {
    pub total_entries: u64,
    pub current_streak: u32,
    pub longest_streak: u32,
    /// Entries per calendar day of the window.
    pub avg_frequency: f64,
    pub last_check_in: Option<DateTime<Utc>>,
    pub medicinal_ratio: f64,
    /// Window ratio minus the ratio of the equally long preceding window.
    pub medicinal_trend: f64,
    pub dominant_layer_id: Option<i64>,
    pub dominant_phase_id: Option<i64>,
    pub unique_emotions: u64,
    pub strategies_used: u64,
    pub secondary_emotions_pct: f64,
}

pub(super) fn compute<Tz: TimeZone>(
    engine: &AnalyticsEngine<Tz>,
    records: &[JournalRecord],
    start_date: NaiveDate,
    end_date: NaiveDate,
) -> AnalyticsOverview {
    let dated: Vec<(NaiveDate, &JournalRecord)> = records
        .iter()
        .map(|record| (engine.local_day(record), record))
        .collect();
    let all_days: BTreeSet<NaiveDate> = dated.iter().map(|(day, _)| *day).collect();

    let window = in_range(&dated, start_date, end_date);
    let day_count = inclusive_day_count(start_date, end_date);
    let total_entries = window.len() as u64;

    let mut overview = AnalyticsOverview {
        current_streak: current_streak(&all_days, end_date),
        longest_streak: longest_streak(&all_days),
        ..AnalyticsOverview::default()
    };
    if records.is_empty() || day_count == 0 {
        return overview;
    }

    let preceding_window = match start_date.checked_sub_days(Days::new(day_count)) {
        Some(preceding_start) => in_range(
            &dated,
            preceding_start,
            start_date.pred_opt().unwrap_or(preceding_start),
        ),
        None => Vec::new(),
    };
    let dominant_window = match end_date.checked_sub_days(Days::new(DOMINANT_WINDOW_DAYS - 1)) {
        Some(dominant_start) => in_range(&dated, dominant_start, end_date),
        None => Vec::new(),
    };

    let catalog = engine.catalog();
    let ratio = medicinal_ratio(catalog, &window);

    // Trend and dominant ids do not depend on the window having entries.
    overview.medicinal_ratio = ratio;
    overview.medicinal_trend = ratio - medicinal_ratio(catalog, &preceding_window);
    overview.dominant_layer_id = dominant(catalog, &dominant_window, |info| info.layer_id);
    overview.dominant_phase_id = dominant(catalog, &dominant_window, |info| info.phase_id);

    overview.total_entries = total_entries;
    overview.avg_frequency = total_entries as f64 / day_count as f64;
    overview.last_check_in = window.iter().map(|record| record.created_at).max();
    overview.unique_emotions = window
        .iter()
        .map(|record| record.primary_curriculum_id)
        .collect::<BTreeSet<_>>()
        .len() as u64;
    overview.strategies_used = window
        .iter()
        .filter_map(|record| record.strategy_id)
        .collect::<BTreeSet<_>>()
        .len() as u64;
    if total_entries > 0 {
        overview.secondary_emotions_pct = window
            .iter()
            .filter(|record| record.secondary_curriculum_id.is_some())
            .count() as f64
            / total_entries as f64;
    }

    debug!(
        "event=analytics_overview module=analytics status=ok window_days={} total_entries={} unresolved_entries={}",
        day_count,
        total_entries,
        window
            .iter()
            .filter(|record| catalog.curriculum(record.primary_curriculum_id).is_none())
            .count()
    );
    overview
}

fn in_range<'a>(
    dated: &[(NaiveDate, &'a JournalRecord)],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<&'a JournalRecord> {
    dated
        .iter()
        .filter(|(day, _)| (start..=end).contains(day))
        .map(|(_, record)| *record)
        .collect()
}

/// Share of medicinal entries among entries whose primary id resolves.
fn medicinal_ratio(catalog: &Catalog, records: &[&JournalRecord]) -> f64 {
    let (medicinal, resolved) = records
        .iter()
        .filter_map(|record| catalog.curriculum(record.primary_curriculum_id))
        .fold((0u64, 0u64), |(medicinal, resolved), info| {
            let is_medicinal = u64::from(info.dosage == Dosage::Medicinal);
            (medicinal + is_medicinal, resolved + 1)
        });
    if resolved == 0 {
        return 0.0;
    }
    medicinal as f64 / resolved as f64
}

/// Most frequent key among resolvable entries; equal counts go to the
/// lowest key.
fn dominant(
    catalog: &Catalog,
    records: &[&JournalRecord],
    key: impl Fn(&CurriculumInfo) -> i64,
) -> Option<i64> {
    let mut counts: BTreeMap<i64, u64> = BTreeMap::new();
    for info in records
        .iter()
        .filter_map(|record| catalog.curriculum(record.primary_curriculum_id))
    {
        *counts.entry(key(info)).or_default() += 1;
    }

    let mut best: Option<(i64, u64)> = None;
    for (id, count) in counts {
        if best.map_or(true, |(_, best_count)| count > best_count) {
            best = Some((id, count));
        }
    }
    best.map(|(id, _)| id)
}
