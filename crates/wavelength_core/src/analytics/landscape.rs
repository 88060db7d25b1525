use crate::model::catalog::{Catalog, Dosage};
use crate::model::journal::JournalRecord;
use log::debug;
use serde::Serialize;
use std::collections::BTreeMap;

/// Share of all entries that landed in one layer or phase.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DistributionBucket {
    pub id: i64,
    pub count: u64,
    /// `count / total_entries * 100`; unresolvable entries count in the total.
    pub percentage: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EmotionTally {
    pub curriculum_id: i64,
    pub text: String,
    pub layer_id: i64,
    pub phase_id: i64,
    pub dosage: Dosage,
    /// Primary and secondary occurrences combined.
    pub count: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EmotionalLandscape {
    pub total_entries: u64,
    pub layer_distribution: Vec<DistributionBucket>,
    pub phase_distribution: Vec<DistributionBucket>,
    pub top_emotions: Vec<EmotionTally>,
}

pub(super) fn compute(catalog: &Catalog, records: &[JournalRecord], limit: usize) -> EmotionalLandscape {
    let total_entries = records.len() as u64;
    if total_entries == 0 {
        return EmotionalLandscape::default();
    }

    let mut layers: BTreeMap<i64, u64> = BTreeMap::new();
    let mut phases: BTreeMap<i64, u64> = BTreeMap::new();
    let mut emotions: BTreeMap<i64, u64> = BTreeMap::new();
    let mut unresolved = 0usize;

    for record in records {
        match catalog.curriculum(record.primary_curriculum_id) {
            Some(info) => {
                *layers.entry(info.layer_id).or_default() += 1;
                *phases.entry(info.phase_id).or_default() += 1;
            }
            None => unresolved += 1,
        }
        let roles = std::iter::once(record.primary_curriculum_id).chain(record.secondary_curriculum_id);
        for curriculum_id in roles {
            *emotions.entry(curriculum_id).or_default() += 1;
        }
    }

    let mut top_emotions: Vec<EmotionTally> = emotions
        .into_iter()
        .filter_map(|(curriculum_id, count)| {
            let info = catalog.curriculum(curriculum_id)?;
            Some(EmotionTally {
                curriculum_id,
                text: info.text.clone(),
                layer_id: info.layer_id,
                phase_id: info.phase_id,
                dosage: info.dosage,
                count,
            })
        })
        .collect();
    // Stable sort keeps ascending id order among equal counts.
    top_emotions.sort_by(|left, right| right.count.cmp(&left.count));
    top_emotions.truncate(limit);

    if unresolved > 0 {
        debug!(
            "event=analytics_landscape module=analytics status=partial unresolved_entries={}",
            unresolved
        );
    }

    EmotionalLandscape {
        total_entries,
        layer_distribution: buckets(layers, total_entries),
        phase_distribution: buckets(phases, total_entries),
        top_emotions,
    }
}

fn buckets(counts: BTreeMap<i64, u64>, total: u64) -> Vec<DistributionBucket> {
    counts
        .into_iter()
        .map(|(id, count)| DistributionBucket {
            id,
            count,
            percentage: count as f64 / total as f64 * 100.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use crate::analytics::AnalyticsEngine;
    use crate::model::catalog::{Catalog, CurriculumInfo, Dosage};
    use crate::model::journal::{InitiatedBy, JournalRecord, NewJournalEntry};
    use chrono::{TimeZone, Utc};

    fn record(primary: i64, secondary: Option<i64>) -> JournalRecord {
        JournalRecord::new(NewJournalEntry {
            created_at: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            user_id: 1,
            primary_curriculum_id: primary,
            secondary_curriculum_id: secondary,
            strategy_id: None,
            initiated_by: InitiatedBy::Scheduled,
        })
    }

    fn catalog() -> Catalog {
        Catalog::new()
            .with_curriculum(
                1,
                CurriculumInfo {
                    text: "calm".to_string(),
                    layer_id: 2,
                    phase_id: 1,
                    dosage: Dosage::Medicinal,
                },
            )
            .with_curriculum(
                2,
                CurriculumInfo {
                    text: "tense".to_string(),
                    layer_id: 1,
                    phase_id: 1,
                    dosage: Dosage::Toxic,
                },
            )
    }

    #[test]
    fn distribution_counts_unresolvable_entries_in_total() {
        let engine = AnalyticsEngine::with_time_zone(catalog(), Utc);
        let records = vec![record(1, None), record(2, None), record(1, None), record(99, None)];

        let landscape = engine.emotional_landscape(&records, 10);

        assert_eq!(landscape.total_entries, 4);
        let layers: Vec<(i64, u64, f64)> = landscape
            .layer_distribution
            .iter()
            .map(|bucket| (bucket.id, bucket.count, bucket.percentage))
            .collect();
        assert_eq!(layers, vec![(1, 1, 25.0), (2, 2, 50.0)]);
        assert_eq!(landscape.phase_distribution.len(), 1);
        assert_eq!(landscape.phase_distribution[0].percentage, 75.0);
    }

    #[test]
    fn top_emotions_count_both_roles_and_break_ties_by_id() {
        let engine = AnalyticsEngine::with_time_zone(catalog(), Utc);
        let records = vec![record(2, Some(1)), record(1, Some(2)), record(99, Some(2))];

        let landscape = engine.emotional_landscape(&records, 10);
        let tallies: Vec<(i64, u64)> = landscape
            .top_emotions
            .iter()
            .map(|tally| (tally.curriculum_id, tally.count))
            .collect();
        assert_eq!(tallies, vec![(2, 3), (1, 2)]);

        let limited = engine.emotional_landscape(&[record(1, None), record(2, None)], 1);
        assert_eq!(limited.top_emotions.len(), 1);
        assert_eq!(limited.top_emotions[0].curriculum_id, 1);
        assert_eq!(limited.top_emotions[0].text, "calm");
    }

    #[test]
    fn empty_input_is_empty_landscape() {
        let engine = AnalyticsEngine::with_time_zone(catalog(), Utc);
        let landscape = engine.emotional_landscape(&[], 5);
        assert_eq!(landscape.total_entries, 0);
        assert!(landscape.layer_distribution.is_empty());
        assert!(landscape.top_emotions.is_empty());
    }
}
