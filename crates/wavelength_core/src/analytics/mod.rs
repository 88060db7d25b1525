//! Local analytics over a snapshot of stored journal records.
//!
//! # Responsibility
//! - Recompute every user-facing metric from local records plus a catalog.
//!
//! # Invariants
//! - Pure and deterministic: same records + catalog + time zone give the
//!   same result; inputs are never mutated.
//! - Catalog misses are excluded silently, never reported as errors.
//! - Calendar days are taken in the engine's time zone.

mod landscape;
mod overview;
mod self_care;
pub mod streak;

pub use landscape::{DistributionBucket, EmotionTally, EmotionalLandscape};
pub use overview::AnalyticsOverview;
pub use self_care::{SelfCareSummary, StrategyTally, UNKNOWN_STRATEGY_TEXT};

use crate::model::catalog::Catalog;
use crate::model::journal::JournalRecord;
use chrono::{Local, NaiveDate, TimeZone};

/// Analytics bound to one catalog snapshot and one time zone.
#[derive(Debug, Clone)]
pub struct AnalyticsEngine<Tz: TimeZone = Local> {
    catalog: Catalog,
    time_zone: Tz,
}

impl AnalyticsEngine<Local> {
    /// Engine that buckets entries by the device's local calendar days.
    pub fn new(catalog: Catalog) -> Self {
        Self::with_time_zone(catalog, Local)
    }
}

impl<Tz: TimeZone> AnalyticsEngine<Tz> {
    pub fn with_time_zone(catalog: Catalog, time_zone: Tz) -> Self {
        Self { catalog, time_zone }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Window metrics over `[start_date, end_date]`, both inclusive.
    pub fn overview(
        &self,
        records: &[JournalRecord],
        start_date: NaiveDate,
        end_date: NaiveDate,
    ) -> AnalyticsOverview {
        overview::compute(self, records, start_date, end_date)
    }

    /// Layer/phase distribution and the `limit` most frequent emotions.
    pub fn emotional_landscape(&self, records: &[JournalRecord], limit: usize) -> EmotionalLandscape {
        landscape::compute(&self.catalog, records, limit)
    }

    /// Strategy diversity and the `limit` most used strategies.
    pub fn self_care(&self, records: &[JournalRecord], limit: usize) -> SelfCareSummary {
        self_care::compute(&self.catalog, records, limit)
    }

    fn local_day(&self, record: &JournalRecord) -> NaiveDate {
        record.created_at.with_timezone(&self.time_zone).date_naive()
    }
}
