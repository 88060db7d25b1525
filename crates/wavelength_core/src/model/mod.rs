//! Domain model for journal entries and the reference catalog.
//!
//! # Responsibility
//! - Define canonical data structures used by store, sync and analytics.
//!
//! # Invariants
//! - Every journal record is identified by a stable `RecordId`.
//! - Records are never hard-deleted by the sync path.

pub mod catalog;
pub mod journal;
