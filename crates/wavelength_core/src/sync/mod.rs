//! Local-first sync: remote endpoint contract, HTTP adapter and sync client.
//!
//! # Responsibility
//! - Submit journal entries to the remote service on a best-effort basis.
//! - Fold every remote outcome into the record's sync status.
//!
//! # Invariants
//! - Entries are persisted locally before any remote call starts.
//! - Remote failures never propagate past the sync client.

pub mod client;
pub mod http;
pub mod remote;
