//! Durable local storage for journal rows.
//!
//! # Responsibility
//! - Keep SQL details inside the core persistence boundary.
//! - Return typed per-call failures (`StoreError`) to every caller.

pub mod journal_store;
