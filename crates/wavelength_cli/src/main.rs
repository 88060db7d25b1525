//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `wavelength_core` linkage with deterministic output.
//! - Optionally summarize a local journal database: `wavelength_cli [DB_PATH]`.

use std::process::ExitCode;
use wavelength_core::{JournalRepository, SqliteJournalRepository};

fn main() -> ExitCode {
    println!("wavelength_core ping={}", wavelength_core::ping());
    println!("wavelength_core version={}", wavelength_core::core_version());

    let Some(db_path) = std::env::args_os().nth(1) else {
        return ExitCode::SUCCESS;
    };

    let repo = SqliteJournalRepository::at_path(db_path);
    let summary = repo
        .count()
        .and_then(|total| Ok((total, repo.fetch_pending_sync()?.len())));
    match summary {
        Ok((total, pending)) => {
            println!("journal entries={total}");
            println!("journal pending_sync={pending}");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to read journal: {err}");
            ExitCode::FAILURE
        }
    }
}
