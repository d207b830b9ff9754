//! End-to-end scan pipeline and diagnostic export.

pub mod diagnostics;
mod orchestrator;

pub use orchestrator::{generate_scan_id, ScanObserver, ScanOrchestrator, ScanOutcome};
