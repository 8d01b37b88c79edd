mod orchestrator;
mod verify;

pub use orchestrator::{enumerate_patches, run_scan, ScanConfig, ScanSummary};
pub use verify::{verify_scan, VerifyReport};
