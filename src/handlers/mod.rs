pub mod scanner;

pub use scanner::{run_scan, CaptureOutcome, ScanController, ScanOutcome};
