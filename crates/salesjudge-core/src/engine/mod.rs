pub mod guard;
pub mod invoke;
pub mod policy;
pub mod runner;

pub use guard::RunGuard;
pub use policy::{FailurePolicy, ScanPolicy};
pub use runner::{ScanOutcome, ScanRunner};
