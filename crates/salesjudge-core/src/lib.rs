//! Evaluator-judge scan engine for sales conversation quality.
//!
//! A scan sends every selected conversation to an evaluator model once, checks
//! each positive verdict against the transcript, asks an independent judge to
//! grade the evaluator, and stores per-rule results, audit rows and metrics.

pub mod canonical;
pub mod config;
pub mod contract;
pub mod engine;
pub mod errors;
pub mod evidence;
pub mod ingest;
pub mod judge;
pub mod metrics;
pub mod model;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod rules;
pub mod storage;
pub mod thresholds;

pub use engine::{FailurePolicy, ScanOutcome, ScanPolicy, ScanRunner};
pub use storage::Store;
