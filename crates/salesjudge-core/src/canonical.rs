//! Canonical baseline run selection and run-to-run comparison.
//!
//! Only runs sharing a metrics version are ever compared numerically.

use crate::storage::store::CANONICAL_RUN_KEY;
use crate::storage::Store;
use std::collections::BTreeMap;

pub const NOTE_SWITCHED: &str = "canonical run switched to version-compatible baseline";
pub const NOTE_FALLBACK: &str =
    "canonical run fell back to current run due to metrics version mismatch";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalSelection {
    pub run_id: String,
    pub note: Option<String>,
}

/// Picks the baseline for `current_run_id` without writing anything.
pub fn select(
    store: &Store,
    current_run_id: &str,
    metrics_version: &str,
) -> anyhow::Result<CanonicalSelection> {
    if let Some(pinned) = store.get_state(CANONICAL_RUN_KEY)? {
        if store.run_metrics_version(&pinned)?.as_deref() == Some(metrics_version) {
            return Ok(CanonicalSelection {
                run_id: pinned,
                note: None,
            });
        }
    }
    if let Some(run_id) = store.earliest_successful_run_for_version(metrics_version)? {
        return Ok(CanonicalSelection {
            run_id,
            note: Some(NOTE_SWITCHED.to_string()),
        });
    }
    Ok(CanonicalSelection {
        run_id: current_run_id.to_string(),
        note: Some(NOTE_FALLBACK.to_string()),
    })
}

/// Selects the baseline and pins it when nothing compatible was pinned.
pub fn resolve_and_pin(
    store: &Store,
    current_run_id: &str,
    metrics_version: &str,
) -> anyhow::Result<CanonicalSelection> {
    let selection = select(store, current_run_id, metrics_version)?;
    let pinned = store.get_state(CANONICAL_RUN_KEY)?;
    if pinned.as_deref() != Some(selection.run_id.as_str()) {
        store.set_state(CANONICAL_RUN_KEY, &selection.run_id)?;
        tracing::info!(
            event = "scan.canonical_pinned",
            run_id = %selection.run_id,
            previous = pinned.as_deref().unwrap_or(""),
            "canonical run pinned"
        );
    }
    Ok(selection)
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleDelta {
    pub rule_key: String,
    pub baseline: f64,
    pub current: f64,
    pub delta: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Delta(Vec<RuleDelta>),
    VersionMismatch { current: String, baseline: String },
}

impl Comparison {
    pub fn mismatch_note(&self) -> Option<String> {
        match self {
            Comparison::Delta(_) => None,
            Comparison::VersionMismatch { current, baseline } => Some(format!(
                "metrics version mismatch (current={}, baseline={}); numeric delta skipped",
                current, baseline
            )),
        }
    }
}

/// Compares judge_correctness per rule. Rules missing on one side count as 0.0.
pub fn compare(store: &Store, current_run_id: &str, baseline_run_id: &str) -> anyhow::Result<Comparison> {
    let current_v = store.run_metrics_version(current_run_id)?.unwrap_or_default();
    let baseline_v = store.run_metrics_version(baseline_run_id)?.unwrap_or_default();
    if current_v != baseline_v {
        return Ok(Comparison::VersionMismatch {
            current: current_v,
            baseline: baseline_v,
        });
    }

    let mut by_rule: BTreeMap<String, (f64, f64)> = BTreeMap::new();
    for m in store.metrics(baseline_run_id)? {
        by_rule.entry(m.rule_key).or_default().0 = m.judge_correctness;
    }
    for m in store.metrics(current_run_id)? {
        by_rule.entry(m.rule_key).or_default().1 = m.judge_correctness;
    }
    Ok(Comparison::Delta(
        by_rule
            .into_iter()
            .map(|(rule_key, (baseline, current))| RuleDelta {
                rule_key,
                baseline,
                current,
                delta: current - baseline,
            })
            .collect(),
    ))
}
