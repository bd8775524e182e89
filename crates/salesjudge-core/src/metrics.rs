use crate::model::ScanMetricRow;
use crate::storage::{RuleCounts, Store};

/// Ratio that is `0.0` on a zero denominator and clamped to `[0, 1]`.
pub fn safe_div(num: i64, den: i64) -> f64 {
    if den <= 0 {
        return 0.0;
    }
    (num as f64 / den as f64).clamp(0.0, 1.0)
}

pub fn metric_row(run_id: &str, rule_key: &str, c: RuleCounts) -> ScanMetricRow {
    ScanMetricRow {
        run_id: run_id.to_string(),
        rule_key: rule_key.to_string(),
        eval_total: c.eval_total,
        eval_true: c.eval_true,
        evaluator_hit_rate: safe_div(c.eval_true, c.eval_total),
        judge_true: c.judge_true,
        judge_false: c.judged_total - c.judge_true,
        judged_total: c.judged_total,
        judge_correctness: safe_div(c.judge_true, c.judged_total),
        judge_coverage: safe_div(c.judged_total, c.eval_total),
    }
}

/// Recomputes and replaces the metric rows of `run_id` for every rule.
pub fn compute_metrics(
    store: &Store,
    run_id: &str,
    rule_keys: &[&str],
) -> anyhow::Result<Vec<ScanMetricRow>> {
    let mut rows = Vec::with_capacity(rule_keys.len());
    for key in rule_keys {
        let counts = store.rule_counts(run_id, key)?;
        rows.push(metric_row(run_id, key, counts));
    }
    store.replace_metrics(run_id, &rows)?;
    tracing::debug!(event = "scan.metrics", run_id = %run_id, rules = rows.len(), "metrics recomputed");
    Ok(rows)
}

/// Overall judged/inserted ratio across rules.
pub fn overall_coverage(inserted: i64, judged: i64) -> f64 {
    safe_div(judged, inserted)
}
