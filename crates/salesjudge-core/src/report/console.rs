use crate::engine::ScanOutcome;
use crate::model::ScanRunRow;

pub fn print_scan_summary(outcome: &ScanOutcome) {
    let s = &outcome.summary;
    let c = &s.counters;
    eprintln!(
        "Scan {}: conversations={} evaluated={} skipped_without_seller={} skipped_on_error={}",
        outcome.run_id,
        s.selected_conversations,
        c.evaluated_conversations,
        c.skipped_conversations_without_seller,
        c.skipped_conversations_on_error
    );
    eprintln!(
        "Results: processed={} inserted={} judged={} judge_coverage={:.4} schema_errors={} non_schema_errors={}",
        c.processed,
        c.inserted,
        c.judged,
        s.judge_coverage.unwrap_or(0.0),
        c.schema_errors,
        c.non_schema_errors
    );
    if let Some(canonical) = &s.canonical_run_id {
        match &s.canonical_note {
            Some(note) => eprintln!("Canonical: {} ({})", canonical, note),
            None => eprintln!("Canonical: {}", canonical),
        }
    }
}

/// One line per run, newest first, on stdout.
pub fn print_runs(runs: &[ScanRunRow]) {
    if runs.is_empty() {
        eprintln!("No scan runs recorded.");
        return;
    }
    for r in runs {
        let version = r.metrics_version().unwrap_or("-");
        let error = r
            .summary
            .get("error")
            .and_then(|e| e.as_str())
            .map(|e| format!(" error={}", e))
            .unwrap_or_default();
        println!(
            "{}\t{}\t{}\t{}..{}\t{}\t{}{}",
            r.run_id,
            r.status.as_str(),
            r.started_at_utc,
            r.conversation_from,
            r.conversation_to,
            r.model,
            version,
            error
        );
    }
}
