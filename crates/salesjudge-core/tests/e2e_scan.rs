mod common;

use salesjudge_core::canonical::NOTE_FALLBACK;
use salesjudge_core::model::ScanStatus;
use salesjudge_core::providers::llm::fake::HeuristicClient;
use salesjudge_core::report::{self, MemorySink, ReportRequest, HEATMAP_NAME, MARKDOWN_NAME};
use salesjudge_core::ScanRunner;
use std::sync::Arc;

#[tokio::test]
async fn test_budget_conversation_end_to_end() -> anyhow::Result<()> {
    let store = common::budget_store();
    let runner = ScanRunner::new(store.clone(), Arc::new(HeuristicClient::new("offline")));

    let outcome = runner.run(0, 0).await?;
    assert!(outcome.run_id.starts_with("scan_"));

    let rows = store.results(&outcome.run_id)?;
    assert_eq!(rows.len(), 3);
    let by_rule = |k: &str| rows.iter().find(|r| r.rule_key == k).unwrap();

    let greeting = by_rule("greeting");
    assert!(greeting.eval_hit);
    assert_eq!(greeting.evidence_quote, "Hello!");
    assert_eq!(greeting.evidence_message_order, Some(2));
    assert!(by_rule("empathy").eval_hit);
    assert!(by_rule("upsell").eval_hit);
    assert!(rows.iter().all(|r| r.judge_label));

    let s = &outcome.summary;
    assert_eq!(s.counters.inserted, 3);
    assert_eq!(s.counters.judged, 3);
    assert_eq!(s.counters.processed, 3);
    assert_eq!(s.judge_coverage, Some(1.0));
    assert_eq!(s.seller_messages, 1);
    assert_eq!(s.customer_messages_context_only, 1);
    assert_eq!(s.canonical_run_id.as_deref(), Some(outcome.run_id.as_str()));
    assert_eq!(s.canonical_note.as_deref(), Some(NOTE_FALLBACK));

    let run = store.get_run(&outcome.run_id)?.unwrap();
    assert_eq!(run.status, ScanStatus::Success);
    assert_eq!(run.summary["judge_coverage"], 1.0);
    assert_eq!(run.summary["metrics_version"], salesjudge_core::rules::METRICS_VERSION);

    let metrics = store.metrics(&outcome.run_id)?;
    assert_eq!(metrics.len(), 3);
    for m in &metrics {
        assert_eq!(m.judge_coverage, 1.0);
        assert_eq!(m.evaluator_hit_rate, 1.0);
        assert_eq!(m.judge_correctness, 1.0);
    }

    let calls = store.llm_calls(&outcome.run_id)?;
    let phases: Vec<&str> = calls.iter().map(|c| c.phase.as_str()).collect();
    assert_eq!(phases, vec!["evaluator", "judge"]);
    assert!(calls.iter().all(|c| c.parse_ok && c.validation_ok && c.attempt == 1));
    assert!(calls[0].request_json.contains("BundledEvaluatorResult__greeting__upsell__empathy"));
    Ok(())
}

#[tokio::test]
async fn test_second_scan_keeps_pinned_canonical() -> anyhow::Result<()> {
    let store = common::budget_store();
    let runner = ScanRunner::new(store.clone(), Arc::new(HeuristicClient::new("offline")));
    let first = runner.run(0, 0).await?;
    let second = runner.run(0, 0).await?;
    assert_ne!(first.run_id, second.run_id);
    assert_eq!(second.summary.canonical_run_id.as_deref(), Some(first.run_id.as_str()));
    assert_eq!(second.summary.canonical_note, None);
    assert_eq!(store.list_runs(10)?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_conversation_without_seller_is_skipped() -> anyhow::Result<()> {
    let store = common::budget_store();
    common::add(
        &store,
        "conv-002",
        &[(salesjudge_core::model::SpeakerRole::Customer, "anyone there?")],
    );
    let runner = ScanRunner::new(store.clone(), Arc::new(HeuristicClient::new("offline")));
    let outcome = runner.run(0, 1).await?;
    assert_eq!(outcome.summary.counters.skipped_conversations_without_seller, 1);
    assert_eq!(outcome.summary.counters.evaluated_conversations, 1);
    assert_eq!(store.llm_calls(&outcome.run_id)?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn test_report_is_deterministic() -> anyhow::Result<()> {
    let store = common::budget_store();
    let runner = ScanRunner::new(store.clone(), Arc::new(HeuristicClient::new("offline")));
    let outcome = runner.run(0, 0).await?;

    let req = ReportRequest::default();
    let a = report::compose(&store, &req)?;
    let b = report::compose(&store, &req)?;
    assert_eq!(a.run_id, outcome.run_id);
    assert_eq!(a.markdown, b.markdown);
    assert_eq!(a.svg, b.svg);

    let md = &a.markdown;
    assert!(md.starts_with("# Scan Metrics\n"));
    assert!(md.contains("- judge_coverage: `1.0000`"));
    assert!(md.contains("| `greeting` | 1 | 1 | 1.0000 | 1.0000 | 1.0000 | ok |"));
    assert!(md.contains("| `evaluator` | 1 | 0 |"));
    assert!(md.contains("| `green` | 3 |"));
    assert!(md.contains("| `-` | 0 | 0 | `-` | 0 | 0 | `-` | `-` |"));
    assert!(md.contains("## Run Summary JSON"));

    let mut sink = MemorySink::default();
    let written = a.write_to(&mut sink)?;
    assert_eq!(written, vec![MARKDOWN_NAME, HEATMAP_NAME]);
    assert_eq!(sink.text(MARKDOWN_NAME), Some(md.as_str()));
    assert!(sink.text(HEATMAP_NAME).unwrap().contains("conv-001"));
    Ok(())
}
