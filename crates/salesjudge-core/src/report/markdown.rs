use super::ReportData;
use crate::canonical::Comparison;
use crate::thresholds::Zone;

pub const BAD_CASE_DETAILS: usize = 10;

/// Flattens newlines, clips to `max_len` characters and escapes pipes.
pub fn md_cell(text: &str, max_len: usize) -> String {
    let flat = text.replace('\n', " ");
    let trimmed = flat.trim();
    let clipped = if trimmed.chars().count() > max_len {
        let mut s: String = trimmed.chars().take(max_len.saturating_sub(1)).collect();
        s.push('…');
        s
    } else {
        trimmed.to_string()
    };
    clipped.replace('|', "\\|")
}

fn opt(v: Option<i64>) -> String {
    v.map(|n| n.to_string()).unwrap_or_else(|| "-".to_string())
}

fn flag(b: bool) -> u8 {
    u8::from(b)
}

pub fn render_markdown(data: &ReportData) -> String {
    let t = &data.thresholds;
    let mut lines: Vec<String> = vec![
        "# Scan Metrics".into(),
        String::new(),
        format!("- metrics_version: `{}`", data.metrics_version),
        format!("- scan_policy: `{}`", data.policy_line),
        "- llm_audit_trace: `full request_json + response_json + extracted_json`".into(),
        format!("- canonical_run_id: `{}`", data.canonical.run_id),
        format!("- current_run_id: `{}`", data.run_id),
    ];
    if let Some(against) = &data.against {
        lines.push(format!("- against_run_id: `{}`", against));
    }
    lines.extend([
        format!("- inserted_results: `{}`", data.inserted),
        format!("- judged_results: `{}`", data.judged),
        format!("- judge_coverage: `{:.4}`", data.coverage),
        format!("- judge_coverage_target: `{:.2}`", t.judge_coverage_min),
        String::new(),
        "## Rule Metrics".into(),
        String::new(),
        "| rule | eval_total | eval_true | evaluator_hit_rate | judge_correctness | judge_coverage | alert |".into(),
        "|---|---:|---:|---:|---:|---:|---|".into(),
    ]);
    if data.metrics.is_empty() {
        lines.push("| `-` | 0 | 0 | 0.0000 | 0.0000 | 0.0000 | n/a |".into());
    }
    for m in &data.metrics {
        let alert = if m.judged_total == 0 {
            "n/a"
        } else if t.is_rule_alert(m.judge_correctness) {
            "ALERT"
        } else {
            "ok"
        };
        lines.push(format!(
            "| `{}` | {} | {} | {:.4} | {:.4} | {:.4} | {} |",
            m.rule_key,
            m.eval_total,
            m.eval_true,
            m.evaluator_hit_rate,
            m.judge_correctness,
            m.judge_coverage,
            alert
        ));
    }

    lines.extend([
        String::new(),
        "## Rule Quality Delta (judge_correctness)".into(),
        String::new(),
    ]);
    match &data.comparison {
        Comparison::Delta(deltas) => {
            let baseline = if data.against.is_some() { "baseline" } else { "canonical" };
            lines.push(format!("| rule | {} | current | delta |", baseline));
            lines.push("|---|---:|---:|---:|".into());
            for d in deltas {
                let sign = if d.delta > 0.0 { "+" } else { "" };
                lines.push(format!(
                    "| `{}` | {:.4} | {:.4} | {}{:.4} |",
                    d.rule_key, d.baseline, d.current, sign, d.delta
                ));
            }
        }
        mismatch @ Comparison::VersionMismatch { .. } => {
            if let Some(note) = mismatch.mismatch_note() {
                lines.push(format!("- note: {}", note));
            }
        }
    }
    if let Some(note) = &data.canonical.note {
        lines.extend([String::new(), format!("- note: {}", note)]);
    }

    lines.extend([
        String::new(),
        "## LLM Calls".into(),
        String::new(),
        "| phase | calls | errors | prompt_chars | response_chars |".into(),
        "|---|---:|---:|---:|---:|".into(),
    ]);
    if data.calls.is_empty() {
        lines.push("| `-` | 0 | 0 | 0 | 0 |".into());
    }
    for c in &data.calls {
        lines.push(format!(
            "| `{}` | {} | {} | {} | {} |",
            c.phase, c.calls, c.errors, c.prompt_chars, c.response_chars
        ));
    }

    let zones = data.heatmap.zone_counts(t);
    let zone_count = |z: Zone| zones.iter().find(|(k, _)| *k == z).map(|(_, n)| *n).unwrap_or(0);
    lines.extend([
        String::new(),
        "## Judge-Aligned Heatmap".into(),
        String::new(),
        format!("- thresholds: `{}`", t.doc_line()),
        format!("- conversations: `{}`", data.heatmap.conversation_ids.len()),
        format!("- rules: `{}`", data.heatmap.rule_keys.len()),
        String::new(),
        "| zone | cells |".into(),
        "|---|---:|".into(),
    ]);
    for z in Zone::ALL {
        lines.push(format!("| `{}` | {} |", z.as_str(), zone_count(z)));
    }

    lines.extend([
        String::new(),
        "### Worst conversation x rule cells".into(),
        String::new(),
        "| conversation_id | rule | score | judged_total |".into(),
        "|---|---|---:|---:|".into(),
    ]);
    if data.worst_cells.is_empty() {
        lines.push("| `-` | `-` | n/a | 0 |".into());
    }
    for w in &data.worst_cells {
        lines.push(format!(
            "| `{}` | `{}` | {:.4} | {} |",
            w.conversation_id, w.rule_key, w.score, w.judged_total
        ));
    }

    lines.extend([
        String::new(),
        "## Judge-Confirmed Bad Cases (judge_label=0)".into(),
        String::new(),
        "| conversation_id | evidence_message_id | evidence_message_order | rule | eval_hit | expected_hit | reason_code | evidence_quote |".into(),
        "|---|---:|---:|---|---:|---:|---|---|".into(),
    ]);
    if data.bad_cases.is_empty() {
        lines.push("| `-` | 0 | 0 | `-` | 0 | 0 | `-` | `-` |".into());
    } else {
        for c in &data.bad_cases {
            lines.push(format!(
                "| `{}` | {} | {} | `{}` | {} | {} | `{}` | `{}` |",
                c.conversation_id,
                opt(c.evidence_message_id),
                opt(c.evidence_message_order),
                c.rule_key,
                flag(c.eval_hit),
                flag(c.judge_expected_hit),
                md_cell(&c.eval_reason_code, 60),
                md_cell(&c.evidence_quote, 80)
            ));
        }
        lines.extend([String::new(), "### Bad Case Details".into(), String::new()]);
        for (idx, c) in data.bad_cases.iter().take(BAD_CASE_DETAILS).enumerate() {
            lines.push(format!(
                "{}. `{}` evidence_message_id={} rule=`{}` eval_hit={} expected_hit={}",
                idx + 1,
                c.conversation_id,
                opt(c.evidence_message_id),
                c.rule_key,
                flag(c.eval_hit),
                flag(c.judge_expected_hit)
            ));
            lines.push(format!(
                "   evidence_message_order: {}",
                md_cell(&opt(c.evidence_message_order), 40)
            ));
            lines.push(format!(
                "   evidence_message_text: {}",
                md_cell(&c.evidence_message_text, 200)
            ));
            lines.push(format!("   evaluator_reason: {}", md_cell(&c.eval_reason, 200)));
            lines.push(format!("   judge_rationale: {}", md_cell(&c.judge_rationale, 200)));
            lines.push(format!("   evidence_quote: {}", md_cell(&c.evidence_quote, 120)));
        }
    }

    lines.extend([
        String::new(),
        "## Run Summary JSON".into(),
        String::new(),
        format!("- summary_json: `{}`", data.summary_json),
    ]);

    let mut out = lines.join("\n");
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_md_cell() {
        assert_eq!(md_cell(" a|b\nc ", 120), "a\\|b c");
        assert_eq!(md_cell("abcdef", 4), "abc…");
        assert_eq!(md_cell("привет мир", 4), "при…");
        assert_eq!(md_cell("abc", 3), "abc");
    }
}
