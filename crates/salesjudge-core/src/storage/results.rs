use super::now_utc;
use super::store::Store;
use crate::model::{LlmCallRecord, ScanMetricRow, ScanResultRow};
use rusqlite::params;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RuleCounts {
    pub eval_total: i64,
    pub eval_true: i64,
    pub judged_total: i64,
    pub judge_true: i64,
}

/// Judged verdicts aggregated per (conversation, rule).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeatCell {
    pub conversation_id: String,
    pub rule_key: String,
    pub judged_total: i64,
    pub judge_true: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BadCase {
    pub conversation_id: String,
    pub rule_key: String,
    pub eval_hit: bool,
    pub eval_confidence: f64,
    pub eval_reason_code: String,
    pub eval_reason: String,
    pub evidence_quote: String,
    pub evidence_message_id: Option<i64>,
    pub evidence_message_order: Option<i64>,
    pub evidence_message_text: String,
    pub judge_expected_hit: bool,
    pub judge_confidence: f64,
    pub judge_rationale: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseStats {
    pub phase: String,
    pub calls: i64,
    pub errors: i64,
    pub prompt_chars: i64,
    pub response_chars: i64,
}

impl Store {
    /// Writes all rule rows of one conversation atomically.
    pub fn insert_conversation_results(&self, rows: &[ScanResultRow]) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_utc();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scan_results(run_id, conversation_id, rule_key, eval_hit, eval_confidence,
                   eval_reason_code, eval_reason, evidence_quote, evidence_message_id, evidence_message_order,
                   judge_expected_hit, judge_label, judge_confidence, judge_rationale, created_at_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )?;
            for r in rows {
                stmt.execute(params![
                    r.run_id,
                    r.conversation_id,
                    r.rule_key,
                    r.eval_hit as i64,
                    r.eval_confidence,
                    r.eval_reason_code,
                    r.eval_reason,
                    r.evidence_quote,
                    r.evidence_message_id,
                    r.evidence_message_order,
                    r.judge_expected_hit as i64,
                    r.judge_label as i64,
                    r.judge_confidence,
                    r.judge_rationale,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(rows.len())
    }

    pub fn insert_llm_call(&self, rec: &LlmCallRecord) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO llm_calls(run_id, phase, rule_key, conversation_id, message_id, attempt,
               context_mode, judge_policy, trace_mode, prompt_chars, response_chars, request_json,
               response_http_status, response_json, extracted_json, parse_ok, validation_ok,
               error_message, latency_ms, created_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            params![
                rec.run_id,
                rec.phase,
                rec.rule_key,
                rec.conversation_id,
                rec.message_id,
                rec.attempt as i64,
                rec.context_mode,
                rec.judge_policy,
                rec.trace_mode,
                rec.prompt_chars as i64,
                rec.response_chars as i64,
                rec.request_json,
                rec.response_http_status as i64,
                rec.response_json,
                rec.extracted_json,
                rec.parse_ok as i64,
                rec.validation_ok as i64,
                rec.error_message,
                rec.latency_ms as i64,
                now_utc()
            ],
        )?;
        Ok(())
    }

    pub fn llm_calls(&self, run_id: &str) -> anyhow::Result<Vec<LlmCallRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, phase, rule_key, conversation_id, message_id, attempt, context_mode,
               judge_policy, trace_mode, prompt_chars, response_chars, request_json,
               response_http_status, response_json, extracted_json, parse_ok, validation_ok,
               error_message, latency_ms
             FROM llm_calls WHERE run_id=?1 ORDER BY call_id",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(LlmCallRecord {
                run_id: row.get(0)?,
                phase: row.get(1)?,
                rule_key: row.get(2)?,
                conversation_id: row.get(3)?,
                message_id: row.get(4)?,
                attempt: row.get::<_, i64>(5)? as u32,
                context_mode: row.get(6)?,
                judge_policy: row.get(7)?,
                trace_mode: row.get(8)?,
                prompt_chars: row.get::<_, i64>(9)? as usize,
                response_chars: row.get::<_, i64>(10)? as usize,
                request_json: row.get(11)?,
                response_http_status: row.get::<_, i64>(12)? as u16,
                response_json: row.get(13)?,
                extracted_json: row.get(14)?,
                parse_ok: row.get::<_, i64>(15)? != 0,
                validation_ok: row.get::<_, i64>(16)? != 0,
                error_message: row.get(17)?,
                latency_ms: row.get::<_, i64>(18)? as u64,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Replaces the metric rows of a run.
    pub fn replace_metrics(&self, run_id: &str, rows: &[ScanMetricRow]) -> anyhow::Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM scan_metrics WHERE run_id=?1", params![run_id])?;
        let now = now_utc();
        {
            let mut stmt = tx.prepare(
                "INSERT INTO scan_metrics(run_id, rule_key, eval_total, eval_true, evaluator_hit_rate,
                   judge_correctness, judge_coverage, judged_total, judge_true, judge_false, created_at_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for m in rows {
                stmt.execute(params![
                    run_id,
                    m.rule_key,
                    m.eval_total,
                    m.eval_true,
                    m.evaluator_hit_rate,
                    m.judge_correctness,
                    m.judge_coverage,
                    m.judged_total,
                    m.judge_true,
                    m.judge_false,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn metrics(&self, run_id: &str) -> anyhow::Result<Vec<ScanMetricRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, rule_key, eval_total, eval_true, evaluator_hit_rate, judge_true,
               judge_false, judged_total, judge_correctness, judge_coverage
             FROM scan_metrics WHERE run_id=?1 ORDER BY rule_key",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(ScanMetricRow {
                run_id: row.get(0)?,
                rule_key: row.get(1)?,
                eval_total: row.get(2)?,
                eval_true: row.get(3)?,
                evaluator_hit_rate: row.get(4)?,
                judge_true: row.get(5)?,
                judge_false: row.get(6)?,
                judged_total: row.get(7)?,
                judge_correctness: row.get(8)?,
                judge_coverage: row.get(9)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn rule_counts(&self, run_id: &str, rule_key: &str) -> anyhow::Result<RuleCounts> {
        let conn = self.lock()?;
        let counts = conn.query_row(
            "SELECT COUNT(*),
               COALESCE(SUM(eval_hit), 0),
               COALESCE(SUM(CASE WHEN judge_label IS NOT NULL THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN judge_label = 1 THEN 1 ELSE 0 END), 0)
             FROM scan_results WHERE run_id=?1 AND rule_key=?2",
            params![run_id, rule_key],
            |r| {
                Ok(RuleCounts {
                    eval_total: r.get(0)?,
                    eval_true: r.get(1)?,
                    judged_total: r.get(2)?,
                    judge_true: r.get(3)?,
                })
            },
        )?;
        Ok(counts)
    }

    /// (inserted, judged) for a run.
    pub fn count_results(&self, run_id: &str) -> anyhow::Result<(i64, i64)> {
        let conn = self.lock()?;
        let counts = conn.query_row(
            "SELECT COUNT(*), COALESCE(SUM(CASE WHEN judge_label IS NOT NULL THEN 1 ELSE 0 END), 0)
             FROM scan_results WHERE run_id=?1",
            params![run_id],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(counts)
    }

    pub fn results(&self, run_id: &str) -> anyhow::Result<Vec<ScanResultRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT run_id, conversation_id, rule_key, eval_hit, eval_confidence, eval_reason_code,
               eval_reason, evidence_quote, evidence_message_id, evidence_message_order,
               COALESCE(judge_expected_hit, 0), COALESCE(judge_label, 0),
               COALESCE(judge_confidence, 0), COALESCE(judge_rationale, '')
             FROM scan_results WHERE run_id=?1 ORDER BY conversation_id, rule_key",
        )?;
        let rows = stmt.query_map(params![run_id], |row| {
            Ok(ScanResultRow {
                run_id: row.get(0)?,
                conversation_id: row.get(1)?,
                rule_key: row.get(2)?,
                eval_hit: row.get::<_, i64>(3)? != 0,
                eval_confidence: row.get(4)?,
                eval_reason_code: row.get(5)?,
                eval_reason: row.get(6)?,
                evidence_quote: row.get(7)?,
                evidence_message_id: row.get(8)?,
                evidence_message_order: row.get(9)?,
                judge_expected_hit: row.get::<_, i64>(10)? != 0,
                judge_label: row.get::<_, i64>(11)? != 0,
                judge_confidence: row.get(12)?,
                judge_rationale: row.get(13)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn heatmap_cells(&self, run_id: &str) -> anyhow::Result<Vec<HeatCell>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, rule_key,
               SUM(CASE WHEN judge_label IS NOT NULL THEN 1 ELSE 0 END),
               SUM(CASE WHEN judge_label = 1 THEN 1 ELSE 0 END)
             FROM scan_results WHERE run_id=?1
             GROUP BY conversation_id, rule_key
             ORDER BY conversation_id, rule_key",
        )?;
        let rows = stmt.query_map(params![run_id], |r| {
            Ok(HeatCell {
                conversation_id: r.get(0)?,
                rule_key: r.get(1)?,
                judged_total: r.get(2)?,
                judge_true: r.get(3)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Judge-confirmed failures, most confident disagreement first.
    pub fn bad_cases(&self, run_id: &str, limit: usize) -> anyhow::Result<Vec<BadCase>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT r.conversation_id, r.rule_key, r.eval_hit, r.eval_confidence, r.eval_reason_code,
               r.eval_reason, r.evidence_quote, r.evidence_message_id, r.evidence_message_order,
               COALESCE(m.text, ''),
               COALESCE(r.judge_expected_hit, 0), COALESCE(r.judge_confidence, 0),
               COALESCE(r.judge_rationale, '')
             FROM scan_results r
             LEFT JOIN messages m ON m.message_id = r.evidence_message_id
             WHERE r.run_id=?1 AND r.judge_label = 0
             ORDER BY ABS(r.eval_confidence - COALESCE(r.judge_confidence, 0)) DESC,
               r.rule_key, COALESCE(r.evidence_message_order, 0), r.conversation_id
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![run_id, limit as i64], |r| {
            Ok(BadCase {
                conversation_id: r.get(0)?,
                rule_key: r.get(1)?,
                eval_hit: r.get::<_, i64>(2)? != 0,
                eval_confidence: r.get(3)?,
                eval_reason_code: r.get(4)?,
                eval_reason: r.get(5)?,
                evidence_quote: r.get(6)?,
                evidence_message_id: r.get(7)?,
                evidence_message_order: r.get(8)?,
                evidence_message_text: r.get(9)?,
                judge_expected_hit: r.get::<_, i64>(10)? != 0,
                judge_confidence: r.get(11)?,
                judge_rationale: r.get(12)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn llm_call_stats(&self, run_id: &str) -> anyhow::Result<Vec<PhaseStats>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT phase, COUNT(*),
               SUM(CASE WHEN error_message != '' THEN 1 ELSE 0 END),
               SUM(prompt_chars), SUM(response_chars)
             FROM llm_calls WHERE run_id=?1
             GROUP BY phase ORDER BY phase",
        )?;
        let rows = stmt.query_map(params![run_id], |r| {
            Ok(PhaseStats {
                phase: r.get(0)?,
                calls: r.get(1)?,
                errors: r.get(2)?,
                prompt_chars: r.get(3)?,
                response_chars: r.get(4)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SpeakerRole;

    fn row(run: &str, conv: &str, rule: &str, label: bool, eval_conf: f64) -> ScanResultRow {
        ScanResultRow {
            run_id: run.into(),
            conversation_id: conv.into(),
            rule_key: rule.into(),
            eval_hit: true,
            eval_confidence: eval_conf,
            eval_reason_code: "greeting_present".into(),
            eval_reason: "said hello".into(),
            evidence_quote: "Hello".into(),
            evidence_message_id: Some(1),
            evidence_message_order: Some(1),
            judge_expected_hit: label,
            judge_label: label,
            judge_confidence: 0.5,
            judge_rationale: "checked".into(),
        }
    }

    fn seeded() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s.replace_conversation("c1", "f", &[(SpeakerRole::Seller, "Hello there".into())])
            .unwrap();
        s.create_run("r1", "m", 0, 0, 1, 1).unwrap();
        s
    }

    #[test]
    fn test_counts_and_heatmap() {
        let s = seeded();
        s.insert_conversation_results(&[
            row("r1", "c1", "greeting", true, 0.9),
            row("r1", "c1", "upsell", false, 0.7),
            row("r1", "c2", "greeting", false, 0.6),
        ])
        .unwrap();
        assert_eq!(s.count_results("r1").unwrap(), (3, 3));
        let g = s.rule_counts("r1", "greeting").unwrap();
        assert_eq!(g.eval_total, 2);
        assert_eq!(g.judge_true, 1);
        assert_eq!(s.rule_counts("r1", "empathy").unwrap(), RuleCounts::default());

        let cells = s.heatmap_cells("r1").unwrap();
        assert_eq!(cells.len(), 3);
        assert_eq!(cells[0].conversation_id, "c1");
        assert_eq!(cells[0].rule_key, "greeting");
    }

    #[test]
    fn test_duplicate_result_rolls_back_conversation() {
        let s = seeded();
        let err = s.insert_conversation_results(&[
            row("r1", "c1", "greeting", true, 0.9),
            row("r1", "c1", "greeting", true, 0.9),
        ]);
        assert!(err.is_err());
        assert_eq!(s.count_results("r1").unwrap(), (0, 0));
    }

    #[test]
    fn test_bad_cases_join_evidence_text_and_sort() {
        let s = seeded();
        s.insert_conversation_results(&[
            row("r1", "c1", "greeting", false, 0.6),
            row("r1", "c1", "upsell", false, 1.0),
            row("r1", "c1", "empathy", true, 1.0),
        ])
        .unwrap();
        let cases = s.bad_cases("r1", 20).unwrap();
        assert_eq!(cases.len(), 2);
        assert_eq!(cases[0].rule_key, "upsell");
        assert_eq!(cases[0].evidence_message_text, "Hello there");
    }

    #[test]
    fn test_metrics_replace_is_idempotent() {
        let s = seeded();
        let m = ScanMetricRow {
            run_id: "r1".into(),
            rule_key: "greeting".into(),
            eval_total: 1,
            eval_true: 1,
            evaluator_hit_rate: 1.0,
            judge_true: 1,
            judge_false: 0,
            judged_total: 1,
            judge_correctness: 1.0,
            judge_coverage: 1.0,
        };
        s.replace_metrics("r1", &[m.clone()]).unwrap();
        s.replace_metrics("r1", &[m.clone()]).unwrap();
        assert_eq!(s.metrics("r1").unwrap(), vec![m]);
    }
}
