use super::guard::RunGuard;
use super::invoke::{audited_call, CallSite};
use super::policy::{FailurePolicy, ScanPolicy};
use crate::canonical;
use crate::contract::{BundleContract, ContractFactory, RuleEvaluation, RuleJudgement, RuleMap};
use crate::errors::{try_classify, ErrorClass, Phase, ScanError};
use crate::evidence;
use crate::judge::{build_judge_prompt, JudgePromptInput, JudgeRuleContext};
use crate::metrics;
use crate::model::{
    Message, ScanCounters, ScanResultRow, ScanSummary, SellerAnchor, SpeakerRole,
};
use crate::prompt::{
    build_evaluator_prompts, business_context, chat_context, seller_catalog, EvaluatorPromptInput,
};
use crate::providers::llm::LlmClient;
use crate::rules::{self, RuleCard, METRICS_VERSION};
use crate::storage::Store;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct ScanOutcome {
    pub run_id: String,
    pub summary: ScanSummary,
}

pub struct ScanRunner {
    pub store: Store,
    pub client: Arc<dyn LlmClient>,
    pub factory: Arc<ContractFactory>,
    pub policy: ScanPolicy,
}

/// Contracts and prompt context shared by every conversation of a run.
struct RunPlan<'a> {
    run_id: &'a str,
    rules: &'a [RuleCard],
    evaluator: Arc<BundleContract>,
    judge: Arc<BundleContract>,
    judge_rules: Vec<JudgeRuleContext>,
}

pub fn new_run_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("scan_{}", &id[..12])
}

impl ScanRunner {
    pub fn new(store: Store, client: Arc<dyn LlmClient>) -> Self {
        Self {
            store,
            client,
            factory: Arc::new(ContractFactory::new()),
            policy: ScanPolicy::fixed(),
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.policy = self.policy.with_failure_policy(failure_policy);
        self
    }

    /// Scans conversations `[from, to]` (by index, ordered by id) with every registered rule.
    pub async fn run(&self, conversation_from: i64, conversation_to: i64) -> anyhow::Result<ScanOutcome> {
        let (conversation_ids, messages) = self
            .store
            .load_messages_for_range(conversation_from, conversation_to)?;

        let rules = rules::all_rules();
        let keys = rules::rule_keys();
        let evaluator = self.factory.evaluator(&keys).map_err(ScanError::from)?;
        let judge = self.factory.judge(&keys).map_err(ScanError::from)?;

        let mut by_conversation: HashMap<&str, Vec<Message>> = HashMap::new();
        for m in &messages {
            by_conversation
                .entry(m.conversation_id.as_str())
                .or_default()
                .push(m.clone());
        }
        let seller_messages = messages
            .iter()
            .filter(|m| m.speaker == SpeakerRole::Seller)
            .count();

        let run_id = new_run_id();
        let guard = RunGuard::begin(
            &self.store,
            &run_id,
            self.client.model(),
            conversation_from,
            conversation_to,
            conversation_ids.len(),
            messages.len(),
        )?;

        let mut summary = ScanSummary {
            conversation_from,
            conversation_to,
            selected_conversations: conversation_ids.len(),
            messages: messages.len(),
            seller_messages,
            customer_messages_context_only: messages.len() - seller_messages,
            rules: rules.len(),
            metrics_version: METRICS_VERSION.to_string(),
            bundle_rules: self.policy.bundle_rules,
            judge_mode: self.policy.judge_mode.to_string(),
            context_mode: self.policy.context_mode.as_str().to_string(),
            llm_trace: self.policy.llm_trace.to_string(),
            failure_policy: self.policy.failure_policy.as_str().to_string(),
            counters: ScanCounters::default(),
            judge_coverage: None,
            canonical_run_id: None,
            canonical_note: None,
            error: None,
            error_class: None,
        };

        tracing::info!(
            event = "scan.started",
            run_id = %run_id,
            provider = self.client.provider_name(),
            model = self.client.model(),
            conversations = conversation_ids.len(),
            messages = messages.len(),
            seller_messages,
            rules = rules.len(),
            range = %format!("{}..{}", conversation_from, conversation_to),
            policy = %self.policy.doc_line(),
            "scan started"
        );

        let plan = RunPlan {
            run_id: &run_id,
            rules,
            evaluator,
            judge,
            judge_rules: business_context(rules),
        };
        let result = self
            .execute(&plan, &conversation_ids, &by_conversation, &mut summary)
            .await;

        match result {
            Ok(()) => {
                guard.succeed(&summary)?;
                tracing::info!(
                    event = "scan.finished",
                    run_id = %run_id,
                    evaluated = summary.counters.evaluated_conversations,
                    skipped_without_seller = summary.counters.skipped_conversations_without_seller,
                    skipped_on_error = summary.counters.skipped_conversations_on_error,
                    inserted = summary.counters.inserted,
                    judged = summary.counters.judged,
                    judge_coverage = summary.judge_coverage.unwrap_or(0.0),
                    schema_errors = summary.counters.schema_errors,
                    non_schema_errors = summary.counters.non_schema_errors,
                    "scan finished"
                );
                Ok(ScanOutcome { run_id, summary })
            }
            Err(e) => Err(fail_run(guard, &mut summary, e)),
        }
    }

    async fn execute(
        &self,
        plan: &RunPlan<'_>,
        conversation_ids: &[String],
        by_conversation: &HashMap<&str, Vec<Message>>,
        summary: &mut ScanSummary,
    ) -> anyhow::Result<()> {
        let total = conversation_ids.len();
        for (pos, conversation_id) in conversation_ids.iter().enumerate() {
            let messages = by_conversation
                .get(conversation_id.as_str())
                .map(|v| v.as_slice())
                .unwrap_or(&[]);
            tracing::info!(
                event = "scan.conversation",
                position = pos + 1,
                total,
                conversation_id = %conversation_id,
                "scanning conversation"
            );

            let catalog = seller_catalog(messages);
            if catalog.is_empty() {
                summary.counters.skipped_conversations_without_seller += 1;
                tracing::info!(event = "scan.skip_no_seller", conversation_id = %conversation_id, "no seller messages");
                continue;
            }
            summary.counters.evaluated_conversations += 1;
            summary.counters.processed += plan.rules.len();

            match self
                .scan_conversation(plan, conversation_id, messages, &catalog, &mut summary.counters)
                .await
            {
                Ok(rows) => {
                    let n = self.store.insert_conversation_results(&rows)?;
                    summary.counters.inserted += n;
                    summary.counters.judged += rows.len();
                }
                Err(e) => {
                    count_error(&mut summary.counters, &e);
                    if self.skippable(&e) {
                        summary.counters.skipped_conversations_on_error += 1;
                        tracing::warn!(
                            event = "scan.skip_on_error",
                            conversation_id = %conversation_id,
                            error = %e,
                            "conversation skipped after retry"
                        );
                        continue;
                    }
                    return Err(e);
                }
            }
        }

        let (db_inserted, db_judged) = self.store.count_results(plan.run_id)?;
        if summary.counters.inserted != summary.counters.judged
            || db_inserted != db_judged
            || db_inserted as usize != summary.counters.inserted
        {
            return Err(ScanError::Invariant(format!(
                "judge coverage must be 1.0: inserted={} judged={} (stored inserted={} judged={})",
                summary.counters.inserted, summary.counters.judged, db_inserted, db_judged
            ))
            .into());
        }

        let keys: Vec<&str> = plan.rules.iter().map(|r| r.key).collect();
        metrics::compute_metrics(&self.store, plan.run_id, &keys)?;
        summary.judge_coverage = Some(metrics::overall_coverage(db_inserted, db_judged));

        let selection = canonical::resolve_and_pin(&self.store, plan.run_id, METRICS_VERSION)?;
        summary.canonical_run_id = Some(selection.run_id);
        summary.canonical_note = selection.note;
        Ok(())
    }

    fn skippable(&self, err: &anyhow::Error) -> bool {
        self.policy.failure_policy == FailurePolicy::RetryThenSkip
            && err
                .downcast_ref::<ScanError>()
                .map(|e| e.is_retryable())
                .unwrap_or(false)
    }

    async fn scan_conversation(
        &self,
        plan: &RunPlan<'_>,
        conversation_id: &str,
        messages: &[Message],
        catalog: &[SellerAnchor],
        counters: &mut ScanCounters,
    ) -> anyhow::Result<Vec<ScanResultRow>> {
        let context = chat_context(messages, self.policy.context_mode);
        let anchor_id = catalog[0].message_id;

        let prompts = build_evaluator_prompts(
            plan.rules,
            &EvaluatorPromptInput {
                conversation_id,
                context_mode: self.policy.context_mode,
                greeting_window_max: self.policy.greeting_window_max,
                chat_context: &context,
                seller_catalog: catalog,
            },
        );
        let eval_payload = self
            .call(
                plan,
                Phase::Evaluator,
                conversation_id,
                anchor_id,
                &plan.evaluator,
                &prompts.system,
                &prompts.user,
                counters,
            )
            .await?;
        let evaluations: RuleMap<RuleEvaluation> =
            RuleMap::from_payload(&plan.evaluator, &eval_payload).map_err(|source| {
                ScanError::Payload {
                    phase: Phase::Evaluator,
                    conversation_id: conversation_id.to_string(),
                    source,
                }
            })?;

        for rule in plan.rules {
            let ev = evaluations.get(rule.key)?;
            ev.check_shape().map_err(|message| ScanError::Payload {
                phase: Phase::Evaluator,
                conversation_id: conversation_id.to_string(),
                source: crate::errors::PayloadError::Shape {
                    rule_key: rule.key.to_string(),
                    message,
                },
            })?;
            if ev.hit {
                evidence::validate(&ev.claim(), catalog, rule.seller_window_max).map_err(
                    |violation| ScanError::Evidence {
                        conversation_id: conversation_id.to_string(),
                        rule_key: rule.key.to_string(),
                        violation,
                    },
                )?;
            }
        }

        let (judge_system, judge_user) = build_judge_prompt(&JudgePromptInput {
            conversation_id,
            context_mode: self.policy.context_mode.as_str(),
            greeting_window_max: self.policy.greeting_window_max,
            chat_context: &context,
            seller_catalog: catalog,
            evaluator_payload: &eval_payload,
            rules: &plan.judge_rules,
        });
        let judge_payload = self
            .call(
                plan,
                Phase::Judge,
                conversation_id,
                anchor_id,
                &plan.judge,
                &judge_system,
                &judge_user,
                counters,
            )
            .await?;
        let judgements: RuleMap<RuleJudgement> = RuleMap::from_payload(&plan.judge, &judge_payload)
            .map_err(|source| ScanError::Payload {
                phase: Phase::Judge,
                conversation_id: conversation_id.to_string(),
                source,
            })?;

        let mut rows = Vec::with_capacity(plan.rules.len());
        for rule in plan.rules {
            let ev = evaluations.get(rule.key)?;
            let jd = judgements.get(rule.key)?;
            rows.push(ScanResultRow {
                run_id: plan.run_id.to_string(),
                conversation_id: conversation_id.to_string(),
                rule_key: rule.key.to_string(),
                eval_hit: ev.hit,
                eval_confidence: ev.confidence,
                eval_reason_code: ev.reason_code.clone(),
                eval_reason: ev.reason.clone(),
                evidence_quote: ev.evidence_quote.clone(),
                evidence_message_id: ev.evidence_message_id,
                evidence_message_order: ev.evidence_message_order,
                judge_expected_hit: jd.expected_hit,
                judge_label: jd.label,
                judge_confidence: jd.confidence,
                judge_rationale: jd.rationale.clone(),
            });
        }
        Ok(rows)
    }

    /// One audited call, retried per the failure policy. Failed attempts that
    /// are retried are counted here; the final failure is counted by the caller.
    #[allow(clippy::too_many_arguments)]
    async fn call(
        &self,
        plan: &RunPlan<'_>,
        phase: Phase,
        conversation_id: &str,
        message_id: i64,
        contract: &BundleContract,
        system_prompt: &str,
        user_prompt: &str,
        counters: &mut ScanCounters,
    ) -> anyhow::Result<Value> {
        let max_attempts = self.policy.failure_policy.max_attempts();
        let mut attempt = 1;
        loop {
            let site = CallSite {
                run_id: plan.run_id,
                phase,
                conversation_id,
                message_id,
                attempt,
            };
            match audited_call(
                &self.store,
                self.client.as_ref(),
                &self.policy,
                site,
                contract,
                system_prompt,
                user_prompt,
            )
            .await
            {
                Ok(v) => return Ok(v),
                Err(e) => {
                    let retryable = e
                        .downcast_ref::<ScanError>()
                        .map(|s| s.is_retryable())
                        .unwrap_or(false);
                    if !retryable || attempt >= max_attempts {
                        return Err(e);
                    }
                    count_error(counters, &e);
                    tracing::info!(
                        event = "scan.retry",
                        phase = %phase,
                        conversation_id = %conversation_id,
                        attempt = attempt + 1,
                        "retrying llm call"
                    );
                    attempt += 1;
                }
            }
        }
    }
}

/// Records `err` on the run and hands it back. A failure to finalize is
/// logged; the scan error is what the caller sees.
fn fail_run(guard: RunGuard, summary: &mut ScanSummary, err: anyhow::Error) -> anyhow::Error {
    let class = try_classify(&err);
    let run_id = guard.run_id().to_string();
    summary.error = Some(err.to_string());
    summary.error_class = Some(class);
    if let Err(finalize) = guard.fail(summary) {
        tracing::error!(
            event = "scan.finalize_failed",
            run_id = %run_id,
            error = %finalize,
            "could not record failed run"
        );
    }
    tracing::error!(
        event = "scan.failed",
        run_id = %run_id,
        error_class = class.as_str(),
        error = %err,
        "scan failed"
    );
    err
}

fn count_error(counters: &mut ScanCounters, err: &anyhow::Error) {
    match try_classify(err) {
        c if c.is_schema() => counters.schema_errors += 1,
        ErrorClass::Transport => counters.non_schema_errors += 1,
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn summary() -> ScanSummary {
        ScanSummary {
            conversation_from: 0,
            conversation_to: 0,
            selected_conversations: 1,
            messages: 2,
            seller_messages: 1,
            customer_messages_context_only: 1,
            rules: 3,
            metrics_version: METRICS_VERSION.to_string(),
            bundle_rules: true,
            judge_mode: "full".into(),
            context_mode: "full".into(),
            llm_trace: "full".into(),
            failure_policy: "fail_fast".into(),
            counters: ScanCounters::default(),
            judge_coverage: None,
            canonical_run_id: None,
            canonical_note: None,
            error: None,
            error_class: None,
        }
    }

    #[test]
    fn test_fail_run_keeps_scan_error_when_finalize_fails() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let guard = RunGuard::begin(&store, "scan_f", "m", 0, 0, 1, 2).unwrap();
        store.lock().unwrap().execute_batch("DROP TABLE scan_runs").unwrap();

        let scan_err: anyhow::Error = ScanError::Invariant("inserted=3 judged=2".into()).into();
        let mut s = summary();
        let returned = fail_run(guard, &mut s, scan_err);

        assert_eq!(try_classify(&returned), ErrorClass::Invariant);
        assert!(returned.to_string().contains("inserted=3 judged=2"));
        assert_eq!(s.error_class, Some(ErrorClass::Invariant));
    }

    #[test]
    fn test_fail_run_records_summary() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let guard = RunGuard::begin(&store, "scan_g", "m", 0, 0, 1, 2).unwrap();
        let mut s = summary();
        fail_run(guard, &mut s, ScanError::Selection("x".into()).into());

        let run = store.get_run("scan_g").unwrap().unwrap();
        assert_eq!(run.status, crate::model::ScanStatus::Failed);
        assert_eq!(run.summary["error_class"], "selection");
    }

    #[test]
    fn test_run_id_shape() {
        let id = new_run_id();
        assert!(id.starts_with("scan_"));
        assert_eq!(id.len(), 17);
        assert!(id[5..].chars().all(|c| c.is_ascii_hexdigit()));
    }
}
