//! Independent judge layer.
//!
//! Works from [`JudgeRuleContext`] business objects only, so a judge can be
//! driven from serialized rule descriptions without access to the registry.

use crate::model::SellerAnchor;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BEGIN_EVALUATOR_JSON: &str = "BEGIN_EVALUATOR_JSON";
pub const END_EVALUATOR_JSON: &str = "END_EVALUATOR_JSON";

pub const JUDGE_SYSTEM_PROMPT: &str = "You are an independent quality judge. \
For every rule, first derive expected_hit from the conversation context, \
then set label=true only if the evaluator's hit equals expected_hit. \
Consider a windowed rule (such as greeting) only within the first seller_window_max seller messages. \
Return only JSON matching the provided bundled judge schema. \
Keep the rationale short.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JudgeRuleContext {
    pub key: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub what_to_check: String,
    #[serde(default)]
    pub why_it_matters: String,
    #[serde(default)]
    pub evaluation_scope: String,
    #[serde(default)]
    pub seller_window_max: Option<usize>,
    #[serde(default)]
    pub hit_policy: String,
    #[serde(default)]
    pub reason_codes: Vec<String>,
    #[serde(default)]
    pub anti_patterns: Vec<String>,
}

pub struct JudgePromptInput<'a> {
    pub conversation_id: &'a str,
    pub context_mode: &'a str,
    pub greeting_window_max: usize,
    pub chat_context: &'a str,
    pub seller_catalog: &'a [SellerAnchor],
    /// Raw evaluator payload exactly as the evaluator returned it.
    pub evaluator_payload: &'a Value,
    pub rules: &'a [JudgeRuleContext],
}

/// Returns `(system, user)` for one bundled judge call.
pub fn build_judge_prompt(input: &JudgePromptInput<'_>) -> (String, String) {
    let catalog = serde_json::to_string(input.seller_catalog).unwrap_or_else(|_| "[]".into());
    let mut lines: Vec<String> = vec![
        format!("conversation_id={}", input.conversation_id),
        format!("context_mode={}", input.context_mode),
        format!("greeting_window_max={}", input.greeting_window_max),
        "BEGIN_SELLER_CATALOG_JSON".to_string(),
        catalog,
        "END_SELLER_CATALOG_JSON".to_string(),
        "Chat context:".to_string(),
        input.chat_context.to_string(),
        String::new(),
        "Rules to check:".to_string(),
    ];

    for r in input.rules {
        let window = r
            .seller_window_max
            .map(|n| n.to_string())
            .unwrap_or_else(|| "none".into());
        lines.push(format!(
            "- {}: scope={}, hit_policy={}, seller_window_max={}",
            r.key, r.evaluation_scope, r.hit_policy, window
        ));
        lines.push(format!("  what to check: {}", r.what_to_check));
        lines.push(format!("  why it matters: {}", r.why_it_matters));
        if !r.reason_codes.is_empty() {
            let joined = r
                .reason_codes
                .iter()
                .map(|c| format!("`{}`", c))
                .collect::<Vec<_>>()
                .join(", ");
            lines.push(format!("  reason_code: {}", joined));
        }
        if !r.anti_patterns.is_empty() {
            lines.push("  anti-patterns:".to_string());
            for item in &r.anti_patterns {
                lines.push(format!("  - {}", item));
            }
        }
    }

    lines.push(String::new());
    lines.push("Evaluator answer (JSON):".to_string());
    lines.push(BEGIN_EVALUATOR_JSON.to_string());
    lines.push(serde_json::to_string(input.evaluator_payload).unwrap_or_else(|_| "{}".into()));
    lines.push(END_EVALUATOR_JSON.to_string());

    (JUDGE_SYSTEM_PROMPT.to_string(), lines.join("\n"))
}

/// Pulls the evaluator payload back out of a judge prompt.
pub fn extract_evaluator_payload(prompt: &str) -> Option<Value> {
    let start = prompt.find(BEGIN_EVALUATOR_JSON)? + BEGIN_EVALUATOR_JSON.len();
    let stop = prompt[start..].find(END_EVALUATOR_JSON)? + start;
    serde_json::from_str(prompt[start..stop].trim()).ok()
}
