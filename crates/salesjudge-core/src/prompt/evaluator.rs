use super::transcript::{
    seller_catalog_json, seller_copy_blocks, BEGIN_ANCHOR_BLOCKS, BEGIN_SELLER_CATALOG,
    END_ANCHOR_BLOCKS, END_SELLER_CATALOG,
};
use super::{ContextMode, PromptPair};
use crate::judge::JudgeRuleContext;
use crate::model::SellerAnchor;
use crate::rules::{self, RuleCard};

pub const EVALUATOR_SYSTEM_PROMPT: &str = "You are a sales quality evaluator. \
Return only JSON matching the bundled evaluator schema. \
Evaluate every rule from the 'Rules to evaluate' block separately, at the level of the whole conversation. \
The quote-contract is mandatory: for hit=true, evidence_quote must be a verbatim, non-empty, \
contiguous substring of the anchor seller message, character for character and in the same language. \
The anchor is given by evidence_message_id and evidence_message_order. \
For hit=false, evidence_quote must be empty and both anchor fields must be null. \
Do not change case, punctuation, quotes, apostrophes, diacritics or whitespace inside evidence_quote. \
Do not shorten the quote with an ellipsis, paraphrase it, translate it or normalize its characters.";

pub struct EvaluatorPromptInput<'a> {
    pub conversation_id: &'a str,
    pub context_mode: ContextMode,
    pub greeting_window_max: usize,
    pub chat_context: &'a str,
    pub seller_catalog: &'a [SellerAnchor],
}

fn backticked(items: &[&str]) -> String {
    items
        .iter()
        .map(|c| format!("`{}`", c))
        .collect::<Vec<_>>()
        .join(", ")
}

fn window_label(window: Option<usize>) -> String {
    match window {
        Some(n) => n.to_string(),
        None => "none".to_string(),
    }
}

/// One bundled prompt per conversation covering every rule.
pub fn build_evaluator_prompts(rule_cards: &[RuleCard], input: &EvaluatorPromptInput<'_>) -> PromptPair {
    let mut lines: Vec<String> = vec![
        format!("conversation_id={}", input.conversation_id),
        format!("context_mode={}", input.context_mode.as_str()),
        format!("greeting_window_max={}", input.greeting_window_max),
        BEGIN_SELLER_CATALOG.to_string(),
        seller_catalog_json(input.seller_catalog),
        END_SELLER_CATALOG.to_string(),
        "Anchor catalog for exact copy-paste:".to_string(),
        BEGIN_ANCHOR_BLOCKS.to_string(),
        seller_copy_blocks(input.seller_catalog),
        END_ANCHOR_BLOCKS.to_string(),
        "Chat context:".to_string(),
        input.chat_context.to_string(),
        String::new(),
        "Rules to evaluate:".to_string(),
    ];

    for r in rule_cards {
        lines.push(format!("- {} ({})", r.key, r.title));
        lines.push(format!("  scope: {}", r.evaluation_scope.as_str()));
        lines.push(format!("  seller_window_max: {}", window_label(r.seller_window_max)));
        lines.push(format!("  hit_policy: {}", r.hit_policy.as_str()));
        lines.push(format!("  what to check: {}", r.what_to_check));
        lines.push(format!("  why it matters: {}", r.why_it_matters));
        lines.push(format!("  reason_code: {}", backticked(rules::reason_codes(r.key))));
        let anti = rules::anti_patterns(r.key);
        if !anti.is_empty() {
            lines.push("  anti-patterns:".to_string());
            for item in anti {
                lines.push(format!("  - {}", item));
            }
        }
    }

    lines.extend(
        [
            "",
            "Check provability:",
            "- if hit=true: evidence_quote is non-empty and evidence_message_id/evidence_message_order are required;",
            "- evidence_quote must be a contiguous substring of the seller message text at evidence_message_id;",
            "- evidence_message_order must equal the order of that same message in the seller catalog;",
            "- for a rule with seller_window_max, the anchor must be within the first seller_window_max seller messages;",
            "- translating, paraphrasing or polishing evidence_quote is not allowed;",
            "- if you cannot give an exact quote, set hit=false and do not invent one.",
            "",
            "SELF-CHECK before emitting JSON:",
            "1) Find anchor_text by evidence_message_id;",
            "2) Check the condition: evidence_quote in anchor_text (strictly, symbol for symbol);",
            "3) If the condition is false, fix evidence_quote or set hit=false.",
        ]
        .iter()
        .map(|s| s.to_string()),
    );

    PromptPair {
        system: EVALUATOR_SYSTEM_PROMPT.to_string(),
        user: lines.join("\n"),
    }
}

/// Business context handed to the judge layer; the judge never sees `RuleCard`.
pub fn business_context(rule_cards: &[RuleCard]) -> Vec<JudgeRuleContext> {
    rule_cards
        .iter()
        .map(|r| JudgeRuleContext {
            key: r.key.to_string(),
            title: r.title.to_string(),
            what_to_check: r.what_to_check.to_string(),
            why_it_matters: r.why_it_matters.to_string(),
            evaluation_scope: r.evaluation_scope.as_str().to_string(),
            seller_window_max: r.seller_window_max,
            hit_policy: r.hit_policy.as_str().to_string(),
            reason_codes: rules::reason_codes(r.key).iter().map(|c| c.to_string()).collect(),
            anti_patterns: rules::anti_patterns(r.key).iter().map(|c| c.to_string()).collect(),
        })
        .collect()
}
