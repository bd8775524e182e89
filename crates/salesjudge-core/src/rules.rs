//! Fixed catalog of business rules evaluated once per conversation.
//!
//! The order of [`RULES`] is a contract: contracts, prompts, persisted rows
//! and reports all follow it. To add a rule, append a [`RuleCard`] and its
//! reason codes and anti-patterns below; the bundle contracts pick the key up
//! without further edits. Bump [`METRICS_VERSION`] whenever rule semantics
//! change so reports never compare runs across incompatible semantics.

use crate::thresholds::QualityThresholds;
use serde::{Deserialize, Serialize};

/// Tag stored in every run summary; runs are only comparable within one tag.
pub const METRICS_VERSION: &str = "dialog-bundle-v5";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluationScope {
    Conversation,
}

impl EvaluationScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            EvaluationScope::Conversation => "conversation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HitPolicy {
    AnyOccurrence,
}

impl HitPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            HitPolicy::AnyOccurrence => "any_occurrence",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleCard {
    pub key: &'static str,
    pub title: &'static str,
    pub what_to_check: &'static str,
    pub why_it_matters: &'static str,
    pub evaluation_scope: EvaluationScope,
    /// Evidence must sit within the first N seller turns when set.
    pub seller_window_max: Option<usize>,
    pub hit_policy: HitPolicy,
}

pub const RULES: &[RuleCard] = &[
    RuleCard {
        key: "greeting",
        title: "Greeting",
        what_to_check: "The seller greets the customer within their first three messages.",
        why_it_matters: "The first touch sets the tone of the conversation and builds trust.",
        evaluation_scope: EvaluationScope::Conversation,
        seller_window_max: Some(3),
        hit_policy: HitPolicy::AnyOccurrence,
    },
    RuleCard {
        key: "upsell",
        title: "Upsell",
        what_to_check: "The seller offers a relevant paid next step (plan, package, add-on) at some point in the conversation.",
        why_it_matters: "Grows the average order value without hurting the quality of the conversation.",
        evaluation_scope: EvaluationScope::Conversation,
        seller_window_max: None,
        hit_policy: HitPolicy::AnyOccurrence,
    },
    RuleCard {
        key: "empathy",
        title: "Empathy",
        what_to_check: "The seller explicitly acknowledges the customer's situation or feelings.",
        why_it_matters: "Reduces friction and raises the chance of a constructive customer reply.",
        evaluation_scope: EvaluationScope::Conversation,
        seller_window_max: None,
        hit_policy: HitPolicy::AnyOccurrence,
    },
];

const REASON_CODES: &[(&str, &[&str])] = &[
    (
        "greeting",
        &["greeting_present", "greeting_missing", "greeting_late"],
    ),
    (
        "upsell",
        &["upsell_offer", "upsell_missing", "discount_without_upsell"],
    ),
    (
        "empathy",
        &[
            "empathy_acknowledged",
            "courtesy_without_empathy",
            "informational_without_empathy",
        ],
    ),
];

const ANTI_PATTERNS: &[(&str, &[&str])] = &[
    (
        "greeting",
        &["A greeting after the third seller message does not count (reason_code=`greeting_late`)."],
    ),
    (
        "upsell",
        &[
            "A discount or promo code without a new paid option is not an upsell.",
            "A status or informational answer without a paid next step is not an upsell.",
        ],
    ),
    (
        "empathy",
        &[
            "Politeness and small talk are not empathy.",
            "A positive tone without acknowledging the customer's state is not empathy.",
        ],
    ),
];

pub fn all_rules() -> &'static [RuleCard] {
    RULES
}

pub fn rule_keys() -> Vec<&'static str> {
    RULES.iter().map(|r| r.key).collect()
}

pub fn rule(key: &str) -> Option<&'static RuleCard> {
    RULES.iter().find(|r| r.key == key)
}

/// Allowed reason codes for a registered rule; empty for unknown keys.
pub fn reason_codes(key: &str) -> &'static [&'static str] {
    REASON_CODES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, codes)| *codes)
        .unwrap_or(&[])
}

/// Every registered reason code, in registry order, without duplicates.
pub fn all_reason_codes() -> Vec<&'static str> {
    let mut out: Vec<&'static str> = Vec::new();
    for (_, codes) in REASON_CODES {
        for code in *codes {
            if !out.contains(code) {
                out.push(code);
            }
        }
    }
    out
}

pub fn anti_patterns(key: &str) -> &'static [&'static str] {
    ANTI_PATTERNS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, items)| *items)
        .unwrap_or(&[])
}

pub fn quality_thresholds() -> QualityThresholds {
    QualityThresholds::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_rule_keys_are_unique_and_ordered() {
        let keys = rule_keys();
        assert_eq!(keys, vec!["greeting", "upsell", "empathy"]);
        let uniq: HashSet<_> = keys.iter().collect();
        assert_eq!(uniq.len(), keys.len());
    }

    #[test]
    fn test_every_rule_has_reason_codes() {
        for r in all_rules() {
            assert!(!reason_codes(r.key).is_empty(), "no reason codes for {}", r.key);
        }
        assert!(reason_codes("unknown_rule").is_empty());
    }

    #[test]
    fn test_only_greeting_is_windowed() {
        assert_eq!(rule("greeting").unwrap().seller_window_max, Some(3));
        assert_eq!(rule("upsell").unwrap().seller_window_max, None);
        assert_eq!(rule("empathy").unwrap().seller_window_max, None);
    }

    #[test]
    fn test_all_reason_codes_union() {
        let all = all_reason_codes();
        assert_eq!(all.len(), 9);
        assert_eq!(all[0], "greeting_present");
        assert!(all.contains(&"discount_without_upsell"));
    }
}
