//! Offline clients: a keyword heuristic that honours the quote-contract, and
//! a scripted client for driving failure paths in tests.

use super::{responses_request, LlmClient, LlmExchange, StructuredRequest};
use crate::contract::{BundleContract, BundleKind};
use crate::judge::extract_evaluator_payload;
use crate::model::SellerAnchor;
use crate::prompt::transcript::extract_seller_catalog;
use crate::rules;
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::VecDeque;
use std::sync::Mutex;

const GREETING_MARKERS: &[&str] = &[
    "hello", "hi", "hey", "greetings", "welcome", "здравствуйте", "привет",
];
const UPSELL_MARKERS: &[&str] = &[
    "package", "plan", "upgrade", "premium", "add-on", "bundle", "subscription", "тариф", "пакет",
];
const DISCOUNT_MARKERS: &[&str] = &["discount", "promo", "coupon", "скидк"];
const EMPATHY_MARKERS: &[&str] = &["understand", "sorry", "apologize", "понимаю", "сочувствую"];
const COURTESY_MARKERS: &[&str] = &["thank", "please", "спасибо", "пожалуйста"];

fn bare(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '-')
        .to_lowercase()
}

/// First whitespace token (verbatim) across the catalog whose bare form matches.
fn find_token<'a>(
    catalog: &'a [SellerAnchor],
    matches: impl Fn(&str) -> bool,
) -> Option<(usize, &'a SellerAnchor, &'a str)> {
    for (idx, anchor) in catalog.iter().enumerate() {
        for token in anchor.text.split_whitespace() {
            if matches(&bare(token)) {
                return Some((idx, anchor, token));
            }
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
struct Verdict {
    hit: bool,
    reason_code: String,
    reason: String,
    anchor: Option<(i64, i64, String)>,
}

impl Verdict {
    fn miss(code: &str, reason: &str) -> Self {
        Self {
            hit: false,
            reason_code: code.to_string(),
            reason: reason.to_string(),
            anchor: None,
        }
    }

    fn hit(code: &str, reason: &str, anchor: &SellerAnchor, quote: &str) -> Self {
        Self {
            hit: true,
            reason_code: code.to_string(),
            reason: reason.to_string(),
            anchor: Some((anchor.message_id, anchor.message_order, quote.to_string())),
        }
    }

    fn to_json(&self) -> Value {
        let (id, order, quote) = match &self.anchor {
            Some((id, order, quote)) => (json!(id), json!(order), quote.clone()),
            None => (Value::Null, Value::Null, String::new()),
        };
        json!({
            "hit": self.hit,
            "confidence": if self.hit { 0.9 } else { 0.8 },
            "reason_code": self.reason_code,
            "reason": self.reason,
            "evidence_quote": quote,
            "evidence_message_id": id,
            "evidence_message_order": order
        })
    }
}

fn first_allowed_code(contract: &BundleContract, key: &str) -> String {
    contract
        .schema
        .pointer(&format!("/properties/{}/properties/reason_code/enum/0", key))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string()
}

fn evaluate_rule(key: &str, catalog: &[SellerAnchor], contract: &BundleContract) -> Verdict {
    match key {
        "greeting" => {
            let window = rules::rule(key)
                .and_then(|r| r.seller_window_max)
                .unwrap_or(usize::MAX);
            match find_token(catalog, |t| {
                GREETING_MARKERS.contains(&t) || t.starts_with("здравств")
            }) {
                Some((idx, anchor, quote)) if idx < window => Verdict::hit(
                    "greeting_present",
                    "seller greets the customer early",
                    anchor,
                    quote,
                ),
                Some(_) => Verdict::miss(
                    "greeting_late",
                    "greeting appears after the seller window",
                ),
                None => Verdict::miss("greeting_missing", "no greeting from the seller"),
            }
        }
        "upsell" => match find_token(catalog, |t| UPSELL_MARKERS.iter().any(|m| t.starts_with(m))) {
            Some((_, anchor, quote)) => {
                Verdict::hit("upsell_offer", "seller offers a paid option", anchor, quote)
            }
            None if find_token(catalog, |t| DISCOUNT_MARKERS.iter().any(|m| t.starts_with(m)))
                .is_some() =>
            {
                Verdict::miss(
                    "discount_without_upsell",
                    "discount offered without a new paid option",
                )
            }
            None => Verdict::miss("upsell_missing", "no paid next step offered"),
        },
        "empathy" => match find_token(catalog, |t| EMPATHY_MARKERS.iter().any(|m| t.starts_with(m))) {
            Some((_, anchor, quote)) => Verdict::hit(
                "empathy_acknowledged",
                "seller acknowledges the customer's situation",
                anchor,
                quote,
            ),
            None if find_token(catalog, |t| COURTESY_MARKERS.iter().any(|m| t.starts_with(m)))
                .is_some() =>
            {
                Verdict::miss("courtesy_without_empathy", "polite but no acknowledgement")
            }
            None => Verdict::miss(
                "informational_without_empathy",
                "informational answers only",
            ),
        },
        other => Verdict::miss(
            &first_allowed_code(contract, other),
            "rule is not covered by the heuristic",
        ),
    }
}

/// Deterministic keyword evaluator and judge.
pub struct HeuristicClient {
    pub model: String,
}

impl HeuristicClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    fn answer(&self, req: &StructuredRequest<'_>) -> Result<Value, String> {
        let catalog = extract_seller_catalog(req.user_prompt)
            .ok_or_else(|| "heuristic: prompt carries no seller catalog".to_string())?;
        let mut out = Map::new();
        match req.contract.kind {
            BundleKind::Evaluator => {
                for key in &req.contract.rule_keys {
                    out.insert(key.clone(), evaluate_rule(key, &catalog, req.contract).to_json());
                }
            }
            BundleKind::Judge => {
                let payload = extract_evaluator_payload(req.user_prompt)
                    .ok_or_else(|| "heuristic: prompt carries no evaluator payload".to_string())?;
                for key in &req.contract.rule_keys {
                    let expected = evaluate_rule(key, &catalog, req.contract).hit;
                    let hit = payload
                        .pointer(&format!("/{}/hit", key))
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false);
                    let label = hit == expected;
                    out.insert(
                        key.clone(),
                        json!({
                            "expected_hit": expected,
                            "label": label,
                            "confidence": 0.85,
                            "rationale": if label { "evaluator agrees with keyword evidence" } else { "evaluator disagrees with keyword evidence" }
                        }),
                    );
                }
            }
        }
        Ok(Value::Object(out))
    }
}

#[async_trait]
impl LlmClient for HeuristicClient {
    async fn invoke(&self, req: &StructuredRequest<'_>) -> LlmExchange {
        let request = responses_request(&self.model, req);
        match self.answer(req) {
            Ok(v) => {
                let output_text = v.to_string();
                LlmExchange {
                    request,
                    http_status: 200,
                    response: json!({"provider": "heuristic", "output_text": output_text}),
                    output_text,
                    error: None,
                    latency_ms: 0,
                }
            }
            Err(message) => LlmExchange::failed(request, 0, message, 0),
        }
    }

    fn provider_name(&self) -> &'static str {
        "heuristic"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[derive(Debug, Clone)]
pub enum Scripted {
    Output(String),
    Failure { message: String, http_status: u16 },
}

/// Replays queued answers in call order, then falls back to the heuristic.
pub struct ScriptedClient {
    queue: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<String>>,
    fallback: HeuristicClient,
}

impl ScriptedClient {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
            fallback: HeuristicClient::new(model),
        }
    }

    pub fn then_output(self, output: impl Into<String>) -> Self {
        self.push(Scripted::Output(output.into()))
    }

    pub fn then_failure(self, message: impl Into<String>, http_status: u16) -> Self {
        self.push(Scripted::Failure {
            message: message.into(),
            http_status,
        })
    }

    fn push(self, s: Scripted) -> Self {
        if let Ok(mut q) = self.queue.lock() {
            q.push_back(s);
        }
        self
    }

    /// Contract names of every call seen so far.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedClient {
    async fn invoke(&self, req: &StructuredRequest<'_>) -> LlmExchange {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(req.contract.name.clone());
        }
        let next = self.queue.lock().ok().and_then(|mut q| q.pop_front());
        let request = responses_request(&self.fallback.model, req);
        match next {
            Some(Scripted::Output(text)) => LlmExchange {
                request,
                http_status: 200,
                response: json!({"provider": "scripted", "output_text": text}),
                output_text: text,
                error: None,
                latency_ms: 0,
            },
            Some(Scripted::Failure {
                message,
                http_status,
            }) => LlmExchange::failed(request, http_status, message, 0),
            None => self.fallback.invoke(req).await,
        }
    }

    fn provider_name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        &self.fallback.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractFactory;

    fn catalog(texts: &[&str]) -> Vec<SellerAnchor> {
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| SellerAnchor {
                message_id: 100 + i as i64,
                message_order: 2 * i as i64 + 2,
                text: t.to_string(),
            })
            .collect()
    }

    #[test]
    fn test_heuristic_quotes_verbatim_tokens() {
        let f = ContractFactory::new();
        let c = f.evaluator(&rules::rule_keys()).unwrap();
        let cat = catalog(&["Hello! I understand your situation, here is the Plus package"]);
        let g = evaluate_rule("greeting", &cat, &c);
        assert_eq!(g.anchor, Some((100, 2, "Hello!".to_string())));
        let e = evaluate_rule("empathy", &cat, &c);
        assert_eq!(e.anchor.unwrap().2, "understand");
        let u = evaluate_rule("upsell", &cat, &c);
        assert_eq!(u.reason_code, "upsell_offer");
    }

    #[test]
    fn test_heuristic_late_greeting_is_a_miss() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting"]).unwrap();
        let cat = catalog(&["One sec.", "Checking.", "Still checking.", "Hello there!", "Bye."]);
        let g = evaluate_rule("greeting", &cat, &c);
        assert!(!g.hit);
        assert_eq!(g.reason_code, "greeting_late");
    }

    #[test]
    fn test_heuristic_discount_and_courtesy_codes() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["upsell", "empathy"]).unwrap();
        let cat = catalog(&["Thank you, here is a discount code."]);
        assert_eq!(evaluate_rule("upsell", &cat, &c).reason_code, "discount_without_upsell");
        assert_eq!(evaluate_rule("empathy", &cat, &c).reason_code, "courtesy_without_empathy");
    }

    #[tokio::test]
    async fn test_scripted_then_fallback() {
        let f = ContractFactory::new();
        let c = f.judge(&["greeting"]).unwrap();
        let client = ScriptedClient::new("m").then_failure("HTTP 502", 502);
        let req = StructuredRequest {
            contract: &c,
            system_prompt: "s",
            user_prompt: "no markers here",
        };
        let first = client.invoke(&req).await;
        assert_eq!(first.http_status, 502);
        let second = client.invoke(&req).await;
        assert!(second.error.unwrap().message.contains("no seller catalog"));
        assert_eq!(client.calls().len(), 2);
    }
}
