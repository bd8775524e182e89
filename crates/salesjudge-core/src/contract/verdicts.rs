use super::BundleContract;
use crate::errors::similarity::did_you_mean;
use crate::errors::PayloadError;
use crate::evidence::EvidenceClaim;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleEvaluation {
    pub hit: bool,
    pub confidence: f64,
    pub reason_code: String,
    pub reason: String,
    pub evidence_quote: String,
    pub evidence_message_id: Option<i64>,
    pub evidence_message_order: Option<i64>,
}

impl RuleEvaluation {
    /// Positive verdicts carry a quote and both anchors; negative ones carry neither.
    pub fn check_shape(&self) -> Result<(), String> {
        if self.hit {
            if self.evidence_quote.trim().is_empty() {
                return Err("hit=true requires a non-empty evidence_quote".into());
            }
            if self.evidence_message_id.is_none() || self.evidence_message_order.is_none() {
                return Err(
                    "hit=true requires evidence_message_id and evidence_message_order".into(),
                );
            }
        } else {
            if !self.evidence_quote.trim().is_empty() {
                return Err("hit=false requires an empty evidence_quote".into());
            }
            if self.evidence_message_id.is_some() || self.evidence_message_order.is_some() {
                return Err(
                    "hit=false requires null evidence_message_id and evidence_message_order"
                        .into(),
                );
            }
        }
        Ok(())
    }

    pub fn claim(&self) -> EvidenceClaim<'_> {
        EvidenceClaim {
            message_id: self.evidence_message_id,
            message_order: self.evidence_message_order,
            quote: &self.evidence_quote,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleJudgement {
    pub expected_hit: bool,
    pub label: bool,
    pub confidence: f64,
    pub rationale: String,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("unknown rule key '{key}'{suggestion}")]
pub struct UnknownRuleKey {
    pub key: String,
    pub suggestion: String,
}

/// Per-rule verdicts kept in contract order.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMap<T> {
    entries: Vec<(String, T)>,
}

impl<T: DeserializeOwned> RuleMap<T> {
    /// Reads one entry per contract key from an already validated payload.
    pub fn from_payload(contract: &BundleContract, payload: &Value) -> Result<Self, PayloadError> {
        let obj = payload
            .as_object()
            .ok_or_else(|| PayloadError::Schema("payload is not a JSON object".into()))?;
        let mut entries = Vec::with_capacity(contract.rule_keys.len());
        for key in &contract.rule_keys {
            let raw = obj
                .get(key)
                .ok_or_else(|| PayloadError::Schema(format!("missing rule key '{}'", key)))?;
            let item: T = serde_json::from_value(raw.clone()).map_err(|e| PayloadError::Shape {
                rule_key: key.clone(),
                message: e.to_string(),
            })?;
            entries.push((key.clone(), item));
        }
        if let Some(extra) = obj
            .keys()
            .find(|k| !contract.rule_keys.iter().any(|r| r == *k))
        {
            return Err(PayloadError::Schema(format!(
                "unexpected rule key '{}'{}",
                extra,
                did_you_mean(extra, contract.rule_keys.iter().map(|k| k.as_str()))
            )));
        }
        Ok(Self { entries })
    }
}

impl<T> RuleMap<T> {
    pub fn get(&self, key: &str) -> Result<&T, UnknownRuleKey> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
            .ok_or_else(|| UnknownRuleKey {
                key: key.to_string(),
                suggestion: did_you_mean(key, self.keys()),
            })
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractFactory;
    use serde_json::json;

    fn negative(code: &str) -> Value {
        json!({
            "hit": false,
            "confidence": 0.9,
            "reason_code": code,
            "reason": "not found",
            "evidence_quote": "",
            "evidence_message_id": null,
            "evidence_message_order": null
        })
    }

    #[test]
    fn test_rule_map_follows_contract_order() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting", "upsell"]).unwrap();
        let payload = json!({
            "upsell": negative("upsell_missing"),
            "greeting": negative("greeting_missing")
        });
        c.validate(&payload).unwrap();
        let map: RuleMap<RuleEvaluation> = RuleMap::from_payload(&c, &payload).unwrap();
        assert_eq!(map.keys().collect::<Vec<_>>(), vec!["greeting", "upsell"]);
        assert_eq!(map.get("upsell").unwrap().reason_code, "upsell_missing");
    }

    #[test]
    fn test_unknown_key_lookup_suggests() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting"]).unwrap();
        let payload = json!({"greeting": negative("greeting_missing")});
        let map: RuleMap<RuleEvaluation> = RuleMap::from_payload(&c, &payload).unwrap();
        let err = map.get("greting").unwrap_err();
        assert_eq!(err.to_string(), "unknown rule key 'greting' (did you mean 'greeting'?)");
    }

    #[test]
    fn test_contract_rejects_missing_key() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting", "empathy"]).unwrap();
        let payload = json!({"greeting": negative("greeting_missing")});
        assert!(matches!(c.validate(&payload), Err(PayloadError::Schema(_))));
    }

    #[test]
    fn test_contract_rejects_foreign_reason_code() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting"]).unwrap();
        let payload = json!({"greeting": negative("upsell_missing")});
        assert!(c.validate(&payload).is_err());
    }

    #[test]
    fn test_unregistered_key_accepts_any_known_code() {
        let f = ContractFactory::new();
        let c = f.evaluator(&["closing"]).unwrap();
        let payload = json!({"closing": negative("empathy_acknowledged")});
        c.validate(&payload).unwrap();
    }

    #[test]
    fn test_shape_check() {
        let mut e = RuleEvaluation {
            hit: true,
            confidence: 0.8,
            reason_code: "greeting_present".into(),
            reason: "greets".into(),
            evidence_quote: "Hello!".into(),
            evidence_message_id: Some(2),
            evidence_message_order: Some(2),
        };
        assert!(e.check_shape().is_ok());
        e.evidence_message_order = None;
        assert!(e.check_shape().is_err());

        e.hit = false;
        assert!(e.check_shape().unwrap_err().contains("empty evidence_quote"));
        e.evidence_quote = String::new();
        e.evidence_message_id = None;
        assert!(e.check_shape().is_ok());
    }
}
