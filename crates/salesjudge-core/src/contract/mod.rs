//! Strict structured-output contracts for bundled evaluator and judge calls.
//!
//! A contract is a closed JSON schema with one sub-object per rule key. The
//! same schema is sent to the provider (`text.format.schema`) and compiled
//! locally to validate whatever comes back. Contracts are built once per
//! (kind, key list) and shared through [`ContractFactory`].

use crate::errors::PayloadError;
use crate::rules;
use jsonschema::JSONSchema;
use regex::Regex;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock};

pub mod builder;
pub mod verdicts;

pub use builder::{ContractBuilder, FieldValidator};
pub use verdicts::{RuleEvaluation, RuleJudgement, RuleMap, UnknownRuleKey};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BundleKind {
    Evaluator,
    Judge,
}

impl BundleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BundleKind::Evaluator => "evaluator",
            BundleKind::Judge => "judge",
        }
    }

    fn name_prefix(&self) -> &'static str {
        match self {
            BundleKind::Evaluator => "BundledEvaluatorResult",
            BundleKind::Judge => "BundledJudgeResult",
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ContractError {
    #[error("rule_keys must not be empty")]
    EmptyRuleSet,

    #[error("rule_keys contain duplicates: {0:?}")]
    DuplicateRuleKeys(Vec<String>),

    #[error("schema_contract_failed: {contract}: {message} (at {path})")]
    NotStrict {
        contract: String,
        path: String,
        message: String,
    },

    #[error("schema_contract_failed: {contract}: compile failed: {message}")]
    Compile { contract: String, message: String },
}

/// Trims keys, drops blanks, and rejects empty or duplicated sets.
pub fn normalized_rule_keys<S: AsRef<str>>(keys: &[S]) -> Result<Vec<String>, ContractError> {
    let out: Vec<String> = keys
        .iter()
        .map(|k| k.as_ref().trim().to_string())
        .filter(|k| !k.is_empty())
        .collect();
    if out.is_empty() {
        return Err(ContractError::EmptyRuleSet);
    }
    let mut dups: Vec<String> = Vec::new();
    for (i, k) in out.iter().enumerate() {
        if out[..i].contains(k) && !dups.contains(k) {
            dups.push(k.clone());
        }
    }
    if !dups.is_empty() {
        dups.sort();
        return Err(ContractError::DuplicateRuleKeys(dups));
    }
    Ok(out)
}

static UNSAFE_CHARS: OnceLock<Regex> = OnceLock::new();

pub fn safe_token(value: &str) -> String {
    let re = UNSAFE_CHARS.get_or_init(|| Regex::new(r"[^0-9A-Za-z_]+").expect("valid regex"));
    let token = re.replace_all(value, "_");
    let token = token.trim_matches('_');
    if token.is_empty() {
        "rule".to_string()
    } else {
        token.to_string()
    }
}

pub fn contract_name<S: AsRef<str>>(kind: BundleKind, keys: &[S]) -> String {
    let suffix: Vec<String> = keys.iter().map(|k| safe_token(k.as_ref())).collect();
    format!("{}__{}", kind.name_prefix(), suffix.join("__"))
}

/// Walks a schema and requires every object to list all of its properties
/// as required and to forbid additional properties.
pub fn assert_strict(schema: &Value, contract: &str) -> Result<(), ContractError> {
    walk_strict(schema, contract, "$")
}

fn walk_strict(node: &Value, contract: &str, path: &str) -> Result<(), ContractError> {
    match node {
        Value::Object(map) => {
            if map.get("type").and_then(|t| t.as_str()) == Some("object") {
                let fail = |message: String| ContractError::NotStrict {
                    contract: contract.to_string(),
                    path: path.to_string(),
                    message,
                };
                let props = map
                    .get("properties")
                    .and_then(|p| p.as_object())
                    .cloned()
                    .unwrap_or_default();
                let required: Vec<&str> = match map.get("required").and_then(|r| r.as_array()) {
                    Some(r) => r.iter().filter_map(|v| v.as_str()).collect(),
                    None => return Err(fail("required must exist for every object".into())),
                };
                let mut missing: Vec<&str> = props
                    .keys()
                    .map(|k| k.as_str())
                    .filter(|k| !required.contains(k))
                    .collect();
                if !missing.is_empty() {
                    missing.sort();
                    return Err(fail(format!(
                        "required must include all properties, missing={:?}",
                        missing
                    )));
                }
                if map.get("additionalProperties") != Some(&Value::Bool(false)) {
                    return Err(fail("additionalProperties must be false".into()));
                }
            }
            for (k, v) in map {
                walk_strict(v, contract, &format!("{}.{}", path, k))?;
            }
            Ok(())
        }
        Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                walk_strict(v, contract, &format!("{}[{}]", path, i))?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

pub struct BundleContract {
    pub kind: BundleKind,
    pub rule_keys: Vec<String>,
    pub name: String,
    pub schema: Value,
    pub fingerprint: String,
    compiled: JSONSchema,
}

impl std::fmt::Debug for BundleContract {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BundleContract")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("rule_keys", &self.rule_keys)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl BundleContract {
    pub(crate) fn compile(
        kind: BundleKind,
        rule_keys: Vec<String>,
        name: String,
        schema: Value,
    ) -> Result<Self, ContractError> {
        assert_strict(&schema, &name)?;
        let compiled = JSONSchema::options()
            .compile(&schema)
            .map_err(|e| ContractError::Compile {
                contract: name.clone(),
                message: e.to_string(),
            })?;
        let canonical = serde_json::to_string(&schema).unwrap_or_default();
        let fingerprint = format!("sha256:{}", hex::encode(Sha256::digest(canonical.as_bytes())));
        Ok(Self {
            kind,
            rule_keys,
            name,
            schema,
            fingerprint,
            compiled,
        })
    }

    /// Parses raw model output into JSON.
    pub fn parse_output(&self, text: &str) -> Result<Value, PayloadError> {
        serde_json::from_str(text).map_err(|e| PayloadError::Parse(e.to_string()))
    }

    pub fn validate(&self, payload: &Value) -> Result<(), PayloadError> {
        if let Err(errors) = self.compiled.validate(payload) {
            let mut msgs: Vec<String> = errors
                .map(|e| format!("{} at {}", e, e.instance_path))
                .collect();
            msgs.sort();
            return Err(PayloadError::Schema(msgs.join("; ")));
        }
        Ok(())
    }

    /// Parse then validate; the parsed value is returned on success.
    pub fn check_output(&self, text: &str) -> Result<Value, PayloadError> {
        let payload = self.parse_output(text)?;
        self.validate(&payload)?;
        Ok(payload)
    }
}

/// Builds contracts from registry keys and caches them by (kind, key list).
#[derive(Default)]
pub struct ContractFactory {
    cache: Mutex<HashMap<(BundleKind, Vec<String>), Arc<BundleContract>>>,
}

impl ContractFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn evaluator<S: AsRef<str>>(&self, keys: &[S]) -> Result<Arc<BundleContract>, ContractError> {
        self.get(BundleKind::Evaluator, keys)
    }

    pub fn judge<S: AsRef<str>>(&self, keys: &[S]) -> Result<Arc<BundleContract>, ContractError> {
        self.get(BundleKind::Judge, keys)
    }

    pub fn get<S: AsRef<str>>(
        &self,
        kind: BundleKind,
        keys: &[S],
    ) -> Result<Arc<BundleContract>, ContractError> {
        let keys = normalized_rule_keys(keys)?;
        let cache_key = (kind, keys.clone());
        if let Ok(cache) = self.cache.lock() {
            if let Some(hit) = cache.get(&cache_key) {
                return Ok(hit.clone());
            }
        }

        let mut b = ContractBuilder::new(kind);
        for key in &keys {
            let validator = match kind {
                BundleKind::Evaluator => {
                    let codes = rules::reason_codes(key);
                    let codes = if codes.is_empty() {
                        rules::all_reason_codes()
                    } else {
                        codes.to_vec()
                    };
                    FieldValidator::Evaluation {
                        reason_codes: codes.into_iter().map(String::from).collect(),
                    }
                }
                BundleKind::Judge => FieldValidator::Judgement,
            };
            b = b.field(key, validator);
        }
        let contract = Arc::new(b.build()?);
        tracing::debug!(
            event = "contract.built",
            kind = kind.as_str(),
            name = %contract.name,
            fingerprint = %contract.fingerprint,
            "built bundle contract"
        );

        if let Ok(mut cache) = self.cache.lock() {
            cache.insert(cache_key, contract.clone());
        }
        Ok(contract)
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_rule_keys() {
        assert_eq!(
            normalized_rule_keys(&[" greeting ", "", "upsell"]).unwrap(),
            vec!["greeting", "upsell"]
        );
        assert_eq!(
            normalized_rule_keys::<&str>(&[]).unwrap_err(),
            ContractError::EmptyRuleSet
        );
        assert_eq!(
            normalized_rule_keys(&["  ", ""]).unwrap_err(),
            ContractError::EmptyRuleSet
        );
        assert_eq!(
            normalized_rule_keys(&["a", "b", "a"]).unwrap_err(),
            ContractError::DuplicateRuleKeys(vec!["a".into()])
        );
    }

    #[test]
    fn test_contract_name_tokens() {
        assert_eq!(
            contract_name(BundleKind::Evaluator, &["greeting", "follow-up call"]),
            "BundledEvaluatorResult__greeting__follow_up_call"
        );
        assert_eq!(contract_name(BundleKind::Judge, &["!!"]), "BundledJudgeResult__rule");
    }

    #[test]
    fn test_assert_strict_rejects_open_objects() {
        let open = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}},
            "required": ["a"]
        });
        let err = assert_strict(&open, "X").unwrap_err();
        assert!(err.to_string().contains("additionalProperties must be false"));

        let partial = json!({
            "type": "object",
            "properties": {"a": {"type": "string"}, "b": {"type": "string"}},
            "required": ["a"],
            "additionalProperties": false
        });
        let err = assert_strict(&partial, "X").unwrap_err();
        assert!(err.to_string().contains("missing=[\"b\"]"));
    }

    #[test]
    fn test_factory_caches_by_kind_and_keys() {
        let f = ContractFactory::new();
        let a = f.evaluator(&["greeting", "upsell"]).unwrap();
        let b = f.evaluator(&["greeting", "upsell"]).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = f.evaluator(&["upsell", "greeting"]).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        let j = f.judge(&["greeting", "upsell"]).unwrap();
        assert_eq!(j.kind, BundleKind::Judge);
        assert_eq!(f.cached_len(), 3);
    }

    #[test]
    fn test_parse_output_errors() {
        let f = ContractFactory::new();
        let c = f.judge(&["greeting"]).unwrap();
        assert!(matches!(c.check_output("{not json"), Err(PayloadError::Parse(_))));
        assert!(matches!(c.check_output("{}"), Err(PayloadError::Schema(_))));
    }
}
