use super::{contract_name, normalized_rule_keys, BundleContract, BundleKind, ContractError};
use serde_json::{json, Map, Value};

/// Per-rule sub-schema of a bundle contract.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValidator {
    /// Evaluator verdict restricted to the given reason codes.
    Evaluation { reason_codes: Vec<String> },
    Judgement,
}

pub const EVALUATION_FIELDS: [&str; 7] = [
    "hit",
    "confidence",
    "reason_code",
    "reason",
    "evidence_quote",
    "evidence_message_id",
    "evidence_message_order",
];

pub const JUDGEMENT_FIELDS: [&str; 4] = ["expected_hit", "label", "confidence", "rationale"];

impl FieldValidator {
    fn schema(&self) -> Value {
        match self {
            FieldValidator::Evaluation { reason_codes } => json!({
                "type": "object",
                "properties": {
                    "hit": {"type": "boolean"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                    "reason_code": {"type": "string", "enum": reason_codes},
                    "reason": {"type": "string"},
                    "evidence_quote": {"type": "string"},
                    "evidence_message_id": {"type": ["integer", "null"]},
                    "evidence_message_order": {"type": ["integer", "null"]}
                },
                "required": EVALUATION_FIELDS,
                "additionalProperties": false
            }),
            FieldValidator::Judgement => json!({
                "type": "object",
                "properties": {
                    "expected_hit": {"type": "boolean"},
                    "label": {"type": "boolean"},
                    "confidence": {"type": "number", "minimum": 0, "maximum": 1},
                    "rationale": {"type": "string"}
                },
                "required": JUDGEMENT_FIELDS,
                "additionalProperties": false
            }),
        }
    }
}

/// Assembles a bundle contract from ordered `(key, validator)` pairs.
pub struct ContractBuilder {
    kind: BundleKind,
    fields: Vec<(String, FieldValidator)>,
}

impl ContractBuilder {
    pub fn new(kind: BundleKind) -> Self {
        Self {
            kind,
            fields: Vec::new(),
        }
    }

    pub fn field(mut self, key: impl Into<String>, validator: FieldValidator) -> Self {
        self.fields.push((key.into(), validator));
        self
    }

    pub fn build(self) -> Result<BundleContract, ContractError> {
        let raw_keys: Vec<&str> = self.fields.iter().map(|(k, _)| k.as_str()).collect();
        let keys = normalized_rule_keys(&raw_keys)?;
        let name = contract_name(self.kind, &keys);

        let mut properties = Map::new();
        for (key, validator) in &self.fields {
            let key = key.trim();
            if key.is_empty() {
                continue;
            }
            properties.insert(key.to_string(), validator.schema());
        }

        let schema = json!({
            "title": name,
            "type": "object",
            "properties": properties,
            "required": keys,
            "additionalProperties": false
        });
        BundleContract::compile(self.kind, keys, name, schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(codes: &[&str]) -> FieldValidator {
        FieldValidator::Evaluation {
            reason_codes: codes.iter().map(|c| c.to_string()).collect(),
        }
    }

    #[test]
    fn test_required_set_equals_keys() {
        let c = ContractBuilder::new(BundleKind::Evaluator)
            .field("greeting", evaluation(&["greeting_present"]))
            .field("custom_rule", evaluation(&["x"]))
            .build()
            .unwrap();
        let required: Vec<&str> = c.schema["required"]
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap())
            .collect();
        assert_eq!(required, vec!["greeting", "custom_rule"]);
        assert_eq!(c.name, "BundledEvaluatorResult__greeting__custom_rule");
        assert!(c.fingerprint.starts_with("sha256:"));
    }

    #[test]
    fn test_duplicate_fields_rejected() {
        let err = ContractBuilder::new(BundleKind::Judge)
            .field("a", FieldValidator::Judgement)
            .field("a", FieldValidator::Judgement)
            .build()
            .unwrap_err();
        assert!(matches!(err, ContractError::DuplicateRuleKeys(_)));
    }

    #[test]
    fn test_empty_builder_rejected() {
        let err = ContractBuilder::new(BundleKind::Judge).build().unwrap_err();
        assert_eq!(err, ContractError::EmptyRuleSet);
    }
}
