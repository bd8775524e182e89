use salesjudge_core::contract::{BundleKind, ContractFactory, RuleEvaluation, RuleMap};
use salesjudge_core::errors::PayloadError;
use serde_json::{json, Map, Value};

fn evaluation() -> Value {
    json!({
        "hit": false,
        "confidence": 0.5,
        "reason_code": "greeting_missing",
        "reason": "",
        "evidence_quote": "",
        "evidence_message_id": null,
        "evidence_message_order": null
    })
}

fn required(schema: &Value) -> Vec<String> {
    let mut keys: Vec<String> = schema["required"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    keys.sort();
    keys
}

#[test]
fn test_required_keys_follow_the_selected_rules() {
    let factory = ContractFactory::new();
    let subsets: [&[&str]; 3] = [
        &["greeting"],
        &["greeting", "upsell"],
        &["empathy", "greeting", "upsell"],
    ];
    for keys in subsets {
        for kind in [BundleKind::Evaluator, BundleKind::Judge] {
            let contract = factory.get(kind, keys).unwrap();
            let mut expected: Vec<String> = keys.iter().map(|k| k.to_string()).collect();
            expected.sort();
            assert_eq!(required(&contract.schema), expected, "{}", contract.name);
            assert_eq!(contract.schema["additionalProperties"], json!(false));
        }
    }
    assert_eq!(factory.cached_len(), 6);

    // cache hit returns the same compiled contract
    let a = factory.evaluator(&["greeting"]).unwrap();
    let b = factory.evaluator(&["greeting"]).unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
}

#[test]
fn test_payload_missing_a_rule_is_rejected() {
    let factory = ContractFactory::new();
    let contract = factory.evaluator(&["greeting", "upsell"]).unwrap();

    let mut payload = Map::new();
    payload.insert("greeting".into(), evaluation());
    let err = contract
        .check_output(&Value::Object(payload.clone()).to_string())
        .unwrap_err();
    assert!(matches!(err, PayloadError::Schema(_)));

    let mut upsell = evaluation();
    upsell["reason_code"] = json!("upsell_missing");
    payload.insert("upsell".into(), upsell);
    let ok = contract
        .check_output(&Value::Object(payload).to_string())
        .unwrap();
    let map: RuleMap<RuleEvaluation> = RuleMap::from_payload(&contract, &ok).unwrap();
    assert!(!map.get("upsell").unwrap().hit);
    assert!(map.get("empathy").is_err());
}

#[test]
fn test_extra_rule_and_unknown_reason_code_are_rejected() {
    let factory = ContractFactory::new();
    let contract = factory.evaluator(&["greeting"]).unwrap();

    let extra = json!({"greeting": evaluation(), "upsell": evaluation()});
    assert!(contract.validate(&extra).is_err());

    let mut bad = evaluation();
    bad["reason_code"] = json!("made_up_code");
    assert!(contract.validate(&json!({"greeting": bad})).is_err());

    assert!(matches!(
        contract.check_output("```json\n{}\n```").unwrap_err(),
        PayloadError::Parse(_)
    ));
}

#[test]
fn test_unregistered_rule_key_gets_its_own_required_slot() {
    let factory = ContractFactory::new();
    let contract = factory.evaluator(&["greeting", "brand_new"]).unwrap();
    assert_eq!(required(&contract.schema), vec!["brand_new", "greeting"]);
    assert_eq!(contract.name, "BundledEvaluatorResult__greeting__brand_new");

    // unknown keys accept any registered reason code
    let mut other = evaluation();
    other["reason_code"] = json!("upsell_missing");
    let full = json!({"greeting": evaluation(), "brand_new": other});
    contract.validate(&full).unwrap();

    let missing = json!({"greeting": evaluation()});
    assert!(matches!(
        contract.validate(&missing).unwrap_err(),
        PayloadError::Schema(_)
    ));
}
