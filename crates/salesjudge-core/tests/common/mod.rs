#![allow(dead_code)]

use salesjudge_core::model::SpeakerRole;
use salesjudge_core::Store;
use serde_json::{json, Value};

pub const CUSTOMER_BUDGET: &str = "Hi, I want to renew but my budget is tight this month";
pub const SELLER_PITCH: &str = "Hello! I understand your situation, here is the Plus package";

pub fn store() -> Store {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    store
}

pub fn add(store: &Store, id: &str, messages: &[(SpeakerRole, &str)]) {
    let owned: Vec<(SpeakerRole, String)> = messages
        .iter()
        .map(|(role, text)| (*role, text.to_string()))
        .collect();
    store.replace_conversation(id, "fixture", &owned).unwrap();
}

pub fn budget_store() -> Store {
    let s = store();
    add(
        &s,
        "conv-001",
        &[
            (SpeakerRole::Customer, CUSTOMER_BUDGET),
            (SpeakerRole::Seller, SELLER_PITCH),
        ],
    );
    s
}

pub fn miss(reason_code: &str) -> Value {
    json!({
        "hit": false,
        "confidence": 0.8,
        "reason_code": reason_code,
        "reason": "not observed",
        "evidence_quote": "",
        "evidence_message_id": null,
        "evidence_message_order": null
    })
}

pub fn hit(reason_code: &str, quote: &str, message_id: i64, order: i64) -> Value {
    json!({
        "hit": true,
        "confidence": 0.9,
        "reason_code": reason_code,
        "reason": "observed",
        "evidence_quote": quote,
        "evidence_message_id": message_id,
        "evidence_message_order": order
    })
}
