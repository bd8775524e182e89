use crate::errors::ErrorClass;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub conversation_id: String,
    pub source_label: String,
    pub message_count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeakerRole {
    Seller,
    Customer,
    Unknown,
}

impl SpeakerRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            SpeakerRole::Seller => "seller",
            SpeakerRole::Customer => "customer",
            SpeakerRole::Unknown => "unknown",
        }
    }

    /// Label used in transcript lines handed to the models.
    pub fn display_label(&self) -> &'static str {
        match self {
            SpeakerRole::Seller => "Seller",
            SpeakerRole::Customer => "Customer",
            SpeakerRole::Unknown => "Unknown",
        }
    }

    /// Normalizes free-form speaker labels from transcripts.
    pub fn from_label(label: &str) -> Self {
        let l = label.trim().to_lowercase();
        match l.as_str() {
            "seller" | "sales rep" | "sales_rep" | "salesrep" | "sales" | "agent" | "rep"
            | "manager" | "operator" | "продавец" | "менеджер" => SpeakerRole::Seller,
            "customer" | "client" | "buyer" | "user" | "покупатель" | "клиент" => {
                SpeakerRole::Customer
            }
            _ => SpeakerRole::Unknown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub message_id: i64,
    pub conversation_id: String,
    pub message_order: i64,
    pub speaker: SpeakerRole,
    pub text: String,
}

/// One entry of the seller anchor catalog handed to both models.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerAnchor {
    pub message_id: i64,
    pub message_order: i64,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Running,
    Success,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Running => "running",
            ScanStatus::Success => "success",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" => Some(ScanStatus::Running),
            "success" => Some(ScanStatus::Success),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanRunRow {
    pub run_id: String,
    pub model: String,
    pub conversation_from: i64,
    pub conversation_to: i64,
    pub selected_conversations: i64,
    pub messages_count: i64,
    pub status: ScanStatus,
    pub started_at_utc: String,
    pub finished_at_utc: String,
    pub summary: serde_json::Value,
}

impl ScanRunRow {
    pub fn metrics_version(&self) -> Option<&str> {
        self.summary.get("metrics_version").and_then(|v| v.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResultRow {
    pub run_id: String,
    pub conversation_id: String,
    pub rule_key: String,
    pub eval_hit: bool,
    pub eval_confidence: f64,
    pub eval_reason_code: String,
    pub eval_reason: String,
    pub evidence_quote: String,
    pub evidence_message_id: Option<i64>,
    pub evidence_message_order: Option<i64>,
    pub judge_expected_hit: bool,
    pub judge_label: bool,
    pub judge_confidence: f64,
    pub judge_rationale: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanMetricRow {
    pub run_id: String,
    pub rule_key: String,
    pub eval_total: i64,
    pub eval_true: i64,
    pub evaluator_hit_rate: f64,
    pub judge_true: i64,
    pub judge_false: i64,
    pub judged_total: i64,
    pub judge_correctness: f64,
    pub judge_coverage: f64,
}

/// Append-only audit row for one provider invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmCallRecord {
    pub run_id: String,
    pub phase: String,
    pub rule_key: String,
    pub conversation_id: String,
    pub message_id: i64,
    pub attempt: u32,
    pub context_mode: String,
    pub judge_policy: String,
    pub trace_mode: String,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub request_json: String,
    pub response_http_status: u16,
    pub response_json: String,
    pub extracted_json: String,
    pub parse_ok: bool,
    pub validation_ok: bool,
    pub error_message: String,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanCounters {
    pub evaluated_conversations: usize,
    pub skipped_conversations_without_seller: usize,
    pub skipped_conversations_on_error: usize,
    pub processed: usize,
    pub inserted: usize,
    pub judged: usize,
    pub schema_errors: usize,
    pub non_schema_errors: usize,
}

/// Persisted as `scan_runs.summary_json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanSummary {
    pub conversation_from: i64,
    pub conversation_to: i64,
    pub selected_conversations: usize,
    pub messages: usize,
    pub seller_messages: usize,
    pub customer_messages_context_only: usize,
    pub rules: usize,
    pub metrics_version: String,
    pub bundle_rules: bool,
    pub judge_mode: String,
    pub context_mode: String,
    pub llm_trace: String,
    pub failure_policy: String,
    #[serde(flatten)]
    pub counters: ScanCounters,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub judge_coverage: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_run_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub canonical_note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_class: Option<ErrorClass>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speaker_label_normalization() {
        assert_eq!(SpeakerRole::from_label("Sales Rep"), SpeakerRole::Seller);
        assert_eq!(SpeakerRole::from_label("  seller "), SpeakerRole::Seller);
        assert_eq!(SpeakerRole::from_label("Customer"), SpeakerRole::Customer);
        assert_eq!(SpeakerRole::from_label("Клиент"), SpeakerRole::Customer);
        assert_eq!(SpeakerRole::from_label("bot"), SpeakerRole::Unknown);
    }

    #[test]
    fn test_summary_flattens_counters() {
        let summary = ScanSummary {
            conversation_from: 0,
            conversation_to: 1,
            selected_conversations: 2,
            messages: 4,
            seller_messages: 2,
            customer_messages_context_only: 2,
            rules: 3,
            metrics_version: "v".into(),
            bundle_rules: true,
            judge_mode: "full".into(),
            context_mode: "full".into(),
            llm_trace: "full".into(),
            failure_policy: "fail_fast".into(),
            counters: ScanCounters {
                inserted: 2,
                ..Default::default()
            },
            judge_coverage: None,
            canonical_run_id: None,
            canonical_note: None,
            error: None,
            error_class: None,
        };
        let v = serde_json::to_value(&summary).unwrap();
        assert_eq!(v["inserted"], 2);
        assert!(v.get("error").is_none());
        let back: ScanSummary = serde_json::from_value(v).unwrap();
        assert_eq!(back, summary);
    }
}
