use crate::contract::BundleContract;
use async_trait::async_trait;
use serde_json::{json, Value};

pub mod fake;
pub mod openai;

/// One structured-output call: a contract plus the two prompts.
pub struct StructuredRequest<'a> {
    pub contract: &'a BundleContract,
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderFailure {
    pub message: String,
    /// The provider refused the contract itself rather than failing to answer.
    pub schema_rejected: bool,
}

/// Everything observed during one invocation, successful or not.
#[derive(Debug, Clone, PartialEq)]
pub struct LlmExchange {
    pub request: Value,
    pub http_status: u16,
    pub response: Value,
    pub output_text: String,
    pub error: Option<ProviderFailure>,
    pub latency_ms: u64,
}

impl LlmExchange {
    pub fn failed(request: Value, http_status: u16, message: String, latency_ms: u64) -> Self {
        let schema_rejected = looks_like_schema_error(&message);
        Self {
            request,
            http_status,
            response: json!({ "error": message }),
            output_text: String::new(),
            error: Some(ProviderFailure {
                message,
                schema_rejected,
            }),
            latency_ms,
        }
    }
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Failures are reported inside the exchange so they can be audited.
    async fn invoke(&self, req: &StructuredRequest<'_>) -> LlmExchange;
    fn provider_name(&self) -> &'static str;
    fn model(&self) -> &str;
}

/// Responses-API request body with a strict `json_schema` text format.
pub fn responses_request(model: &str, req: &StructuredRequest<'_>) -> Value {
    json!({
        "model": model,
        "input": [
            {"role": "system", "content": req.system_prompt},
            {"role": "user", "content": req.user_prompt}
        ],
        "text": {
            "format": {
                "type": "json_schema",
                "name": req.contract.name,
                "schema": req.contract.schema,
                "strict": true
            }
        }
    })
}

pub fn looks_like_schema_error(text: &str) -> bool {
    let lower = text.to_lowercase();
    [
        "invalid_json_schema",
        "invalid schema for response_format",
        "text.format.schema",
        "json_parse_failed",
        "validation_failed",
        "schema_contract_failed",
    ]
    .iter()
    .any(|needle| lower.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_detection() {
        assert!(looks_like_schema_error(
            "HTTP 400: Invalid schema for response_format 'X'"
        ));
        assert!(looks_like_schema_error("code=invalid_json_schema"));
        assert!(!looks_like_schema_error("HTTP 502: bad gateway"));
    }

    #[test]
    fn test_failed_exchange_flags_schema_rejection() {
        let ex = LlmExchange::failed(json!({}), 400, "param text.format.schema invalid".into(), 3);
        assert!(ex.error.as_ref().unwrap().schema_rejected);
        assert_eq!(ex.output_text, "");
    }
}
