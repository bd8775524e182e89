use super::{responses_request, LlmClient, LlmExchange, StructuredRequest};
use async_trait::async_trait;
use serde_json::Value;
use std::time::{Duration, Instant};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client: http_client(DEFAULT_TIMEOUT),
        }
    }
}

/// A timed-out request surfaces as a transport failure of that call.
pub(crate) fn http_client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default()
}

/// Concatenates every `output_text` content item of a Responses-API reply.
pub fn extract_output_text(response: &Value) -> Option<String> {
    if let Some(s) = response.get("output_text").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    let mut out = String::new();
    let mut found = false;
    for item in response.get("output")?.as_array()? {
        let Some(content) = item.get("content").and_then(|c| c.as_array()) else {
            continue;
        };
        for part in content {
            if part.get("type").and_then(|t| t.as_str()) == Some("output_text") {
                if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                    out.push_str(text);
                    found = true;
                }
            }
        }
    }
    found.then_some(out)
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn invoke(&self, req: &StructuredRequest<'_>) -> LlmExchange {
        let body = responses_request(&self.model, req);
        let start = Instant::now();
        let elapsed = |s: &Instant| s.elapsed().as_millis() as u64;

        if self.api_key.trim().is_empty() {
            return LlmExchange::failed(
                body,
                0,
                "live_call_failed: OPENAI_API_KEY is not set".into(),
                0,
            );
        }

        let url = format!("{}/responses", self.base_url);
        let resp = match self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return LlmExchange::failed(
                    body,
                    0,
                    format!("live_call_failed: {}", e),
                    elapsed(&start),
                )
            }
        };

        let status = resp.status().as_u16();
        let text = resp.text().await.unwrap_or_default();
        let latency_ms = elapsed(&start);

        if !(200..300).contains(&status) {
            let mut ex = LlmExchange::failed(
                body,
                status,
                format!("live_call_failed: HTTP {}: {}", status, text),
                latency_ms,
            );
            if let Ok(v) = serde_json::from_str::<Value>(&text) {
                ex.response = v;
            }
            return ex;
        }

        let json: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                return LlmExchange::failed(
                    body,
                    status,
                    format!("live_call_failed: provider returned non-JSON body: {}", e),
                    latency_ms,
                )
            }
        };

        let output_text = extract_output_text(&json).unwrap_or_default();
        LlmExchange {
            request: body,
            http_status: status,
            response: json,
            output_text,
            error: None,
            latency_ms,
        }
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractFactory;
    use serde_json::json;

    #[test]
    fn test_extract_output_text_from_output_items() {
        let resp = json!({
            "output": [
                {"type": "reasoning", "summary": []},
                {"type": "message", "content": [
                    {"type": "output_text", "text": "{\"a\":"},
                    {"type": "output_text", "text": "1}"}
                ]}
            ]
        });
        assert_eq!(extract_output_text(&resp).as_deref(), Some("{\"a\":1}"));
        assert_eq!(extract_output_text(&json!({"output": []})), None);
    }

    #[tokio::test]
    async fn test_missing_key_is_audited_failure() {
        let f = ContractFactory::new();
        let c = f.judge(&["greeting"]).unwrap();
        let client = OpenAIClient::new("gpt-4.1-mini".into(), "".into());
        let ex = client
            .invoke(&StructuredRequest {
                contract: &c,
                system_prompt: "s",
                user_prompt: "u",
            })
            .await;
        let err = ex.error.unwrap();
        assert!(err.message.contains("OPENAI_API_KEY"));
        assert!(!err.schema_rejected);
        assert_eq!(ex.request["text"]["format"]["strict"], true);
        assert_eq!(ex.request["text"]["format"]["name"], "BundledJudgeResult__greeting");
    }

    #[tokio::test]
    async fn test_silent_provider_times_out_as_transport_failure() {
        // accepts connections into the backlog but never answers
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let f = ContractFactory::new();
        let c = f.evaluator(&["greeting"]).unwrap();
        let client = OpenAIClient {
            base_url: format!("http://{}", addr),
            client: http_client(Duration::from_millis(200)),
            ..OpenAIClient::new("gpt-4.1-mini".into(), "sk-test".into())
        };
        let ex = client
            .invoke(&StructuredRequest {
                contract: &c,
                system_prompt: "s",
                user_prompt: "u",
            })
            .await;
        let err = ex.error.unwrap();
        assert_eq!(ex.http_status, 0);
        assert!(err.message.starts_with("live_call_failed"));
        assert!(!err.schema_rejected);
        drop(listener);
    }
}
