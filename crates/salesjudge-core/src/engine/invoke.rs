use super::policy::ScanPolicy;
use crate::contract::BundleContract;
use crate::errors::{PayloadError, Phase, ScanError};
use crate::model::LlmCallRecord;
use crate::providers::llm::{LlmClient, LlmExchange, StructuredRequest};
use crate::storage::Store;
use serde_json::Value;

/// Where an invocation belongs; copied into its audit row.
#[derive(Debug, Clone, Copy)]
pub struct CallSite<'a> {
    pub run_id: &'a str,
    pub phase: Phase,
    pub conversation_id: &'a str,
    pub message_id: i64,
    pub attempt: u32,
}

/// Invokes the provider, checks the answer against `contract` and writes one
/// `llm_calls` row whatever the outcome.
///
/// Provider and payload failures come back as [`ScanError`] inside the anyhow
/// error; storage failures are returned as-is.
pub async fn audited_call(
    store: &Store,
    client: &dyn LlmClient,
    policy: &ScanPolicy,
    site: CallSite<'_>,
    contract: &BundleContract,
    system_prompt: &str,
    user_prompt: &str,
) -> anyhow::Result<Value> {
    let req = StructuredRequest {
        contract,
        system_prompt,
        user_prompt,
    };
    let exchange = client.invoke(&req).await;
    let prompt_chars = system_prompt.chars().count() + user_prompt.chars().count();

    let outcome = check_exchange(&exchange, contract, site);
    let (parse_ok, validation_ok, extracted) = match &outcome {
        Ok(v) => (true, true, v.to_string()),
        Err(ScanError::Payload {
            source: PayloadError::Schema(_) | PayloadError::Shape { .. },
            ..
        }) => (true, false, exchange.output_text.clone()),
        Err(_) => (false, false, exchange.output_text.clone()),
    };
    let error_message = match &outcome {
        Ok(_) => String::new(),
        Err(e) => e.to_string(),
    };

    store.insert_llm_call(&LlmCallRecord {
        run_id: site.run_id.to_string(),
        phase: site.phase.as_str().to_string(),
        rule_key: "bundle".to_string(),
        conversation_id: site.conversation_id.to_string(),
        message_id: site.message_id,
        attempt: site.attempt,
        context_mode: policy.context_mode.as_str().to_string(),
        judge_policy: policy.judge_mode.to_string(),
        trace_mode: policy.llm_trace.to_string(),
        prompt_chars,
        response_chars: exchange.output_text.chars().count(),
        request_json: exchange.request.to_string(),
        response_http_status: exchange.http_status,
        response_json: exchange.response.to_string(),
        extracted_json: extracted,
        parse_ok,
        validation_ok,
        error_message,
        latency_ms: exchange.latency_ms,
    })?;

    match outcome {
        Ok(v) => {
            tracing::debug!(
                event = "scan.llm_call",
                phase = %site.phase,
                conversation_id = %site.conversation_id,
                attempt = site.attempt,
                latency_ms = exchange.latency_ms,
                "llm call ok"
            );
            Ok(v)
        }
        Err(e) => {
            tracing::warn!(
                event = "scan.llm_call_failed",
                phase = %site.phase,
                conversation_id = %site.conversation_id,
                attempt = site.attempt,
                error_class = e.class().as_str(),
                error = %e,
                "llm call failed"
            );
            Err(e.into())
        }
    }
}

fn check_exchange(
    exchange: &LlmExchange,
    contract: &BundleContract,
    site: CallSite<'_>,
) -> Result<Value, ScanError> {
    let payload_err = |source| ScanError::Payload {
        phase: site.phase,
        conversation_id: site.conversation_id.to_string(),
        source,
    };
    if let Some(failure) = &exchange.error {
        if failure.schema_rejected {
            return Err(payload_err(PayloadError::ProviderRejected {
                contract: contract.name.clone(),
                message: failure.message.clone(),
            }));
        }
        return Err(ScanError::Transport {
            phase: site.phase,
            conversation_id: site.conversation_id.to_string(),
            message: failure.message.clone(),
        });
    }
    contract.check_output(&exchange.output_text).map_err(payload_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractFactory;
    use crate::errors::{try_classify, ErrorClass};
    use crate::providers::llm::fake::ScriptedClient;

    fn setup() -> (Store, ScanPolicy) {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        store.create_run("r", "m", 0, 0, 1, 1).unwrap();
        (store, ScanPolicy::fixed())
    }

    fn site() -> CallSite<'static> {
        CallSite {
            run_id: "r",
            phase: Phase::Judge,
            conversation_id: "c1",
            message_id: 7,
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn test_every_outcome_is_audited() {
        let (store, policy) = setup();
        let factory = ContractFactory::new();
        let contract = factory.judge(&["greeting"]).unwrap();
        let client = ScriptedClient::new("m")
            .then_output("not json")
            .then_failure("connection reset", 0)
            .then_output(r#"{"greeting":{"expected_hit":true,"label":true,"confidence":0.9,"rationale":"ok"}}"#);

        let err = audited_call(&store, &client, &policy, site(), &contract, "s", "u")
            .await
            .unwrap_err();
        assert_eq!(try_classify(&err), ErrorClass::Schema);

        let err = audited_call(&store, &client, &policy, site(), &contract, "s", "u")
            .await
            .unwrap_err();
        assert_eq!(try_classify(&err), ErrorClass::Transport);

        let ok = audited_call(&store, &client, &policy, site(), &contract, "s", "u")
            .await
            .unwrap();
        assert_eq!(ok["greeting"]["label"], true);

        let calls = store.llm_calls("r").unwrap();
        assert_eq!(calls.len(), 3);
        assert!(!calls[0].parse_ok);
        assert!(calls[0].error_message.starts_with("schema error"));
        assert!(!calls[1].error_message.is_empty());
        assert!(calls[2].parse_ok && calls[2].validation_ok);
        assert_eq!(calls[2].rule_key, "bundle");
        assert_eq!(calls[2].message_id, 7);
        assert_eq!(calls[2].prompt_chars, 2);
    }

    #[tokio::test]
    async fn test_schema_violation_keeps_parse_ok() {
        let (store, policy) = setup();
        let factory = ContractFactory::new();
        let contract = factory.judge(&["greeting"]).unwrap();
        let client = ScriptedClient::new("m").then_output(r#"{"greeting":{"label":true}}"#);
        let err = audited_call(&store, &client, &policy, site(), &contract, "s", "u")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("validation_failed"));
        let calls = store.llm_calls("r").unwrap();
        assert!(calls[0].parse_ok);
        assert!(!calls[0].validation_ok);
    }
}
