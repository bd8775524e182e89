use crate::prompt::ContextMode;
use crate::rules;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Any failed call aborts the run.
    #[default]
    FailFast,
    /// Transport and parse failures are retried once, then the conversation is skipped.
    RetryThenSkip,
}

impl FailurePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailFast => "fail_fast",
            FailurePolicy::RetryThenSkip => "retry_then_skip",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "fail_fast" | "fail-fast" => Some(FailurePolicy::FailFast),
            "retry_then_skip" | "retry-then-skip" => Some(FailurePolicy::RetryThenSkip),
            _ => None,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        match self {
            FailurePolicy::FailFast => 1,
            FailurePolicy::RetryThenSkip => 2,
        }
    }
}

/// Scan settings that are not user-tunable. Every run records them in its summary.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanPolicy {
    pub bundle_rules: bool,
    pub judge_mode: &'static str,
    pub context_mode: ContextMode,
    pub llm_trace: &'static str,
    pub greeting_window_max: usize,
    pub failure_policy: FailurePolicy,
}

impl ScanPolicy {
    pub fn fixed() -> Self {
        let greeting_window_max = rules::rule("greeting")
            .and_then(|r| r.seller_window_max)
            .unwrap_or(3);
        Self {
            bundle_rules: true,
            judge_mode: "full",
            context_mode: ContextMode::Full,
            llm_trace: "full",
            greeting_window_max,
            failure_policy: FailurePolicy::FailFast,
        }
    }

    pub fn with_failure_policy(mut self, failure_policy: FailurePolicy) -> Self {
        self.failure_policy = failure_policy;
        self
    }

    /// `bundled=true, judge=full, context=full, llm_trace=full`
    pub fn doc_line(&self) -> String {
        format!(
            "bundled={}, judge={}, context={}, llm_trace={}",
            self.bundle_rules,
            self.judge_mode,
            self.context_mode.as_str(),
            self.llm_trace
        )
    }
}
