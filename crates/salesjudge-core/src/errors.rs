use crate::contract::ContractError;
use crate::evidence::EvidenceViolation;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

pub mod similarity;

#[derive(Debug)]
pub struct ConfigError(pub String);

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "ConfigError: {}", self.0)
    }
}
impl std::error::Error for ConfigError {}

/// Tag stored in a failed run's summary as `error_class`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorClass {
    Contract,
    Schema,
    Transport,
    Invariant,
    Selection,
    Config,
    Internal,
}

impl ErrorClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorClass::Contract => "contract",
            ErrorClass::Schema => "schema",
            ErrorClass::Transport => "transport",
            ErrorClass::Invariant => "invariant",
            ErrorClass::Selection => "selection",
            ErrorClass::Config => "config",
            ErrorClass::Internal => "internal",
        }
    }

    /// Counted under `schema_errors` in the run summary.
    pub fn is_schema(&self) -> bool {
        matches!(self, ErrorClass::Schema | ErrorClass::Contract)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Evaluator,
    Judge,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Evaluator => "evaluator",
            Phase::Judge => "judge",
        }
    }
}

impl Display for Phase {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A model answer that cannot be accepted as-is.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PayloadError {
    #[error("invalid_json_schema: provider rejected contract {contract}: {message}")]
    ProviderRejected { contract: String, message: String },

    #[error("json_parse_failed: {0}")]
    Parse(String),

    #[error("validation_failed: {0}")]
    Schema(String),

    #[error("validation_failed: rule '{rule_key}': {message}")]
    Shape { rule_key: String, message: String },
}

#[derive(Debug, thiserror::Error)]
pub enum ScanError {
    #[error("contract error: {0}")]
    Contract(#[from] ContractError),

    #[error("schema error in {phase} call for conversation {conversation_id}: {source}")]
    Payload {
        phase: Phase,
        conversation_id: String,
        #[source]
        source: PayloadError,
    },

    #[error(
        "schema error: evidence contract violated for rule '{rule_key}' in conversation {conversation_id}: {violation}"
    )]
    Evidence {
        conversation_id: String,
        rule_key: String,
        violation: EvidenceViolation,
    },

    #[error("non-schema error in {phase} call for conversation {conversation_id}: {message}")]
    Transport {
        phase: Phase,
        conversation_id: String,
        message: String,
    },

    #[error("invariant violation: {0}")]
    Invariant(String),

    #[error("{0}")]
    Selection(String),
}

impl ScanError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ScanError::Contract(_) => ErrorClass::Contract,
            ScanError::Payload { .. } | ScanError::Evidence { .. } => ErrorClass::Schema,
            ScanError::Transport { .. } => ErrorClass::Transport,
            ScanError::Invariant(_) => ErrorClass::Invariant,
            ScanError::Selection(_) => ErrorClass::Selection,
        }
    }

    /// Errors a retry could plausibly clear: transport failures and unparseable output.
    pub fn is_retryable(&self) -> bool {
        match self {
            ScanError::Transport { .. } => true,
            ScanError::Payload { source, .. } => matches!(source, PayloadError::Parse(_)),
            _ => false,
        }
    }
}

/// Maps an arbitrary error back to its class by downcasting.
pub fn try_classify(err: &anyhow::Error) -> ErrorClass {
    if let Some(e) = err.downcast_ref::<ScanError>() {
        return e.class();
    }
    if err.downcast_ref::<ContractError>().is_some() {
        return ErrorClass::Contract;
    }
    if err.downcast_ref::<ConfigError>().is_some() {
        return ErrorClass::Config;
    }
    ErrorClass::Internal
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_through_anyhow() {
        let err: anyhow::Error = ScanError::Transport {
            phase: Phase::Judge,
            conversation_id: "c1".into(),
            message: "502".into(),
        }
        .into();
        assert_eq!(try_classify(&err), ErrorClass::Transport);
        assert!(!try_classify(&err).is_schema());

        let err: anyhow::Error = ScanError::Payload {
            phase: Phase::Evaluator,
            conversation_id: "c1".into(),
            source: PayloadError::Parse("eof".into()),
        }
        .into();
        assert_eq!(try_classify(&err), ErrorClass::Schema);

        let err = anyhow::anyhow!("disk full");
        assert_eq!(try_classify(&err), ErrorClass::Internal);
    }

    #[test]
    fn test_classify_keeps_class_under_context() {
        let err = anyhow::Error::new(ScanError::Invariant("inserted=3 judged=2".into()))
            .context("finalizing scan");
        assert_eq!(try_classify(&err), ErrorClass::Invariant);
    }

    #[test]
    fn test_only_transport_and_parse_are_retryable() {
        let parse = ScanError::Payload {
            phase: Phase::Evaluator,
            conversation_id: "c1".into(),
            source: PayloadError::Parse("eof".into()),
        };
        let shape = ScanError::Payload {
            phase: Phase::Evaluator,
            conversation_id: "c1".into(),
            source: PayloadError::Shape {
                rule_key: "greeting".into(),
                message: "quote missing".into(),
            },
        };
        assert!(parse.is_retryable());
        assert!(!shape.is_retryable());
        assert!(!ScanError::Invariant("x".into()).is_retryable());
    }
}
