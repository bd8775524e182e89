//! Evaluator-side prompt assembly.

use serde::{Deserialize, Serialize};

pub mod evaluator;
pub mod transcript;

pub use evaluator::{build_evaluator_prompts, business_context, EvaluatorPromptInput};
pub use transcript::{chat_context, seller_catalog};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// How much of the conversation the models see. Only the full transcript is supported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextMode {
    #[default]
    Full,
}

impl ContextMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContextMode::Full => "full",
        }
    }
}
