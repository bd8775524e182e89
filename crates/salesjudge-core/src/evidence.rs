//! Quote-contract checks for positive evaluator verdicts.
//!
//! Pure functions over the seller anchor catalog; nothing here touches the
//! store or the provider.

use crate::model::SellerAnchor;

/// What the evaluator claims as evidence for one rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvidenceClaim<'a> {
    pub message_id: Option<i64>,
    pub message_order: Option<i64>,
    pub quote: &'a str,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EvidenceViolation {
    #[error("evidence anchor is missing")]
    MissingAnchor,

    #[error("evidence_message_id={message_id} is not a seller message of this conversation")]
    NotSellerMessage { message_id: i64 },

    #[error(
        "evidence_message_order mismatch for evidence_message_id={message_id}: claimed {claimed}, recorded {recorded}"
    )]
    OrderMismatch {
        message_id: i64,
        claimed: i64,
        recorded: i64,
    },

    #[error("evidence_quote is empty")]
    EmptyQuote,

    #[error("evidence_quote is not an exact substring of seller message {message_id}")]
    QuoteNotFound { message_id: i64 },

    #[error(
        "evidence_message_id={message_id} is seller turn {turn}, outside the first {window} seller messages"
    )]
    OutsideWindow {
        message_id: i64,
        turn: usize,
        window: usize,
    },
}

/// Checks a claimed anchor and quote against the seller catalog.
///
/// `catalog` must be the conversation's seller messages in order; the
/// window counts seller turns only, starting at 1.
pub fn validate(
    claim: &EvidenceClaim<'_>,
    catalog: &[SellerAnchor],
    window: Option<usize>,
) -> Result<(), EvidenceViolation> {
    let (message_id, claimed_order) = match (claim.message_id, claim.message_order) {
        (Some(id), Some(order)) => (id, order),
        _ => return Err(EvidenceViolation::MissingAnchor),
    };

    let (idx, anchor) = catalog
        .iter()
        .enumerate()
        .find(|(_, a)| a.message_id == message_id)
        .ok_or(EvidenceViolation::NotSellerMessage { message_id })?;

    if anchor.message_order != claimed_order {
        return Err(EvidenceViolation::OrderMismatch {
            message_id,
            claimed: claimed_order,
            recorded: anchor.message_order,
        });
    }

    if claim.quote.trim().is_empty() {
        return Err(EvidenceViolation::EmptyQuote);
    }
    if !anchor.text.contains(claim.quote) {
        return Err(EvidenceViolation::QuoteNotFound { message_id });
    }

    if let Some(window) = window {
        let turn = idx + 1;
        if turn > window {
            return Err(EvidenceViolation::OutsideWindow {
                message_id,
                turn,
                window,
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<SellerAnchor> {
        vec![
            SellerAnchor {
                message_id: 11,
                message_order: 2,
                text: "Hello! How can I help?".into(),
            },
            SellerAnchor {
                message_id: 13,
                message_order: 4,
                text: "We have the Plus package.".into(),
            },
        ]
    }

    fn claim(id: i64, order: i64, quote: &str) -> EvidenceClaim<'_> {
        EvidenceClaim {
            message_id: Some(id),
            message_order: Some(order),
            quote,
        }
    }

    #[test]
    fn test_accepts_exact_substring() {
        assert_eq!(validate(&claim(11, 2, "Hello!"), &catalog(), Some(3)), Ok(()));
        assert_eq!(validate(&claim(13, 4, "Plus package"), &catalog(), None), Ok(()));
    }

    #[test]
    fn test_rejects_missing_anchor() {
        let c = EvidenceClaim {
            message_id: Some(11),
            message_order: None,
            quote: "Hello!",
        };
        assert_eq!(validate(&c, &catalog(), None), Err(EvidenceViolation::MissingAnchor));
    }

    #[test]
    fn test_rejects_non_seller_and_order_mismatch() {
        assert_eq!(
            validate(&claim(12, 3, "Hello!"), &catalog(), None),
            Err(EvidenceViolation::NotSellerMessage { message_id: 12 })
        );
        assert!(matches!(
            validate(&claim(11, 3, "Hello!"), &catalog(), None),
            Err(EvidenceViolation::OrderMismatch { recorded: 2, .. })
        ));
    }

    #[test]
    fn test_rejects_paraphrase_and_normalization() {
        assert_eq!(
            validate(&claim(11, 2, "   "), &catalog(), None),
            Err(EvidenceViolation::EmptyQuote)
        );
        for q in ["hello!", "Hello !", "Hello…", "Hi! How can I help?"] {
            assert_eq!(
                validate(&claim(11, 2, q), &catalog(), None),
                Err(EvidenceViolation::QuoteNotFound { message_id: 11 }),
                "quote {:?}",
                q
            );
        }
    }

    #[test]
    fn test_window_counts_seller_turns() {
        assert_eq!(
            validate(&claim(13, 4, "Plus"), &catalog(), Some(1)),
            Err(EvidenceViolation::OutsideWindow {
                message_id: 13,
                turn: 2,
                window: 1
            })
        );
        assert_eq!(validate(&claim(13, 4, "Plus"), &catalog(), Some(2)), Ok(()));
    }
}
