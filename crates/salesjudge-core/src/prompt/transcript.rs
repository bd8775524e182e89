use super::ContextMode;
use crate::model::{Message, SellerAnchor, SpeakerRole};

pub const BEGIN_SELLER_CATALOG: &str = "BEGIN_SELLER_CATALOG_JSON";
pub const END_SELLER_CATALOG: &str = "END_SELLER_CATALOG_JSON";
pub const BEGIN_ANCHOR_BLOCKS: &str = "BEGIN_SELLER_ANCHOR_BLOCKS";
pub const END_ANCHOR_BLOCKS: &str = "END_SELLER_ANCHOR_BLOCKS";
pub const BEGIN_ANCHOR_TEXT: &str = "BEGIN_ANCHOR_TEXT";
pub const END_ANCHOR_TEXT: &str = "END_ANCHOR_TEXT";

fn ordered(messages: &[Message]) -> Vec<&Message> {
    let mut out: Vec<&Message> = messages.iter().collect();
    out.sort_by_key(|m| m.message_order);
    out
}

/// Seller messages of one conversation, in message order.
pub fn seller_catalog(messages: &[Message]) -> Vec<SellerAnchor> {
    ordered(messages)
        .into_iter()
        .filter(|m| m.speaker == SpeakerRole::Seller)
        .map(|m| SellerAnchor {
            message_id: m.message_id,
            message_order: m.message_order,
            text: m.text.clone(),
        })
        .collect()
}

/// `[order] Speaker: text`, one line per message.
pub fn chat_context(messages: &[Message], mode: ContextMode) -> String {
    match mode {
        ContextMode::Full => ordered(messages)
            .into_iter()
            .map(|m| format!("[{}] {}: {}", m.message_order, m.speaker.display_label(), m.text))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

pub fn seller_catalog_json(catalog: &[SellerAnchor]) -> String {
    serde_json::to_string(catalog).unwrap_or_else(|_| "[]".to_string())
}

/// Verbatim per-anchor blocks the model can copy quotes from.
pub fn seller_copy_blocks(catalog: &[SellerAnchor]) -> String {
    let mut lines: Vec<String> = Vec::with_capacity(catalog.len() * 4);
    for a in catalog {
        lines.push(format!(
            "ANCHOR message_id={} message_order={}",
            a.message_id, a.message_order
        ));
        lines.push(BEGIN_ANCHOR_TEXT.to_string());
        lines.push(a.text.clone());
        lines.push(END_ANCHOR_TEXT.to_string());
    }
    lines.join("\n")
}

/// Pulls the seller catalog back out of a prompt built by this module.
pub fn extract_seller_catalog(prompt: &str) -> Option<Vec<SellerAnchor>> {
    let raw = between(prompt, BEGIN_SELLER_CATALOG, END_SELLER_CATALOG)?;
    serde_json::from_str(raw.trim()).ok()
}

pub(crate) fn between<'a>(text: &'a str, begin: &str, end: &str) -> Option<&'a str> {
    let start = text.find(begin)? + begin.len();
    let stop = text[start..].find(end)? + start;
    Some(&text[start..stop])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(id: i64, order: i64, speaker: SpeakerRole, text: &str) -> Message {
        Message {
            message_id: id,
            conversation_id: "c1".into(),
            message_order: order,
            speaker,
            text: text.into(),
        }
    }

    fn conversation() -> Vec<Message> {
        vec![
            msg(2, 2, SpeakerRole::Seller, "Hello! Our Plus package fits."),
            msg(1, 1, SpeakerRole::Customer, "Hi, budget is tight"),
            msg(3, 3, SpeakerRole::Unknown, "[system] transfer"),
        ]
    }

    #[test]
    fn test_chat_context_is_ordered_and_labelled() {
        let ctx = chat_context(&conversation(), ContextMode::Full);
        assert_eq!(
            ctx,
            "[1] Customer: Hi, budget is tight\n[2] Seller: Hello! Our Plus package fits.\n[3] Unknown: [system] transfer"
        );
    }

    #[test]
    fn test_catalog_and_copy_blocks() {
        let cat = seller_catalog(&conversation());
        assert_eq!(cat.len(), 1);
        assert_eq!(
            seller_catalog_json(&cat),
            r#"[{"message_id":2,"message_order":2,"text":"Hello! Our Plus package fits."}]"#
        );
        assert_eq!(
            seller_copy_blocks(&cat),
            "ANCHOR message_id=2 message_order=2\nBEGIN_ANCHOR_TEXT\nHello! Our Plus package fits.\nEND_ANCHOR_TEXT"
        );
    }

    #[test]
    fn test_extract_catalog_roundtrip_from_prompt() {
        let cat = seller_catalog(&conversation());
        let prompt = format!(
            "x\n{}\n{}\n{}\ny",
            BEGIN_SELLER_CATALOG,
            seller_catalog_json(&cat),
            END_SELLER_CATALOG
        );
        assert_eq!(extract_seller_catalog(&prompt), Some(cat));
    }
}
