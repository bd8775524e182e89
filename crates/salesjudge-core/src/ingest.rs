//! Transcript import from YAML or JSON files.
//!
//! Accepted shapes: a top-level `conversations:` list, or a bare list of
//! conversations. Each conversation has an `id`, an optional `source` and an
//! ordered `messages` list of `{speaker, text}`.

use crate::model::SpeakerRole;
use crate::storage::Store;
use anyhow::Context;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptMessage {
    pub speaker: String,
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TranscriptConversation {
    pub id: String,
    #[serde(default)]
    pub source: Option<String>,
    pub messages: Vec<TranscriptMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TranscriptFile {
    Wrapped {
        conversations: Vec<TranscriptConversation>,
    },
    List(Vec<TranscriptConversation>),
}

impl TranscriptFile {
    fn into_conversations(self) -> Vec<TranscriptConversation> {
        match self {
            TranscriptFile::Wrapped { conversations } => conversations,
            TranscriptFile::List(list) => list,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportStats {
    pub conversations: usize,
    pub messages: usize,
    pub seller_messages: usize,
    pub unknown_speakers: usize,
    pub skipped_blank_messages: usize,
}

pub fn parse_transcripts(raw: &str, is_json: bool) -> anyhow::Result<Vec<TranscriptConversation>> {
    let file: TranscriptFile = if is_json {
        serde_json::from_str(raw).context("failed to parse transcript JSON")?
    } else {
        serde_yaml::from_str(raw).context("failed to parse transcript YAML")?
    };
    let conversations = file.into_conversations();

    let mut seen = HashSet::new();
    for c in &conversations {
        if c.id.trim().is_empty() {
            anyhow::bail!("transcript contains a conversation with an empty id");
        }
        if !seen.insert(c.id.trim()) {
            anyhow::bail!("duplicate conversation id '{}' in transcript", c.id.trim());
        }
    }
    Ok(conversations)
}

/// Imports every conversation, replacing stored conversations with the same id.
pub fn import_conversations(
    store: &Store,
    conversations: &[TranscriptConversation],
    default_source: &str,
) -> anyhow::Result<ImportStats> {
    let mut stats = ImportStats::default();
    for conv in conversations {
        let mut messages = Vec::with_capacity(conv.messages.len());
        for m in &conv.messages {
            if m.text.trim().is_empty() {
                stats.skipped_blank_messages += 1;
                continue;
            }
            let role = SpeakerRole::from_label(&m.speaker);
            match role {
                SpeakerRole::Seller => stats.seller_messages += 1,
                SpeakerRole::Unknown => {
                    stats.unknown_speakers += 1;
                    tracing::warn!(
                        event = "import.unknown_speaker",
                        conversation_id = %conv.id,
                        speaker = %m.speaker,
                        "speaker label not recognized"
                    );
                }
                SpeakerRole::Customer => {}
            }
            messages.push((role, m.text.clone()));
        }
        let source = conv.source.as_deref().unwrap_or(default_source);
        stats.messages += store.replace_conversation(conv.id.trim(), source, &messages)?;
        stats.conversations += 1;
    }
    tracing::info!(
        event = "import.done",
        conversations = stats.conversations,
        messages = stats.messages,
        seller_messages = stats.seller_messages,
        "transcripts imported"
    );
    Ok(stats)
}

pub fn import_file(store: &Store, path: &Path) -> anyhow::Result<ImportStats> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read transcript file {}", path.display()))?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    let conversations = parse_transcripts(&raw, is_json)
        .with_context(|| format!("invalid transcript file {}", path.display()))?;
    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    import_conversations(store, &conversations, &source)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> Store {
        let s = Store::memory().unwrap();
        s.init_schema().unwrap();
        s
    }

    #[test]
    fn test_yaml_wrapped_and_reimport_replaces() {
        let raw = r#"
conversations:
  - id: c1
    messages:
      - speaker: Customer
        text: "Hi, budget is tight"
      - speaker: Sales Rep
        text: "Hello! Here is the Plus package"
      - speaker: bot
        text: "   "
"#;
        let s = store();
        let convs = parse_transcripts(raw, false).unwrap();
        let stats = import_conversations(&s, &convs, "chats.yaml").unwrap();
        assert_eq!(stats.conversations, 1);
        assert_eq!(stats.messages, 2);
        assert_eq!(stats.seller_messages, 1);
        assert_eq!(stats.skipped_blank_messages, 1);

        import_conversations(&s, &convs, "chats.yaml").unwrap();
        let listed = s.list_conversations().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].message_count, 2);
        assert_eq!(listed[0].source_label, "chats.yaml");
    }

    #[test]
    fn test_json_list_and_duplicates() {
        let raw = r#"[{"id": "a", "source": "crm", "messages": [{"speaker": "seller", "text": "hi"}]}]"#;
        let convs = parse_transcripts(raw, true).unwrap();
        assert_eq!(convs[0].source.as_deref(), Some("crm"));

        let dup = r#"[{"id": "a", "messages": []}, {"id": "a", "messages": []}]"#;
        let err = parse_transcripts(dup, true).unwrap_err();
        assert!(err.to_string().contains("duplicate conversation id"));
    }
}
