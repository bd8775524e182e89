use super::now_utc;
use crate::errors::ScanError;
use crate::model::{Conversation, Message, ScanRunRow, ScanStatus, SpeakerRole};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const CANONICAL_RUN_KEY: &str = "canonical_run_id";

#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create db dir {}", parent.display()))?;
            }
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open db {}", path.display()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("store connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    // conversations

    /// Replaces a conversation and all of its messages; orders start at 1.
    pub fn replace_conversation(
        &self,
        conversation_id: &str,
        source_label: &str,
        messages: &[(SpeakerRole, String)],
    ) -> anyhow::Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let now = now_utc();
        tx.execute(
            "DELETE FROM messages WHERE conversation_id=?1",
            params![conversation_id],
        )?;
        tx.execute(
            "INSERT INTO conversations(conversation_id, source_label, message_count, created_at_utc, updated_at_utc)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT(conversation_id) DO UPDATE SET
               source_label=excluded.source_label,
               message_count=excluded.message_count,
               updated_at_utc=excluded.updated_at_utc",
            params![conversation_id, source_label, messages.len() as i64, now],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO messages(conversation_id, message_order, speaker_label, text, created_at_utc)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            for (i, (speaker, text)) in messages.iter().enumerate() {
                stmt.execute(params![
                    conversation_id,
                    (i + 1) as i64,
                    speaker.as_str(),
                    text,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(messages.len())
    }

    pub fn list_conversations(&self) -> anyhow::Result<Vec<Conversation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT conversation_id, source_label, message_count FROM conversations ORDER BY conversation_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(Conversation {
                conversation_id: row.get(0)?,
                source_label: row.get(1)?,
                message_count: row.get::<_, i64>(2)? as usize,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Conversations ordered by id, sliced `[from, to]` inclusive by index.
    pub fn load_messages_for_range(
        &self,
        from: i64,
        to: i64,
    ) -> anyhow::Result<(Vec<String>, Vec<Message>)> {
        let selection = |msg: String| anyhow::Error::new(ScanError::Selection(msg));
        if from < 0 {
            return Err(selection("conversation_from must be >= 0".into()));
        }
        if to < from {
            return Err(selection("conversation_to must be >= conversation_from".into()));
        }

        let conn = self.lock()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM conversations", [], |r| r.get(0))?;
        if total == 0 {
            return Err(selection("no conversations in db; run import first".into()));
        }
        if from >= total {
            return Err(selection(format!(
                "conversation_from={} is out of range (total={})",
                from, total
            )));
        }

        let last = to.min(total - 1);
        let ids: Vec<String> = {
            let mut stmt = conn.prepare(
                "SELECT conversation_id FROM conversations ORDER BY conversation_id LIMIT ?1 OFFSET ?2",
            )?;
            let rows = stmt.query_map(params![last - from + 1, from], |r| r.get(0))?;
            rows.collect::<Result<Vec<_>, _>>()?
        };
        if ids.is_empty() {
            return Err(selection("no conversations selected".into()));
        }

        let mut messages = Vec::new();
        let mut stmt = conn.prepare(
            "SELECT message_id, conversation_id, message_order, speaker_label, text
             FROM messages WHERE conversation_id=?1 ORDER BY message_order",
        )?;
        for id in &ids {
            let rows = stmt.query_map(params![id], |row| {
                let speaker: String = row.get(3)?;
                Ok(Message {
                    message_id: row.get(0)?,
                    conversation_id: row.get(1)?,
                    message_order: row.get(2)?,
                    speaker: SpeakerRole::from_label(&speaker),
                    text: row.get(4)?,
                })
            })?;
            for m in rows {
                messages.push(m?);
            }
        }
        if messages.is_empty() {
            return Err(selection("selected conversations contain no messages".into()));
        }
        Ok((ids, messages))
    }

    // runs

    #[allow(clippy::too_many_arguments)]
    pub fn create_run(
        &self,
        run_id: &str,
        model: &str,
        conversation_from: i64,
        conversation_to: i64,
        selected_conversations: usize,
        messages_count: usize,
    ) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO scan_runs(run_id, model, conversation_from, conversation_to,
               selected_conversations, messages_count, status, started_at_utc, finished_at_utc, summary_json)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, '', '{}')",
            params![
                run_id,
                model,
                conversation_from,
                conversation_to,
                selected_conversations as i64,
                messages_count as i64,
                ScanStatus::Running.as_str(),
                now_utc()
            ],
        )?;
        Ok(())
    }

    /// Moves a running run to its final status. Returns false if it was already final.
    pub fn finish_run(
        &self,
        run_id: &str,
        status: ScanStatus,
        summary: &serde_json::Value,
    ) -> anyhow::Result<bool> {
        let conn = self.lock()?;
        let n = conn.execute(
            "UPDATE scan_runs SET status=?1, finished_at_utc=?2, summary_json=?3
             WHERE run_id=?4 AND status=?5",
            params![
                status.as_str(),
                now_utc(),
                serde_json::to_string(summary)?,
                run_id,
                ScanStatus::Running.as_str()
            ],
        )?;
        Ok(n == 1)
    }

    pub fn get_run(&self, run_id: &str) -> anyhow::Result<Option<ScanRunRow>> {
        let conn = self.lock()?;
        let row = conn
            .query_row(
                &format!("{} WHERE run_id=?1", RUN_SELECT),
                params![run_id],
                run_from_row,
            )
            .optional()?;
        Ok(row)
    }

    pub fn list_runs(&self, limit: usize) -> anyhow::Result<Vec<ScanRunRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "{} ORDER BY started_at_utc DESC, rowid DESC LIMIT ?1",
            RUN_SELECT
        ))?;
        let rows = stmt.query_map(params![limit as i64], run_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn run_metrics_version(&self, run_id: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .get_run(run_id)?
            .and_then(|r| r.metrics_version().map(|s| s.to_string()))
            .filter(|s| !s.is_empty()))
    }

    pub fn latest_successful_run(&self) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                "SELECT run_id FROM scan_runs WHERE status=?1
                 ORDER BY started_at_utc DESC, rowid DESC LIMIT 1",
                params![ScanStatus::Success.as_str()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn earliest_successful_run_for_version(
        &self,
        metrics_version: &str,
    ) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let id = conn
            .query_row(
                "SELECT run_id FROM scan_runs
                 WHERE status=?1 AND json_extract(summary_json, '$.metrics_version')=?2
                 ORDER BY started_at_utc ASC, rowid ASC LIMIT 1",
                params![ScanStatus::Success.as_str(), metrics_version],
                |r| r.get(0),
            )
            .optional()?;
        Ok(id)
    }

    // app state

    pub fn get_state(&self, key: &str) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let v = conn
            .query_row(
                "SELECT value FROM app_state WHERE key=?1",
                params![key],
                |r| r.get(0),
            )
            .optional()?;
        Ok(v)
    }

    pub fn set_state(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO app_state(key, value, updated_at_utc) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value=excluded.value, updated_at_utc=excluded.updated_at_utc",
            params![key, value, now_utc()],
        )?;
        Ok(())
    }
}

const RUN_SELECT: &str = "SELECT run_id, model, conversation_from, conversation_to, selected_conversations,
  messages_count, status, started_at_utc, finished_at_utc, summary_json FROM scan_runs";

fn run_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ScanRunRow> {
    let status: String = row.get(6)?;
    let summary: String = row.get(9)?;
    Ok(ScanRunRow {
        run_id: row.get(0)?,
        model: row.get(1)?,
        conversation_from: row.get(2)?,
        conversation_to: row.get(3)?,
        selected_conversations: row.get(4)?,
        messages_count: row.get(5)?,
        status: ScanStatus::parse(&status).unwrap_or(ScanStatus::Failed),
        started_at_utc: row.get(7)?,
        finished_at_utc: row.get(8)?,
        summary: serde_json::from_str(&summary).unwrap_or(serde_json::Value::Null),
    })
}
