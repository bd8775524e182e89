use crate::model::{ScanStatus, ScanSummary};
use crate::storage::Store;
use serde_json::json;

/// Owns a `running` scan row and guarantees it is finalized exactly once.
///
/// Dropping an unfinished guard (early return, panic) marks the run failed.
pub struct RunGuard {
    store: Store,
    run_id: String,
    finalized: bool,
}

impl RunGuard {
    #[allow(clippy::too_many_arguments)]
    pub fn begin(
        store: &Store,
        run_id: &str,
        model: &str,
        conversation_from: i64,
        conversation_to: i64,
        selected_conversations: usize,
        messages_count: usize,
    ) -> anyhow::Result<Self> {
        store.create_run(
            run_id,
            model,
            conversation_from,
            conversation_to,
            selected_conversations,
            messages_count,
        )?;
        Ok(Self {
            store: store.clone(),
            run_id: run_id.to_string(),
            finalized: false,
        })
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn succeed(self, summary: &ScanSummary) -> anyhow::Result<()> {
        self.finish(ScanStatus::Success, summary)
    }

    pub fn fail(self, summary: &ScanSummary) -> anyhow::Result<()> {
        self.finish(ScanStatus::Failed, summary)
    }

    fn finish(mut self, status: ScanStatus, summary: &ScanSummary) -> anyhow::Result<()> {
        self.finalized = true;
        let value = serde_json::to_value(summary)?;
        if !self.store.finish_run(&self.run_id, status, &value)? {
            tracing::warn!(event = "scan.already_final", run_id = %self.run_id, "run was already finalized");
        }
        Ok(())
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if self.finalized {
            return;
        }
        let summary = json!({
            "metrics_version": crate::rules::METRICS_VERSION,
            "error": "scan aborted before finalization",
            "error_class": "internal",
        });
        match self.store.finish_run(&self.run_id, ScanStatus::Failed, &summary) {
            Ok(_) => tracing::warn!(event = "scan.aborted", run_id = %self.run_id, "run marked failed on drop"),
            Err(e) => tracing::error!(event = "scan.abort_failed", run_id = %self.run_id, error = %e, "could not finalize run"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_marks_run_failed() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        {
            let _guard = RunGuard::begin(&store, "scan_x", "m", 0, 0, 1, 1).unwrap();
        }
        let run = store.get_run("scan_x").unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Failed);
        assert_eq!(run.summary["error_class"], "internal");
    }

    #[test]
    fn test_panic_marks_run_failed() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let s = store.clone();
        let res = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _guard = RunGuard::begin(&s, "scan_p", "m", 0, 0, 1, 1).unwrap();
            panic!("boom");
        }));
        assert!(res.is_err());
        let run = store.get_run("scan_p").unwrap().unwrap();
        assert_eq!(run.status, ScanStatus::Failed);
    }
}
