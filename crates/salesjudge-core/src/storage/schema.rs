pub const DDL: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS conversations (
  conversation_id TEXT PRIMARY KEY,
  source_label TEXT NOT NULL,
  message_count INTEGER NOT NULL,
  created_at_utc TEXT NOT NULL,
  updated_at_utc TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS messages (
  message_id INTEGER PRIMARY KEY AUTOINCREMENT,
  conversation_id TEXT NOT NULL REFERENCES conversations(conversation_id),
  message_order INTEGER NOT NULL,
  speaker_label TEXT NOT NULL,
  text TEXT NOT NULL,
  created_at_utc TEXT NOT NULL,
  UNIQUE(conversation_id, message_order)
);

CREATE TABLE IF NOT EXISTS scan_runs (
  run_id TEXT PRIMARY KEY,
  model TEXT NOT NULL,
  conversation_from INTEGER NOT NULL,
  conversation_to INTEGER NOT NULL,
  selected_conversations INTEGER NOT NULL,
  messages_count INTEGER NOT NULL,
  status TEXT NOT NULL,
  started_at_utc TEXT NOT NULL,
  finished_at_utc TEXT NOT NULL DEFAULT '',
  summary_json TEXT NOT NULL DEFAULT '{}'
);

CREATE TABLE IF NOT EXISTS scan_results (
  result_id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES scan_runs(run_id),
  conversation_id TEXT NOT NULL,
  rule_key TEXT NOT NULL,
  eval_hit INTEGER NOT NULL,
  eval_confidence REAL NOT NULL,
  eval_reason_code TEXT NOT NULL,
  eval_reason TEXT NOT NULL,
  evidence_quote TEXT NOT NULL,
  evidence_message_id INTEGER,
  evidence_message_order INTEGER,
  judge_expected_hit INTEGER,
  judge_label INTEGER,
  judge_confidence REAL,
  judge_rationale TEXT,
  created_at_utc TEXT NOT NULL,
  UNIQUE(run_id, conversation_id, rule_key)
);

CREATE TABLE IF NOT EXISTS scan_metrics (
  run_id TEXT NOT NULL REFERENCES scan_runs(run_id),
  rule_key TEXT NOT NULL,
  eval_total INTEGER NOT NULL,
  eval_true INTEGER NOT NULL,
  evaluator_hit_rate REAL NOT NULL,
  judge_correctness REAL NOT NULL,
  judge_coverage REAL NOT NULL,
  judged_total INTEGER NOT NULL,
  judge_true INTEGER NOT NULL,
  judge_false INTEGER NOT NULL,
  created_at_utc TEXT NOT NULL,
  PRIMARY KEY(run_id, rule_key)
);

CREATE TABLE IF NOT EXISTS llm_calls (
  call_id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL,
  phase TEXT NOT NULL,
  rule_key TEXT NOT NULL DEFAULT '',
  conversation_id TEXT NOT NULL DEFAULT '',
  message_id INTEGER NOT NULL DEFAULT 0,
  attempt INTEGER NOT NULL,
  context_mode TEXT NOT NULL DEFAULT 'full',
  judge_policy TEXT NOT NULL DEFAULT 'full',
  trace_mode TEXT NOT NULL DEFAULT 'full',
  prompt_chars INTEGER NOT NULL DEFAULT 0,
  response_chars INTEGER NOT NULL DEFAULT 0,
  request_json TEXT NOT NULL,
  response_http_status INTEGER NOT NULL,
  response_json TEXT NOT NULL,
  extracted_json TEXT NOT NULL,
  parse_ok INTEGER NOT NULL,
  validation_ok INTEGER NOT NULL,
  error_message TEXT NOT NULL DEFAULT '',
  latency_ms INTEGER NOT NULL,
  created_at_utc TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_llm_calls_run ON llm_calls(run_id, phase);
CREATE INDEX IF NOT EXISTS idx_scan_results_run ON scan_results(run_id, rule_key);

CREATE TABLE IF NOT EXISTS app_state (
  key TEXT PRIMARY KEY,
  value TEXT NOT NULL,
  updated_at_utc TEXT NOT NULL
);
"#;
