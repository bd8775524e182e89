use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "salesjudge",
    version,
    about = "Evaluator-judge quality scans for sales conversations"
)]
pub struct Cli {
    /// config file; defaults apply when it does not exist
    #[arg(long, global = true, default_value = "salesjudge.yaml")]
    pub config: PathBuf,

    /// tracing filter, e.g. `info` or `salesjudge_core=debug`
    #[arg(long, global = true, env = "SALESJUDGE_LOG", default_value = "warn")]
    pub log_level: String,

    /// emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// write a sample config (never overwrites)
    Init(InitArgs),
    /// load transcripts (YAML or JSON) into the database
    Import(ImportArgs),
    /// evaluate and judge a conversation range
    Scan(ScanArgs),
    /// write metrics.md and the accuracy heat-grid for a run
    Report(ReportArgs),
    /// list recent scan runs
    Runs(RunsArgs),
    Version,
}

#[derive(Parser, Clone)]
pub struct InitArgs {
    /// also write demo transcripts to this path
    #[arg(long)]
    pub demo_transcripts: Option<PathBuf>,

    /// generate .gitignore for artifacts/db
    #[arg(long)]
    pub gitignore: bool,
}

#[derive(Parser, Clone)]
pub struct ImportArgs {
    #[arg(long)]
    pub file: PathBuf,
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct ScanArgs {
    /// first conversation index (inclusive, ordered by id)
    #[arg(long)]
    pub from: Option<i64>,
    /// last conversation index (inclusive)
    #[arg(long)]
    pub to: Option<i64>,
    #[arg(long)]
    pub model: Option<String>,
    /// openai|heuristic
    #[arg(long)]
    pub provider: Option<String>,
    /// fail_fast|retry_then_skip
    #[arg(long)]
    pub failure_policy: Option<String>,
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct ReportArgs {
    /// defaults to the latest successful run
    #[arg(long)]
    pub run_id: Option<String>,
    /// compare against this run instead of the canonical one
    #[arg(long)]
    pub against: Option<String>,
    #[arg(long)]
    pub out_dir: Option<PathBuf>,
    #[arg(long)]
    pub db: Option<PathBuf>,
}

#[derive(Parser, Clone)]
pub struct RunsArgs {
    #[arg(long, default_value_t = 20)]
    pub limit: usize,
    #[arg(long)]
    pub db: Option<PathBuf>,
}
