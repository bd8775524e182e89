use super::args::*;
use salesjudge_core::config::{self, ScanConfig};
use salesjudge_core::Store;
use std::path::{Path, PathBuf};

pub mod import;
pub mod report;
pub mod scan;

pub mod exit_codes {
    use salesjudge_core::errors::{try_classify, ErrorClass};

    pub const OK: i32 = 0;
    pub const SCAN_FAILED: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;

    /// Bad input (config, range, unknown run) vs. a scan that started and failed.
    pub fn for_error(err: &anyhow::Error) -> i32 {
        match try_classify(err) {
            ErrorClass::Config | ErrorClass::Selection => CONFIG_ERROR,
            _ => SCAN_FAILED,
        }
    }
}

pub async fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    match cli.cmd {
        Command::Init(args) => cmd_init(&cli.config, args),
        Command::Import(args) => import::cmd_import(&cli.config, args),
        Command::Scan(args) => scan::cmd_scan(&cli.config, args).await,
        Command::Report(args) => report::cmd_report(&cli.config, args),
        Command::Runs(args) => cmd_runs(&cli.config, args),
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            Ok(exit_codes::OK)
        }
    }
}

fn cmd_init(config_path: &Path, args: InitArgs) -> anyhow::Result<i32> {
    if config_path.exists() {
        eprintln!("note: {} already exists (skipped)", config_path.display());
    } else {
        config::write_sample_config(config_path)?;
        eprintln!("created {}", config_path.display());
    }

    if let Some(path) = &args.demo_transcripts {
        write_file_if_missing(path, crate::templates::DEMO_TRANSCRIPTS_YAML)?;
    }
    if args.gitignore {
        write_file_if_missing(Path::new(".gitignore"), crate::templates::GITIGNORE)?;
    }
    Ok(exit_codes::OK)
}

fn write_file_if_missing(path: &Path, content: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    if !path.exists() {
        std::fs::write(path, content)?;
        eprintln!("created {}", path.display());
    } else {
        eprintln!("note: {} already exists (skipped)", path.display());
    }
    Ok(())
}

fn cmd_runs(config_path: &Path, args: RunsArgs) -> anyhow::Result<i32> {
    let cfg = load_settings(config_path, args.db.as_deref())?;
    let store = open_store(&cfg)?;
    salesjudge_core::report::console::print_runs(&store.list_runs(args.limit)?);
    Ok(exit_codes::OK)
}

/// Config file (or defaults), then environment, then `--db`.
pub(crate) fn load_settings(config_path: &Path, db: Option<&Path>) -> anyhow::Result<ScanConfig> {
    let mut cfg = config::load_or_default(config_path)?;
    cfg.apply_env();
    if let Some(db) = db {
        cfg.db = db.to_string_lossy().to_string();
    }
    tracing::debug!(
        event = "cli.settings",
        config = %config_path.display(),
        db = %cfg.db,
        model = %cfg.model,
        provider = cfg.provider.as_str(),
        "settings resolved"
    );
    Ok(cfg)
}

pub(crate) fn open_store(cfg: &ScanConfig) -> anyhow::Result<Store> {
    let store = Store::open(&PathBuf::from(&cfg.db))?;
    store.init_schema()?;
    Ok(store)
}
