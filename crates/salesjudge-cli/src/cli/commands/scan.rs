use super::exit_codes;
use super::{load_settings, open_store};
use crate::cli::args::ScanArgs;
use anyhow::Result;
use salesjudge_core::config::ProviderKind;
use salesjudge_core::errors::ConfigError;
use salesjudge_core::report::console::print_scan_summary;
use salesjudge_core::{FailurePolicy, ScanRunner};
use std::path::Path;

pub async fn cmd_scan(config_path: &Path, args: ScanArgs) -> Result<i32> {
    let mut cfg = load_settings(config_path, args.db.as_deref())?;
    if let Some(model) = args.model {
        cfg.model = model;
    }
    if let Some(provider) = &args.provider {
        cfg.provider = ProviderKind::parse(provider)?;
    }
    if let Some(policy) = &args.failure_policy {
        cfg.failure_policy = FailurePolicy::parse(policy).ok_or_else(|| {
            ConfigError(format!(
                "unknown failure policy '{}' (expected fail_fast or retry_then_skip)",
                policy
            ))
        })?;
    }
    let from = args.from.unwrap_or(cfg.conversation_from);
    let to = args.to.unwrap_or(cfg.conversation_to);

    let client = cfg.build_client()?;
    let store = open_store(&cfg)?;
    let runner = ScanRunner::new(store, client).with_failure_policy(cfg.failure_policy);

    let outcome = runner.run(from, to).await?;
    print_scan_summary(&outcome);
    println!("{}", outcome.run_id);
    Ok(exit_codes::OK)
}
