use super::exit_codes;
use super::{load_settings, open_store};
use crate::cli::args::ReportArgs;
use anyhow::Result;
use salesjudge_core::report::{self, DirSink, ReportRequest};
use std::path::{Path, PathBuf};

pub fn cmd_report(config_path: &Path, args: ReportArgs) -> Result<i32> {
    let cfg = load_settings(config_path, args.db.as_deref())?;
    let store = open_store(&cfg)?;

    let built = report::compose(
        &store,
        &ReportRequest {
            run_id: args.run_id,
            against: args.against,
        },
    )?;

    let out_dir = args
        .out_dir
        .unwrap_or_else(|| PathBuf::from(&cfg.report.out_dir));
    let mut sink = DirSink::new(out_dir.clone());
    let written = built.write_to(&mut sink)?;

    eprintln!(
        "Report for {} (canonical {}, metrics_version {}, bad cases {})",
        built.run_id, built.canonical_run_id, built.metrics_version, built.bad_cases
    );
    for name in written {
        println!("{}", sink.path_for(name).display());
    }
    Ok(exit_codes::OK)
}
