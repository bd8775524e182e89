use super::exit_codes;
use super::{load_settings, open_store};
use crate::cli::args::ImportArgs;
use anyhow::Result;
use salesjudge_core::ingest;
use std::path::Path;

pub fn cmd_import(config_path: &Path, args: ImportArgs) -> Result<i32> {
    let cfg = load_settings(config_path, args.db.as_deref())?;
    let store = open_store(&cfg)?;

    let stats = ingest::import_file(&store, &args.file)?;
    eprintln!(
        "Imported {} conversations ({} messages, {} from sellers) from {}",
        stats.conversations,
        stats.messages,
        stats.seller_messages,
        args.file.display()
    );
    if stats.unknown_speakers > 0 {
        eprintln!(
            "warning: {} messages have an unrecognized speaker label and are treated as customer context",
            stats.unknown_speakers
        );
    }
    if stats.skipped_blank_messages > 0 {
        eprintln!("note: skipped {} blank messages", stats.skipped_blank_messages);
    }
    Ok(exit_codes::OK)
}
