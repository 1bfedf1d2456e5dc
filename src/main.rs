use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;

use game_dataset::config::BuilderConfig;
use game_dataset::data::builder::DatasetBuilder;
use game_dataset::data::split::{split_by_id, SplitOptions};
use game_dataset::data::store::Store;

/// Rows shown after a run when debug logging is on.
const PREVIEW_ROWS: usize = 5;

fn main() -> Result<()> {
    env_logger::init();

    // Optional first argument: path to a JSON config. Defaults otherwise.
    let config = match std::env::args_os().nth(1) {
        Some(path) => BuilderConfig::load(&PathBuf::from(path))?,
        None => {
            let config = BuilderConfig::default();
            config.validate()?;
            config
        }
    };

    if let Some(split) = &config.split {
        let options = SplitOptions {
            id_column: split.id_column.clone(),
            chunk_rows: split.chunk_rows,
        };
        split_by_id(&split.input, &config.source_dir, &options)
            .with_context(|| format!("splitting {}", split.input.display()))?;
    }

    let mut store = Store::open_or_create(&config.store_path)
        .with_context(|| format!("opening store {}", config.store_path.display()))?;
    let report = DatasetBuilder::new(&config)
        .ingest_directory(&mut store, &config.source_dir)
        .context("ingesting source files")?;

    println!(
        "{} files ingested, {} skipped, {} rows appended; store now {} rows x {} columns",
        report.files_processed,
        report.files_skipped,
        report.rows_appended,
        store.len(),
        store.columns()
    );
    for failure in &report.failures {
        println!("  FAILED {} ({}): {}", failure.file.display(), failure.kind, failure.message);
    }

    if log::log_enabled!(log::Level::Debug) && !store.is_empty() {
        info!("First rows:\n{}", store.preview(PREVIEW_ROWS)?);
    }

    store.close()?;

    if !report.is_clean() {
        std::process::exit(1);
    }
    Ok(())
}
