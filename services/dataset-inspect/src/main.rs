//! Dataset inspector.
//!
//! Loads a dataset JSON document, optionally binds file payloads from a
//! local directory laid out by key, and prints a summary of its files,
//! metadata and keyspace.

mod report;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use dataset::Dataset;
use datastore_common::{StoreConfig, StoreError, StoreResult};
use storage::LocalDirectoryContext;

use report::DatasetReport;

#[derive(Parser, Debug)]
#[command(name = "dataset-inspect")]
#[command(about = "Summarize a keyed dataset document")]
struct Args {
    /// Dataset JSON document
    dataset: PathBuf,

    /// Directory holding the file payloads (defaults to none)
    #[arg(long, env = "DATASTORE_ROOT_DIR")]
    root: Option<PathBuf>,

    /// Include the generated keyspace
    #[arg(long)]
    keyspace: bool,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,

    /// Log level (defaults to DATASTORE_LOG_LEVEL, then "info")
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    json_logs: bool,
}

fn init_tracing(level: &str, json: bool) -> Result<()> {
    let level = match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if json {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }
    Ok(())
}

fn load_dataset(path: &Path) -> Result<Dataset> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let dataset = dataset::from_json_str(&text)
        .with_context(|| format!("Failed to decode dataset {}", path.display()))?;
    Ok(dataset)
}

/// Environment configuration with the command line overrides applied.
fn resolve_config(args: &Args) -> StoreResult<StoreConfig> {
    let mut config = StoreConfig::from_env();
    if let Some(level) = &args.log_level {
        config.log_level = level.to_lowercase();
    }
    if let Some(root) = &args.root {
        config.root_dir = root.clone();
    }
    config.validate()?;
    Ok(config)
}

/// The store error behind a failure, if there is one.
fn store_error(err: &anyhow::Error) -> Option<&StoreError> {
    err.chain().find_map(|cause| cause.downcast_ref::<StoreError>())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = resolve_config(&args)?;
    init_tracing(&config.log_level, args.json_logs)?;

    if let Err(e) = run(&args, &config) {
        match store_error(&e) {
            Some(cause) => error!(code = cause.code(), error = %e, "Inspection failed"),
            None => error!(error = %e, "Inspection failed"),
        }
        return Err(e);
    }
    Ok(())
}

fn run(args: &Args, config: &StoreConfig) -> Result<()> {
    let dataset = load_dataset(&args.dataset)?;
    info!(
        path = %args.dataset.display(),
        files = dataset.file_count(),
        metadata = dataset.metadata_count(),
        "Loaded dataset"
    );

    if let Some(root) = &args.root {
        let context = LocalDirectoryContext::from_config(config, false)?;
        let attached = dataset.attach_sources(|key, _| context.source_for(key))?;
        info!(root = %root.display(), attached, "Bound file payloads");
    }

    dataset.generate_keyspaces();
    let report = DatasetReport::build(&dataset, args.keyspace);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", report);
    }

    dataset.release()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dataset::{DataFile, DataKey};
    use test_utils::{temp_test_dir, write_test_file};

    #[test]
    fn test_args_parse() {
        let args = Args::try_parse_from([
            "dataset-inspect",
            "tiles.json",
            "--root",
            "/data",
            "--keyspace",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert_eq!(args.dataset, PathBuf::from("tiles.json"));
        assert_eq!(args.root, Some(PathBuf::from("/data")));
        assert!(args.keyspace);
        assert!(!args.json_logs);
    }

    #[test]
    fn test_resolve_config_rejects_unknown_log_level() {
        let args = Args::try_parse_from(["dataset-inspect", "tiles.json", "--log-level", "verbose"])
            .unwrap();
        let err = resolve_config(&args).unwrap_err();
        assert!(matches!(err, StoreError::Config(_)));
        assert_eq!(err.code(), "ConfigurationError");

        let args = Args::try_parse_from([
            "dataset-inspect",
            "tiles.json",
            "--root",
            "/data",
            "--log-level",
            "WARN",
        ])
        .unwrap();
        let config = resolve_config(&args).unwrap();
        assert_eq!(config.log_level, "warn");
        assert_eq!(config.root_dir, PathBuf::from("/data"));
    }

    #[test]
    fn test_store_error_is_found_behind_context() {
        let dir = temp_test_dir();
        let document = write_test_file(dir.path(), "broken.json", br#"{"files":[{"key":{"elements":[]}}]}"#);
        let err = load_dataset(&document).unwrap_err();
        let cause = store_error(&err).unwrap();
        assert_eq!(cause.code(), "SerializationFailure");

        let plain = anyhow::anyhow!("not a store failure");
        assert!(store_error(&plain).is_none());
    }

    #[test]
    fn test_load_and_bind() {
        let dir = temp_test_dir();
        let key = DataKey::from_pairs(&[("NAME", "a")]).unwrap();
        write_test_file(dir.path(), "payload/NAME=a/data.txt", b"hello");

        let source = Dataset::new();
        source
            .add_data_file(key.clone(), DataFile::new("text/plain"))
            .unwrap();
        let document = write_test_file(
            dir.path(),
            "dataset.json",
            dataset::to_json_string(&source).unwrap().as_bytes(),
        );

        let dataset = load_dataset(&document).unwrap();
        let context = LocalDirectoryContext::input(dir.path().join("payload"));
        assert_eq!(dataset.attach_sources(|k, _| context.source_for(k)).unwrap(), 1);

        let report = DatasetReport::build(&dataset, false);
        assert_eq!(report.files[0].size, Some(5));
    }
}
