//! Top-level application orchestration.
//!
//! `src/main.rs` stays tiny; this module parses arguments, sets up logging,
//! runs the generation pipeline and prints or exports the results.

use std::io;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::cli::{Command, EngineArgs, GenerateArgs, SegmentArgs};
use crate::config::{timeout_from_secs, EngineConfig};
use crate::error::AppError;
use crate::params::{ParamValue, PHIN};
use crate::segments::{SegmentData, SegmentTable};

pub mod pipeline;

/// Entry point for the `wdc` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Generate(args) => {
            init_logging(args.verbose);
            handle_generate(args)
        }
        Command::Segments(args) => {
            init_logging(args.verbose);
            handle_segments(args)
        }
    }
}

/// `RUST_LOG` wins over the verbosity flag.
fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();
}

/// Environment configuration with the CLI overrides applied.
pub fn engine_config(args: &EngineArgs) -> Result<EngineConfig, AppError> {
    let mut config = EngineConfig::from_env()?;
    if let Some(segments) = args.segments {
        config.default_segments = segments;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    if let Some(secs) = args.timeout_secs {
        config.job_timeout = timeout_from_secs(secs);
    }
    if let Some(step) = args.phase_step {
        config.phase_step = step;
    }
    config.validate()?;
    Ok(config)
}

fn handle_generate(args: GenerateArgs) -> Result<(), AppError> {
    let config = engine_config(&args.engine)?;
    debug!(?config, "engine configuration");

    let latency = (args.latency_ms > 0).then(|| Duration::from_millis(args.latency_ms));
    let engine = pipeline::Engine::synthetic(config, latency)?;
    engine.apply_assignments(&args.set)?;

    let observations = match &args.observed {
        Some(path) => {
            let ingested = crate::io::load_observations(path)?;
            for err in &ingested.row_errors {
                warn!(line = err.line, "skipped observation row: {}", err.message);
            }
            info!(
                path = %path.display(),
                rows = ingested.table.len(),
                read = ingested.rows_read,
                "observations loaded"
            );
            Some(ingested.table)
        }
        None => None,
    };

    let curve = engine.curve(args.kind, observations)?;
    let wait = args.wait_secs.and_then(timeout_from_secs);
    let run = pipeline::run_generate(curve, &args.split_at, wait)?;
    let generator = run.curve.generator();

    println!("{}", crate::report::format_run_summary(generator, run.elapsed));
    println!("{}", crate::report::format_segments(&generator.segments()));
    println!(
        "{}",
        crate::report::format_table_preview(&generator.table(), args.rows)
    );
    if args.observed.is_some() {
        println!("{}", crate::report::format_residuals(&run.residuals));
    }

    if let Some(path) = &args.export {
        crate::io::write_table_csv(path, &generator.table())?;
        info!(path = %path.display(), "table exported");
    }
    if let Some(path) = &args.export_curve {
        crate::io::write_curve_json(path, &crate::io::CurveFile::snapshot(generator))?;
        info!(path = %path.display(), "curve exported");
    }

    if run.completed() {
        Ok(())
    } else {
        Err(AppError::new(
            4,
            format!("Generation ended in state {}", generator.state()),
        ))
    }
}

fn handle_segments(args: SegmentArgs) -> Result<(), AppError> {
    let config = engine_config(&EngineArgs {
        segments: Some(args.segments),
        ..EngineArgs::default()
    })?;
    let data = SegmentData::from([(PHIN.to_string(), ParamValue::Float(config.phase_step))]);
    let mut segments = SegmentTable::uniform(config.default_segments, data)?;

    for &pos in &args.split_at {
        let index = segments.split_at(pos)?;
        debug!(pos, index, "segment split");
    }
    for &index in &args.delete {
        segments.delete(index)?;
        debug!(index, "segment deleted");
    }
    if args.prune {
        let removed = segments.delete_empty();
        info!(removed, "empty segments removed");
    }

    println!("{}", crate::report::format_segments(&segments));
    Ok(())
}
