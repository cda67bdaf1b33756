//! Command-line parsing for the segmented curve generator.
//!
//! Argument parsing and command dispatch stay separate from the engine.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::curves::CurveKind;

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "wdc", version, about = "Segmented concurrent curve synthesis")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Generate a synthetic curve over the segmented phase domain.
    Generate(GenerateArgs),
    /// Show the phase partition after applying splits and deletions.
    Segments(SegmentArgs),
}

/// Engine settings; each overrides the environment configuration.
#[derive(Debug, Parser, Clone, Default)]
pub struct EngineArgs {
    /// Initial number of equal segments (1..=20).
    #[arg(long)]
    pub segments: Option<usize>,

    /// Worker threads (0 = one per core).
    #[arg(long)]
    pub workers: Option<usize>,

    /// Per-job timeout in seconds (<= 0 disables it).
    #[arg(long = "timeout")]
    pub timeout_secs: Option<f64>,

    /// Default phase step of new segments.
    #[arg(long = "phin")]
    pub phase_step: Option<f64>,
}

#[derive(Debug, Parser, Clone)]
pub struct GenerateArgs {
    /// Which curve to synthesize.
    #[arg(short = 'k', long, value_enum, default_value_t = CurveKind::Light)]
    pub kind: CurveKind,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Give up waiting after this many seconds (the batch is canceled).
    #[arg(long = "wait")]
    pub wait_secs: Option<f64>,

    /// Artificial solver run time per segment, in milliseconds.
    #[arg(long, default_value_t = 0)]
    pub latency_ms: u64,

    /// Split the segment containing this phase (repeatable).
    #[arg(long = "split-at", value_name = "PHASE")]
    pub split_at: Vec<f64>,

    /// Override a bundle parameter (repeatable), e.g. `--set XINCL=80`.
    #[arg(long = "set", value_name = "NAME=VALUE")]
    pub set: Vec<String>,

    /// Observation CSV to compare against.
    #[arg(long)]
    pub observed: Option<PathBuf>,

    /// Export the synthesized table to CSV.
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export the synthesized curve with its segmentation to JSON.
    #[arg(long = "export-curve")]
    pub export_curve: Option<PathBuf>,

    /// Rows shown in the table preview.
    #[arg(long, default_value_t = 10)]
    pub rows: usize,

    /// Debug logging.
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Debug, Parser, Clone)]
pub struct SegmentArgs {
    /// Initial number of equal segments.
    #[arg(long, default_value_t = 4)]
    pub segments: usize,

    /// Split the segment containing this phase (repeatable).
    #[arg(long = "split-at", value_name = "PHASE")]
    pub split_at: Vec<f64>,

    /// Delete the segment with this index, applied after the splits (repeatable).
    #[arg(long)]
    pub delete: Vec<usize>,

    /// Drop zero-length segments at the end.
    #[arg(long)]
    pub prune: bool,

    #[arg(short, long)]
    pub verbose: bool,
}
