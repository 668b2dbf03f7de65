//! CLI argument parsing for earstudy

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Output format for study results
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text format (default)
    Text,
    /// JSON format for machine parsing
    Json,
    /// CSV format for spreadsheet analysis
    Csv,
}

/// Built-in study configurations
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    /// Ear temperature sensor study (labelled phases, channel-mean calibration)
    Temperature,
    /// Stress study (marker phases, HRV from RR files)
    Stress,
}

#[derive(Parser, Debug)]
#[command(name = "earstudy")]
#[command(version)]
#[command(about = "Calibrate in-ear sensor recordings and compare study phases", long_about = None)]
pub struct Cli {
    /// Directory with participant recordings (searched recursively)
    #[arg(value_name = "DATA_DIR")]
    pub data_dir: PathBuf,

    /// TOML study configuration
    #[arg(short, long, value_name = "FILE", conflicts_with = "preset")]
    pub config: Option<PathBuf>,

    /// Start from a built-in configuration instead of a file
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Fit one pooled calibration from the recordings in this directory
    #[arg(long = "calibration-data", value_name = "DIR")]
    pub calibration_data: Option<PathBuf>,

    /// Output format
    #[arg(long = "format", value_enum, default_value = "text")]
    pub format: OutputFormat,

    /// Write results to file instead of stdout
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Analyse participants one at a time
    #[arg(long)]
    pub sequential: bool,

    /// Skip calibration and analyse smoothed raw readings
    #[arg(long = "no-calibration")]
    pub no_calibration: bool,

    /// Significance level for phase comparisons (overrides config)
    #[arg(long, value_name = "ALPHA")]
    pub alpha: Option<f64>,

    /// Enable debug tracing output to stderr
    #[arg(long = "debug")]
    pub debug: bool,
}
