use anyhow::{Context, Result};
use clap::Parser;
use earstudy::cli::{Cli, OutputFormat, Preset};
use earstudy::config::StudyConfig;
use earstudy::loader::{discover, load_participant};
use earstudy::pipeline::{fit_pooled_calibration, ParticipantFailure, ParticipantInput, Pipeline};
use regex::Regex;
use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize tracing subscriber for debug output
fn init_tracing(debug: bool) {
    if debug {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::from_default_env().add_directive(tracing::Level::TRACE.into()),
            )
            .with_writer(std::io::stderr)
            .init();
    }
}

/// Config from file or preset, with command-line overrides applied
fn load_config(args: &Cli) -> Result<StudyConfig> {
    let mut config = match (&args.config, args.preset) {
        (Some(path), _) => StudyConfig::from_file(path)?,
        (None, Some(Preset::Temperature)) => StudyConfig::temperature_study(),
        (None, Some(Preset::Stress)) => StudyConfig::stress_study(),
        (None, None) => StudyConfig::default(),
    };

    if let Some(alpha) = args.alpha {
        config.statistics.significance_level = alpha;
    }
    if args.sequential {
        config.parallel = false;
    }
    if args.no_calibration {
        config.calibration.enabled = false;
    }

    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;
    Ok(config)
}

/// Load every participant under `dir`; unreadable participants become failures
fn load_inputs(
    dir: &Path,
    pattern: &Regex,
    config: &StudyConfig,
) -> Result<(Vec<ParticipantInput>, Vec<ParticipantFailure>)> {
    let mut inputs = Vec::new();
    let mut failures = Vec::new();

    for (participant, files) in discover(dir, pattern)? {
        match load_participant(&participant, &files, &config.input) {
            Ok(input) => inputs.push(input),
            Err(e) => {
                tracing::warn!(participant = %participant, "failed to load: {:#}", e);
                failures.push(ParticipantFailure {
                    participant,
                    error: format!("{:#}", e),
                });
            }
        }
    }
    Ok((inputs, failures))
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.debug);

    let config = load_config(&args)?;
    let pattern = config
        .participant_regex()
        .map_err(|e| anyhow::anyhow!("Invalid configuration: {}", e))?;

    let (inputs, load_failures) = load_inputs(&args.data_dir, &pattern, &config)?;
    if inputs.is_empty() && load_failures.is_empty() {
        anyhow::bail!("No participant files found in {}", args.data_dir.display());
    }

    let mut pipeline = Pipeline::new(&config);
    if let Some(dir) = &args.calibration_data {
        let (calibration_inputs, calibration_failures) = load_inputs(dir, &pattern, &config)?;
        if let Some(failure) = calibration_failures.first() {
            anyhow::bail!(
                "Failed to load calibration data for participant {}: {}",
                failure.participant,
                failure.error
            );
        }
        let recordings: Vec<_> = calibration_inputs
            .into_iter()
            .filter_map(|input| input.recording)
            .collect();
        let pooled = fit_pooled_calibration(&config, &recordings)?;
        pipeline = pipeline.with_pooled_calibration(pooled);
    }

    let mut outcome = pipeline.run(&inputs);
    outcome.record_failures(load_failures);

    let rendered = match args.format {
        OutputFormat::Text => outcome.to_report_string(),
        OutputFormat::Json => outcome.to_json()?,
        OutputFormat::Csv => outcome.to_csv()?,
    };

    match &args.output {
        Some(path) => std::fs::write(path, rendered)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => print!("{}", rendered),
    }

    Ok(())
}
