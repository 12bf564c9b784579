// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use clap::{ArgAction, Args, Parser, Subcommand, ValueHint};
use serde_json::{json, Map, Value};
use spiral_config::determinism;
use spiral_config::tracing::{flush_tracing, init_tracing, TracingOptions};
use spiral_config::{ConfigLayering, LayeredConfig};
use st_seismic::synthetic::SyntheticKind;
use st_seismic::{
    parse_patch, parse_permutation, parse_range, parse_variants, write_raw_volume,
    CurvatureParams, NormalizationMode, PatchSize, Pipeline, PipelineConfig, RawVolumeSource,
    RawVolumeWriter, RunReport, TraceSource, Volume, ZWindow,
};
use std::error::Error;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

type DynError = Box<dyn Error>;

type Result<T> = std::result::Result<T, DynError>;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Coherence and curvature attributes for 3D seismic volumes"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace). RUST_LOG wins when set
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Write a Chrome trace of the run to this file
    #[arg(long, global = true, value_hint = ValueHint::FilePath)]
    trace_chrome: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the attribute pipeline over a raw volume
    Run(RunArgs),

    /// Write a synthetic survey in the raw container format
    Synth(SynthArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Header (`<stem>.json`) of the input volume; samples are read from `<stem>.bin`
    #[arg(long, value_hint = ValueHint::FilePath)]
    input: PathBuf,

    /// Directory receiving one `<attribute>.json`/`.bin` pair per output
    #[arg(long, value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Inline range `start:end` (end exclusive)
    #[arg(long)]
    iline: Option<String>,

    /// Crossline range `start:end`
    #[arg(long)]
    xline: Option<String>,

    /// Depth sample range `start:end`
    #[arg(long)]
    z: Option<String>,

    /// Axis permutation applied after cropping, e.g. `2,0,1`
    #[arg(long)]
    swap_axes: Option<String>,

    /// Normalisation mode: none, trace, z or both
    #[arg(long)]
    norm: Option<String>,

    /// Depth window of the z normalisation; even sizes are rounded up
    #[arg(long)]
    z_window: Option<usize>,

    /// Coherence window `py,px,pz`; even sizes are rounded up
    #[arg(long)]
    patch: Option<String>,

    /// Attributes to compute: coherence, curvature or both (comma separated)
    #[arg(long)]
    attributes: Option<String>,

    /// Curvature outputs, e.g. `most-positive,most-negative,mean,gaussian`
    #[arg(long)]
    curvature: Option<String>,

    /// Largest bulk read in bytes before falling back to per-trace reads
    #[arg(long)]
    memory_budget: Option<usize>,

    /// Traces read per batch on the per-trace path
    #[arg(long)]
    trace_batch: Option<usize>,

    /// TOML run configuration; its `[pipeline]` table is overridden by flags
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: Option<PathBuf>,

    /// Destination of the run report (defaults to `<output>/report.json`)
    #[arg(long, value_hint = ValueHint::FilePath)]
    report: Option<PathBuf>,

    /// Print per-attribute statistics to STDOUT after the run
    #[arg(long)]
    print_stats: bool,
}

#[derive(Args)]
struct SynthArgs {
    /// Directory receiving `<name>.json` and `<name>.bin`
    #[arg(long, value_hint = ValueHint::DirPath)]
    output: PathBuf,

    /// Survey shape `inlines,crosslines,samples`
    #[arg(long, default_value = "10,10,20")]
    shape: String,

    /// Survey family: dip, ramp, noise or flat
    #[arg(long, default_value = "dip")]
    kind: String,

    /// Seed for the noise family
    #[arg(long)]
    seed: Option<u64>,

    /// File stem of the written volume
    #[arg(long, default_value = "input")]
    name: String,
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        flush_tracing();
        std::process::exit(1);
    }
    flush_tracing();
}

fn try_main() -> Result<()> {
    let cli = Cli::parse();
    let options = TracingOptions {
        verbosity: cli.verbose,
        chrome_trace: cli.trace_chrome.clone(),
    };
    init_tracing(&options)?;
    if determinism::install_thread_pool(determinism::config()) {
        debug!("sized the worker pool from SPIRAL_THREADS");
    }

    match &cli.command {
        Command::Run(args) => run_pipeline(args),
        Command::Synth(args) => run_synth(args),
    }
}

/// Which attributes `--attributes` asked for.
#[derive(Clone, Copy, Debug, Default)]
struct Selection {
    coherence: bool,
    curvature: bool,
}

fn parse_attributes(text: &str) -> Result<Selection> {
    let mut selection = Selection::default();
    for item in text.split(',').map(str::trim).filter(|item| !item.is_empty()) {
        match item.to_ascii_lowercase().as_str() {
            "coherence" | "semblance" => selection.coherence = true,
            "curvature" => selection.curvature = true,
            "all" | "both" => {
                selection.coherence = true;
                selection.curvature = true;
            }
            other => {
                return Err(invalid_input(format!(
                    "unknown attribute `{other}`: expected coherence, curvature or both"
                )));
            }
        }
    }
    if !selection.coherence && !selection.curvature {
        return Err(invalid_input("--attributes selects nothing"));
    }
    Ok(selection)
}

/// Validates every textual flag and turns the ones that were given into a
/// `{"pipeline": ...}` override layer. Nothing is read from disk here.
fn cli_overrides(args: &RunArgs) -> Result<(Value, Option<Selection>)> {
    let mut request = Map::new();
    for (key, text) in [("inline", &args.iline), ("crossline", &args.xline), ("depth", &args.z)] {
        if let Some(text) = text {
            request.insert(key.into(), json!(String::from(parse_range(text)?)));
        }
    }
    if let Some(text) = &args.swap_axes {
        request.insert("permutation".into(), json!(String::from(parse_permutation(text)?)));
    }

    let mut normalize = Map::new();
    if let Some(text) = &args.norm {
        let mode: NormalizationMode = text.parse()?;
        normalize.insert("mode".into(), json!(mode.as_str()));
    }
    if let Some(size) = args.z_window {
        ZWindow::new(size)?;
        normalize.insert("z_window".into(), json!(size));
    }

    let mut loader = Map::new();
    if let Some(bytes) = args.memory_budget {
        loader.insert("memory_budget_bytes".into(), json!(bytes));
    }
    if let Some(batch) = args.trace_batch {
        loader.insert("trace_batch".into(), json!(batch));
    }

    let mut pipeline = Map::new();
    if let Some(text) = &args.patch {
        parse_patch(text)?;
        pipeline.insert("coherence".into(), json!(text));
    }
    if let Some(text) = &args.curvature {
        let variants: Vec<&str> = parse_variants(text)?.iter().map(|v| v.as_str()).collect();
        pipeline.insert("curvature".into(), json!({ "variants": variants }));
    }
    for (key, section) in [("request", request), ("normalize", normalize), ("loader", loader)] {
        if !section.is_empty() {
            pipeline.insert(key.into(), Value::Object(section));
        }
    }

    let selection = args.attributes.as_deref().map(parse_attributes).transpose()?;
    if let Some(selection) = selection {
        if args.curvature.is_some() && !selection.curvature {
            return Err(invalid_input(
                "--curvature needs the curvature attribute in --attributes",
            ));
        }
        if args.patch.is_some() && !selection.coherence {
            return Err(invalid_input(
                "--patch needs the coherence attribute in --attributes",
            ));
        }
    }
    Ok((json!({ "pipeline": pipeline }), selection))
}

fn resolve_config(args: &RunArgs) -> Result<PipelineConfig> {
    let (overrides, selection) = cli_overrides(args)?;

    let mut layering = ConfigLayering::discover();
    if let Some(path) = &args.config {
        layering = layering.with_base(path);
    }
    let mut layered = LayeredConfig::load(layering)?;
    layered.apply_overrides(&overrides);
    for event in layered.events() {
        debug!(layer = ?event.layer, path = %event.path, current = ?event.current, "config value");
    }
    let mut config: PipelineConfig = layered.section(&["pipeline"])?.unwrap_or_default();

    match selection {
        Some(selection) => {
            config.coherence = if selection.coherence {
                Some(config.coherence.unwrap_or_default())
            } else {
                None
            };
            config.curvature = if selection.curvature {
                Some(config.curvature.take().unwrap_or_default())
            } else {
                None
            };
        }
        None if config.coherence.is_none() && config.curvature.is_none() => {
            config.coherence = Some(PatchSize::default());
            config.curvature = Some(CurvatureParams::default());
        }
        None => {}
    }
    Ok(config)
}

fn run_pipeline(args: &RunArgs) -> Result<()> {
    let pipeline = Pipeline::new(resolve_config(args)?)?;

    let source = RawVolumeSource::open(&args.input)?;
    let mut writer = RawVolumeWriter::new(&args.output)?;
    let report = pipeline.run(&source, &mut writer)?;

    let report_path = args
        .report
        .clone()
        .unwrap_or_else(|| args.output.join("report.json"));
    write_report(&report, &report_path)?;
    info!(report = %report_path.display(), "run complete");

    if args.print_stats {
        print_statistics(&report);
    }
    Ok(())
}

fn print_statistics(report: &RunReport) {
    for output in &report.outputs {
        let stats = &output.stats;
        println!(
            "[{attribute}] min: {min:.6}, max: {max:.6}, mean: {mean:.6}, std: {std:.6}",
            attribute = output.attribute,
            min = stats.min,
            max = stats.max,
            mean = stats.mean,
            std = stats.std
        );
    }
}

fn parse_shape(text: &str) -> Result<[usize; 3]> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let invalid = || {
        invalid_input(format!(
            "invalid shape `{text}`: expected three positive integers"
        ))
    };
    if parts.len() != 3 {
        return Err(invalid());
    }
    let mut shape = [0usize; 3];
    for (slot, part) in shape.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|_| invalid())?;
        if *slot == 0 {
            return Err(invalid());
        }
    }
    Ok(shape)
}

fn run_synth(args: &SynthArgs) -> Result<()> {
    let shape = parse_shape(&args.shape)?;
    let kind: SyntheticKind = args.kind.parse()?;
    let source = kind.generate(shape, args.seed);

    fs::create_dir_all(&args.output)?;
    let header_path = args.output.join(format!("{}.json", args.name));
    write_raw_volume(
        &header_path,
        &Volume::from_array(source.data().clone()),
        source.sample_interval(),
        None,
    )?;
    info!(kind = %kind, ?shape, path = %header_path.display(), "synthetic survey written");
    println!("{}", header_path.display());
    Ok(())
}

fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    fs::write(path, report.to_json_pretty()?)?;
    Ok(())
}

fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

fn invalid_input(message: impl Into<String>) -> DynError {
    Box::new(io::Error::new(ErrorKind::InvalidInput, message.into()))
}
