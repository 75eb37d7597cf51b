//! Amplifier piston analysis command line.
//!
//! Usage:
//! ```text
//! amp_piston synth --output ./data --visit 1252 --sensors 4
//! amp_piston scan --visit 1252 --data-dir ./data --output-dir ./ampscan
//! amp_piston render --visit 1252 --data-dir ./data --output-dir ./ampscan
//! amp_piston export --visit 1252 --output-dir ./ampscan > v0001252.csv
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};

use amp_piston::ccd::SensorPreset;
use amp_piston::ccd::sensor::Exposure;
use amp_piston::correlate::{
    self, FluxRatioParams, GainParams, OverscanDeltaParams, amp_gain, flux_ratio,
};
use amp_piston::display::{Colormap, PanelParams};
use amp_piston::pedestal::{BoundaryConvention, NanPolicy};
use amp_piston::pipeline::{self, AnalysisConfig};
use amp_piston::source::{DataSource, DirectorySource, ExposureKind, SyntheticSource};
use amp_piston::table::VisitTable;

#[derive(Parser)]
#[command(name = "amp_piston")]
#[command(about = "Amplifier-to-amplifier pedestal analysis for four-amp CCDs")]
#[command(version)]
struct Cli {
    /// JSON file with analysis settings; command-line flags override it
    #[arg(long, global = true, value_name = "JSON")]
    config: Option<PathBuf>,

    /// Directory holding geometry and exposures
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Directory for tables and figures
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    /// More logging (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Less logging (repeatable)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    quiet: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Measure boundary statistics and pedestals, one table per visit
    Scan(ScanArgs),
    /// Draw piston figures from previously written tables
    Render(RenderArgs),
    /// Print written tables as CSV, one row per amplifier
    Export(ExportArgs),
    /// Photon-transfer gain per amplifier
    Gain(GainArgs),
    /// Time-scaled flux ratio between a short and a long exposure
    FluxRatio(FluxRatioArgs),
    /// Overscan first-minus-last difference against boundary flux
    OverscanDelta(OverscanDeltaArgs),
    /// Write a synthetic data directory
    Synth(SynthArgs),
}

#[derive(Args)]
struct ScanArgs {
    /// Visit to scan (repeatable; default all)
    #[arg(long = "visit")]
    visits: Vec<u32>,

    #[arg(long)]
    strip_size: Option<usize>,

    #[arg(long)]
    inset: Option<usize>,

    #[arg(long)]
    sigma: Option<f64>,

    #[arg(long)]
    max_iterations: Option<usize>,

    /// Apply the raw mask to prescan/overscan regions
    #[arg(long)]
    mask_scan_regions: bool,

    /// hold-previous or propagate
    #[arg(long)]
    nan_policy: Option<NanPolicy>,

    /// Scan sensors one at a time
    #[arg(long)]
    serial: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Convention {
    /// Whole imaging-area medians
    All,
    /// Medians of the strips facing each boundary
    Edge,
}

impl From<Convention> for BoundaryConvention {
    fn from(c: Convention) -> Self {
        match c {
            Convention::All => BoundaryConvention::AllRegion,
            Convention::Edge => BoundaryConvention::ScanEdge,
        }
    }
}

#[derive(Args)]
struct RenderArgs {
    /// Visit to render (repeatable; default all)
    #[arg(long = "visit")]
    visits: Vec<u32>,

    #[arg(long, value_enum, default_value = "all")]
    convention: Convention,

    /// Central percentage of pixels mapped onto the stretch
    #[arg(long, default_value_t = 75.0)]
    scale: f64,

    /// Piston map colours: rdylbu, rdylbu<N>, sls or grey
    #[arg(long, default_value = "rdylbu")]
    colormap: Colormap,

    /// Each displayed pixel averages a block*block square per axis
    #[arg(long, default_value_t = 4)]
    block: usize,

    /// Gaussian blur FWHM in displayed pixels (0 disables)
    #[arg(long, default_value_t = 0.0)]
    smooth_fwhm: f64,
}

#[derive(Args)]
struct ExportArgs {
    /// Visit to export (repeatable; default all)
    #[arg(long = "visit")]
    visits: Vec<u32>,
}

#[derive(Args)]
struct GainArgs {
    #[arg(long)]
    visit: u32,

    /// Sensor to measure (repeatable; default all)
    #[arg(long = "sensor")]
    sensors: Vec<u32>,

    /// Signal bin width (ADU)
    #[arg(long, default_value_t = 50.0)]
    bin_width: f64,
}

#[derive(Args)]
struct FluxRatioArgs {
    /// Short exposure
    #[arg(long)]
    lo_visit: u32,

    /// Long exposure
    #[arg(long)]
    hi_visit: u32,

    #[arg(long)]
    sensor: u32,

    /// Column shift of the long exposure
    #[arg(long, default_value_t = 0)]
    dx: usize,

    /// Row shift of the long exposure
    #[arg(long, default_value_t = 0)]
    dy: usize,

    /// Rows trimmed from each side for the background estimate
    #[arg(long, default_value_t = 1000)]
    margin_rows: usize,

    /// Columns trimmed from each side for the background estimate
    #[arg(long, default_value_t = 500)]
    margin_cols: usize,
}

#[derive(Args)]
struct OverscanDeltaArgs {
    #[arg(long)]
    sensor: u32,

    /// Visit to pool (repeatable; default all)
    #[arg(long = "visit")]
    visits: Vec<u32>,

    /// Amplifier (1-4) whose boundary column supplies the flux
    #[arg(long)]
    flux_amp: usize,

    /// Amplifier (1-4) whose overscan difference is measured
    #[arg(long)]
    overscan_amp: usize,

    /// Data column counted in from the overscan edge
    #[arg(long, default_value_t = 0)]
    offset: usize,

    #[arg(long, default_value_t = 50)]
    min_count: usize,
}

#[derive(Args)]
struct SynthArgs {
    #[arg(long, default_value = "compact")]
    preset: SensorPreset,

    /// Visit to generate (repeatable)
    #[arg(long = "visit", required = true)]
    visits: Vec<u32>,

    /// Number of sensors, numbered from 0
    #[arg(long, default_value_t = 4)]
    sensors: u32,

    /// Processed level of each amplifier (ADU)
    #[arg(
        long,
        num_args = 4,
        value_delimiter = ',',
        default_values_t = [100.0, 105.0, 103.0, 108.0]
    )]
    levels: Vec<f64>,

    #[arg(long, default_value_t = 0.0)]
    read_noise: f64,

    /// Electrons per ADU; enables shot noise and a variance plane
    #[arg(long, default_value_t = 0.0)]
    gain: f64,

    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Sensor to leave without data (repeatable)
    #[arg(long = "missing")]
    missing: Vec<u32>,

    /// BAD-flagged hot pixels per amplifier
    #[arg(long, default_value_t = 0)]
    hot_pixels: usize,

    /// Exposure time override as VISIT=SECONDS (repeatable)
    #[arg(long = "exptime", value_parser = parse_exptime)]
    exptimes: Vec<(u32, f64)>,
}

fn parse_exptime(s: &str) -> std::result::Result<(u32, f64), String> {
    let (visit, secs) = s
        .split_once('=')
        .ok_or_else(|| format!("expected VISIT=SECONDS, got '{s}'"))?;
    let visit = visit.trim().parse().map_err(|e| format!("bad visit: {e}"))?;
    let secs = secs.trim().parse().map_err(|e| format!("bad exposure time: {e}"))?;
    Ok((visit, secs))
}

fn init_logging(verbose: u8, quiet: u8) {
    let level = match i16::from(verbose) - i16::from(quiet) {
        i16::MIN..=-2 => "error",
        -1 => "warn",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_config(cli: &Cli) -> Result<AnalysisConfig> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_json_file(path)
            .with_context(|| format!("reading config {}", path.display()))?,
        None => AnalysisConfig::default(),
    };
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(dir) = &cli.output_dir {
        config.output_dir = dir.clone();
    }
    Ok(config)
}

fn visits_or_all(source: &dyn DataSource, visits: &[u32]) -> Result<Vec<u32>> {
    if visits.is_empty() {
        Ok(source.visits()?)
    } else {
        Ok(visits.to_vec())
    }
}

fn scan(mut config: AnalysisConfig, args: ScanArgs) -> Result<()> {
    if !args.visits.is_empty() {
        config.visits = args.visits;
    }
    if let Some(v) = args.strip_size {
        config.strip_size = v;
    }
    if let Some(v) = args.inset {
        config.inset = v;
    }
    if let Some(v) = args.sigma {
        config.sigma = v;
    }
    if let Some(v) = args.max_iterations {
        config.max_iterations = v;
    }
    if args.mask_scan_regions {
        config.mask.mask_scan_regions = true;
    }
    if let Some(v) = args.nan_policy {
        config.nan_policy = v;
    }
    if args.serial {
        config.parallel = false;
    }
    config.validate()?;

    let source = DirectorySource::new(&config.data_dir);
    let written = pipeline::run(&source, &config).context("scan failed")?;
    for path in &written {
        println!("{}", path.display());
    }
    Ok(())
}

fn render(config: AnalysisConfig, args: RenderArgs) -> Result<()> {
    let source = DirectorySource::new(&config.data_dir);
    let params = PanelParams {
        scale: args.scale,
        block: args.block,
        smooth_fwhm: args.smooth_fwhm,
        colormap: args.colormap,
        ..Default::default()
    };
    for visit in visits_or_all(&source, &args.visits)? {
        let path = VisitTable::path_for(&config.output_dir, visit);
        let table = VisitTable::read(&path)
            .with_context(|| format!("reading table {}", path.display()))?;
        pipeline::render_visit(
            &source,
            &table,
            args.convention.into(),
            &params,
            &config.output_dir,
        )?;
    }
    Ok(())
}

fn export(config: AnalysisConfig, args: ExportArgs) -> Result<()> {
    let source = DirectorySource::new(&config.data_dir);
    for (i, visit) in visits_or_all(&source, &args.visits)?.into_iter().enumerate() {
        let path = VisitTable::path_for(&config.output_dir, visit);
        let table = VisitTable::read(&path)
            .with_context(|| format!("reading table {}", path.display()))?;
        let csv = table.to_csv();
        // one header for the whole export
        let body = if i == 0 {
            csv.as_str()
        } else {
            csv.split_once('\n').map_or("", |(_, rows)| rows)
        };
        print!("{body}");
    }
    Ok(())
}

fn gain(config: AnalysisConfig, args: GainArgs) -> Result<()> {
    let source = DirectorySource::new(&config.data_dir);
    let sensors = if args.sensors.is_empty() {
        source.sensors(args.visit)?
    } else {
        args.sensors
    };
    let params = GainParams {
        mask_bits: config.mask.bits,
        bin_width: args.bin_width,
        ..Default::default()
    };
    println!("sensor amp gain");
    let mut measured = Vec::new();
    for sensor in sensors {
        let geometry = source.geometry(sensor)?;
        let exposure = match source.exposure(ExposureKind::Processed, args.visit, sensor) {
            Ok(e) => e,
            Err(e) if e.is_data_gap() => {
                log::warn!("c{sensor:03}: {e}");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        for (i, amp) in geometry.amps.iter().enumerate() {
            match amp_gain(&exposure, amp, &params)? {
                Some(g) => {
                    println!("{sensor:6} {:3} {g:.4}", i + 1);
                    measured.push(g);
                }
                None => println!("{sensor:6} {:3} nan", i + 1),
            }
        }
    }
    let summary = config.clip().apply(&measured);
    println!(
        "clipped mean {:.4}, median {:.4}, std {:.4} over {} amps",
        summary.mean, summary.median, summary.std, summary.n_used
    );
    Ok(())
}

fn flux_ratio_cmd(config: AnalysisConfig, args: FluxRatioArgs) -> Result<()> {
    let source = DirectorySource::new(&config.data_dir);
    let load = |visit: u32| -> Result<(Exposure, f64)> {
        let exposure = source
            .exposure(ExposureKind::Processed, visit, args.sensor)
            .with_context(|| format!("loading v{visit:07} c{:03}", args.sensor))?;
        let exptime = source.metadata(ExposureKind::Processed, "exptime", visit)?;
        Ok((exposure, exptime))
    };
    let (lo, lo_time) = load(args.lo_visit)?;
    let (hi, hi_time) = load(args.hi_visit)?;
    if lo_time > hi_time {
        bail!(
            "v{:07} ({lo_time}s) is longer than v{:07} ({hi_time}s)",
            args.lo_visit,
            args.hi_visit
        );
    }
    let params = FluxRatioParams {
        background_margin: (args.margin_rows, args.margin_cols),
        clip: config.clip(),
        ..Default::default()
    };
    let out = flux_ratio(&lo, &hi, lo_time, hi_time, (args.dx, args.dy), &params)?;
    println!(
        "time ratio {:.4}, backgrounds {:.2} / {:.2}, {} pixels",
        out.time_ratio,
        out.lo_background,
        out.hi_background,
        out.ratios.len()
    );
    println!("log10(counts) ratio n");
    for bin in &out.bins {
        println!("{:.2} {:.4} {}", (bin.lo + bin.hi) / 2.0, bin.y_median, bin.count);
    }
    Ok(())
}

fn overscan_delta_cmd(config: AnalysisConfig, args: OverscanDeltaArgs) -> Result<()> {
    if !(1..=4).contains(&args.flux_amp) || !(1..=4).contains(&args.overscan_amp) {
        bail!("amplifiers are numbered 1 to 4");
    }
    let source = DirectorySource::new(&config.data_dir);
    let geometry = source.geometry(args.sensor)?;
    let mut exposures = Vec::new();
    for visit in visits_or_all(&source, &args.visits)? {
        match source.exposure(ExposureKind::Raw, visit, args.sensor) {
            Ok(e) => exposures.push(e),
            // visits without this sensor are skipped
            Err(e) if e.is_data_gap() => log::debug!("v{visit:07}: {e}"),
            Err(e) => return Err(e.into()),
        }
    }
    let params = OverscanDeltaParams {
        min_count: args.min_count,
        ..Default::default()
    };
    let bins = correlate::overscan_delta(
        &exposures,
        &geometry,
        args.flux_amp - 1,
        args.overscan_amp - 1,
        args.offset,
        &params,
    )?;
    println!("flux delta n");
    for bin in &bins {
        println!("{:.1} {:.3} {}", bin.x_median, bin.y_median, bin.count);
    }
    Ok(())
}

fn synth(config: AnalysisConfig, args: SynthArgs) -> Result<()> {
    let mut source = SyntheticSource::new(args.preset, args.visits, (0..args.sensors).collect());
    source.readout.amp_levels = [args.levels[0], args.levels[1], args.levels[2], args.levels[3]];
    source.readout.read_noise = args.read_noise;
    source.readout.gain = args.gain;
    source.seed = args.seed;
    source.missing = args.missing.into_iter().collect::<BTreeSet<_>>();
    source.hot_pixels = args.hot_pixels;
    source.exptimes = args.exptimes.into_iter().collect::<BTreeMap<_, _>>();

    let store = DirectorySource::new(&config.data_dir);
    let written = store
        .copy_from(&source)
        .with_context(|| format!("writing {}", config.data_dir.display()))?;
    println!("{written} exposures written to {}", config.data_dir.display());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);
    let config = load_config(&cli)?;

    match cli.command {
        Command::Scan(args) => scan(config, args),
        Command::Render(args) => render(config, args),
        Command::Export(args) => export(config, args),
        Command::Gain(args) => gain(config, args),
        Command::FluxRatio(args) => flux_ratio_cmd(config, args),
        Command::OverscanDelta(args) => overscan_delta_cmd(config, args),
        Command::Synth(args) => synth(config, args),
    }
}
