//! sspfm CLI: per-pixel analysis, maps, clustering and elbow scans of an SSPFM
//! scan described by a run configuration.

use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use serde::Serialize;
use sspfm_toolbox::cluster::{cluster_rows, elbow};
use sspfm_toolbox::config::{load_metadata, load_run_config, RunConfig, ScanMetadata};
use sspfm_toolbox::map::{on_off, property_map, within_mode, LinePrompt};
use sspfm_toolbox::pipeline::{mode_vectors, run, PipelineOptions, PipelineOutput};
use sspfm_toolbox::properties::io::{
    best_loops_file, read_bundle, write_average_curves, write_best_loops, write_bundle,
    write_cluster_labels, LoopRows,
};
use sspfm_toolbox::raster::io::{save_raster_png, write_json_file};
use sspfm_toolbox::segments::TextTableSource;
use sspfm_toolbox::{Mode, Result, SspfmError};
use std::io;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "sspfm")]
#[command(about = "Nanoloop fitting, property maps and clustering for SSPFM scans")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every pixel and write property tables, best loops and a report.
    Process(RunArgs),

    /// Build maps and correlation matrices from written property tables.
    Map(RunArgs),

    /// Analyze every pixel and cluster the configured modes.
    Cluster(RunArgs),

    /// Inertia of the clustering for k = 2..elbow_k_max.
    Elbow {
        #[command(flatten)]
        run: RunArgs,

        /// Only scan this mode (off, on, coupled).
        #[arg(long, value_parser = parse_mode)]
        mode: Option<Mode>,
    },
}

#[derive(Debug, Clone, Args)]
struct RunArgs {
    /// Run configuration (JSON or TOML).
    #[arg(long)]
    config: PathBuf,

    /// Output directory; overrides `output_dir` of the config.
    #[arg(long)]
    out: Option<PathBuf>,

    /// Analyze pixels on this many worker threads.
    #[arg(long)]
    workers: Option<usize>,
}

fn parse_mode(s: &str) -> std::result::Result<Mode, String> {
    Mode::parse(s).ok_or_else(|| format!("unknown mode '{s}'"))
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let res = match &cli.command {
        Commands::Process(args) => run_process(args),
        Commands::Map(args) => run_map(args),
        Commands::Cluster(args) => run_cluster(args),
        Commands::Elbow { run, mode } => run_elbow(run, *mode),
    };
    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::from(exit_code(&err))
        }
    }
}

fn exit_code(err: &SspfmError) -> u8 {
    match err {
        SspfmError::Config(_) | SspfmError::Geometry(_) | SspfmError::UserAbort => 1,
        _ => 2,
    }
}

fn load(args: &RunArgs) -> Result<RunConfig> {
    info!("Loading config: {}", args.config.display());
    let mut cfg = load_run_config(&args.config)?;
    if let Some(out) = &args.out {
        cfg.output_dir = out.clone();
    }
    if let Some(workers) = args.workers {
        cfg.analysis.multi_processing = true;
        cfg.analysis.workers = Some(workers);
    }
    Ok(cfg)
}

fn analyze(cfg: &RunConfig) -> Result<(ScanMetadata, PipelineOutput)> {
    let meta = load_metadata(&cfg.measurement_sheet)?;
    let source = TextTableSource::from_dir(
        &cfg.input.dir,
        &cfg.input.extension,
        cfg.analysis.table_layout(),
        meta.bias.clone(),
        cfg.analysis.segment_trim,
    )?;
    let opts = PipelineOptions::from_config(&cfg.analysis, &meta);
    let output = run(&source, &meta.grid, &opts)?;
    Ok((meta, output))
}

fn run_process(args: &RunArgs) -> Result<()> {
    let cfg = load(args)?;
    let (_, output) = analyze(&cfg)?;
    let dir = &cfg.output_dir;

    for path in write_bundle(dir, &output.bundle)? {
        info!("wrote {}", path.display());
    }
    for &mode in output.best_loops.keys() {
        let rows = output.loop_rows(mode);
        let refs: Vec<LoopRows<'_>> = rows
            .iter()
            .map(|(i, v, y)| (*i, v.as_slice(), y.as_slice()))
            .collect();
        write_best_loops(&best_loops_file(dir, mode), mode, &refs)?;
    }
    write_json_file(&dir.join("report.json"), &output.report)?;
    println!(
        "{} of {} pixels measured, {} stage failures; outputs in {}",
        output.report.measured_pixels,
        output.report.n_pixels,
        output.report.total_failed(),
        dir.display()
    );
    Ok(())
}

fn map_path(dir: &Path, mode: Mode, name: &str, ext: &str) -> PathBuf {
    dir.join("maps").join(mode.as_str()).join(format!("{name}.{ext}"))
}

#[derive(Serialize)]
struct NamedCorrelation<'a> {
    property: &'a str,
    r: f64,
}

fn run_map(args: &RunArgs) -> Result<()> {
    let cfg = load(args)?;
    let dir = &cfg.output_dir;
    let bundle = read_bundle(dir)?;
    let prompt = LinePrompt::new(io::stdin().lock(), io::stderr());
    let mask = cfg.map.mask.build(&bundle, prompt)?;
    info!("mask excludes {} of {} pixels", mask.len(), bundle.grid.len());

    for &mode in &cfg.map.modes {
        let Some(table) = bundle.table(mode) else {
            info!("map {mode}: no property table, skipped");
            continue;
        };
        let names: Vec<String> = if cfg.map.properties.is_empty() {
            table.names().to_vec()
        } else {
            cfg.map.properties.clone()
        };
        for name in &names {
            if table.get(name).is_none() {
                warn!("map {mode}: no property '{name}'");
                continue;
            }
            let art = property_map(&bundle, mode, name, &mask, &cfg.map.interpolation)?;
            if cfg.map.png {
                save_raster_png(&art.densified, &art.blank, &map_path(dir, mode, name, "png"))?;
            }
            write_json_file(&map_path(dir, mode, name, "json"), &art)?;
        }
        if cfg.map.correlation {
            let matrix = within_mode(table, &names, &mask);
            write_json_file(&dir.join(format!("correlation_{mode}.json")), &matrix)?;
        }
    }

    if cfg.map.correlation {
        if let (Some(on), Some(off)) = (bundle.table(Mode::On), bundle.table(Mode::Off)) {
            let pairs = on_off(on, off, &mask);
            let named: Vec<NamedCorrelation<'_>> = pairs
                .iter()
                .map(|(property, r)| NamedCorrelation { property, r: *r })
                .collect();
            write_json_file(&dir.join("correlation_on_off.json"), &named)?;
        }
    }
    Ok(())
}

fn run_cluster(args: &RunArgs) -> Result<()> {
    let cfg = load(args)?;
    let (meta, output) = analyze(&cfg)?;
    let dir = cfg.output_dir.join("clusters");
    let opts = &cfg.cluster.options;

    for &mode in &cfg.cluster.modes {
        let vectors = mode_vectors(
            &output,
            mode,
            &cfg.cluster.channels,
            opts.relative,
            cfg.analysis.electrostatic_offset,
        );
        let assignment = match cluster_rows(mode, &vectors.features, &vectors.raw, opts) {
            Ok(a) => a,
            Err(e @ SspfmError::Cluster(_)) => {
                warn!("clustering {mode} skipped: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        write_cluster_labels(&dir.join(format!("labels_{mode}.txt")), &meta.grid, &assignment)?;
        if assignment.is_empty() {
            continue;
        }
        write_average_curves(
            &dir.join(format!("averages_{mode}.txt")),
            &vectors.x,
            &assignment.averages,
        )?;
        write_json_file(&dir.join(format!("clusters_{mode}.json")), &assignment.info)?;
        for info in &assignment.info {
            println!(
                "{mode} {}: {} pixels, {:.4} from A, nearest {} at {:.4}",
                info.name, info.population, info.ref_distance, info.nearest_name, info.nearest_distance
            );
        }
    }
    Ok(())
}

fn run_elbow(args: &RunArgs, only: Option<Mode>) -> Result<()> {
    let cfg = load(args)?;
    let (_, output) = analyze(&cfg)?;
    let modes: Vec<Mode> = match only {
        Some(m) => vec![m],
        None => cfg.cluster.modes.clone(),
    };
    let opts = &cfg.cluster.options;

    for mode in modes {
        let vectors = mode_vectors(
            &output,
            mode,
            &cfg.cluster.channels,
            opts.relative,
            cfg.analysis.electrostatic_offset,
        );
        let scan = match elbow(mode, &vectors.features, cfg.cluster.elbow_k_max, opts) {
            Ok(s) => s,
            Err(e @ SspfmError::Cluster(_)) => {
                warn!("elbow {mode} skipped: {e}");
                continue;
            }
            Err(e) => return Err(e),
        };
        for (k, inertia) in &scan {
            println!("{mode}\tk={k}\tinertia={inertia:.6e}");
        }
        write_json_file(&cfg.output_dir.join("clusters").join(format!("elbow_{mode}.json")), &scan)?;
    }
    Ok(())
}
