// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 Polyframe Inc.

//! meshintersect CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use log::{Level, LevelFilter, Log, Metadata, Record};
use meshintersect::{io, BoolOpType, IMeshArena, IntersectConfig, PolyMesh};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "meshintersect")]
#[command(about = "Exact mesh intersection and boolean operations", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Worker threads (0 = all cores)
    #[arg(long, global = true)]
    threads: Option<usize>,

    /// Classify every triangle separately in booleans
    #[arg(long, global = true)]
    hole_tolerant: bool,

    /// Also intersect faces of the same operand
    #[arg(long, global = true)]
    use_self: bool,

    /// Verbose output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Print a JSON run report on stdout
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Split all faces along their mutual intersections
    SelfIntersect {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Boolean of the operands (objects/groups) of the input files
    Boolean {
        /// One or more inputs; each file's objects become further operands
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
        #[arg(long, value_enum, default_value = "union")]
        op: OpArg,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Triangulate all polygons
    Triangulate {
        input: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Print mesh statistics
    Info { input: PathBuf },
}

#[derive(Clone, Copy, ValueEnum)]
enum OpArg {
    None,
    Union,
    Intersect,
    Difference,
}

impl From<OpArg> for BoolOpType {
    fn from(op: OpArg) -> Self {
        match op {
            OpArg::None => BoolOpType::None,
            OpArg::Union => BoolOpType::Union,
            OpArg::Intersect => BoolOpType::Intersect,
            OpArg::Difference => BoolOpType::Difference,
        }
    }
}

#[derive(Serialize)]
struct RunReport {
    command: String,
    inputs: Vec<String>,
    output: Option<String>,
    input_faces: usize,
    input_vertices: usize,
    output_faces: usize,
    output_vertices: usize,
    shapes: usize,
    duration_ms: u128,
}

struct StderrLogger {
    level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.level
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR".red().bold(),
            Level::Warn => "WARN".yellow().bold(),
            Level::Info => "INFO".green(),
            Level::Debug => "DEBUG".blue(),
            Level::Trace => "TRACE".dimmed(),
        };
        eprintln!("{tag} {}: {}", record.target(), record.args());
    }

    fn flush(&self) {}
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let logger: &'static StderrLogger = Box::leak(Box::new(StderrLogger { level }));
    if log::set_logger(logger).is_ok() {
        log::set_max_level(level);
    }
}

fn spinner(message: &str, quiet: bool) -> ProgressBar {
    if quiet {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.cyan} {msg} [{elapsed}]") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn load_config(cli: &Cli) -> Result<IntersectConfig> {
    let mut config = IntersectConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(threads) = cli.threads {
        config.threads = (threads > 0).then_some(threads);
    }
    config.hole_tolerant |= cli.hole_tolerant;
    config.use_self |= cli.use_self;
    Ok(config)
}

fn read_input(path: &Path) -> Result<PolyMesh> {
    io::read_mesh(path).with_context(|| format!("Failed to read mesh: {}", path.display()))
}

fn write_output(pm: &PolyMesh, path: &Path) -> Result<()> {
    let written = match io_extension(path).as_str() {
        "stl" => {
            let arena = IMeshArena::new();
            let (m, _) = pm.to_imesh(&arena);
            let tm = meshintersect::triangulate_polymesh(&m, &arena);
            io::write_stl(&tm, path)
        }
        _ => io::write_obj(pm, path),
    };
    written.with_context(|| format!("Failed to write mesh: {}", path.display()))
}

fn io_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    let config = load_config(&cli)?;
    let quiet = cli.json || cli.verbose > 0;
    let start = Instant::now();

    let (command, inputs, output, input, result) = match &cli.command {
        Commands::SelfIntersect { input, output } => {
            let pm = read_input(input)?;
            let pb = spinner("Intersecting", quiet);
            let out = meshintersect::self_intersect(&pm, &config)?;
            pb.finish_and_clear();
            ("self-intersect", vec![input.clone()], Some(output.clone()), pm, out)
        }
        Commands::Boolean { inputs, op, output } => {
            let mut pm = PolyMesh::new();
            for path in inputs {
                pm.append(&read_input(path)?);
            }
            let op = BoolOpType::from(*op);
            let pb = spinner(&format!("Computing {op}"), quiet);
            let out = meshintersect::boolean(&pm, op, &config)?;
            pb.finish_and_clear();
            ("boolean", inputs.clone(), Some(output.clone()), pm, out)
        }
        Commands::Triangulate { input, output } => {
            let pm = read_input(input)?;
            let arena = IMeshArena::new();
            let (m, shapes) = pm.to_imesh(&arena);
            let mut tm = config.install(|| meshintersect::triangulate_polymesh(&m, &arena))?;
            let out = PolyMesh::from_imesh(&mut tm, &shapes);
            ("triangulate", vec![input.clone()], Some(output.clone()), pm, out)
        }
        Commands::Info { input } => {
            let pm = read_input(input)?;
            let out = pm.clone();
            ("info", vec![input.clone()], None, pm, out)
        }
    };

    if let Some(path) = &output {
        write_output(&result, path)?;
    }

    let report = RunReport {
        command: command.to_string(),
        inputs: inputs.iter().map(|p| p.display().to_string()).collect(),
        output: output.as_ref().map(|p| p.display().to_string()),
        input_faces: input.faces.len(),
        input_vertices: input.vertices.len(),
        output_faces: result.faces.len(),
        output_vertices: result.vertices.len(),
        shapes: input.nshapes(),
        duration_ms: start.elapsed().as_millis(),
    };
    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else if output.is_none() {
        println!("{}", "Mesh info".bold());
        println!("  Vertices: {}", report.input_vertices);
        println!("  Faces:    {}", report.input_faces);
        println!("  Shapes:   {}", report.shapes);
        println!("  Triangulated: {}", input.is_triangulated());
    } else {
        println!(
            "{} {} -> {} ({} faces in {:.2?})",
            "✓".green(),
            command,
            report.output.as_deref().unwrap_or_default(),
            report.output_faces,
            start.elapsed()
        );
    }
    Ok(())
}
