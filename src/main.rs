//! Systolic Array Generator CLI
//!
//! Usage:
//!   systolicgen grid --rows 4 --cols 4 --out generated.sv
//!   systolicgen feed --a "[[9,8],[5,4]]" --b @weights.txt --tile 2x2 --out-dir streams/
//!   systolicgen --config array.json grid --json

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{Parser as ClapParser, Subcommand};
use colored::Colorize;
use log::{Level, LevelFilter, Log, Metadata, Record};

use systolic_mesh::{
    ArrayEmitter, EmitOptions, Grid, LaneFiles, LaneStreams, Matrix, MatrixTiler, SystolicConfig,
    SystolicResult,
};

#[derive(ClapParser, Debug)]
#[command(name = "systolicgen")]
#[command(author = "FPGA Team")]
#[command(version = "0.1.0")]
#[command(about = "Generates and feeds weight-stationary systolic arrays")]
struct Args {
    /// JSON configuration file (grid and tiling dimensions)
    #[arg(short = 'c', long = "config", global = true)]
    config: Option<PathBuf>,

    /// Verbose output (repeat for more)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Emit the PE instantiations for a grid
    Grid {
        /// Number of PE rows
        #[arg(long = "rows")]
        rows: Option<usize>,

        /// Number of PE columns
        #[arg(long = "cols")]
        cols: Option<usize>,

        /// PE module name
        #[arg(short = 'm', long = "module", default_value = "mac")]
        module: String,

        /// Write to a file instead of stdout
        #[arg(short = 'o', long = "out")]
        out: Option<PathBuf>,

        /// Output the wired grid as JSON
        #[arg(short = 'j', long = "json")]
        json_output: bool,
    },

    /// Multiply two matrices tile by tile and produce the lane streams
    Feed {
        /// Left operand literal, or @path to read it from a file
        #[arg(short = 'a', long = "a")]
        a: String,

        /// Right operand literal, or @path to read it from a file
        #[arg(short = 'b', long = "b")]
        b: String,

        /// Tile shape (e.g., "2x2"), defaults to the grid shape
        #[arg(short = 't', long = "tile", value_parser = parse_dims)]
        tile: Option<(usize, usize)>,

        /// Directory for the per-lane stream files
        #[arg(short = 'o', long = "out-dir")]
        out_dir: Option<PathBuf>,

        /// Output product and streams as JSON
        #[arg(short = 'j', long = "json")]
        json_output: bool,
    },
}

fn parse_dims(s: &str) -> Result<(usize, usize), String> {
    let dims: Vec<&str> = s.split('x').collect();
    if dims.len() != 2 {
        return Err(format!("Invalid dimensions: {}", s));
    }

    let rows = dims[0]
        .parse::<usize>()
        .map_err(|_| format!("Invalid row count: {}", dims[0]))?;
    let cols = dims[1]
        .parse::<usize>()
        .map_err(|_| format!("Invalid col count: {}", dims[1]))?;

    Ok((rows, cols))
}

/// Colored stderr logger
struct ConsoleLogger;

impl Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error".red().bold(),
            Level::Warn => "warn".yellow().bold(),
            Level::Info => "info".green(),
            Level::Debug => "debug".blue(),
            Level::Trace => "trace".dimmed(),
        };
        eprintln!("{} [{}] {}", tag, record.target(), record.args());
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level);
    }
}

fn main() {
    let args = Args::parse();
    init_logging(args.verbose);

    if let Err(e) = run(args) {
        eprintln!("{}: {}", "Error".red(), e);
        std::process::exit(1);
    }
}

fn run(args: Args) -> SystolicResult<()> {
    let config = match &args.config {
        Some(path) => SystolicConfig::load(path)?,
        None => SystolicConfig::default(),
    };

    match args.command {
        Command::Grid {
            rows,
            cols,
            module,
            out,
            json_output,
        } => {
            let mut config = config;
            config.grid.rows = rows.unwrap_or(config.grid.rows);
            config.grid.cols = cols.unwrap_or(config.grid.cols);
            run_grid(&config, module, out, json_output)
        }
        Command::Feed {
            a,
            b,
            tile,
            out_dir,
            json_output,
        } => {
            let config = match tile {
                Some((rows, cols)) => config.with_tiling(rows, cols),
                None => config,
            };
            run_feed(&config, &a, &b, out_dir, json_output)
        }
    }
}

fn run_grid(
    config: &SystolicConfig,
    module: String,
    out: Option<PathBuf>,
    json_output: bool,
) -> SystolicResult<()> {
    let grid = Grid::from_dims(config.grid)?;
    log::info!("wired {}x{} grid", grid.rows(), grid.cols());

    let text = if json_output {
        grid.to_json()?
    } else {
        let emitter = ArrayEmitter::new(EmitOptions {
            module,
            ..EmitOptions::default()
        });
        emitter.emit(&grid)
    };

    match out {
        Some(path) => {
            let mut writer = BufWriter::new(File::create(&path)?);
            io::Write::write_all(&mut writer, text.as_bytes())?;
            io::Write::flush(&mut writer)?;
            println!(
                "{} {} instances to {}",
                "Wrote".green(),
                grid.cells().len(),
                path.display()
            );
        }
        None => print!("{}", text),
    }
    Ok(())
}

/// Read a matrix literal, or the file named after a leading '@'
fn load_matrix(source: &str) -> SystolicResult<Matrix> {
    match source.strip_prefix('@') {
        Some(path) => fs::read_to_string(path)?.parse(),
        None => source.parse(),
    }
}

fn run_feed(
    config: &SystolicConfig,
    a: &str,
    b: &str,
    out_dir: Option<PathBuf>,
    json_output: bool,
) -> SystolicResult<()> {
    config.validate()?;
    let a = load_matrix(a)?;
    let b = load_matrix(b)?;
    let tile = config.tile_dims();
    let tiler = MatrixTiler::new(tile)?;

    let passes = tiler.schedule(&a, &b)?.pass_count();
    let (product, streams) = tiler.run(&a, &b, LaneStreams::new(tile))?;
    let matches_reference = a.matmul(&b)? == product;

    // Lane files are only touched once every pass has succeeded
    if let Some(dir) = &out_dir {
        let mut files = LaneFiles::create(dir, tile)?;
        streams.replay(&mut files)?;
        log::info!("flushing lane files in {}", files.dir().display());
        files.finish()?;
    }

    if json_output {
        let value = serde_json::json!({
            "product": product,
            "streams": streams,
            "passes": passes,
            "matches_reference": matches_reference,
        });
        println!("{}", serde_json::to_string_pretty(&value)?);
        return Ok(());
    }

    println!("{}", "Tiled Product".bold().green());
    println!("{}", "=".repeat(50));
    println!(
        "{}: {:?} @ {:?} in {} passes of {}x{}",
        "Operands".cyan(),
        a.shape(),
        b.shape(),
        passes,
        tile.rows,
        tile.cols
    );
    println!("{}: {}", "Result".cyan(), product);
    if matches_reference {
        println!("{}: {}", "Reference".cyan(), "match".green());
    } else {
        println!("{}: {}", "Reference".cyan(), "MISMATCH".red().bold());
    }
    println!();

    println!("{}", "Lane Streams".bold().yellow());
    println!("{}", "-".repeat(50));
    for (idx, lane) in streams.activations.iter().enumerate() {
        println!("  {} {}: {:?}", "activation".cyan(), idx + 1, lane);
    }
    for (idx, lane) in streams.weights.iter().enumerate() {
        println!("  {} {}: {:?}", "weight".cyan(), idx + 1, lane);
    }
    if let Some(dir) = out_dir {
        println!();
        println!("{} lane files to {}", "Wrote".green(), dir.display());
    }
    Ok(())
}
