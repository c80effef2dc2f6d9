//! CLI definition and dispatch.

use chrono::DateTime;
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::domain::context::Context;
use crate::domain::engine::Runner;
use crate::domain::error::{ParseError, PineError};
use crate::domain::run_config::{Overrides, build_run_config};
use crate::domain::run_result::Columns;
use crate::domain::script_eval::{ScriptCompiler, compile};
use crate::ports::config_port::ConfigPort;
use crate::ports::data_port::DataPort;

#[derive(Parser, Debug)]
#[command(name = "pinerun", about = "Bar-by-bar indicator script runner")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a script over historical bars and print the results as CSV
    Run {
        #[arg(short, long)]
        script: PathBuf,
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
        /// Evaluate only the most recent N bars
        #[arg(short, long)]
        bars: Option<usize>,
        #[arg(long)]
        no_cache: bool,
        #[arg(long)]
        precision: Option<u32>,
        /// Drop rows produced before the longest indicator lookback is filled
        #[arg(long)]
        skip_warmup: bool,
        /// Write CSV here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compile a script without running it
    Check {
        #[arg(short, long)]
        script: PathBuf,
    },
    /// Show available tickers or the data range of one ticker
    Info {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(short, long)]
        ticker: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
    },
}

/// Run-command arguments after parsing.
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub script: PathBuf,
    pub config: Option<PathBuf>,
    pub overrides: Overrides,
    pub skip_warmup: bool,
    pub output: Option<PathBuf>,
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            script,
            config,
            data_dir,
            ticker,
            timeframe,
            bars,
            no_cache,
            precision,
            skip_warmup,
            output,
        } => {
            let args = RunArgs {
                script,
                config,
                overrides: Overrides {
                    data_dir,
                    ticker,
                    timeframe,
                    bars,
                    no_cache,
                    precision,
                },
                skip_warmup,
                output,
            };
            report(run_script_file(&args))
        }
        Command::Check { script } => report(run_check(&script)),
        Command::Info {
            config,
            data_dir,
            ticker,
            timeframe,
        } => report(run_info(
            config.as_deref(),
            data_dir,
            ticker.as_deref(),
            timeframe.as_deref(),
        )),
    }
}

fn report(result: Result<(), PineError>) -> ExitCode {
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

/// Loads `path`, or an empty configuration when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, PineError> {
    match path {
        Some(path) => {
            eprintln!("Loading config from {}", path.display());
            FileConfigAdapter::from_file(path)
        }
        None => FileConfigAdapter::from_string(""),
    }
}

fn read_script(path: &Path) -> Result<String, PineError> {
    fs::read_to_string(path).map_err(|e| {
        PineError::Io(io::Error::new(
            e.kind(),
            format!("failed to read {}: {}", path.display(), e),
        ))
    })
}

/// Prints parse and compile errors with a caret under the offending column.
fn show_source_error(err: &PineError, source: &str) {
    let rendered = match err {
        PineError::Parse(e) => e.display_with_context(source),
        PineError::Compile { position, reason } => ParseError {
            message: reason.clone(),
            position: *position,
        }
        .display_with_context(source),
        _ => return,
    };
    eprintln!("{rendered}");
}

/// Loads bars, runs the script and writes the result table.
pub fn run_script_file(args: &RunArgs) -> Result<(), PineError> {
    let config = load_config(args.config.as_deref())?;
    let run_config = build_run_config(&config, &args.overrides)?;
    let source = read_script(&args.script)?;

    let adapter = CsvAdapter::new(run_config.data_dir.clone());
    eprintln!(
        "Loading {} {} from {}",
        run_config.request.ticker,
        run_config.request.timeframe,
        run_config.data_dir.display()
    );
    let mut runner = Runner::from_port(ScriptCompiler, &adapter, &run_config.request)?
        .with_cache(run_config.use_cache)
        .with_precision(run_config.precision);

    let ctx = runner
        .run(Some(&source), run_config.bars)
        .inspect_err(|e| show_source_error(e, &source))?;
    eprintln!(
        "Evaluated {} of {} bars (max period {})",
        ctx.result.rows(),
        runner.market().len(),
        ctx.max_period()
            .map_or_else(|| "none".to_string(), |p| p.to_string())
    );

    let skip = if args.skip_warmup {
        warmup_rows(&ctx)
    } else {
        0
    };
    match &args.output {
        Some(path) => {
            let file = fs::File::create(path)?;
            write_results(file, &ctx, skip)?;
            eprintln!("Results written to {}", path.display());
        }
        None => write_results(io::stdout().lock(), &ctx, skip)?,
    }
    Ok(())
}

/// Leading result rows whose bar has less history than the longest lookback.
/// Bars before the first evaluated one count as history.
fn warmup_rows(ctx: &Context) -> usize {
    let first = ctx.data.market().len().saturating_sub(ctx.result.rows());
    ctx.max_period()
        .unwrap_or(0)
        .saturating_sub(1)
        .saturating_sub(first)
}

fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}

/// Writes one row per evaluated bar: open time in Unix ms, then every result
/// column. `na` is an empty field. The first `skip` rows are omitted.
pub fn write_results<W: Write>(writer: W, ctx: &Context, skip: usize) -> Result<(), PineError> {
    let rows = ctx.result.rows();
    let bars = ctx.data.market().bars();
    let times = &bars[bars.len().saturating_sub(rows)..];

    let columns: Vec<(&str, &[f64])> = match ctx.result.columns() {
        Columns::Empty => Vec::new(),
        Columns::Scalar(values) => vec![("value", values.as_slice())],
        Columns::Named(cols) => cols
            .iter()
            .map(|(name, values)| (name.as_str(), values.as_slice()))
            .collect(),
    };

    let mut wtr = csv::Writer::from_writer(writer);
    let mut header = vec!["time"];
    header.extend(columns.iter().map(|(name, _)| *name));
    wtr.write_record(&header).map_err(io::Error::from)?;

    for (row, bar) in times.iter().enumerate().skip(skip) {
        let mut record = vec![bar.open_time.to_string()];
        record.extend(columns.iter().map(|(_, values)| format_value(values[row])));
        wtr.write_record(&record).map_err(io::Error::from)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Compiles a script and prints what the compiler allocated.
pub fn run_check(path: &Path) -> Result<(), PineError> {
    let source = read_script(path)?;
    let script = compile(&source).inspect_err(|e| show_source_error(e, &source))?;
    let summary = script.summary();
    println!("statements:  {}", summary.statements);
    println!("variables:   {}", summary.variables);
    println!("params:      {}", summary.params);
    println!("cache sites: {}", summary.cache_sites);
    eprintln!("{} compiles", path.display());
    Ok(())
}

fn format_time(ms: i64) -> String {
    DateTime::from_timestamp_millis(ms)
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ms.to_string())
}

/// Lists tickers for a timeframe, or the range of one ticker.
pub fn run_info(
    config_path: Option<&Path>,
    data_dir: Option<PathBuf>,
    ticker: Option<&str>,
    timeframe: Option<&str>,
) -> Result<(), PineError> {
    let config = load_config(config_path)?;
    let dir = data_dir
        .or_else(|| config.get_string("data", "dir").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("."));
    let timeframe = timeframe
        .map(str::to_string)
        .or_else(|| config.get_string("data", "timeframe"))
        .ok_or_else(|| PineError::ConfigMissing {
            section: "data".into(),
            key: "timeframe".into(),
        })?;
    let adapter = CsvAdapter::new(dir);

    let tickers = match ticker {
        Some(t) => vec![t.to_string()],
        None => adapter.list_tickers(&timeframe)?,
    };
    if tickers.is_empty() {
        eprintln!("No tickers found for timeframe {timeframe}");
    }
    for t in &tickers {
        match adapter.data_range(t, &timeframe)? {
            Some((first, last, count)) => println!(
                "{}_{}: {} bars, {} to {}",
                t,
                timeframe,
                count,
                format_time(first),
                format_time(last)
            ),
            None => eprintln!("{t}_{timeframe}: no data found"),
        }
    }
    Ok(())
}
