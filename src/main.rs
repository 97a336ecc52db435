use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use indicatif::MultiProgress;
use indicatif_log_bridge::LogWrapper;
use log::{error, LevelFilter};

use rangefold::sequential::DEFAULT_BUFFER_SIZE;
use rangefold::{aggregate, AggregatePreferences, Mode, RangeStrategy, TrailingPolicy};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct CliArgs {
    /// File of big-endian u32 records
    path: PathBuf,

    #[arg(short, long, value_enum, default_value_t = Mode::Sequential)]
    mode: Mode,

    /// Parallel workers; defaults to the number of available cores
    #[arg(short, long)]
    workers: Option<usize>,

    #[arg(short, long, value_enum, default_value_t = RangeStrategy::Mapped)]
    strategy: RangeStrategy,

    /// Fail instead of ignoring a trailing partial record
    #[arg(long)]
    strict: bool,

    /// Read buffer in bytes, rounded down to whole records
    #[arg(short, long, default_value_t = DEFAULT_BUFFER_SIZE)]
    buffer_size: usize,

    #[arg(short, long)]
    progress: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn init_logging(level: LevelFilter, multi: MultiProgress) -> Result<(), log::SetLoggerError> {
    let logger = simplelog::TermLogger::new(
        level,
        simplelog::Config::default(),
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    LogWrapper::new(multi, logger).try_init()?;
    log::set_max_level(level);
    Ok(())
}

/// Renders a min/max field, marking the sentinel of an empty input.
fn format_extreme(value: Option<u32>, raw: u64) -> String {
    match value {
        Some(v) => v.to_string(),
        None => format!("{raw} (no records)"),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = CliArgs::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let multi = MultiProgress::new();
    if let Err(e) = init_logging(level, multi.clone()) {
        eprintln!("failed to initialise logging: {e}");
        return ExitCode::FAILURE;
    }

    let prefs = AggregatePreferences {
        path: args.path,
        mode: args.mode,
        workers: args.workers,
        strategy: args.strategy,
        trailing: if args.strict {
            TrailingPolicy::Reject
        } else {
            TrailingPolicy::Truncate
        },
        buffer_size: args.buffer_size,
    };

    let progress = args.progress.then_some(multi);
    match aggregate(prefs, progress).await {
        Ok(report) => {
            let acc = report.accumulator;
            match report.mode {
                Mode::Sequential => println!("Using sequential reading"),
                Mode::Parallel => println!(
                    "Using parallel processing with {} workers",
                    report.workers
                ),
            }
            println!("Total: {}", acc.total);
            println!("Min: {}", format_extreme(acc.min_value(), acc.min));
            println!("Max: {}", format_extreme(acc.max_value(), acc.max));
            println!("Records: {}", acc.records);
            println!("Time elapsed: {:.2} seconds", report.elapsed.as_secs_f64());
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("aggregation failed: {e}");
            ExitCode::FAILURE
        }
    }
}
