use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use log::error;

use whisper::config;
use whisper::whisper::{
    aggregate, create, fetch as fetch_points, info, parse_archive_list, update, update_many, validate_archive_list,
    AggregationType,
};

#[derive(Parser)]
#[command(name = "whisper", about = "Read and write Whisper round-robin time-series files")]
struct Cli {
    /// Enable AutoFlush: fsync before closing after create/update.
    #[arg(long, global = true)]
    auto_flush: bool,

    /// Enable the process-wide header cache.
    #[arg(long, global = true)]
    cache_headers: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new whisper file.
    Create {
        path: PathBuf,
        /// Comma-separated secondsPerPoint:points pairs, e.g. "1:60,60:60,3600:24".
        archives: String,
        #[arg(long, default_value_t = 0.5)]
        xff: f64,
        #[arg(long, default_value = "average")]
        agg: String,
        #[arg(long)]
        sparse: bool,
    },
    /// Print header metadata for an existing file.
    Info { path: PathBuf },
    /// Write a single point.
    Update {
        path: PathBuf,
        value: f64,
        #[arg(long)]
        timestamp: Option<u64>,
        #[arg(long)]
        now: Option<u64>,
    },
    /// Write several points in one pass.
    UpdateMany {
        path: PathBuf,
        /// One or more timestamp:value pairs.
        points: Vec<String>,
        #[arg(long)]
        now: Option<u64>,
    },
    /// Read a dense window of points.
    Fetch {
        path: PathBuf,
        from: u64,
        #[arg(long)]
        until: Option<u64>,
        #[arg(long)]
        now: Option<u64>,
    },
    /// Not supported by this engine (spec.md §1 Non-goals).
    Resize { path: PathBuf, archives: String },
}

fn parse_aggregation(name: &str) -> Result<AggregationType, String> {
    match name.to_ascii_lowercase().as_str() {
        "average" | "avg" => Ok(AggregationType::Average),
        "sum" => Ok(AggregationType::Sum),
        "last" => Ok(AggregationType::Last),
        "max" => Ok(AggregationType::Max),
        "min" => Ok(AggregationType::Min),
        other => Err(format!("unknown aggregation method {:?}", other)),
    }
}

fn parse_points(args: &[String]) -> Result<Vec<(u64, f64)>, String> {
    args.iter()
        .map(|arg| {
            let (ts, value) = arg
                .split_once(':')
                .ok_or_else(|| format!("{:?} is not of the form timestamp:value", arg))?;
            let ts: u64 = ts.parse().map_err(|_| format!("invalid timestamp in {:?}", arg))?;
            let value: f64 = value.parse().map_err(|_| format!("invalid value in {:?}", arg))?;
            Ok((ts, value))
        })
        .collect()
}

fn run(cli: Cli) -> Result<(), String> {
    config::set_auto_flush(cli.auto_flush);
    config::set_cache_headers(cli.cache_headers);

    match cli.command {
        Command::Create { path, archives, xff, agg, sparse } => {
            let mut archives = parse_archive_list(&archives).map_err(|e| e.to_string())?;
            validate_archive_list(&mut archives).map_err(|e| e.to_string())?;
            let agg = parse_aggregation(&agg)?;
            create(&path, archives, xff, agg, sparse).map_err(|e| e.to_string())
        }
        Command::Info { path } => {
            let header = info(&path).map_err(|e| e.to_string())?;
            print!("{}", header);
            Ok(())
        }
        Command::Update { path, value, timestamp, now } => {
            update(&path, value, timestamp, now).map_err(|e| e.to_string())
        }
        Command::UpdateMany { path, points, now } => {
            let points = parse_points(&points)?;
            update_many(&path, &points, now).map_err(|e| e.to_string())
        }
        Command::Fetch { path, from, until, now } => {
            match fetch_points(&path, from, until, now).map_err(|e| e.to_string())? {
                Some(result) => {
                    println!(
                        "from={} until={} step={}",
                        result.time_info.from_interval, result.time_info.until_interval, result.time_info.step
                    );
                    for point in result.values {
                        println!("{}\t{}", point.timestamp, point.value);
                    }
                    Ok(())
                }
                None => {
                    println!("(no data in range)");
                    Ok(())
                }
            }
        }
        Command::Resize { .. } => Err(
            "resize is not supported: this engine only implements create/info/fetch/update/update-many (spec Non-goals)".to_string(),
        ),
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            error!("{}", message);
            eprintln!("error: {}", message);
            ExitCode::FAILURE
        }
    }
}
