//! IEEE 802.11 DCF channel access simulation application.
#![warn(
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_import_braces,
    unused_qualifications
)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::default_trait_access)]

use std::fs::File;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use eyre::WrapErr;
use indicatif::{ProgressBar, ProgressStyle};
use structopt::StructOpt;

use dcfsim::{output, run_batch, BatchConfig, StationConfig};

/// Simulates stations contending for a shared medium with the 802.11 DCF, for every number of
/// stations up to `--stations`, each with `--seeds` different seeds.
#[derive(StructOpt)]
struct Opt {
    /// Payload size in bytes.
    #[structopt(long, default_value = "1472")]
    payload: u32,

    /// Minimum contention window.
    #[structopt(long, default_value = "15")]
    cw_min: u32,

    /// Maximum contention window.
    #[structopt(long, default_value = "1023")]
    cw_max: u32,

    /// Number of retransmissions before a frame is dropped.
    #[structopt(long, default_value = "7")]
    retry_limit: u32,

    /// Modulation and coding scheme index.
    #[structopt(long, default_value = "7")]
    mcs: u8,

    /// Maximum number of stations.
    #[structopt(long, default_value = "10")]
    stations: usize,

    /// Number of runs per number of stations.
    #[structopt(long, default_value = "5")]
    seeds: u64,

    /// Simulated time of each run, e.g., `100s` or `1m 30s`.
    #[structopt(long, default_value = "100s", parse(try_from_str = humantime::parse_duration))]
    time: Duration,

    /// JSON file with the batch configuration; overrides all the simulation options above.
    #[structopt(long)]
    config: Option<PathBuf>,

    /// Directory where the results directory is created.
    #[structopt(long, default_value = "results")]
    output_dir: PathBuf,

    /// Suffix of the results directory.
    #[structopt(long, default_value = "dcf")]
    label: String,

    /// Verbosity.
    #[structopt(short, long, parse(from_occurrences))]
    verbose: i32,

    /// Store the logs in this file.
    #[structopt(long)]
    log_output: Option<PathBuf>,

    /// Do not log to the stderr.
    #[structopt(long)]
    no_stderr: bool,
}

impl Opt {
    fn batch_config(&self) -> eyre::Result<BatchConfig> {
        if let Some(path) = &self.config {
            let file = File::open(path)
                .wrap_err_with(|| format!("unable to open config file: {}", path.display()))?;
            return serde_json::from_reader(file)
                .wrap_err_with(|| format!("unable to parse config file: {}", path.display()));
        }
        Ok(BatchConfig {
            station: StationConfig {
                payload: self.payload,
                cw_min: self.cw_min,
                cw_max: self.cw_max,
                retry_limit: self.retry_limit,
                mcs: self.mcs,
            },
            max_stations: self.stations,
            seeds: self.seeds,
            horizon: self.time,
            label: self.label.clone(),
        })
    }
}

/// Set up a logger based on the given user options.
fn set_up_logger(opt: &Opt) -> Result<(), fern::InitError> {
    let log_level = match opt.verbose {
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        3 => log::LevelFilter::Trace,
        _ => log::LevelFilter::Warn,
    };
    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!("[{}] {}", record.level(), message))
        })
        .level(log_level);
    let dispatch = if let Some(path) = &opt.log_output {
        let _ = std::fs::remove_file(path);
        dispatch.chain(
            std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .append(false)
                .open(path)?,
        )
    } else {
        dispatch
    };
    let dispatch = if opt.no_stderr {
        dispatch
    } else {
        dispatch.chain(std::io::stderr())
    };
    dispatch.apply()?;
    Ok(())
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let opt = Opt::from_args();
    set_up_logger(&opt)?;
    let config = opt.batch_config()?;
    config.validate().wrap_err("invalid simulation config")?;
    let started = SystemTime::now();
    let pb = ProgressBar::new(0)
        .with_style(ProgressStyle::default_bar().template("{msg} {wide_bar} {pos}/{len}"));
    pb.set_message("Simulating");
    let results = run_batch(&config, &pb)?;
    let path = output::save(&opt.output_dir, started, &config.label, &results)
        .wrap_err("unable to save results")?;
    println!("{}", path.display());
    Ok(())
}
