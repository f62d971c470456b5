//! NCEP forecast ingestion service.
//!
//! Downloads scheduled forecast runs as indexed GRIB2 messages, decodes
//! and normalises them, stages per-hour space frames, and transposes them
//! into the per-location time-series column store.

mod elevation;
mod ensemble;
mod pipeline;
mod scheduler;
mod transpose;
mod upload;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Timelike, Utc};
use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use column_store::OmStore;
use grib_index::{FetchPolicy, GribIndexClient};
use models::{Domain, VariableFilter};

use ensemble::EnsembleProbability;
use scheduler::{Scheduler, SchedulerConfig};

/// Process exit code of the deadline alarm.
const EXIT_DEADLINE: i32 = 70;

#[derive(Parser, Debug)]
#[command(name = "ncep-ingest")]
#[command(about = "NCEP gridded forecast downloader and time-series transposer")]
struct Args {
    /// Forecast product to ingest
    domain: Domain,

    /// Run to ingest: YYYYMMDDHH, or an hour of today (default: latest)
    #[arg(long)]
    run: Option<String>,

    /// Restrict to these variables (comma separated om names)
    #[arg(long, value_delimiter = ',')]
    only_variables: Option<Vec<String>>,

    /// Ingest every run in an interval: YYYYMMDD-YYYYMMDD
    #[arg(long)]
    timeinterval: Option<String>,

    /// Concurrent transpose workers
    #[arg(long, default_value = "4")]
    concurrent: usize,

    /// Stop the schedule after this forecast hour
    #[arg(long)]
    max_forecast_hour: Option<u32>,

    /// Upload freshly written om files to this S3 bucket
    #[arg(long)]
    upload_s3_bucket: Option<String>,

    /// Skip forecast hours whose space files already exist
    #[arg(long)]
    skip_existing: bool,

    /// Request a netCDF debug dump from external tooling
    #[arg(long)]
    create_netcdf: bool,

    /// Extend the schedule with the second flush (0.5° ensemble to 840 h)
    #[arg(long)]
    second_flush: bool,

    /// Only pressure-level variables
    #[arg(long)]
    upper_level: bool,

    /// Only surface variables
    #[arg(long)]
    surface_level: bool,

    /// Directory for staged space files
    #[arg(long, env = "DOWNLOAD_DIRECTORY", default_value = "data")]
    download_directory: PathBuf,

    /// Root directory of the column store
    #[arg(long, env = "STORE_DIRECTORY", default_value = "data/omfile")]
    store_directory: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let domain = args.domain;
    let runs = select_runs(&args, Utc::now())?;

    // Liveness bound: if the run is not done deadline + 2 h after start,
    // abort the process. Partial space files are picked up by
    // --skip-existing on retry.
    let alarm = domain.deadline() + chrono::Duration::hours(2);
    tokio::spawn(async move {
        tokio::time::sleep(alarm.to_std().expect("positive deadline")).await;
        error!(
            deadline_hours = alarm.num_hours(),
            "Deadline alarm fired, aborting"
        );
        std::process::exit(EXIT_DEADLINE);
    });

    for run in runs {
        info!(domain = %domain, run = %run, "Ingesting run");
        ingest_run(&args, domain, run).await?;
    }

    Ok(())
}

/// Runs selected by `--run` / `--timeinterval`, latest cycle by default.
fn select_runs(args: &Args, now: DateTime<Utc>) -> Result<Vec<DateTime<Utc>>> {
    let domain = args.domain;

    if let Some(interval) = &args.timeinterval {
        let (start, end) = interval
            .split_once('-')
            .context("expected YYYYMMDD-YYYYMMDD")?;
        let start = NaiveDate::parse_from_str(start, "%Y%m%d")?;
        let end = NaiveDate::parse_from_str(end, "%Y%m%d")?;
        if end < start {
            bail!("time interval end before start");
        }

        let step = chrono::Duration::hours((24 / domain.runs_per_day()) as i64);
        let mut runs = Vec::new();
        let mut t = Utc.from_utc_datetime(&start.and_hms_opt(0, 0, 0).unwrap());
        let last = Utc.from_utc_datetime(&end.and_hms_opt(23, 59, 59).unwrap());
        while t <= last {
            runs.push(t);
            t += step;
        }
        return Ok(runs);
    }

    let run = match args.run.as_deref() {
        None => domain.latest_run(now),
        Some(value) if value.len() == 10 => {
            let date = NaiveDate::parse_from_str(&value[..8], "%Y%m%d")?;
            let hour: u32 = value[8..].parse()?;
            Utc.from_utc_datetime(&date.and_hms_opt(hour, 0, 0).context("invalid run hour")?)
        }
        Some(value) => {
            let hour: u32 = value.parse().context("expected YYYYMMDDHH or an hour")?;
            let today = domain.latest_run(now).date_naive();
            Utc.from_utc_datetime(&today.and_hms_opt(hour, 0, 0).context("invalid run hour")?)
        }
    };

    let interval = 24 / domain.runs_per_day();
    if run.hour() % interval != 0 {
        bail!("run hour {} is not aligned to the {} cadence", run.hour(), domain);
    }
    Ok(vec![run])
}

/// One full ingest of one run: elevation, download, aggregate, transpose,
/// upload.
async fn ingest_run(args: &Args, domain: Domain, run: DateTime<Utc>) -> Result<()> {
    let download_dir = args.download_directory.join(domain.name());
    let store_root = args.store_directory.join(domain.name());
    tokio::fs::create_dir_all(&store_root).await?;

    let client = GribIndexClient::new()?;
    let policy = FetchPolicy {
        deadline: Utc::now() + domain.deadline(),
        wait_after_last_modified: domain.wait_after_last_modified(),
        retry_interval: Duration::from_secs(10),
    };

    elevation::ensure_surface_elevation(domain, run, &store_root, &client, &policy).await?;

    let filter = VariableFilter {
        only: args.only_variables.clone(),
        surface_only: args.surface_level && !args.upper_level,
        upper_only: args.upper_level && !args.surface_level,
    };
    let config = SchedulerConfig {
        domain,
        run,
        download_dir: download_dir.clone(),
        filter,
        skip_existing: args.skip_existing,
        max_forecast_hour: args.max_forecast_hour,
        second_flush: args.second_flush,
    };

    let scheduler = Scheduler::new(config, client.clone(), policy.clone());
    let mut handles = scheduler.run().await?;

    // Precipitation probability is aggregated from the 0.25° ensemble
    // members in a separate pass.
    if domain == Domain::Gfs025Ens {
        let mut hours = domain.forecast_hours(run.hour(), args.second_flush);
        if let Some(max) = args.max_forecast_hour {
            hours.retain(|&h| h <= max);
        }
        let mut aggregator = EnsembleProbability::new(
            domain,
            run,
            &download_dir,
            client.clone(),
            policy.clone(),
            args.skip_existing,
        );
        handles.extend(aggregator.run(&hours).await?);
    }

    let store = OmStore::new(&store_root);
    transpose::transpose_run(domain, run, store, handles, args.concurrent).await?;

    if args.create_netcdf {
        info!("netCDF debug dump requested; produced by external tooling");
    }

    if let Some(bucket) = &args.upload_s3_bucket {
        upload::upload_store(bucket, domain.name(), &store_root).await?;
    }

    info!(domain = %domain, run = %run, "Run complete");
    Ok(())
}
