use egostrategy_review::config::Config;
use egostrategy_review::models::dataset::{find_builtin, ALL_DATASETS};
use egostrategy_review::scrapers::{self, HttpClient};
use egostrategy_review::services::Orchestrator;
use egostrategy_review::store::{export, MarketStore, RowFilter};
use egostrategy_review::util;

use anyhow::{bail, Context};
use chrono_tz::Asia::Shanghai;
use clap::{App, Arg, ArgMatches, SubCommand};
use log::{info, warn};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const DEFAULT_DB: &str = "data/review.sqlite";

fn db_arg<'a>() -> Arg<'a> {
    Arg::with_name("db")
        .long("db")
        .value_name("PATH")
        .help("SQLite database path")
        .takes_value(true)
        .default_value(DEFAULT_DB)
}

fn dataset_arg<'a>() -> Arg<'a> {
    Arg::with_name("dataset")
        .long("dataset")
        .value_name("NAME")
        .help("Dataset name, e.g. indices, breadth, calendar")
        .required(true)
        .takes_value(true)
}

fn parse_opt<T>(matches: &ArgMatches, name: &str) -> anyhow::Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    matches
        .value_of(name)
        .map(|v| v.parse::<T>().with_context(|| format!("invalid --{}: {}", name, v)))
        .transpose()
}

fn open_store(matches: &ArgMatches) -> anyhow::Result<MarketStore> {
    let db = matches.value_of("db").unwrap_or(DEFAULT_DB);
    MarketStore::open(db, &ALL_DATASETS).with_context(|| format!("failed to open {}", db))
}

fn dataset_name<'a>(matches: &'a ArgMatches) -> anyhow::Result<&'a str> {
    let name = matches.value_of("dataset").unwrap_or_default();
    if find_builtin(name).is_none() {
        bail!("Unknown dataset: {}", name);
    }
    Ok(name)
}

async fn ingest(matches: &ArgMatches, today: &str) -> anyhow::Result<bool> {
    let date = util::parse_iso_date(matches.value_of("date").unwrap_or(today))?;

    let mut config = Config::new().with_store_location(matches.value_of("db").unwrap_or(DEFAULT_DB));
    if let Some(n) = parse_opt::<u32>(matches, "max-attempts")? {
        config = config.with_max_attempts(n);
    }
    if let Some(secs) = parse_opt::<f64>(matches, "base-delay")? {
        let delay = Duration::try_from_secs_f64(secs).context("invalid --base-delay")?;
        config = config.with_base_delay(delay);
    }
    if let Some(tolerance) = parse_opt::<f64>(matches, "null-tolerance")? {
        config = config.with_null_tolerance(tolerance);
    }
    if let Some(n) = parse_opt::<usize>(matches, "concurrency")? {
        config = config.with_concurrency(n);
    }
    if let Some(dir) = matches.value_of("snapshot-dir") {
        config = config.with_snapshot_dir(dir);
    }
    config.validate()?;

    let client = Arc::new(HttpClient::new(config.request_timeout, config.request_interval)?);
    let registry = scrapers::default_registry(client)?;
    let store = Arc::new(MarketStore::open(&config.store_location, &ALL_DATASETS)?);
    let orchestrator = Orchestrator::new(&config, registry, store)?;

    let cancel = CancellationToken::new();
    {
        let token = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("收到中断信号，停止发起新的请求");
                token.cancel();
            }
        });
    }
    if let Some(secs) = parse_opt::<u64>(matches, "deadline-secs")? {
        let token = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            warn!("超过 {} 秒截止时间，取消剩余任务", secs);
            token.cancel();
        });
    }

    let summary = orchestrator.run_with_cancel(date, &cancel).await;
    if matches.is_present("json") {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print!("{}", summary);
    }
    Ok(!summary.has_failures())
}

fn show(matches: &ArgMatches) -> anyhow::Result<()> {
    let dataset = dataset_name(matches)?;
    let store = open_store(matches)?;
    let filter = match matches.value_of("date") {
        Some(d) => RowFilter::on_date(util::parse_iso_date(d)?),
        None => RowFilter::all(),
    };
    let batch = store.read(dataset, &filter)?;
    info!("{} 共 {} 行", dataset, batch.num_rows());

    let stdout = std::io::stdout();
    export::write_json_lines(&batch, stdout.lock())?;
    Ok(())
}

fn export_table(matches: &ArgMatches) -> anyhow::Result<()> {
    let dataset = dataset_name(matches)?;
    let out = matches.value_of("out").unwrap_or_default();
    let store = open_store(matches)?;
    let batch = store.read(dataset, &RowFilter::all())?;
    export::write_arrow(&batch, Path::new(out))?;
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logger
    env_logger::init();

    let today = chrono::Utc::now()
        .with_timezone(&Shanghai)
        .format("%Y-%m-%d")
        .to_string();

    let app = App::new("EgoStrategy Review")
        .version(env!("CARGO_PKG_VERSION"))
        .about("A股每日复盘数据采集：抓取、校验并落库")
        .subcommand(
            SubCommand::with_name("ingest")
                .about("Fetch, validate and persist every dataset for one trading date")
                .arg(
                    Arg::with_name("date")
                        .short('d')
                        .long("date")
                        .value_name("DATE")
                        .help("Trading date (YYYY-MM-DD), defaults to today in Asia/Shanghai")
                        .takes_value(true),
                )
                .arg(db_arg())
                .arg(
                    Arg::with_name("max-attempts")
                        .long("max-attempts")
                        .value_name("N")
                        .help("Fetch attempts per dataset")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("base-delay")
                        .long("base-delay")
                        .value_name("SECS")
                        .help("Backoff before the second attempt, doubled after each failure")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("null-tolerance")
                        .long("null-tolerance")
                        .value_name("RATIO")
                        .help("Default null ratio allowed in required columns")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("concurrency")
                        .long("concurrency")
                        .value_name("N")
                        .help("Datasets processed at the same time")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("snapshot-dir")
                        .long("snapshot-dir")
                        .value_name("DIR")
                        .help("Also write each persisted dataset as an Arrow file")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("deadline-secs")
                        .long("deadline-secs")
                        .value_name("SECS")
                        .help("Stop starting new attempts after this many seconds")
                        .takes_value(true),
                )
                .arg(
                    Arg::with_name("json")
                        .long("json")
                        .help("Print the run summary as JSON")
                        .takes_value(false),
                ),
        )
        .subcommand(
            SubCommand::with_name("show")
                .about("Print stored rows as JSON lines")
                .arg(dataset_arg())
                .arg(
                    Arg::with_name("date")
                        .short('d')
                        .long("date")
                        .value_name("DATE")
                        .help("Only rows of this date (YYYY-MM-DD)")
                        .takes_value(true),
                )
                .arg(db_arg()),
        )
        .subcommand(
            SubCommand::with_name("export")
                .about("Export a stored table to an Arrow IPC file")
                .arg(dataset_arg())
                .arg(
                    Arg::with_name("out")
                        .short('o')
                        .long("out")
                        .value_name("FILE")
                        .help("Output .arrow file")
                        .required(true)
                        .takes_value(true),
                )
                .arg(db_arg()),
        );

    let matches = app.get_matches();

    if let Some(matches) = matches.subcommand_matches("ingest") {
        if !ingest(matches, &today).await? {
            std::process::exit(1);
        }
    } else if let Some(matches) = matches.subcommand_matches("show") {
        show(matches)?;
    } else if let Some(matches) = matches.subcommand_matches("export") {
        export_table(matches)?;
    } else {
        info!("No command specified. Use --help for usage information.");
    }

    Ok(())
}
