use async_trait::async_trait;
use chrono::NaiveDate;
use egostrategy_review::errors::FetchError;
use egostrategy_review::models::dataset::{
    DatasetDescriptor, BREADTH, CALENDAR, INDICES, MARGIN, MARKET_AMOUNT, NORTHBOUND,
};
use egostrategy_review::models::table::{build_batch, Cell, ColumnKind, FetchResult};
use egostrategy_review::store::export;
use egostrategy_review::{
    Config, DatasetEntry, DatasetRegistry, DatasetState, MarketFetcher, MarketStore, Orchestrator, RowFilter,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

type Respond = Box<dyn Fn(&NaiveDate) -> Result<FetchResult, FetchError> + Send + Sync>;

/// 测试用适配器：记录调用次数，可选延迟
struct StubFetcher {
    calls: AtomicU32,
    delay: Duration,
    respond: Respond,
}

impl StubFetcher {
    fn new(respond: Respond) -> Arc<Self> {
        Self::delayed(Duration::ZERO, respond)
    }

    fn delayed(delay: Duration, respond: Respond) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            delay,
            respond,
        })
    }

    fn full(descriptor: DatasetDescriptor) -> Arc<Self> {
        Self::new(Box::new(move |date: &NaiveDate| full_batch(&descriptor, date)))
    }

    fn unavailable() -> Arc<Self> {
        Self::new(Box::new(|_: &NaiveDate| {
            Err(FetchError::Status {
                status: 503,
                url: "http://upstream.invalid/api".to_string(),
            })
        }))
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketFetcher for StubFetcher {
    fn source(&self) -> &'static str {
        "stub"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        (self.respond)(date)
    }
}

fn date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
}

/// 每列都有值的一行
fn full_batch(descriptor: &DatasetDescriptor, date: &NaiveDate) -> Result<FetchResult, FetchError> {
    let row: Vec<Cell> = descriptor
        .columns
        .iter()
        .map(|c| match c.kind {
            ColumnKind::Date => Cell::Date(*date),
            ColumnKind::Text => Cell::from("sh000001"),
            ColumnKind::Real => Cell::Real(1.5),
            ColumnKind::Integer => Cell::Integer(1),
        })
        .collect();
    build_batch(descriptor.columns, &[row])
}

fn calendar_batch(date: &NaiveDate, trading: bool) -> Result<FetchResult, FetchError> {
    build_batch(
        CALENDAR.columns,
        &[vec![Cell::Date(*date), Cell::Integer(i64::from(trading))]],
    )
}

fn config() -> Config {
    Config::new()
        .with_store_location(":memory:")
        .with_base_delay(Duration::from_secs(1))
}

fn orchestrator(config: &Config, entries: Vec<DatasetEntry>) -> (Orchestrator, Arc<MarketStore>) {
    let registry = DatasetRegistry::new(entries).unwrap();
    let store = Arc::new(MarketStore::open_in_memory(&registry.descriptors()).unwrap());
    let orchestrator = Orchestrator::new(config, registry, store.clone()).unwrap();
    (orchestrator, store)
}

#[tokio::test(start_paused = true)]
async fn one_failing_dataset_does_not_affect_the_others() {
    let failing = StubFetcher::unavailable();
    let entries = vec![
        DatasetEntry::new(INDICES, StubFetcher::full(INDICES)),
        DatasetEntry::new(MARKET_AMOUNT, StubFetcher::full(MARKET_AMOUNT)),
        DatasetEntry::new(BREADTH, failing.clone()),
        DatasetEntry::new(NORTHBOUND, StubFetcher::full(NORTHBOUND)),
        DatasetEntry::new(MARGIN, StubFetcher::full(MARGIN)),
    ];
    let (orchestrator, store) = orchestrator(&config(), entries);

    let summary = orchestrator.run(date()).await;

    let states: Vec<(&str, DatasetState)> = summary
        .outcomes
        .iter()
        .map(|o| (o.dataset.as_str(), o.state))
        .collect();
    assert_eq!(
        states,
        vec![
            ("indices", DatasetState::Persisted),
            ("market_amount", DatasetState::Persisted),
            ("breadth", DatasetState::FetchFailed),
            ("northbound", DatasetState::Persisted),
            ("margin", DatasetState::Persisted),
        ]
    );

    let breadth = summary.outcome("breadth").unwrap();
    assert_eq!(failing.calls(), 3);
    assert_eq!(breadth.attempts, 3);
    assert!(breadth
        .reason
        .as_deref()
        .unwrap()
        .starts_with("FetchExhausted(attempts=3)"));
    assert_eq!(store.count("breadth").unwrap(), 0);
    assert_eq!(store.count("northbound").unwrap(), 1);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn excess_nulls_are_reported_and_nothing_is_written() {
    const STRICT_INDICES: DatasetDescriptor = DatasetDescriptor {
        required: &["date", "symbol", "close", "volume"],
        null_tolerance: Some(0.0),
        ..INDICES
    };
    let fetcher = StubFetcher::new(Box::new(|date: &NaiveDate| {
        let mut row = full_batch_row(date);
        // volume
        row[7] = Cell::Null;
        build_batch(INDICES.columns, &[row])
    }));
    let (orchestrator, store) = orchestrator(&config(), vec![DatasetEntry::new(STRICT_INDICES, fetcher)]);

    let summary = orchestrator.run_iso("2024-01-02").await.unwrap();

    let outcome = summary.outcome("indices").unwrap();
    assert_eq!(outcome.state, DatasetState::Invalid);
    let reason = outcome.reason.as_deref().unwrap();
    assert!(reason.starts_with("excess_nulls(column=volume"), "{}", reason);
    assert_eq!(store.count("indices").unwrap(), 0);
}

fn full_batch_row(date: &NaiveDate) -> Vec<Cell> {
    vec![
        Cell::Date(*date),
        Cell::from("sh000001"),
        Cell::from("上证指数"),
        Cell::Real(2962.28),
        Cell::Real(2972.78),
        Cell::Real(2976.27),
        Cell::Real(2962.28),
        Cell::Real(313418848.0),
        Cell::Real(3.4e11),
        Cell::Real(-0.43),
    ]
}

#[tokio::test]
async fn closed_calendar_day_skips_dependent_datasets() {
    let calendar = StubFetcher::new(Box::new(|date: &NaiveDate| calendar_batch(date, false)));
    let indices = StubFetcher::full(INDICES);
    let entries = vec![
        DatasetEntry::new(INDICES, indices.clone()),
        DatasetEntry::new(CALENDAR, calendar.clone()),
    ];
    let (orchestrator, store) = orchestrator(&config(), entries);

    let summary = orchestrator.run(date()).await;

    assert_eq!(summary.outcome("calendar").unwrap().state, DatasetState::Persisted);
    let skipped = summary.outcome("indices").unwrap();
    assert_eq!(skipped.state, DatasetState::Skipped);
    assert_eq!(skipped.reason.as_deref(), Some("NonTradingDay"));
    assert_eq!(indices.calls(), 0);
    assert!(!summary.has_failures());
    assert_eq!(store.is_trading_day(&date()).unwrap(), Some(false));

    // 汇总仍按声明顺序
    assert_eq!(summary.outcomes[0].dataset, "indices");
}

#[tokio::test(start_paused = true)]
async fn unknown_calendar_day_is_fetched_normally() {
    let entries = vec![
        DatasetEntry::new(CALENDAR, StubFetcher::unavailable()),
        DatasetEntry::new(INDICES, StubFetcher::full(INDICES)),
    ];
    let (orchestrator, _store) = orchestrator(&config(), entries);

    let summary = orchestrator.run(date()).await;

    assert_eq!(summary.outcome("calendar").unwrap().state, DatasetState::FetchFailed);
    assert_eq!(summary.outcome("indices").unwrap().state, DatasetState::Persisted);
}

#[tokio::test(start_paused = true)]
async fn concurrent_runs_keep_declaration_order() {
    let entries = vec![
        DatasetEntry::new(
            INDICES,
            StubFetcher::delayed(Duration::from_secs(3), Box::new(|d: &NaiveDate| full_batch(&INDICES, d))),
        ),
        DatasetEntry::new(
            MARKET_AMOUNT,
            StubFetcher::delayed(Duration::from_secs(2), Box::new(|d: &NaiveDate| full_batch(&MARKET_AMOUNT, d))),
        ),
        DatasetEntry::new(
            NORTHBOUND,
            StubFetcher::delayed(Duration::from_secs(1), Box::new(|d: &NaiveDate| full_batch(&NORTHBOUND, d))),
        ),
    ];
    let (orchestrator, _store) = orchestrator(&config().with_concurrency(3), entries);

    let started = tokio::time::Instant::now();
    let summary = orchestrator.run(date()).await;

    let names: Vec<&str> = summary.outcomes.iter().map(|o| o.dataset.as_str()).collect();
    assert_eq!(names, vec!["indices", "market_amount", "northbound"]);
    assert_eq!(summary.count(DatasetState::Persisted), 3);
    // 三个数据集同时进行
    assert!(started.elapsed() < Duration::from_secs(6));
}

#[tokio::test]
async fn cancelled_run_makes_no_attempts() {
    let indices = StubFetcher::full(INDICES);
    let (orchestrator, store) = orchestrator(&config(), vec![DatasetEntry::new(INDICES, indices.clone())]);
    let token = CancellationToken::new();
    token.cancel();

    let summary = orchestrator.run_with_cancel(date(), &token).await;

    let outcome = summary.outcome("indices").unwrap();
    assert_eq!(outcome.state, DatasetState::Cancelled);
    assert_eq!(outcome.attempts, 0);
    assert_eq!(indices.calls(), 0);
    assert_eq!(store.count("indices").unwrap(), 0);
}

#[tokio::test]
async fn rerunning_a_date_replaces_rows_and_writes_snapshots() {
    let dir = tempfile::tempdir().unwrap();
    let config = config().with_snapshot_dir(dir.path().to_str().unwrap());
    let (orchestrator, store) = orchestrator(&config, vec![DatasetEntry::new(INDICES, StubFetcher::full(INDICES))]);

    orchestrator.run(date()).await;
    let summary = orchestrator.run(date()).await;

    assert_eq!(summary.outcome("indices").unwrap().rows, 1);
    assert_eq!(store.count("indices").unwrap(), 1);
    let stored = store.read("indices", &RowFilter::on_date(date())).unwrap();
    assert_eq!(stored.num_rows(), 1);

    let path = export::snapshot_path(dir.path(), "indices", &date());
    let snapshot = export::read_arrow(&path).unwrap();
    assert_eq!(snapshot.iter().map(|b| b.num_rows()).sum::<usize>(), 1);
}

#[tokio::test]
async fn invalid_inputs_are_errors_not_summaries() {
    let (orchestrator, _store) = orchestrator(&config(), vec![DatasetEntry::new(INDICES, StubFetcher::full(INDICES))]);
    assert!(orchestrator.run_iso("2024-02-30").await.is_err());

    let registry = DatasetRegistry::new(vec![DatasetEntry::new(INDICES, StubFetcher::full(INDICES))]).unwrap();
    let store = Arc::new(MarketStore::open_in_memory(&[INDICES]).unwrap());
    let overridden = config().with_dataset_null_tolerance("etf_flows", 0.2);
    assert!(Orchestrator::new(&overridden, registry, store).is_err());

    // 数据集未在存储中建表
    let registry = DatasetRegistry::new(vec![DatasetEntry::new(MARGIN, StubFetcher::full(MARGIN))]).unwrap();
    let store = Arc::new(MarketStore::open_in_memory(&[INDICES]).unwrap());
    assert!(Orchestrator::new(&config(), registry, store).is_err());
}

#[tokio::test]
async fn rejected_write_is_persist_failed_and_leaves_no_rows() {
    const LENIENT_INDICES: DatasetDescriptor = DatasetDescriptor {
        null_tolerance: Some(1.0),
        ..INDICES
    };
    let fetcher = StubFetcher::new(Box::new(|date: &NaiveDate| {
        let healthy = full_batch_row(date);
        let mut keyless = full_batch_row(date);
        // symbol 是主键列
        keyless[1] = Cell::Null;
        build_batch(INDICES.columns, &[healthy, keyless])
    }));
    let entries = vec![
        DatasetEntry::new(LENIENT_INDICES, fetcher),
        DatasetEntry::new(NORTHBOUND, StubFetcher::full(NORTHBOUND)),
    ];
    let (orchestrator, store) = orchestrator(&config(), entries);

    let summary = orchestrator.run(date()).await;

    let outcome = summary.outcome("indices").unwrap();
    assert_eq!(outcome.state, DatasetState::PersistFailed);
    assert!(outcome.reason.as_deref().unwrap().starts_with("PersistError: "));
    assert_eq!(outcome.rows, 0);
    assert_eq!(store.count("indices").unwrap(), 0);

    assert_eq!(summary.outcome("northbound").unwrap().state, DatasetState::Persisted);
    assert_eq!(store.count("northbound").unwrap(), 1);
    assert!(summary.has_failures());
}

#[tokio::test(start_paused = true)]
async fn adapter_reported_closed_day_is_skipped_after_one_call() {
    let fetcher = StubFetcher::new(Box::new(|date: &NaiveDate| {
        Err(FetchError::NonTradingDay { date: *date })
    }));
    let (orchestrator, store) = orchestrator(&config(), vec![DatasetEntry::new(BREADTH, fetcher.clone())]);

    let summary = orchestrator.run(date()).await;

    let outcome = summary.outcome("breadth").unwrap();
    assert_eq!(outcome.state, DatasetState::Skipped);
    assert_eq!(outcome.reason.as_deref(), Some("NonTradingDay"));
    assert_eq!(outcome.attempts, 1);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(store.count("breadth").unwrap(), 0);
    assert!(!summary.has_failures());
}

#[tokio::test(start_paused = true)]
async fn internal_adapter_error_is_aborted_without_retry() {
    let fetcher = StubFetcher::new(Box::new(|_: &NaiveDate| {
        Err(FetchError::Internal("cell does not fit column close".to_string()))
    }));
    let (orchestrator, store) = orchestrator(&config(), vec![DatasetEntry::new(MARGIN, fetcher.clone())]);

    let summary = orchestrator.run(date()).await;

    let outcome = summary.outcome("margin").unwrap();
    assert_eq!(outcome.state, DatasetState::FetchFailed);
    let reason = outcome.reason.as_deref().unwrap();
    assert!(reason.starts_with("Aborted: "), "{}", reason);
    assert_eq!(outcome.attempts, 1);
    assert_eq!(fetcher.calls(), 1);
    assert_eq!(store.count("margin").unwrap(), 0);
}
