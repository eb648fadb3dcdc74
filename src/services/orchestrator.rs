use crate::config::Config;
use crate::errors::{RetryError, Result};
use crate::models::summary::{DatasetOutcome, DatasetState, RunSummary};
use crate::models::table::FetchResult;
use crate::registry::{DatasetEntry, DatasetRegistry};
use crate::services::retry::{run_with_retry, RetryPolicy};
use crate::services::validator::Validator;
use crate::store::{export, MarketStore};
use crate::util;
use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use log::{debug, error, info, warn};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// 单个数据集的处理过程，记录状态迁移
struct DatasetRun {
    dataset: &'static str,
    state: DatasetState,
    attempts: u32,
}

impl DatasetRun {
    fn new(dataset: &'static str) -> Self {
        Self {
            dataset,
            state: DatasetState::Pending,
            attempts: 0,
        }
    }

    fn transition(&mut self, next: DatasetState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "{}: illegal transition {} -> {}",
            self.dataset,
            self.state,
            next
        );
        debug!("{}: {} -> {}", self.dataset, self.state, next);
        self.state = next;
    }

    fn finish(mut self, state: DatasetState, reason: Option<String>, rows: usize) -> DatasetOutcome {
        self.transition(state);
        DatasetOutcome {
            dataset: self.dataset.to_string(),
            state: self.state,
            reason,
            attempts: self.attempts,
            rows,
        }
    }

    fn cancelled(self) -> DatasetOutcome {
        self.finish(DatasetState::Cancelled, Some("Cancelled".to_string()), 0)
    }
}

/// 编排一次采集：按声明顺序对每个数据集执行 抓取 -> 校验 -> 落库
///
/// 单个数据集的失败只记录在汇总里，不影响其他数据集。
pub struct Orchestrator {
    registry: DatasetRegistry,
    store: Arc<MarketStore>,
    policy: RetryPolicy,
    validator: Validator,
    concurrency: usize,
    snapshot_dir: Option<PathBuf>,
}

impl Orchestrator {
    pub fn new(config: &Config, registry: DatasetRegistry, store: Arc<MarketStore>) -> Result<Self> {
        config.validate()?;
        let registry = registry.with_tolerance_overrides(&config.null_tolerance_overrides)?;
        // 每个数据集都必须已在存储中建表
        for descriptor in registry.descriptors() {
            store.descriptor(descriptor.name)?;
        }

        Ok(Self {
            registry,
            store,
            policy: RetryPolicy::from_config(config),
            validator: Validator::new(config.null_tolerance),
            concurrency: config.concurrency,
            snapshot_dir: config.snapshot_dir.clone(),
        })
    }

    /// 解析 `YYYY-MM-DD` 后运行，日期无效时返回错误而不是汇总
    pub async fn run_iso(&self, date: &str) -> Result<RunSummary> {
        let date = util::parse_iso_date(date)?;
        Ok(self.run(date).await)
    }

    pub async fn run(&self, date: NaiveDate) -> RunSummary {
        self.run_with_cancel(date, &CancellationToken::new()).await
    }

    /// 先处理不依赖交易日历的数据集（日历本身），再处理其余数据集
    ///
    /// 每个阶段内按声明顺序发起抓取，因此日历声明在其他数据集之后时仍会先抓取；
    /// 汇总中的顺序始终与声明顺序一致。
    pub async fn run_with_cancel(&self, date: NaiveDate, cancel: &CancellationToken) -> RunSummary {
        info!("开始采集 {} 的复盘数据，共 {} 个数据集", date, self.registry.len());

        let entries = self.registry.entries();
        let (first, second): (Vec<usize>, Vec<usize>) =
            (0..entries.len()).partition(|&i| !entries[i].descriptor.calendar_dependent);

        let mut outcomes = Vec::with_capacity(entries.len());
        for phase in [first, second] {
            let results: Vec<(usize, DatasetOutcome)> = stream::iter(phase)
                .map(|i| async move { (i, self.process(&entries[i], date, cancel).await) })
                .buffered(self.concurrency)
                .collect()
                .await;
            outcomes.extend(results);
        }
        outcomes.sort_by_key(|(i, _)| *i);

        let summary = RunSummary {
            date,
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        };
        if summary.has_failures() {
            warn!("{}", summary);
        } else {
            info!("{}", summary);
        }
        summary
    }

    async fn process(&self, entry: &DatasetEntry, date: NaiveDate, cancel: &CancellationToken) -> DatasetOutcome {
        let descriptor = &entry.descriptor;
        let mut run = DatasetRun::new(descriptor.name);

        if cancel.is_cancelled() {
            return run.cancelled();
        }

        if descriptor.calendar_dependent {
            match self.store.is_trading_day(&date) {
                Ok(Some(false)) => {
                    info!("{} 非交易日，跳过 {}", date, descriptor.name);
                    return run.finish(DatasetState::Skipped, Some("NonTradingDay".to_string()), 0);
                }
                Ok(_) => {}
                Err(e) => warn!("查询交易日历失败，继续抓取 {}: {}", descriptor.name, e),
            }
        }

        run.transition(DatasetState::Fetching);
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let target = &date;
        let fetched = run_with_retry(descriptor.name, &self.policy, cancel, || {
            calls.fetch_add(1, Ordering::SeqCst);
            entry.fetcher.fetch(target)
        })
        .await;
        run.attempts = counter.load(Ordering::SeqCst);

        let batch = match fetched {
            Ok(batch) => batch,
            Err(RetryError::Exhausted {
                attempts, last_cause, ..
            }) => {
                let reason = format!("FetchExhausted(attempts={}): {}", attempts, last_cause);
                return run.finish(DatasetState::FetchFailed, Some(reason), 0);
            }
            Err(RetryError::Aborted { cause, .. }) => {
                return run.finish(DatasetState::FetchFailed, Some(format!("Aborted: {}", cause)), 0);
            }
            Err(RetryError::NonTradingDay { .. }) => {
                return run.finish(DatasetState::Skipped, Some("NonTradingDay".to_string()), 0);
            }
            Err(RetryError::Cancelled { .. }) => return run.cancelled(),
        };
        run.transition(DatasetState::Fetched);
        debug!("{} 来自 {}，{} 行", descriptor.name, entry.fetcher.source(), batch.num_rows());

        if cancel.is_cancelled() {
            return run.cancelled();
        }
        run.transition(DatasetState::Validating);
        let batch = match self.validator.validate(batch, descriptor) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("{} 校验失败: {}", descriptor.name, e);
                return run.finish(DatasetState::Invalid, Some(e.reason_string()), 0);
            }
        };
        run.transition(DatasetState::Valid);

        if cancel.is_cancelled() {
            return run.cancelled();
        }
        run.transition(DatasetState::Persisting);
        let rows = match self.store.upsert(descriptor.name, &batch, descriptor.natural_key) {
            Ok(rows) => rows,
            Err(e) => {
                error!("{} 落库失败: {}", descriptor.name, e);
                return run.finish(DatasetState::PersistFailed, Some(format!("PersistError: {}", e)), 0);
            }
        };

        self.write_snapshot(descriptor.name, &date, &batch);
        info!("{} 已写入 {} 行", descriptor.name, rows);
        run.finish(DatasetState::Persisted, None, rows)
    }

    /// 快照失败只记录日志，不影响数据集状态
    fn write_snapshot(&self, dataset: &str, date: &NaiveDate, batch: &FetchResult) {
        if let Some(dir) = &self.snapshot_dir {
            let path = export::snapshot_path(dir, dataset, date);
            if let Err(e) = export::write_arrow(batch, &path) {
                warn!("写入快照 {} 失败: {}", path.display(), e);
            }
        }
    }
}
