use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;

/// 单个数据集在一次运行中的状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DatasetState {
    Pending,
    Fetching,
    Fetched,
    FetchFailed,
    Validating,
    Valid,
    Invalid,
    Persisting,
    Persisted,
    PersistFailed,
    /// 非交易日，属预期结果
    Skipped,
    Cancelled,
}

impl DatasetState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DatasetState::FetchFailed
                | DatasetState::Invalid
                | DatasetState::Persisted
                | DatasetState::PersistFailed
                | DatasetState::Skipped
                | DatasetState::Cancelled
        )
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DatasetState::FetchFailed | DatasetState::Invalid | DatasetState::PersistFailed
        )
    }

    /// 状态机允许的迁移
    pub fn can_transition_to(&self, next: DatasetState) -> bool {
        use DatasetState::*;
        match (*self, next) {
            (_, Cancelled) => !self.is_terminal(),
            (Pending, Fetching) | (Pending, Skipped) => true,
            (Fetching, Fetched) | (Fetching, FetchFailed) | (Fetching, Skipped) => true,
            (Fetched, Validating) => true,
            (Validating, Valid) | (Validating, Invalid) => true,
            (Valid, Persisting) => true,
            (Persisting, Persisted) | (Persisting, PersistFailed) => true,
            _ => false,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetState::Pending => "PENDING",
            DatasetState::Fetching => "FETCHING",
            DatasetState::Fetched => "FETCHED",
            DatasetState::FetchFailed => "FETCH_FAILED",
            DatasetState::Validating => "VALIDATING",
            DatasetState::Valid => "VALID",
            DatasetState::Invalid => "INVALID",
            DatasetState::Persisting => "PERSISTING",
            DatasetState::Persisted => "PERSISTED",
            DatasetState::PersistFailed => "PERSIST_FAILED",
            DatasetState::Skipped => "SKIPPED",
            DatasetState::Cancelled => "CANCELLED",
        }
    }
}

impl fmt::Display for DatasetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 单个数据集的最终结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetOutcome {
    pub dataset: String,
    pub state: DatasetState,
    pub reason: Option<String>,
    pub attempts: u32,
    pub rows: usize,
}

impl fmt::Display for DatasetOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            Some(reason) => write!(f, "{} -> {}({})", self.dataset, self.state, reason),
            None => write!(f, "{} -> {} ({} rows)", self.dataset, self.state, self.rows),
        }
    }
}

/// 一次运行的汇总，按声明顺序列出每个数据集
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub outcomes: Vec<DatasetOutcome>,
}

impl RunSummary {
    pub fn outcome(&self, dataset: &str) -> Option<&DatasetOutcome> {
        self.outcomes.iter().find(|o| o.dataset == dataset)
    }

    pub fn failures(&self) -> impl Iterator<Item = &DatasetOutcome> {
        self.outcomes.iter().filter(|o| o.state.is_failure())
    }

    pub fn has_failures(&self) -> bool {
        self.failures().next().is_some()
    }

    pub fn count(&self, state: DatasetState) -> usize {
        self.outcomes.iter().filter(|o| o.state == state).count()
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{}: {} persisted, {} skipped, {} failed",
            self.date,
            self.count(DatasetState::Persisted),
            self.count(DatasetState::Skipped),
            self.failures().count()
        )?;
        for outcome in &self.outcomes {
            writeln!(f, "  {}", outcome)?;
        }
        Ok(())
    }
}
