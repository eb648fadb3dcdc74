use chrono::NaiveDate;
use std::fmt;
use thiserror::Error;

/// 抓取适配器的失败类型
///
/// `Request`/`Status`/`Json`/`Decode` 视为瞬时错误，由重试控制器重试；
/// `NonTradingDay` 与 `Internal` 不会被重试。
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("HTTP request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("upstream returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("{date} is not a trading day")]
    NonTradingDay { date: NaiveDate },

    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// 是否允许重试
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Request(_)
                | FetchError::Status { .. }
                | FetchError::Json(_)
                | FetchError::Decode(_)
        )
    }
}

// 用于从字符串创建解码错误
impl From<String> for FetchError {
    fn from(s: String) -> Self {
        FetchError::Decode(s)
    }
}

impl From<&str> for FetchError {
    fn from(s: &str) -> Self {
        FetchError::Decode(s.to_string())
    }
}

/// 重试控制器的最终失败
#[derive(Error, Debug)]
pub enum RetryError {
    #[error("{dataset}: fetch exhausted after {attempts} attempts: {last_cause}")]
    Exhausted {
        dataset: String,
        attempts: u32,
        last_cause: FetchError,
    },

    #[error("{dataset}: {date} is not a trading day")]
    NonTradingDay { dataset: String, date: NaiveDate },

    #[error("{dataset}: aborted: {cause}")]
    Aborted { dataset: String, cause: FetchError },

    #[error("{dataset}: cancelled after {attempts} attempts")]
    Cancelled { dataset: String, attempts: u32 },
}

/// 校验失败原因
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationReason {
    Empty,
    MissingColumn,
    ExcessNulls { ratio: f64, tolerance: f64 },
}

impl ValidationReason {
    /// 对外暴露的原因代码
    pub fn code(&self) -> &'static str {
        match self {
            ValidationReason::Empty => "empty",
            ValidationReason::MissingColumn => "missing_column",
            ValidationReason::ExcessNulls { .. } => "excess_nulls",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    pub dataset: String,
    pub column: Option<String>,
    pub reason: ValidationReason,
}

impl ValidationError {
    /// 摘要中使用的原因字符串，例如 `excess_nulls(column=volume, ratio=1.0000, tolerance=0.0000)`
    pub fn reason_string(&self) -> String {
        match (&self.reason, &self.column) {
            (ValidationReason::ExcessNulls { ratio, tolerance }, Some(column)) => format!(
                "excess_nulls(column={}, ratio={:.4}, tolerance={:.4})",
                column, ratio, tolerance
            ),
            (reason, Some(column)) => format!("{}(column={})", reason.code(), column),
            (reason, None) => reason.code().to_string(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.dataset, self.reason_string())
    }
}

impl std::error::Error for ValidationError {}

/// 持久化层错误
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Arrow error: {0}")]
    Arrow(String),

    #[error("unknown table: {0}")]
    UnknownTable(String),

    #[error("table {table} has no column {column}")]
    UnknownColumn { table: String, column: String },

    #[error("table {table} is keyed by {declared:?}, got {given:?}")]
    KeyMismatch {
        table: String,
        declared: Vec<String>,
        given: Vec<String>,
    },

    #[error("batch for {table} lacks key column {column}")]
    MissingKeyColumn { table: String, column: String },

    #[error("column {column} has unsupported type {data_type}")]
    UnsupportedType { column: String, data_type: String },

    #[error("invalid table declaration: {0}")]
    InvalidDescriptor(#[from] ConfigError),

    #[error("store connection lock poisoned")]
    Poisoned,
}

impl From<arrow::error::ArrowError> for StoreError {
    fn from(e: arrow::error::ArrowError) -> Self {
        StoreError::Arrow(e.to_string())
    }
}

/// 配置或数据集声明错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("invalid option {option}: {message}")]
    InvalidOption { option: &'static str, message: String },

    #[error("dataset {dataset}: {message}")]
    InvalidDataset { dataset: String, message: String },
}

/// 顶层错误：只有配置、日期或存储获取失败会中止整次运行
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),
}

pub type Result<T> = std::result::Result<T, IngestError>;
