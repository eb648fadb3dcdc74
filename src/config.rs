use crate::errors::ConfigError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// 采集流程的全部配置，在构造时一次性传入
#[derive(Debug, Clone)]
pub struct Config {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub null_tolerance: f64,
    pub null_tolerance_overrides: HashMap<String, f64>,
    pub store_location: String,
    pub snapshot_dir: Option<PathBuf>,
    pub concurrency: usize,
    pub request_timeout: Duration,
    pub request_interval: Duration,
}

impl Config {
    pub fn new() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            null_tolerance: 0.10,
            null_tolerance_overrides: HashMap::new(),
            store_location: "data/review.sqlite".to_string(),
            snapshot_dir: None,
            concurrency: 1,
            request_timeout: Duration::from_secs(30),
            request_interval: Duration::from_millis(500),
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    pub fn with_null_tolerance(mut self, tolerance: f64) -> Self {
        self.null_tolerance = tolerance;
        self
    }

    /// 为单个数据集覆盖空值容忍度
    pub fn with_dataset_null_tolerance(mut self, dataset: &str, tolerance: f64) -> Self {
        self.null_tolerance_overrides
            .insert(dataset.to_string(), tolerance);
        self
    }

    pub fn with_store_location(mut self, location: &str) -> Self {
        self.store_location = location.to_string();
        self
    }

    pub fn with_snapshot_dir(mut self, dir: &str) -> Self {
        self.snapshot_dir = Some(PathBuf::from(dir));
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_request_interval(mut self, interval: Duration) -> Self {
        self.request_interval = interval;
        self
    }

    /// 检查配置取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::InvalidOption {
                option: "max_attempts",
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.null_tolerance) {
            return Err(ConfigError::InvalidOption {
                option: "null_tolerance",
                message: format!("{} is outside [0, 1]", self.null_tolerance),
            });
        }
        for (dataset, tolerance) in &self.null_tolerance_overrides {
            if !(0.0..=1.0).contains(tolerance) {
                return Err(ConfigError::InvalidDataset {
                    dataset: dataset.clone(),
                    message: format!("null tolerance {} is outside [0, 1]", tolerance),
                });
            }
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidOption {
                option: "concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.store_location.trim().is_empty() {
            return Err(ConfigError::InvalidOption {
                option: "store_location",
                message: "must not be empty".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}
