use crate::config::Config;
use crate::errors::{FetchError, RetryError};
use log::{debug, error, warn};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// 有界重试与指数退避
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.max_attempts, config.base_delay)
    }

    /// 第 `attempt` 次失败后的等待时间：`base_delay * 2^(attempt-1)`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }
}

/// 执行一次逻辑抓取，瞬时错误按策略重试
///
/// 每次尝试前检查取消信号，退避等待期间取消会立即返回，不会再发起新的尝试。
pub async fn run_with_retry<T, F, Fut>(
    dataset: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, RetryError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled {
                dataset: dataset.to_string(),
                attempts: attempt,
            });
        }

        attempt += 1;
        debug!("{} 第 {}/{} 次抓取", dataset, attempt, max_attempts);

        let cause = match operation().await {
            Ok(value) => return Ok(value),
            Err(FetchError::NonTradingDay { date }) => {
                return Err(RetryError::NonTradingDay {
                    dataset: dataset.to_string(),
                    date,
                })
            }
            Err(e) if !e.is_transient() => {
                error!("{} 抓取出现不可重试的错误: {}", dataset, e);
                return Err(RetryError::Aborted {
                    dataset: dataset.to_string(),
                    cause: e,
                });
            }
            Err(e) => e,
        };

        if attempt >= max_attempts {
            error!("{} 在 {} 次尝试后仍失败: {}", dataset, attempt, cause);
            return Err(RetryError::Exhausted {
                dataset: dataset.to_string(),
                attempts: attempt,
                last_cause: cause,
            });
        }

        let delay = policy.delay_for(attempt);
        warn!(
            "{} 第 {} 次抓取失败，{:?} 后重试（剩余 {} 次）: {}",
            dataset,
            attempt,
            delay,
            max_attempts - attempt,
            cause
        );

        tokio::select! {
            _ = cancel.cancelled() => {
                return Err(RetryError::Cancelled {
                    dataset: dataset.to_string(),
                    attempts: attempt,
                });
            }
            _ = tokio::time::sleep(delay) => {}
        }
    }
}
