use crate::errors::FetchError;
use crate::util;
use log::debug;
use reqwest::Client;
use serde_json::Value;
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// 适配器共用的 HTTP 客户端，带超时与请求间隔限制
pub struct HttpClient {
    client: Client,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl HttpClient {
    pub fn new(timeout: Duration, min_interval: Duration) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36")
            .build()
            .map_err(FetchError::Request)?;

        Ok(Self {
            client,
            min_interval,
            last_request: Mutex::new(None),
        })
    }

    /// 等待请求频率限制
    async fn wait_for_rate_limit(&self) {
        let now = Instant::now();
        let should_wait = {
            let mut last = match self.last_request.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            // last 记录上一次请求的计划发出时刻
            let should_wait = last
                .map(|instant| (instant + self.min_interval).saturating_duration_since(now))
                .filter(|wait| !wait.is_zero());
            *last = Some(now + should_wait.unwrap_or_default());
            should_wait
        };

        if let Some(wait_time) = should_wait {
            debug!("等待 {:?} 以遵守频率限制", wait_time);
            tokio::time::sleep(wait_time).await;
        }
    }

    /// GET 文本，非 2xx 状态视为瞬时错误
    pub async fn get_text(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<String, FetchError> {
        self.wait_for_rate_limit().await;

        let mut request = self.client.get(url).query(query);
        if let Some(referer) = referer {
            request = request.header("Referer", referer);
        }
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await?;
        debug!("{} 返回 {} 字节", url, text.len());
        Ok(text)
    }

    /// GET 并解析 JSON，自动去掉 JSONP 包装
    pub async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        referer: Option<&str>,
    ) -> Result<Value, FetchError> {
        let text = self.get_text(url, query, referer).await?;
        let json: Value = serde_json::from_str(util::strip_jsonp(&text))?;
        Ok(json)
    }
}
