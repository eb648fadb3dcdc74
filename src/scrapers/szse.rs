use crate::errors::FetchError;
use crate::models::dataset::CALENDAR;
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::http::HttpClient;
use crate::util;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use serde_json::Value;
use std::sync::Arc;

const MONTH_LIST_URL: &str = "https://www.szse.cn/api/report/exchange/onepersistenthour/monthList";

/// 深交所交易日历，一次返回目标日期所在整月
pub struct CalendarFetcher {
    client: Arc<HttpClient>,
}

impl CalendarFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// 解析 `data[{jyrq, jybz}]`，`jybz` 为 "1" 表示交易日
pub fn parse_calendar(json: &Value) -> Result<FetchResult, FetchError> {
    let days = json
        .get("data")
        .and_then(|d| d.as_array())
        .ok_or_else(|| FetchError::Decode("calendar response has no data array".to_string()))?;

    let mut rows = Vec::with_capacity(days.len());
    for day in days {
        let date = day
            .get("jyrq")
            .and_then(|d| d.as_str())
            .and_then(util::parse_upstream_date)
            .ok_or_else(|| FetchError::Decode(format!("invalid calendar entry: {}", day)))?;
        let trading = match day.get("jybz") {
            Some(Value::String(flag)) => Some(flag == "1"),
            Some(Value::Number(flag)) => flag.as_i64().map(|f| f == 1),
            _ => None,
        };
        rows.push(vec![Cell::Date(date), Cell::integer(trading.map(i64::from))]);
    }
    rows.sort_by_key(|row| match row[0] {
        Cell::Date(d) => Some(d),
        _ => None,
    });
    build_batch(CALENDAR.columns, &rows)
}

#[async_trait]
impl MarketFetcher for CalendarFetcher {
    fn source(&self) -> &'static str {
        "szse-calendar"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        let month = date.format("%Y-%m").to_string();
        info!("开始获取深交所 {} 交易日历", month);

        let json = self
            .client
            .get_json(
                MONTH_LIST_URL,
                &[("month", month.as_str())],
                Some("https://www.szse.cn/aboutus/calendar/"),
            )
            .await?;
        let batch = parse_calendar(&json)?;
        info!("获取到 {} 天的日历记录", batch.num_rows());
        Ok(batch)
    }
}
