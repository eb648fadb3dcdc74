use crate::errors::FetchError;
use crate::models::dataset::BREADTH;
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::eastmoney::{self, PoolEntry, PoolKind};
use crate::scrapers::http::HttpClient;
use crate::util;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use chrono_tz::Asia::Shanghai;
use log::{info, warn};
use serde_json::Value;
use std::sync::Arc;

/// 沪深京 A 股列表
const A_SHARE_FS: &str = "m:0 t:6,m:0 t:80,m:1 t:2,m:1 t:23,m:0 t:81 s:2048";
const SPOT_FIELDS: &str = "f2,f3,f12,f14,f124";

/// 行情快照的交易日：取更新时间戳 f124 的最大值，按北京时间换算
pub fn snapshot_date(rows: &[Value]) -> Option<NaiveDate> {
    rows.iter()
        .filter_map(|row| row.get("f124").and_then(|t| t.as_i64()))
        .filter(|ts| *ts > 0)
        .max()
        .and_then(|ts| DateTime::from_timestamp(ts, 0))
        .map(|dt| dt.with_timezone(&Shanghai).date_naive())
}

/// 市场广度：涨跌家数、涨跌停、最高连板与连板率
pub struct BreadthFetcher {
    client: Arc<HttpClient>,
}

impl BreadthFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// 由快照与股池组装一行广度数据
///
/// 快照只反映最新交易日，快照日期与目标日期不一致时返回空结果。
/// 停牌股票（涨跌幅为 `-`）不计入涨跌平家数。
pub fn breadth_batch(
    date: &NaiveDate,
    spot: &[Value],
    limit_up: &[PoolEntry],
    limit_down: &[PoolEntry],
    previous_limit_up: &[PoolEntry],
) -> Result<FetchResult, FetchError> {
    match snapshot_date(spot) {
        Some(snapshot) if snapshot == *date => {}
        other => {
            warn!("行情快照日期 {:?} 与目标日期 {} 不一致", other, date);
            return build_batch(BREADTH.columns, &[]);
        }
    }

    let changes: Vec<f64> = spot
        .iter()
        .filter_map(|row| row.get("f3").and_then(util::number))
        .collect();
    let up = changes.iter().filter(|c| **c > 0.0).count() as i64;
    let down = changes.iter().filter(|c| **c < 0.0).count() as i64;
    let flat = changes.iter().filter(|c| **c == 0.0).count() as i64;

    // 空股池的最高连板为 0；有股票但缺连板字段则保持为空
    let max_continuous = if limit_up.is_empty() {
        Some(0)
    } else {
        limit_up.iter().filter_map(|e| e.continuous).max()
    };

    let continuous_rate = if previous_limit_up.is_empty() {
        None
    } else {
        let continued = limit_up
            .iter()
            .filter(|e| e.continuous.map_or(false, |n| n >= 2))
            .count();
        Some(continued as f64 / previous_limit_up.len() as f64)
    };

    let rows = vec![vec![
        Cell::Date(*date),
        Cell::Integer(up),
        Cell::Integer(down),
        Cell::Integer(flat),
        Cell::Integer(limit_up.len() as i64),
        Cell::Integer(limit_down.len() as i64),
        Cell::integer(max_continuous),
        Cell::real(continuous_rate),
    ]];
    build_batch(BREADTH.columns, &rows)
}

#[async_trait]
impl MarketFetcher for BreadthFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-spot"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的市场广度", date);
        let spot = eastmoney::fetch_clist(&self.client, A_SHARE_FS, SPOT_FIELDS).await?;
        let limit_up = eastmoney::fetch_pool(&self.client, PoolKind::LimitUp, date).await?;
        let limit_down = eastmoney::fetch_pool(&self.client, PoolKind::LimitDown, date).await?;
        let previous = eastmoney::fetch_pool(&self.client, PoolKind::PreviousLimitUp, date).await?;
        info!(
            "快照 {} 只，涨停 {}，跌停 {}，昨日涨停 {}",
            spot.len(),
            limit_up.len(),
            limit_down.len(),
            previous.len()
        );
        breadth_batch(date, &spot, &limit_up, &limit_down, &previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array, Int64Array};
    use chrono::TimeZone;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn ts(d: NaiveDate) -> i64 {
        Shanghai
            .from_local_datetime(&d.and_hms_opt(15, 0, 0).unwrap())
            .single()
            .unwrap()
            .timestamp()
    }

    fn entry(code: &str, continuous: Option<i64>) -> PoolEntry {
        PoolEntry {
            code: code.to_string(),
            name: None,
            continuous,
            industry: Some("银行".to_string()),
        }
    }

    fn int(batch: &FetchResult, name: &str) -> Int64Array {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .cloned()
            .unwrap()
    }

    #[test]
    fn counts_up_down_flat_and_skips_suspended() {
        let t = ts(date());
        let spot = vec![
            json!({"f3": 1.5, "f124": t}),
            json!({"f3": -0.3, "f124": t}),
            json!({"f3": 0.0, "f124": t}),
            json!({"f3": "-", "f124": t}),
            json!({"f3": 2.0, "f124": t}),
        ];
        let limit_up = vec![entry("600000", Some(1)), entry("000001", Some(3))];
        let previous = vec![entry("600001", None), entry("600002", None), entry("600003", None), entry("600004", None)];
        let batch = breadth_batch(&date(), &spot, &limit_up, &[], &previous).unwrap();

        assert_eq!(batch.num_rows(), 1);
        assert_eq!(int(&batch, "up_count").value(0), 2);
        assert_eq!(int(&batch, "down_count").value(0), 1);
        assert_eq!(int(&batch, "flat_count").value(0), 1);
        assert_eq!(int(&batch, "limit_up_count").value(0), 2);
        assert_eq!(int(&batch, "limit_down_count").value(0), 0);
        assert_eq!(int(&batch, "max_continuous_limit_up").value(0), 3);

        let rate = batch
            .column_by_name("continuous_limit_rate")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .unwrap();
        assert!((rate.value(0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn stale_snapshot_gives_empty_result() {
        let yesterday = NaiveDate::from_ymd_opt(2023, 12, 29).unwrap();
        let spot = vec![json!({"f3": 1.0, "f124": ts(yesterday)})];
        let batch = breadth_batch(&date(), &spot, &[], &[], &[]).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }

    #[test]
    fn rate_is_null_without_previous_pool() {
        let spot = vec![json!({"f3": 1.0, "f124": ts(date())})];
        let batch = breadth_batch(&date(), &spot, &[], &[], &[]).unwrap();
        assert_eq!(batch.column_by_name("continuous_limit_rate").unwrap().null_count(), 1);
        assert_eq!(int(&batch, "max_continuous_limit_up").value(0), 0);
    }
}
