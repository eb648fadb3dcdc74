use crate::errors::FetchError;
use crate::models::dataset::NORTHBOUND;
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::http::HttpClient;
use crate::util;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use serde_json::Value;
use std::sync::Arc;

const KAMT_URL: &str = "http://push2his.eastmoney.com/api/qt/kamt.kline/get";
// 上游单位为万元
const UNIT: f64 = 1e4;

/// 北向资金：沪股通、深股通与合计净流入
pub struct NorthboundFetcher {
    client: Arc<HttpClient>,
}

impl NorthboundFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// 在 `"日期,数值"` 序列中查找目标日期
fn series_value(data: &Value, key: &str, date: &NaiveDate) -> Result<Option<f64>, FetchError> {
    let series = match data.get(key).and_then(|s| s.as_array()) {
        Some(series) => series,
        None => return Ok(None),
    };
    for item in series {
        let line = item
            .as_str()
            .ok_or_else(|| FetchError::Decode(format!("{} entry is not a string", key)))?;
        let mut parts = line.splitn(3, ',');
        let day = parts.next().and_then(util::parse_upstream_date);
        if day.as_ref() == Some(date) {
            return Ok(parts.next().and_then(util::number_str).map(|v| v * UNIT));
        }
    }
    Ok(None)
}

pub fn parse_northbound(json: &Value, date: &NaiveDate) -> Result<FetchResult, FetchError> {
    let data = json
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| FetchError::Decode("kamt response has no data".to_string()))?;

    let sh = series_value(data, "hk2sh", date)?;
    let sz = series_value(data, "hk2sz", date)?;
    let total = series_value(data, "s2n", date)?;

    if sh.is_none() && sz.is_none() && total.is_none() {
        return build_batch(NORTHBOUND.columns, &[]);
    }

    let net_flow = total.or(match (sh, sz) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    });

    let rows = vec![vec![
        Cell::Date(*date),
        Cell::real(net_flow),
        Cell::real(sh),
        Cell::real(sz),
    ]];
    build_batch(NORTHBOUND.columns, &rows)
}

#[async_trait]
impl MarketFetcher for NorthboundFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-kamt"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的北向资金", date);
        let json = self
            .client
            .get_json(
                KAMT_URL,
                &[
                    ("fields1", "f1,f3,f5"),
                    ("fields2", "f51,f52"),
                    ("klt", "101"),
                    ("lmt", "500"),
                    ("ut", "b2884a393a59ad64002292a3e90d46a5"),
                ],
                Some("https://data.eastmoney.com/hsgtcg/"),
            )
            .await?;
        parse_northbound(&json, date)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Float64Array};
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn real(batch: &FetchResult, name: &str) -> Float64Array {
        batch
            .column_by_name(name)
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .cloned()
            .unwrap()
    }

    #[test]
    fn converts_units_and_prefers_upstream_total() {
        let payload = json!({"data": {
            "hk2sh": ["2023-12-29,100.0", "2024-01-02,250.5"],
            "hk2sz": ["2024-01-02,-50.5"],
            "s2n": ["2024-01-02,200.0"]
        }});
        let batch = parse_northbound(&payload, &date()).unwrap();
        assert_eq!(batch.num_rows(), 1);
        assert_eq!(real(&batch, "sh_net").value(0), 2_505_000.0);
        assert_eq!(real(&batch, "sz_net").value(0), -505_000.0);
        assert_eq!(real(&batch, "net_flow").value(0), 2_000_000.0);
    }

    #[test]
    fn derives_total_from_both_channels() {
        let payload = json!({"data": {
            "hk2sh": ["2024-01-02,1.0"],
            "hk2sz": ["2024-01-02,2.0"]
        }});
        let batch = parse_northbound(&payload, &date()).unwrap();
        assert_eq!(real(&batch, "net_flow").value(0), 30_000.0);
    }

    #[test]
    fn missing_date_is_empty_not_zero() {
        let payload = json!({"data": {"hk2sh": ["2023-12-29,1.0"], "hk2sz": [], "s2n": []}});
        let batch = parse_northbound(&payload, &date()).unwrap();
        assert_eq!(batch.num_rows(), 0);
    }

    #[test]
    fn one_channel_only_leaves_total_null() {
        let payload = json!({"data": {"hk2sh": ["2024-01-02,1.0"]}});
        let batch = parse_northbound(&payload, &date()).unwrap();
        assert_eq!(batch.column_by_name("net_flow").unwrap().null_count(), 1);
    }
}
