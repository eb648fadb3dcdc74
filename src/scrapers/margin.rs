use crate::errors::FetchError;
use crate::models::dataset::MARGIN;
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::http::HttpClient;
use crate::util;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::info;
use serde_json::Value;
use std::sync::Arc;

const DATACENTER_URL: &str = "https://datacenter-web.eastmoney.com/api/data/v1/get";

/// 沪深两市融资融券汇总
pub struct MarginFetcher {
    client: Arc<HttpClient>,
}

impl MarginFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// `result` 为 null 表示当日尚未公布
pub fn parse_margin(json: &Value, date: &NaiveDate) -> Result<FetchResult, FetchError> {
    if json.get("success").and_then(|s| s.as_bool()) == Some(false) {
        // 无数据时接口返回 success=false 且 code=9201
        if json.get("code").and_then(|c| c.as_i64()) == Some(9201) {
            return build_batch(MARGIN.columns, &[]);
        }
        let message = json.get("message").and_then(|m| m.as_str()).unwrap_or("unknown");
        return Err(FetchError::Decode(format!("datacenter error: {}", message)));
    }

    let records = match json.get("result") {
        Some(Value::Null) | None => return build_batch(MARGIN.columns, &[]),
        Some(result) => result
            .get("data")
            .and_then(|d| d.as_array())
            .ok_or_else(|| FetchError::Decode("margin result has no data array".to_string()))?,
    };

    let record = records.iter().find(|r| {
        r.get("DIM_DATE")
            .and_then(|d| d.as_str())
            .and_then(util::parse_upstream_date)
            .as_ref()
            == Some(date)
    });

    let rows = match record {
        Some(r) => vec![vec![
            Cell::Date(*date),
            Cell::real(r.get("RZYE").and_then(util::number)),
            Cell::real(r.get("RZMRE").and_then(util::number)),
        ]],
        None => Vec::new(),
    };
    build_batch(MARGIN.columns, &rows)
}

#[async_trait]
impl MarketFetcher for MarginFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-datacenter"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的两融余额", date);
        let filter = format!("(dim_date='{}')", util::iso_date(date));
        let json = self
            .client
            .get_json(
                DATACENTER_URL,
                &[
                    ("reportName", "RPTA_RZRQ_LSHJ"),
                    ("columns", "ALL"),
                    ("source", "WEB"),
                    ("sortColumns", "dim_date"),
                    ("sortTypes", "-1"),
                    ("pageNumber", "1"),
                    ("pageSize", "5"),
                    ("filter", filter.as_str()),
                ],
                Some("https://data.eastmoney.com/rzrq/"),
            )
            .await?;
        parse_margin(&json, date)
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

    #[test]
    fn picks_record_for_target_date() {
        let payload = json!({
            "success": true,
            "result": {"data": [
                {"DIM_DATE": "2024-01-02 00:00:00", "RZYE": 1.5e12, "RZMRE": 6.1e10},
                {"DIM_DATE": "2023-12-29 00:00:00", "RZYE": 1.6e12, "RZMRE": 5.0e10}
            ]}
        });
        let batch = parse_margin(&payload, &date()).unwrap();
        assert_eq!(batch.num_rows(), 1);
        let balance = batch
            .column_by_name("balance")
            .and_then(|c| c.as_any().downcast_ref::<Float64Array>())
            .unwrap();
        assert_eq!(balance.value(0), 1.5e12);
    }

    #[test]
    fn unpublished_day_is_empty() {
        assert_eq!(parse_margin(&json!({"result": null}), &date()).unwrap().num_rows(), 0);
        let no_data = json!({"success": false, "code": 9201, "message": "返回数据为空"});
        assert_eq!(parse_margin(&no_data, &date()).unwrap().num_rows(), 0);
    }

    #[test]
    fn other_upstream_failures_are_retryable() {
        let err = parse_margin(&json!({"success": false, "code": 500, "message": "busy"}), &date())
            .unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn missing_balance_stays_null() {
        let payload = json!({"result": {"data": [{"DIM_DATE": "2024-01-02", "RZYE": null}]}});
        let batch = parse_margin(&payload, &date()).unwrap();
        assert_eq!(batch.column_by_name("balance").unwrap().null_count(), 1);
        assert_eq!(batch.column_by_name("buy_amount").unwrap().null_count(), 1);
    }

    #[test]
    fn nan_balance_is_missing_and_rejected() {
        use crate::services::Validator;
        use crate::store::{MarketStore, RowFilter};

        let payload = json!({"result": {"data": [{"DIM_DATE": "2024-01-02", "RZYE": "NaN", "RZMRE": 6.1e10}]}});
        let batch = parse_margin(&payload, &date()).unwrap();
        assert_eq!(batch.column_by_name("balance").unwrap().null_count(), 1);

        let strict = MARGIN.with_null_tolerance(0.0);
        let err = Validator::new(0.0).validate(batch.clone(), &strict).unwrap_err();
        assert_eq!(err.column.as_deref(), Some("balance"));

        // 宽松容忍度下落库，读回的空值与抓取时一致
        let store = MarketStore::open_in_memory(&[MARGIN]).unwrap();
        store.upsert("margin", &batch, MARGIN.natural_key).unwrap();
        let stored = store.read("margin", &RowFilter::all()).unwrap();
        assert_eq!(stored.column_by_name("balance").unwrap().null_count(), 1);
    }
}
