use crate::errors::FetchError;
use crate::models::dataset::INDUSTRY;
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::breadth::snapshot_date;
use crate::scrapers::eastmoney::{self, PoolEntry, PoolKind};
use crate::scrapers::http::HttpClient;
use crate::util;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{info, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 东财行业板块
const INDUSTRY_FS: &str = "m:90 t:2 f:!50";
// f3 涨跌幅, f8 换手率, f14 板块名称, f62 主力净流入, f124 更新时间
const INDUSTRY_FIELDS: &str = "f3,f8,f12,f14,f62,f124";

pub struct IndustryFetcher {
    client: Arc<HttpClient>,
}

impl IndustryFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// 每个行业板块一行，涨停家数按涨停股池的所属行业统计
pub fn industry_batch(
    date: &NaiveDate,
    boards: &[Value],
    limit_up: &[PoolEntry],
) -> Result<FetchResult, FetchError> {
    if snapshot_date(boards) != Some(*date) {
        warn!("行业板块快照不是 {} 的数据", date);
        return build_batch(INDUSTRY.columns, &[]);
    }

    let mut limit_up_by_industry: HashMap<&str, i64> = HashMap::new();
    for entry in limit_up {
        if let Some(industry) = entry.industry.as_deref() {
            *limit_up_by_industry.entry(industry).or_insert(0) += 1;
        }
    }

    let mut rows = Vec::with_capacity(boards.len());
    for board in boards {
        let name = match board.get("f14").and_then(|n| n.as_str()) {
            Some(name) if !name.is_empty() => name,
            _ => {
                warn!("跳过缺少名称的行业板块: {}", board);
                continue;
            }
        };
        rows.push(vec![
            Cell::Date(*date),
            Cell::from(name),
            Cell::real(board.get("f3").and_then(util::number)),
            Cell::real(board.get("f62").and_then(util::number)),
            Cell::real(board.get("f8").and_then(util::number)),
            Cell::Integer(limit_up_by_industry.get(name).copied().unwrap_or(0)),
        ]);
    }
    build_batch(INDUSTRY.columns, &rows)
}

#[async_trait]
impl MarketFetcher for IndustryFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-board"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的行业板块数据", date);
        let boards = eastmoney::fetch_clist(&self.client, INDUSTRY_FS, INDUSTRY_FIELDS).await?;
        let limit_up = eastmoney::fetch_pool(&self.client, PoolKind::LimitUp, date).await?;
        info!("行业板块 {} 个", boards.len());
        industry_batch(date, &boards, &limit_up)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::array::{Array, Int64Array, StringArray};
    use chrono::TimeZone;
    use chrono_tz::Asia::Shanghai;
    use serde_json::json;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()
    }

    fn ts() -> i64 {
        Shanghai
            .from_local_datetime(&date().and_hms_opt(15, 0, 0).unwrap())
            .single()
            .unwrap()
            .timestamp()
    }

    fn pool_entry(industry: &str) -> PoolEntry {
        PoolEntry {
            code: "600000".to_string(),
            name: None,
            continuous: Some(1),
            industry: Some(industry.to_string()),
        }
    }

    #[test]
    fn counts_limit_ups_per_industry() {
        let boards = vec![
            json!({"f3": 1.2, "f8": 0.8, "f14": "银行", "f62": 12345678.0, "f124": ts()}),
            json!({"f3": "-", "f8": 1.1, "f14": "煤炭", "f62": "-", "f124": ts()}),
            json!({"f3": 0.5, "f14": "", "f124": ts()}),
        ];
        let pool = vec![pool_entry("银行"), pool_entry("银行"), pool_entry("医药")];
        let batch = industry_batch(&date(), &boards, &pool).unwrap();

        assert_eq!(batch.num_rows(), 2);
        let names = batch
            .column_by_name("industry_name")
            .and_then(|c| c.as_any().downcast_ref::<StringArray>())
            .unwrap();
        assert_eq!(names.value(1), "煤炭");
        let counts = batch
            .column_by_name("limit_up_count")
            .and_then(|c| c.as_any().downcast_ref::<Int64Array>())
            .unwrap();
        assert_eq!(counts.value(0), 2);
        assert_eq!(counts.value(1), 0);
        assert_eq!(batch.column_by_name("avg_return").unwrap().null_count(), 1);
    }

    #[test]
    fn stale_board_snapshot_is_empty() {
        let boards = vec![json!({"f3": 1.2, "f14": "银行", "f124": ts() - 86_400 * 3})];
        assert_eq!(industry_batch(&date(), &boards, &[]).unwrap().num_rows(), 0);
    }
}
