use crate::errors::FetchError;
use crate::models::dataset::{INDICES, MARKET_AMOUNT};
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::scrapers::base::MarketFetcher;
use crate::scrapers::eastmoney::{self, KlineBar};
use crate::scrapers::http::HttpClient;
use async_trait::async_trait;
use chrono::NaiveDate;
use log::{info, warn};
use std::sync::Arc;

/// 指数：本地代码、名称、东财 secid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub symbol: &'static str,
    pub name: &'static str,
    pub secid: &'static str,
}

pub const SSE_COMPOSITE: IndexSpec = IndexSpec {
    symbol: "sh000001",
    name: "上证指数",
    secid: "1.000001",
};

pub const SZSE_COMPONENT: IndexSpec = IndexSpec {
    symbol: "sz399001",
    name: "深证成指",
    secid: "0.399001",
};

pub const CHINEXT: IndexSpec = IndexSpec {
    symbol: "sz399006",
    name: "创业板指",
    secid: "0.399006",
};

pub const CSI_300: IndexSpec = IndexSpec {
    symbol: "sh000300",
    name: "沪深300",
    secid: "1.000300",
};

pub const DEFAULT_INDICES: [IndexSpec; 4] = [SSE_COMPOSITE, SZSE_COMPONENT, CHINEXT, CSI_300];

/// 选出目标日期那一根K线
fn bar_on<'a>(bars: &'a [KlineBar], date: &NaiveDate) -> Option<&'a KlineBar> {
    bars.iter().find(|b| b.date == *date)
}

/// 主要指数日线
pub struct IndicesFetcher {
    client: Arc<HttpClient>,
    indices: Vec<IndexSpec>,
}

impl IndicesFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self::with_indices(client, DEFAULT_INDICES.to_vec())
    }

    pub fn with_indices(client: Arc<HttpClient>, indices: Vec<IndexSpec>) -> Self {
        Self { client, indices }
    }
}

/// 每个有当日K线的指数一行，没有K线的指数不补占位行
pub fn indices_batch(
    date: &NaiveDate,
    bars: &[(IndexSpec, Vec<KlineBar>)],
) -> Result<FetchResult, FetchError> {
    let mut rows = Vec::new();
    for (spec, index_bars) in bars {
        match bar_on(index_bars, date) {
            Some(bar) => rows.push(vec![
                Cell::Date(*date),
                Cell::from(spec.symbol),
                Cell::from(spec.name),
                Cell::real(bar.close),
                Cell::real(bar.open),
                Cell::real(bar.high),
                Cell::real(bar.low),
                Cell::real(bar.volume),
                Cell::real(bar.amount),
                Cell::real(bar.change_pct),
            ]),
            None => warn!("指数 {} 在 {} 无数据", spec.name, date),
        }
    }
    build_batch(INDICES.columns, &rows)
}

#[async_trait]
impl MarketFetcher for IndicesFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-kline"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的指数数据", date);
        let mut bars = Vec::with_capacity(self.indices.len());
        // 任一子请求失败则整个数据集失败，交由重试控制器整体重来
        for spec in &self.indices {
            let index_bars = eastmoney::fetch_index_kline(&self.client, spec.secid, date).await?;
            bars.push((*spec, index_bars));
        }
        indices_batch(date, &bars)
    }
}

/// 两市成交额：上证综指与深证成指的成交额
pub struct MarketAmountFetcher {
    client: Arc<HttpClient>,
}

impl MarketAmountFetcher {
    pub fn new(client: Arc<HttpClient>) -> Self {
        Self { client }
    }
}

/// 两市都无当日K线时返回空结果；单边缺失时对应列与合计为空
pub fn market_amount_batch(
    date: &NaiveDate,
    sh_bars: &[KlineBar],
    sz_bars: &[KlineBar],
) -> Result<FetchResult, FetchError> {
    let sh = bar_on(sh_bars, date);
    let sz = bar_on(sz_bars, date);
    if sh.is_none() && sz.is_none() {
        return build_batch(MARKET_AMOUNT.columns, &[]);
    }

    let sh_amount = sh.and_then(|b| b.amount);
    let sz_amount = sz.and_then(|b| b.amount);
    let total = match (sh_amount, sz_amount) {
        (Some(a), Some(b)) => Some(a + b),
        _ => None,
    };

    let rows = vec![vec![
        Cell::Date(*date),
        Cell::real(sh_amount),
        Cell::real(sz_amount),
        Cell::real(total),
    ]];
    build_batch(MARKET_AMOUNT.columns, &rows)
}

#[async_trait]
impl MarketFetcher for MarketAmountFetcher {
    fn source(&self) -> &'static str {
        "eastmoney-kline"
    }

    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError> {
        info!("获取 {} 的两市成交额", date);
        let sh = eastmoney::fetch_index_kline(&self.client, SSE_COMPOSITE.secid, date).await?;
        let sz = eastmoney::fetch_index_kline(&self.client, SZSE_COMPONENT.secid, date).await?;
        market_amount_batch(date, &sh, &sz)
    }
}
