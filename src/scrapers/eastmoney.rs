//! 东方财富公共接口：指数日K、涨跌停股池与行情列表
//!
//! 这里只负责请求与解析，组装成数据集由各适配器完成。

use crate::errors::FetchError;
use crate::scrapers::http::HttpClient;
use crate::util;
use chrono::NaiveDate;
use log::debug;
use serde_json::Value;

const KLINE_URL: &str = "http://push2his.eastmoney.com/api/qt/stock/kline/get";
const CLIST_URL: &str = "http://82.push2.eastmoney.com/api/qt/clist/get";
const POOL_BASE_URL: &str = "http://push2ex.eastmoney.com";
const REFERER: &str = "https://quote.eastmoney.com/";
const PAGE_SIZE: usize = 5000;
const MAX_PAGES: usize = 20;

/// 日K线一行
#[derive(Debug, Clone, PartialEq)]
pub struct KlineBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub close: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub volume: Option<f64>,
    pub amount: Option<f64>,
    pub change_pct: Option<f64>,
}

/// 获取指数在指定日期的日K，非交易日返回空
pub async fn fetch_index_kline(
    client: &HttpClient,
    secid: &str,
    date: &NaiveDate,
) -> Result<Vec<KlineBar>, FetchError> {
    let day = util::compact_date(date);
    let json = client
        .get_json(
            KLINE_URL,
            &[
                ("secid", secid),
                ("ut", "7eea3edcaed734bea9cbfc24409ed989"),
                ("fields1", "f1,f2,f3,f4,f5,f6"),
                ("fields2", "f51,f52,f53,f54,f55,f56,f57,f58,f59,f60,f61"),
                ("klt", "101"),
                ("fqt", "0"),
                ("beg", day.as_str()),
                ("end", day.as_str()),
            ],
            Some(REFERER),
        )
        .await?;

    let bars = parse_kline(&json)?;
    debug!("{} 在 {} 获取到 {} 条K线", secid, date, bars.len());
    Ok(bars)
}

/// 解析 `data.klines`，字段顺序 f51..f61：
/// 日期,开盘,收盘,最高,最低,成交量,成交额,振幅,涨跌幅,涨跌额,换手率
pub fn parse_kline(json: &Value) -> Result<Vec<KlineBar>, FetchError> {
    let data = json
        .get("data")
        .filter(|d| !d.is_null())
        .ok_or_else(|| FetchError::Decode("kline response has no data".to_string()))?;

    let lines = match data.get("klines").and_then(|k| k.as_array()) {
        Some(lines) => lines,
        None => return Ok(Vec::new()),
    };

    let mut bars = Vec::with_capacity(lines.len());
    for line in lines {
        let line = line
            .as_str()
            .ok_or_else(|| FetchError::Decode(format!("kline entry is not a string: {}", line)))?;
        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 7 {
            return Err(FetchError::Decode(format!("kline entry too short: {}", line)));
        }
        let date = util::parse_upstream_date(fields[0])
            .ok_or_else(|| FetchError::Decode(format!("invalid kline date: {}", fields[0])))?;

        bars.push(KlineBar {
            date,
            open: util::number_str(fields[1]),
            close: util::number_str(fields[2]),
            high: util::number_str(fields[3]),
            low: util::number_str(fields[4]),
            volume: util::number_str(fields[5]),
            amount: util::number_str(fields[6]),
            change_pct: fields.get(8).and_then(|s| util::number_str(s)),
        });
    }
    Ok(bars)
}

/// 涨跌停股池
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolKind {
    LimitUp,
    LimitDown,
    /// 昨日涨停股今日表现
    PreviousLimitUp,
}

impl PoolKind {
    fn path(&self) -> &'static str {
        match self {
            PoolKind::LimitUp => "/getTopicZTPool",
            PoolKind::LimitDown => "/getTopicDTPool",
            PoolKind::PreviousLimitUp => "/getYesterdayZTPool",
        }
    }

    fn sort(&self) -> &'static str {
        match self {
            PoolKind::LimitUp => "fbt:asc",
            PoolKind::LimitDown => "fund:asc",
            PoolKind::PreviousLimitUp => "zs:desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PoolEntry {
    pub code: String,
    pub name: Option<String>,
    /// 连板数
    pub continuous: Option<i64>,
    /// 所属行业
    pub industry: Option<String>,
}

pub async fn fetch_pool(
    client: &HttpClient,
    kind: PoolKind,
    date: &NaiveDate,
) -> Result<Vec<PoolEntry>, FetchError> {
    let url = format!("{}{}", POOL_BASE_URL, kind.path());
    let day = util::compact_date(date);
    let json = client
        .get_json(
            &url,
            &[
                ("ut", "7eea3edcaed734bea9cbfc24409ed989"),
                ("dpt", "wz.ztzt"),
                ("Pageindex", "0"),
                ("pagesize", "10000"),
                ("sort", kind.sort()),
                ("date", day.as_str()),
            ],
            Some(REFERER),
        )
        .await?;
    parse_pool(&json)
}

/// `data` 为 null 表示股池为空
pub fn parse_pool(json: &Value) -> Result<Vec<PoolEntry>, FetchError> {
    let data = match json.get("data") {
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(data) => data,
    };
    let pool = data
        .get("pool")
        .and_then(|p| p.as_array())
        .ok_or_else(|| FetchError::Decode("pool response has no pool array".to_string()))?;

    pool.iter()
        .map(|item| {
            let code = item
                .get("c")
                .and_then(|c| c.as_str())
                .ok_or_else(|| FetchError::Decode(format!("pool entry without code: {}", item)))?;
            Ok(PoolEntry {
                code: code.to_string(),
                name: item.get("n").and_then(|n| n.as_str()).map(str::to_string),
                continuous: item.get("lbc").and_then(|l| l.as_i64()),
                industry: item.get("hybk").and_then(|h| h.as_str()).map(str::to_string),
            })
        })
        .collect()
}

/// 分页拉取行情列表 `data.diff`，返回每行原始 JSON
pub async fn fetch_clist(
    client: &HttpClient,
    fs: &str,
    fields: &str,
) -> Result<Vec<Value>, FetchError> {
    let page_size = PAGE_SIZE.to_string();
    let mut rows = Vec::new();

    for page in 1..=MAX_PAGES {
        let page_no = page.to_string();
        let json = client
            .get_json(
                CLIST_URL,
                &[
                    ("pn", page_no.as_str()),
                    ("pz", page_size.as_str()),
                    ("po", "1"),
                    ("np", "1"),
                    ("ut", "bd1d9ddb04089700cf9c27f6f7426281"),
                    ("fltt", "2"),
                    ("invt", "2"),
                    ("fid", "f3"),
                    ("fs", fs),
                    ("fields", fields),
                ],
                Some(REFERER),
            )
            .await?;

        let (total, diff) = parse_clist_page(&json)?;
        let received = diff.len();
        rows.extend(diff);
        debug!("行情列表第 {} 页：{} 行，累计 {}/{}", page, received, rows.len(), total);

        if received == 0 || rows.len() >= total {
            return Ok(rows);
        }
    }

    Err(FetchError::Decode(format!(
        "list {} did not finish within {} pages",
        fs, MAX_PAGES
    )))
}

/// 返回 (总行数, 本页行)
pub fn parse_clist_page(json: &Value) -> Result<(usize, Vec<Value>), FetchError> {
    let data = match json.get("data") {
        Some(Value::Null) | None => return Ok((0, Vec::new())),
        Some(data) => data,
    };
    let total = data.get("total").and_then(|t| t.as_u64()).unwrap_or(0) as usize;
    let diff = match data.get("diff") {
        Some(Value::Array(items)) => items.clone(),
        // np=0 时 diff 为以序号为键的对象
        Some(Value::Object(map)) => map.values().cloned().collect(),
        _ => Vec::new(),
    };
    Ok((total, diff))
}
