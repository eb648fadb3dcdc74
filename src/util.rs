use chrono::NaiveDate;
use serde_json::Value;
use crate::errors::{Result, IngestError};

// 日期转换工具
pub fn parse_iso_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d").map_err(IngestError::DateError)
}

/// `YYYYMMDD` 形式，东财接口使用
pub fn compact_date(date: &NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

pub fn iso_date(date: &NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

/// 上游日期：支持 `2024-01-02`、`2024-01-02 00:00:00` 与 `20240102`
pub fn parse_upstream_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    let head = s.get(..10).unwrap_or(s);
    NaiveDate::parse_from_str(head, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
        .ok()
}

fn epoch() -> NaiveDate {
    NaiveDate::from_ymd_opt(1970, 1, 1).unwrap_or_default()
}

// Arrow Date32 以 1970-01-01 起的天数表示
pub fn date_to_days(date: &NaiveDate) -> i32 {
    (*date - epoch()).num_days() as i32
}

pub fn days_to_date(days: i32) -> Option<NaiveDate> {
    epoch().checked_add_signed(chrono::Duration::days(days as i64))
}

/// 解析上游数值字段，`"-"`、空串、null 与非有限值（`NaN`、`inf`）都视为缺失
pub fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let s = s.trim().replace(',', "");
            if s.is_empty() || s == "-" {
                None
            } else {
                s.parse::<f64>().ok()
            }
        }
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

pub fn number_str(s: &str) -> Option<f64> {
    number(&Value::String(s.to_string()))
}

/// 去掉 JSONP 回调包装，例如 `jQuery123_456({...});`
pub fn strip_jsonp(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        return trimmed;
    }
    match (trimmed.find('('), trimmed.rfind(')')) {
        (Some(start), Some(end)) if start < end => &trimmed[start + 1..end],
        _ => trimmed,
    }
}
