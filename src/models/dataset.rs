use crate::errors::ConfigError;
use crate::models::table::ColumnSpec;
use std::collections::HashSet;

use crate::models::table::ColumnKind::{Date, Integer, Real, Text};

/// 数据集声明：列、自然键、必需列与空值容忍度
///
/// 声明为常量，在配置阶段通过 [`DatasetDescriptor::validate`] 检查一次。
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetDescriptor {
    pub name: &'static str,
    pub columns: &'static [ColumnSpec],
    pub natural_key: &'static [&'static str],
    pub required: &'static [&'static str],
    /// 为 `None` 时使用全局默认值
    pub null_tolerance: Option<f64>,
    /// 仅在交易日存在的数据集
    pub calendar_dependent: bool,
}

impl DatasetDescriptor {
    pub fn with_null_tolerance(mut self, tolerance: f64) -> Self {
        self.null_tolerance = Some(tolerance);
        self
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn effective_tolerance(&self, default: f64) -> f64 {
        self.null_tolerance.unwrap_or(default)
    }

    /// 检查声明自洽：名称是合法标识符，键与必需列都已声明
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidDataset {
            dataset: self.name.to_string(),
            message,
        };

        if !is_identifier(self.name) {
            return Err(invalid("name must be a lowercase SQL identifier".to_string()));
        }
        if self.columns.is_empty() {
            return Err(invalid("no columns declared".to_string()));
        }

        let mut seen = HashSet::new();
        for column in self.columns {
            if !is_identifier(column.name) {
                return Err(invalid(format!("column {:?} is not a valid identifier", column.name)));
            }
            if !seen.insert(column.name) {
                return Err(invalid(format!("column {} declared twice", column.name)));
            }
        }

        if self.natural_key.is_empty() {
            return Err(invalid("natural key is empty".to_string()));
        }
        for key in self.natural_key {
            if !seen.contains(key) {
                return Err(invalid(format!("key column {} is not declared", key)));
            }
        }
        for required in self.required {
            if !seen.contains(required) {
                return Err(invalid(format!("required column {} is not declared", required)));
            }
        }

        if let Some(tolerance) = self.null_tolerance {
            if !(0.0..=1.0).contains(&tolerance) {
                return Err(invalid(format!("null tolerance {} is outside [0, 1]", tolerance)));
            }
        }
        Ok(())
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// 交易日历
pub const CALENDAR: DatasetDescriptor = DatasetDescriptor {
    name: "calendar",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("is_trading_day", Integer),
    ],
    natural_key: &["date"],
    required: &["date", "is_trading_day"],
    null_tolerance: Some(0.0),
    calendar_dependent: false,
};

/// 主要指数日线
pub const INDICES: DatasetDescriptor = DatasetDescriptor {
    name: "indices",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("symbol", Text),
        ColumnSpec::new("name", Text),
        ColumnSpec::new("close", Real),
        ColumnSpec::new("open", Real),
        ColumnSpec::new("high", Real),
        ColumnSpec::new("low", Real),
        ColumnSpec::new("volume", Real),
        ColumnSpec::new("amount", Real),
        ColumnSpec::new("change_pct", Real),
    ],
    natural_key: &["date", "symbol"],
    required: &["date", "symbol", "close", "volume", "amount"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 两市成交额
pub const MARKET_AMOUNT: DatasetDescriptor = DatasetDescriptor {
    name: "market_amount",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("sh_amount", Real),
        ColumnSpec::new("sz_amount", Real),
        ColumnSpec::new("total_amount", Real),
    ],
    natural_key: &["date"],
    required: &["date", "sh_amount", "sz_amount", "total_amount"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 市场广度：涨跌家数、涨跌停与连板
pub const BREADTH: DatasetDescriptor = DatasetDescriptor {
    name: "breadth",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("up_count", Integer),
        ColumnSpec::new("down_count", Integer),
        ColumnSpec::new("flat_count", Integer),
        ColumnSpec::new("limit_up_count", Integer),
        ColumnSpec::new("limit_down_count", Integer),
        ColumnSpec::new("max_continuous_limit_up", Integer),
        ColumnSpec::new("continuous_limit_rate", Real),
    ],
    natural_key: &["date"],
    required: &[
        "date",
        "up_count",
        "down_count",
        "flat_count",
        "limit_up_count",
        "limit_down_count",
    ],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 北向资金净流入（元）
pub const NORTHBOUND: DatasetDescriptor = DatasetDescriptor {
    name: "northbound",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("net_flow", Real),
        ColumnSpec::new("sh_net", Real),
        ColumnSpec::new("sz_net", Real),
    ],
    natural_key: &["date"],
    required: &["date", "net_flow"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// ETF 资金流向，按分组
pub const ETF_FLOWS: DatasetDescriptor = DatasetDescriptor {
    name: "etf_flows",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("bucket", Text),
        ColumnSpec::new("net_flow", Real),
    ],
    natural_key: &["date", "bucket"],
    required: &["date", "bucket", "net_flow"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 两融余额
pub const MARGIN: DatasetDescriptor = DatasetDescriptor {
    name: "margin",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("balance", Real),
        ColumnSpec::new("buy_amount", Real),
    ],
    natural_key: &["date"],
    required: &["date", "balance"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 行业板块
pub const INDUSTRY: DatasetDescriptor = DatasetDescriptor {
    name: "industry",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("industry_name", Text),
        ColumnSpec::new("avg_return", Real),
        ColumnSpec::new("net_flow", Real),
        ColumnSpec::new("avg_turnover", Real),
        ColumnSpec::new("limit_up_count", Integer),
    ],
    natural_key: &["date", "industry_name"],
    required: &["date", "industry_name", "avg_return"],
    null_tolerance: None,
    calendar_dependent: true,
};

/// 宏观指标
pub const MACRO: DatasetDescriptor = DatasetDescriptor {
    name: "macro",
    columns: &[
        ColumnSpec::new("date", Date),
        ColumnSpec::new("indicator", Text),
        ColumnSpec::new("value", Real),
    ],
    natural_key: &["date", "indicator"],
    required: &["date", "indicator", "value"],
    null_tolerance: None,
    calendar_dependent: false,
};

/// 启动时建表的全部数据集
pub const ALL_DATASETS: [DatasetDescriptor; 9] = [
    CALENDAR,
    INDICES,
    MARKET_AMOUNT,
    BREADTH,
    NORTHBOUND,
    ETF_FLOWS,
    MARGIN,
    INDUSTRY,
    MACRO,
];

pub fn find_builtin(name: &str) -> Option<DatasetDescriptor> {
    ALL_DATASETS.iter().find(|d| d.name == name).copied()
}
