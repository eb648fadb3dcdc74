pub mod base;
pub mod breadth;
pub mod eastmoney;
pub mod http;
pub mod indices;
pub mod industry;
pub mod margin;
pub mod northbound;
pub mod szse;

use crate::errors::ConfigError;
use crate::models::dataset::{BREADTH, CALENDAR, INDICES, INDUSTRY, MARGIN, MARKET_AMOUNT, NORTHBOUND};
use crate::registry::{DatasetEntry, DatasetRegistry};
use std::sync::Arc;

pub use base::MarketFetcher;
pub use http::HttpClient;

/// 内置数据集及其适配器，按处理顺序排列
pub fn default_registry(client: Arc<HttpClient>) -> Result<DatasetRegistry, ConfigError> {
    DatasetRegistry::new(vec![
        DatasetEntry::new(CALENDAR, Arc::new(szse::CalendarFetcher::new(client.clone()))),
        DatasetEntry::new(INDICES, Arc::new(indices::IndicesFetcher::new(client.clone()))),
        DatasetEntry::new(MARKET_AMOUNT, Arc::new(indices::MarketAmountFetcher::new(client.clone()))),
        DatasetEntry::new(BREADTH, Arc::new(breadth::BreadthFetcher::new(client.clone()))),
        DatasetEntry::new(NORTHBOUND, Arc::new(northbound::NorthboundFetcher::new(client.clone()))),
        DatasetEntry::new(INDUSTRY, Arc::new(industry::IndustryFetcher::new(client.clone()))),
        DatasetEntry::new(MARGIN, Arc::new(margin::MarginFetcher::new(client))),
    ])
}
