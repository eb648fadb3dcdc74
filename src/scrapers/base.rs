use crate::errors::FetchError;
use crate::models::table::FetchResult;
use async_trait::async_trait;
use chrono::NaiveDate;

/// Base trait for dataset fetch adapters
///
/// One call is one logical fetch: a single request, or a small fixed set of
/// sub-requests that together make up the dataset. Adapters never retry and
/// never write to the store; missing upstream values surface as nulls or as an
/// empty result.
#[async_trait]
pub trait MarketFetcher: Send + Sync {
    /// Upstream source label, used in logs
    fn source(&self) -> &'static str;

    /// Fetch the dataset for the given trading date
    async fn fetch(&self, date: &NaiveDate) -> Result<FetchResult, FetchError>;
}
