// 公开导出的模块，供外部使用
pub mod config;
pub mod errors;
pub mod models;
pub mod registry;
pub mod services;
pub mod store;

// 适配器与工具函数主要供二进制程序和测试使用
#[doc(hidden)]
pub mod scrapers;
#[doc(hidden)]
pub mod util;

// 重新导出常用类型，方便使用
pub use config::Config;
pub use errors::{IngestError, Result};
pub use models::dataset::DatasetDescriptor;
pub use models::summary::{DatasetOutcome, DatasetState, RunSummary};
pub use registry::{DatasetEntry, DatasetRegistry};
pub use scrapers::MarketFetcher;
pub use services::Orchestrator;
pub use store::{MarketStore, RowFilter};
