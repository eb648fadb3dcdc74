use crate::errors::ConfigError;
use crate::models::dataset::DatasetDescriptor;
use crate::scrapers::base::MarketFetcher;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// 数据集声明与对应的抓取适配器
#[derive(Clone)]
pub struct DatasetEntry {
    pub descriptor: DatasetDescriptor,
    pub fetcher: Arc<dyn MarketFetcher>,
}

impl DatasetEntry {
    pub fn new(descriptor: DatasetDescriptor, fetcher: Arc<dyn MarketFetcher>) -> Self {
        Self { descriptor, fetcher }
    }
}

/// 有序的数据集注册表，顺序即处理与汇总顺序
#[derive(Clone)]
pub struct DatasetRegistry {
    entries: Vec<DatasetEntry>,
}

impl DatasetRegistry {
    /// 校验每个声明，并拒绝重名数据集
    pub fn new(entries: Vec<DatasetEntry>) -> Result<Self, ConfigError> {
        let mut names = HashSet::new();
        for entry in &entries {
            entry.descriptor.validate()?;
            if !names.insert(entry.descriptor.name) {
                return Err(ConfigError::InvalidDataset {
                    dataset: entry.descriptor.name.to_string(),
                    message: "registered twice".to_string(),
                });
            }
        }
        Ok(Self { entries })
    }

    /// 应用按数据集覆盖的空值容忍度，未注册的名称视为配置错误
    pub fn with_tolerance_overrides(mut self, overrides: &HashMap<String, f64>) -> Result<Self, ConfigError> {
        for (name, tolerance) in overrides {
            let entry = self
                .entries
                .iter_mut()
                .find(|e| e.descriptor.name == name.as_str())
                .ok_or_else(|| ConfigError::InvalidDataset {
                    dataset: name.clone(),
                    message: "not registered".to_string(),
                })?;
            entry.descriptor = entry.descriptor.with_null_tolerance(*tolerance);
            entry.descriptor.validate()?;
        }
        Ok(self)
    }

    pub fn entries(&self) -> &[DatasetEntry] {
        &self.entries
    }

    pub fn descriptors(&self) -> Vec<DatasetDescriptor> {
        self.entries.iter().map(|e| e.descriptor).collect()
    }

    pub fn get(&self, name: &str) -> Option<&DatasetEntry> {
        self.entries.iter().find(|e| e.descriptor.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
