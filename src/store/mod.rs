//! SQLite 持久化：每个数据集一张表，自然键为主键，批量写入在同一事务内完成

pub mod convert;
pub mod export;

use crate::errors::StoreError;
use crate::models::dataset::{DatasetDescriptor, CALENDAR};
use crate::models::table::{build_batch, Cell, FetchResult};
use crate::util;
use chrono::NaiveDate;
use log::{debug, info, warn};
use rusqlite::types::Value;
use rusqlite::{params_from_iter, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

/// 按列等值过滤
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowFilter {
    conditions: Vec<(String, Cell)>,
}

impl RowFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn on_date(date: NaiveDate) -> Self {
        Self::all().eq("date", date)
    }

    pub fn eq(mut self, column: &str, value: impl Into<Cell>) -> Self {
        self.conditions.push((column.to_string(), value.into()));
        self
    }
}

pub struct MarketStore {
    conn: Mutex<Connection>,
    tables: HashMap<&'static str, DatasetDescriptor>,
}

impl MarketStore {
    /// 打开或创建数据库，并为每个声明的数据集建表
    pub fn open(location: &str, descriptors: &[DatasetDescriptor]) -> Result<Self, StoreError> {
        if location == ":memory:" {
            return Self::open_in_memory(descriptors);
        }
        if let Some(parent) = Path::new(location).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(location)?;
        let journal_mode: String = conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))
            .unwrap_or_default();
        if !journal_mode.eq_ignore_ascii_case("wal") {
            warn!("WAL 模式未生效, journal_mode = {}", journal_mode);
        }
        info!("打开数据库 {}", location);
        Self::init(conn, descriptors)
    }

    pub fn open_in_memory(descriptors: &[DatasetDescriptor]) -> Result<Self, StoreError> {
        Self::init(Connection::open_in_memory()?, descriptors)
    }

    fn init(mut conn: Connection, descriptors: &[DatasetDescriptor]) -> Result<Self, StoreError> {
        conn.busy_timeout(Duration::from_secs(5))?;

        let mut tables = HashMap::new();
        let tx = conn.transaction()?;
        for descriptor in descriptors {
            descriptor.validate()?;
            tx.execute_batch(&create_table_sql(descriptor))?;
            tables.insert(descriptor.name, *descriptor);
        }
        tx.commit()?;
        debug!("已确认 {} 张表", tables.len());

        Ok(Self {
            conn: Mutex::new(conn),
            tables,
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::Poisoned)
    }

    pub fn descriptor(&self, table: &str) -> Result<&DatasetDescriptor, StoreError> {
        self.tables
            .get(table)
            .ok_or_else(|| StoreError::UnknownTable(table.to_string()))
    }

    /// 以自然键覆盖写入整批数据，任一行失败则整批回滚
    pub fn upsert(&self, table: &str, batch: &FetchResult, key_columns: &[&str]) -> Result<usize, StoreError> {
        let descriptor = self.descriptor(table)?;

        let mut declared: Vec<&str> = descriptor.natural_key.to_vec();
        let mut given: Vec<&str> = key_columns.to_vec();
        declared.sort_unstable();
        given.sort_unstable();
        if declared != given {
            return Err(StoreError::KeyMismatch {
                table: table.to_string(),
                declared: descriptor.natural_key.iter().map(|k| k.to_string()).collect(),
                given: key_columns.iter().map(|k| k.to_string()).collect(),
            });
        }

        let schema = batch.schema();
        for key in descriptor.natural_key {
            if schema.index_of(key).is_err() {
                return Err(StoreError::MissingKeyColumn {
                    table: table.to_string(),
                    column: key.to_string(),
                });
            }
        }

        let mut names = Vec::with_capacity(batch.num_columns());
        let mut columns = Vec::with_capacity(batch.num_columns());
        for (field, array) in schema.fields().iter().zip(batch.columns()) {
            let spec = descriptor
                .column(field.name())
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: field.name().to_string(),
                })?;
            names.push(spec.name);
            columns.push(convert::column_cells(array, spec.name, spec.kind)?);
        }

        if batch.num_rows() == 0 {
            return Ok(0);
        }

        let placeholders: Vec<String> = (1..=names.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}) VALUES ({})",
            table,
            names.join(", "),
            placeholders.join(", ")
        );

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in 0..batch.num_rows() {
                stmt.execute(params_from_iter(columns.iter().map(|column| &column[row])))?;
            }
        }
        tx.commit()?;

        debug!("{} 写入 {} 行", table, batch.num_rows());
        Ok(batch.num_rows())
    }

    /// 按自然键排序读取
    pub fn read(&self, table: &str, filter: &RowFilter) -> Result<FetchResult, StoreError> {
        let descriptor = self.descriptor(table)?;

        let mut clauses = Vec::with_capacity(filter.conditions.len());
        for (i, (column, _)) in filter.conditions.iter().enumerate() {
            let spec = descriptor
                .column(column)
                .ok_or_else(|| StoreError::UnknownColumn {
                    table: table.to_string(),
                    column: column.clone(),
                })?;
            clauses.push(format!("{} = ?{}", spec.name, i + 1));
        }

        let names: Vec<&str> = descriptor.columns.iter().map(|c| c.name).collect();
        let mut sql = format!("SELECT {} FROM {}", names.join(", "), table);
        if !clauses.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&descriptor.natural_key.join(", "));

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let raw: Vec<Vec<Value>> = stmt
            .query_map(params_from_iter(filter.conditions.iter().map(|(_, v)| v)), |row| {
                (0..names.len())
                    .map(|i| row.get::<_, Value>(i))
                    .collect::<rusqlite::Result<Vec<Value>>>()
            })?
            .collect::<Result<_, _>>()?;

        let mut rows = Vec::with_capacity(raw.len());
        for values in raw {
            let row = values
                .into_iter()
                .zip(descriptor.columns)
                .map(|(value, spec)| convert::cell_from_sql(value, spec.name, spec.kind))
                .collect::<Result<Vec<Cell>, _>>()?;
            rows.push(row);
        }

        build_batch(descriptor.columns, &rows).map_err(|e| StoreError::Arrow(e.to_string()))
    }

    /// 查询本地交易日历；未声明日历表或日期未知时返回 `None`
    pub fn is_trading_day(&self, date: &NaiveDate) -> Result<Option<bool>, StoreError> {
        if !self.tables.contains_key(CALENDAR.name) {
            return Ok(None);
        }
        let conn = self.lock()?;
        let flag: Option<Option<i64>> = conn
            .query_row(
                "SELECT is_trading_day FROM calendar WHERE date = ?1",
                [util::iso_date(date)],
                |row| row.get(0),
            )
            .optional()?;
        Ok(flag.flatten().map(|f| f != 0))
    }

    /// 表中最新的日期
    pub fn latest_date(&self, table: &str) -> Result<Option<NaiveDate>, StoreError> {
        let descriptor = self.descriptor(table)?;
        if descriptor.column("date").is_none() {
            return Err(StoreError::UnknownColumn {
                table: table.to_string(),
                column: "date".to_string(),
            });
        }
        let conn = self.lock()?;
        let latest: Option<String> =
            conn.query_row(&format!("SELECT MAX(date) FROM {}", table), [], |row| row.get(0))?;
        Ok(latest.as_deref().and_then(util::parse_upstream_date))
    }

    pub fn count(&self, table: &str) -> Result<usize, StoreError> {
        self.descriptor(table)?;
        let conn = self.lock()?;
        let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| row.get(0))?;
        Ok(n as usize)
    }
}

fn create_table_sql(descriptor: &DatasetDescriptor) -> String {
    let mut columns: Vec<String> = descriptor
        .columns
        .iter()
        .map(|c| {
            let not_null = if descriptor.natural_key.contains(&c.name) {
                " NOT NULL"
            } else {
                ""
            };
            format!("{} {}{}", c.name, c.kind.sql_type(), not_null)
        })
        .collect();
    columns.push(format!("PRIMARY KEY ({})", descriptor.natural_key.join(", ")));
    format!(
        "CREATE TABLE IF NOT EXISTS {} ({})",
        descriptor.name,
        columns.join(", ")
    )
}
