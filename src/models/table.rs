use crate::errors::FetchError;
use crate::util;
use arrow::array::{ArrayRef, Date32Builder, Float64Builder, Int64Builder, StringBuilder};
use arrow::record_batch::RecordBatch;
use arrow_schema::{DataType, Field, Schema};
use chrono::NaiveDate;
use std::sync::Arc;

/// 一次抓取得到的表格结果
pub type FetchResult = RecordBatch;

/// 列的逻辑类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Text,
    Real,
    Integer,
    Date,
}

impl ColumnKind {
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnKind::Text => DataType::Utf8,
            ColumnKind::Real => DataType::Float64,
            ColumnKind::Integer => DataType::Int64,
            ColumnKind::Date => DataType::Date32,
        }
    }

    /// SQLite 列类型，日期以 `YYYY-MM-DD` 文本存储
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnKind::Text | ColumnKind::Date => "TEXT",
            ColumnKind::Real => "REAL",
            ColumnKind::Integer => "INTEGER",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpec {
    pub name: &'static str,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub const fn new(name: &'static str, kind: ColumnKind) -> Self {
        Self { name, kind }
    }
}

/// 单元格
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Text(String),
    Real(f64),
    Integer(i64),
    Date(NaiveDate),
}

impl Cell {
    /// 上游缺失的数值保持为空，不做默认值替换
    pub fn real(value: Option<f64>) -> Self {
        value.map(Cell::Real).unwrap_or(Cell::Null)
    }

    pub fn integer(value: Option<i64>) -> Self {
        value.map(Cell::Integer).unwrap_or(Cell::Null)
    }

    pub fn text(value: Option<&str>) -> Self {
        value.map(|s| Cell::Text(s.to_string())).unwrap_or(Cell::Null)
    }
}

impl From<&str> for Cell {
    fn from(s: &str) -> Self {
        Cell::Text(s.to_string())
    }
}

impl From<String> for Cell {
    fn from(s: String) -> Self {
        Cell::Text(s)
    }
}

impl From<f64> for Cell {
    fn from(v: f64) -> Self {
        Cell::Real(v)
    }
}

impl From<i64> for Cell {
    fn from(v: i64) -> Self {
        Cell::Integer(v)
    }
}

impl From<NaiveDate> for Cell {
    fn from(d: NaiveDate) -> Self {
        Cell::Date(d)
    }
}

enum ColumnBuilder {
    Text(StringBuilder),
    Real(Float64Builder),
    Integer(Int64Builder),
    Date(Date32Builder),
}

impl ColumnBuilder {
    fn new(kind: ColumnKind) -> Self {
        match kind {
            ColumnKind::Text => ColumnBuilder::Text(StringBuilder::new()),
            ColumnKind::Real => ColumnBuilder::Real(Float64Builder::new()),
            ColumnKind::Integer => ColumnBuilder::Integer(Int64Builder::new()),
            ColumnKind::Date => ColumnBuilder::Date(Date32Builder::new()),
        }
    }

    fn append(&mut self, column: &str, cell: &Cell) -> Result<(), FetchError> {
        match (self, cell) {
            (ColumnBuilder::Text(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Real(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Integer(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Date(b), Cell::Null) => b.append_null(),
            (ColumnBuilder::Text(b), Cell::Text(s)) => b.append_value(s),
            // NaN 与缺失同义，写库时同样落为 NULL
            (ColumnBuilder::Real(b), Cell::Real(v)) if v.is_nan() => b.append_null(),
            (ColumnBuilder::Real(b), Cell::Real(v)) => b.append_value(*v),
            (ColumnBuilder::Integer(b), Cell::Integer(v)) => b.append_value(*v),
            (ColumnBuilder::Date(b), Cell::Date(d)) => b.append_value(util::date_to_days(d)),
            (_, other) => {
                return Err(FetchError::Internal(format!(
                    "cell {:?} does not fit column {}",
                    other, column
                )))
            }
        }
        Ok(())
    }

    fn finish(self) -> ArrayRef {
        match self {
            ColumnBuilder::Text(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Real(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Integer(mut b) => Arc::new(b.finish()),
            ColumnBuilder::Date(mut b) => Arc::new(b.finish()),
        }
    }
}

/// 按列声明构造 Arrow 记录批次，所有列均允许为空
pub fn build_batch(columns: &[ColumnSpec], rows: &[Vec<Cell>]) -> Result<RecordBatch, FetchError> {
    let schema = Arc::new(Schema::new(
        columns
            .iter()
            .map(|c| Field::new(c.name, c.kind.data_type(), true))
            .collect::<Vec<_>>(),
    ));

    let mut builders: Vec<ColumnBuilder> = columns.iter().map(|c| ColumnBuilder::new(c.kind)).collect();

    for (i, row) in rows.iter().enumerate() {
        if row.len() != columns.len() {
            return Err(FetchError::Internal(format!(
                "row {} has {} cells, expected {}",
                i,
                row.len(),
                columns.len()
            )));
        }
        for ((builder, spec), cell) in builders.iter_mut().zip(columns).zip(row) {
            builder.append(spec.name, cell)?;
        }
    }

    let arrays: Vec<ArrayRef> = builders.into_iter().map(ColumnBuilder::finish).collect();
    RecordBatch::try_new(schema, arrays).map_err(|e| FetchError::Internal(e.to_string()))
}
