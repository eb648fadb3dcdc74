//! Arrow 列与 SQLite 值之间的转换

use crate::errors::StoreError;
use crate::models::table::{Cell, ColumnKind};
use crate::util;
use arrow_array::{Array, ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Cell::Null => ToSqlOutput::Owned(Value::Null),
            Cell::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            Cell::Real(v) if v.is_nan() => ToSqlOutput::Owned(Value::Null),
            Cell::Real(v) => ToSqlOutput::Owned(Value::Real(*v)),
            Cell::Integer(v) => ToSqlOutput::Owned(Value::Integer(*v)),
            Cell::Date(d) => ToSqlOutput::Owned(Value::Text(util::iso_date(d))),
        })
    }
}

fn downcast<'a, T: 'static>(array: &'a ArrayRef, column: &str) -> Result<&'a T, StoreError> {
    array
        .as_any()
        .downcast_ref::<T>()
        .ok_or_else(|| StoreError::UnsupportedType {
            column: column.to_string(),
            data_type: array.data_type().to_string(),
        })
}

/// 取出一列的全部单元格，列类型必须与声明一致
pub fn column_cells(array: &ArrayRef, column: &str, kind: ColumnKind) -> Result<Vec<Cell>, StoreError> {
    if array.data_type() != &kind.data_type() {
        return Err(StoreError::UnsupportedType {
            column: column.to_string(),
            data_type: array.data_type().to_string(),
        });
    }

    let cells = match kind {
        ColumnKind::Text => {
            let values = downcast::<StringArray>(array, column)?;
            values.iter().map(Cell::text).collect()
        }
        ColumnKind::Real => {
            let values = downcast::<Float64Array>(array, column)?;
            values.iter().map(Cell::real).collect()
        }
        ColumnKind::Integer => {
            let values = downcast::<Int64Array>(array, column)?;
            values.iter().map(Cell::integer).collect()
        }
        ColumnKind::Date => {
            let values = downcast::<Date32Array>(array, column)?;
            values
                .iter()
                .map(|days| match days.and_then(util::days_to_date) {
                    Some(date) => Cell::Date(date),
                    None => Cell::Null,
                })
                .collect()
        }
    };
    Ok(cells)
}

/// 按声明类型把 SQLite 值还原为单元格
pub fn cell_from_sql(value: Value, column: &str, kind: ColumnKind) -> Result<Cell, StoreError> {
    let mismatch = |found: &str| StoreError::UnsupportedType {
        column: column.to_string(),
        data_type: found.to_string(),
    };

    match (kind, value) {
        (_, Value::Null) => Ok(Cell::Null),
        (ColumnKind::Text, Value::Text(s)) => Ok(Cell::Text(s)),
        (ColumnKind::Real, Value::Real(v)) => Ok(Cell::Real(v)),
        // SQLite 会把整数值的 REAL 列存成 INTEGER
        (ColumnKind::Real, Value::Integer(v)) => Ok(Cell::Real(v as f64)),
        (ColumnKind::Integer, Value::Integer(v)) => Ok(Cell::Integer(v)),
        (ColumnKind::Date, Value::Text(s)) => util::parse_upstream_date(&s)
            .map(Cell::Date)
            .ok_or_else(|| mismatch(&format!("TEXT {:?}", s))),
        (_, Value::Text(_)) => Err(mismatch("TEXT")),
        (_, Value::Real(_)) => Err(mismatch("REAL")),
        (_, Value::Integer(_)) => Err(mismatch("INTEGER")),
        (_, Value::Blob(_)) => Err(mismatch("BLOB")),
    }
}
