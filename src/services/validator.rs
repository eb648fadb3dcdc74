use crate::errors::{ValidationError, ValidationReason};
use crate::models::dataset::DatasetDescriptor;
use crate::models::table::FetchResult;
use arrow::array::{Array, ArrayRef, Float64Array};
use log::debug;

// 浮点列里的 NaN 写库时会变成 NULL，这里一并计为缺失
fn missing_count(column: &ArrayRef) -> usize {
    match column.as_any().downcast_ref::<Float64Array>() {
        Some(values) => values.iter().filter(|v| v.map_or(true, f64::is_nan)).count(),
        None => column.null_count(),
    }
}

/// 按数据集声明检查抓取结果：非空、必需列存在、空值比例不超限
#[derive(Debug, Clone, Copy)]
pub struct Validator {
    default_null_tolerance: f64,
}

impl Validator {
    pub fn new(default_null_tolerance: f64) -> Self {
        Self {
            default_null_tolerance,
        }
    }

    /// 规则依次检查，第一条失败即返回；通过时原样返回结果
    pub fn validate(
        &self,
        result: FetchResult,
        descriptor: &DatasetDescriptor,
    ) -> Result<FetchResult, ValidationError> {
        let fail = |column: Option<&str>, reason: ValidationReason| ValidationError {
            dataset: descriptor.name.to_string(),
            column: column.map(str::to_string),
            reason,
        };

        let rows = result.num_rows();
        if rows == 0 {
            return Err(fail(None, ValidationReason::Empty));
        }

        let schema = result.schema();
        if let Some(missing) = descriptor
            .required
            .iter()
            .find(|name| schema.index_of(name).is_err())
        {
            return Err(fail(Some(*missing), ValidationReason::MissingColumn));
        }

        let tolerance = descriptor.effective_tolerance(self.default_null_tolerance);
        for name in descriptor.required {
            let nulls = result
                .column_by_name(name)
                .map(missing_count)
                .unwrap_or(rows);
            let ratio = nulls as f64 / rows as f64;
            if ratio > tolerance {
                return Err(fail(
                    Some(*name),
                    ValidationReason::ExcessNulls { ratio, tolerance },
                ));
            }
        }

        debug!("{} 校验通过：{} 行", descriptor.name, rows);
        Ok(result)
    }
}
