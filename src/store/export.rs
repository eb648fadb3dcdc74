//! Arrow IPC 快照与 JSON 行输出

use crate::errors::StoreError;
use crate::models::table::FetchResult;
use crate::util;
use arrow_ipc::reader::FileReader;
use arrow_ipc::writer::FileWriter;
use chrono::NaiveDate;
use log::info;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

/// 快照路径：`<dir>/<dataset>/<YYYY-MM-DD>.arrow`
pub fn snapshot_path(dir: &Path, dataset: &str, date: &NaiveDate) -> PathBuf {
    dir.join(dataset).join(format!("{}.arrow", util::iso_date(date)))
}

// 将记录批次保存到Arrow文件
pub fn write_arrow(batch: &FetchResult, path: &Path) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;

    // 使用默认选项，不启用压缩
    let mut writer = FileWriter::try_new(file, &batch.schema())?;
    writer.write(batch)?;
    writer.finish()?;

    info!("已写入 {} 行到 {}", batch.num_rows(), path.display());
    Ok(())
}

// 从Arrow文件读取全部批次
pub fn read_arrow(path: &Path) -> Result<Vec<FetchResult>, StoreError> {
    let file = File::open(path)?;
    let reader = FileReader::try_new(file, None)?;
    let mut batches = Vec::new();
    for batch in reader {
        batches.push(batch?);
    }
    Ok(batches)
}

/// 每行输出一个 JSON 对象，日期列输出为 `YYYY-MM-DD`
pub fn write_json_lines<W: Write>(batch: &FetchResult, out: W) -> Result<(), StoreError> {
    let mut writer = arrow_json::LineDelimitedWriter::new(out);
    writer.write_batches(&[batch])?;
    writer.finish()?;
    Ok(())
}
