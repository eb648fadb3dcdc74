use egostrategy_review::models::dataset::ALL_DATASETS;
use egostrategy_review::store::MarketStore;
use std::error::Error;
use std::path::Path;

fn main() -> Result<(), Box<dyn Error>> {
    let db = std::env::args().nth(1).unwrap_or_else(|| "data/review.sqlite".to_string());

    // 检查数据库是否存在
    if !Path::new(&db).exists() {
        return Err(format!("数据库 {} 不存在，请先运行 'cargo run -- ingest'", db).into());
    }

    let store = MarketStore::open(&db, &ALL_DATASETS)?;

    // 以指数日线的最新日期作为最新交易日
    match store.latest_date("indices")? {
        Some(date) => {
            println!("最新交易日期: {}", date);

            // 格式化为 YYYY.M.D 版本号（移除前导零）
            let formatted_version = date.format("%Y.%-m.%-d").to_string();
            println!("版本号: {}", formatted_version);
        }
        None => println!("未找到有效的日期"),
    }

    Ok(())
}
