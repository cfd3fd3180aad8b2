//! 行映射辅助函数
//!
//! SQLite只有有符号整数，无符号计数按i64存取。

use pipeline_core::{PipelineError, PipelineResult};
use sqlx::{sqlite::SqliteRow, Row};

pub fn get_u64(row: &SqliteRow, column: &str) -> PipelineResult<u64> {
    let value: i64 = row.try_get(column)?;
    u64::try_from(value)
        .map_err(|_| PipelineError::database_error(format!("列 {column} 的值为负数: {value}")))
}

pub fn get_optional_u64(row: &SqliteRow, column: &str) -> PipelineResult<Option<u64>> {
    let value: Option<i64> = row.try_get(column)?;
    value
        .map(|v| {
            u64::try_from(v)
                .map_err(|_| PipelineError::database_error(format!("列 {column} 的值为负数: {v}")))
        })
        .transpose()
}

pub fn get_u32(row: &SqliteRow, column: &str) -> PipelineResult<u32> {
    let value: i64 = row.try_get(column)?;
    u32::try_from(value)
        .map_err(|_| PipelineError::database_error(format!("列 {column} 的值超出范围: {value}")))
}

pub fn to_i64(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn parse_json(row: &SqliteRow, column: &str) -> PipelineResult<serde_json::Value> {
    let raw: String = row.try_get(column)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn parse_optional_json(
    row: &SqliteRow,
    column: &str,
) -> PipelineResult<Option<serde_json::Value>> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| serde_json::from_str(&s))
        .transpose()
        .map_err(PipelineError::from)
}
