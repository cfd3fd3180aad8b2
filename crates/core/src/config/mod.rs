//! 服务配置
//!
//! 加载顺序：内置默认值 → TOML配置文件 → `PIPELINE_` 前缀的环境变量。

pub mod models;

pub use models::*;
