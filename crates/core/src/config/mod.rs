//! 配置管理
//!
//! 配置按以下顺序叠加：内置默认值、TOML 配置文件、`FLEET_SYNC_` 前缀的环境变量。
//! 嵌套字段用 `__` 分隔，例如 `FLEET_SYNC_SYNC__DEFAULT_BATCH_SIZE=10`。

pub mod models;

pub use models::*;

#[cfg(test)]
mod tests;
