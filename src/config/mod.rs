// ==========================================
// 能源数据集市 - 配置层
// ==========================================
// 职责: 声明式配置（数据源 / 逻辑表规则 / 目录 / 运行参数）
// 格式: YAML / TOML
// ==========================================

pub mod config_manager;
pub mod etl_config;

// 重导出
pub use config_manager::{ConfigManager, DEFAULT_CONFIG_CANDIDATES};
pub use etl_config::{ConfigFormat, EtlConfig, PathsConfig, RuntimeConfig};
