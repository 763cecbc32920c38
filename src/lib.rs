// ==========================================
// 能源数据集市 - 核心库
// ==========================================
// 系统定位: 电力公司表格导出 → 规范化数据集市（无外部数据库）
// 核心: 声明式校验 + 按主键增量合并 + 可审计运行台账
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 配置层 - 声明式配置
pub mod config;

// 导入层 - 解析 / 抽取 / 校验 / 转换
pub mod importer;

// 存储层 - 集市表 / 锁 / 台账 / 元数据
pub mod repository;

// 引擎层 - 合并与编排
pub mod engine;

// 错误类型
pub mod error;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

pub use config::{ConfigManager, EtlConfig, PathsConfig, RuntimeConfig};
pub use domain::{
    CanonicalRow, MartTable, RawTable, RunContext, RunMode, RunRecord, RunStatus, SourceSpec,
    TableRule, TableRunStatus, ValidationOutcome, ValidationStatus,
};
pub use engine::{EtlOrchestrator, IncrementalMerger, MartPipeline, RunOutcome};
pub use error::{EtlError, EtlResult};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "能源数据集市 ETL";
