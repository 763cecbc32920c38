// ==========================================
// 能源数据集市 - 引擎层
// ==========================================
// 职责: 运行编排 / 增量合并 / 校验报告
// 红线: IncrementalMerger 是唯一写集市表的组件
// ==========================================

pub mod incremental_merger;
pub mod orchestrator;
pub mod report_generator;

// 重导出核心引擎
pub use incremental_merger::{reconcile, IncrementalMerger, MergeStats};
pub use orchestrator::{EtlOrchestrator, MartPipeline, RunOutcome};
pub use report_generator::{ReportGenerator, ReportLevel, ValidationReport};
