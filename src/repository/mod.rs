// ==========================================
// 能源数据集市 - 存储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 集市表读写 / 合并锁 / 运行台账 / 运行元数据
// 约束: 所有覆盖写均为原子替换（临时文件 + rename）
// ==========================================

pub mod atomic_file;
pub mod mart_lock;
pub mod mart_repo;
pub mod metadata_repo;
pub mod run_ledger_repo;

// 重导出核心仓储
pub use atomic_file::atomic_write;
pub use mart_lock::MartLock;
pub use mart_repo::{CsvMartRepository, MartStore};
pub use metadata_repo::{DatasetMetadata, MetadataRepository, RunMetadata};
pub use run_ledger_repo::RunLedger;
