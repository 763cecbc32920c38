// ==========================================
// 能源数据集市 - 领域层
// ==========================================
// 职责: 数据源 / 表规则 / 行记录 / 校验结果 / 运行记录
// 红线: 领域层不做 I/O
// ==========================================

pub mod record;
pub mod run;
pub mod source;
pub mod table;
pub mod types;
pub mod validation;

// 重导出核心类型
pub use record::{
    CanonicalRow, ColumnHeader, ColumnOrigin, KeyTuple, MartTable, Provenance, RawRow, RawTable,
};
pub use run::{
    RunContext, RunRecord, RunStatus, SourceFileInfo, TableRunStats, TableRunStatus,
};
pub use source::{SheetSelector, SheetSpec, SourceSpec, UnpivotSpec};
pub use table::{ColumnConstraint, LookupRule, TableRule};
pub use types::{CellValue, ColumnType, RunMode};
pub use validation::{DomainViolation, TransformIssue, ValidationOutcome, ValidationStatus};
