// ==========================================
// 能源数据集市 - 运行上下文与运行记录
// ==========================================
// 职责: RunContext（显式传递，无全局状态）/ RunRecord（台账条目）
// ==========================================

use crate::domain::types::RunMode;
use crate::domain::validation::ValidationStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ==========================================
// RunContext - 运行上下文
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    pub run_id: String,
    pub mode: RunMode,
    pub force: bool,                 // 主键冲突时以新行替换
    pub month: Option<String>,       // 仅用于标注 / 日志
    pub parallel_extraction: bool,   // 并发抽取
    pub started_at: DateTime<Utc>,
}

impl RunContext {
    /// 创建新的运行上下文（生成新的 run_id）
    pub fn new(mode: RunMode, force: bool, month: Option<String>, parallel_extraction: bool) -> Self {
        let started_at = Utc::now();
        Self {
            run_id: generate_run_id(started_at),
            mode,
            force,
            month,
            parallel_extraction,
            started_at,
        }
    }

    pub fn is_strict(&self) -> bool {
        self.mode == RunMode::Strict
    }
}

/// 生成 run_id: `<UTC YYYYMMDDHHMMSS>-<8 位十六进制>`
///
/// 前缀按启动时间可排序，后缀保证同一秒内的唯一性
pub fn generate_run_id(at: DateTime<Utc>) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}-{}", at.format("%Y%m%d%H%M%S"), &suffix[..8])
}

/// 校验 `--month` 标签（YYYYMM）
pub fn validate_month_label(value: &str) -> Result<String, String> {
    let trimmed = value.trim();
    if trimmed.len() != 6 || !trimmed.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("月份格式应为 YYYYMM: {}", value));
    }
    let month: u32 = trimmed[4..].parse().map_err(|_| format!("月份无效: {}", value))?;
    if !(1..=12).contains(&month) {
        return Err(format!("月份超出范围 01-12: {}", value));
    }
    Ok(trimmed.to_string())
}

// ==========================================
// TableRunStatus - 单表处理状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableRunStatus {
    Merged,             // 已合并，无问题
    MergedWithWarnings, // 已合并，存在告警 / 丢弃行
    Failed,             // 失败（未合并）
    Skipped,            // 无可用数据源
    NotProcessed,       // 运行中止前未处理
}

impl fmt::Display for TableRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TableRunStatus::Merged => "merged",
            TableRunStatus::MergedWithWarnings => "merged_with_warnings",
            TableRunStatus::Failed => "failed",
            TableRunStatus::Skipped => "skipped",
            TableRunStatus::NotProcessed => "not_processed",
        };
        write!(f, "{}", s)
    }
}

// ==========================================
// TableRunStats - 单表运行统计
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRunStats {
    pub rows_in: usize,        // 抽取行数
    pub rows_out: usize,       // 规范化后交给合并的行数
    pub new_count: usize,      // 新增行
    pub duplicate_count: usize, // 主键已存在的行
    pub replaced_count: usize, // --force 下替换的行
    pub mart_rows: usize,      // 合并后集市表总行数
    pub status: TableRunStatus,
    pub validation: Option<ValidationStatus>,
    pub report: Option<String>, // 校验报告路径
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl TableRunStats {
    pub fn with_status(status: TableRunStatus) -> Self {
        Self {
            rows_in: 0,
            rows_out: 0,
            new_count: 0,
            duplicate_count: 0,
            replaced_count: 0,
            mart_rows: 0,
            status,
            validation: None,
            report: None,
            duration_ms: 0,
            message: None,
        }
    }
}

// ==========================================
// RunStatus - 整体运行状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    SuccessWithWarnings,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunStatus::Success => write!(f, "success"),
            RunStatus::SuccessWithWarnings => write!(f, "success_with_warnings"),
            RunStatus::Failed => write!(f, "failed"),
        }
    }
}

// ==========================================
// SourceFileInfo - 已读取的源文件
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceFileInfo {
    pub source_name: String,
    pub file_name: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub size: u64,
}

// ==========================================
// RunRecord - 运行台账条目
// ==========================================
// 约束: 追加后不可变
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: u64,
    pub mode: RunMode,
    pub force: bool,
    pub month: Option<String>,
    pub status: RunStatus,
    pub tables: BTreeMap<String, TableRunStats>,
    pub files_read: Vec<SourceFileInfo>,
    pub skipped_sources: Vec<String>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn table(&self, name: &str) -> Option<&TableRunStats> {
        self.tables.get(name)
    }
}
