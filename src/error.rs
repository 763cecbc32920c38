// ==========================================
// 能源数据集市 - 错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 配置 / 数据源 / 校验 / 转换 / 锁 / 写入
// ==========================================

use crate::domain::validation::TransformIssue;
use std::path::PathBuf;
use thiserror::Error;

/// ETL 错误类型
#[derive(Error, Debug)]
pub enum EtlError {
    // ===== 配置错误（运行不会开始） =====
    #[error("配置错误 ({path}): {message}")]
    Config { path: String, message: String },

    // ===== 数据源错误 =====
    #[error("必需数据源未找到: {0}")]
    SourceNotFound(String),

    #[error("工作表不存在 (数据源 {source_name}): {sheet}")]
    SheetNotFound { source_name: String, sheet: String },

    #[error("文件格式不支持: {0}（仅支持 .xlsx/.xlsm/.xls/.xlsb/.ods/.csv）")]
    UnsupportedFormat(String),

    #[error("文件读取失败: {0}")]
    FileRead(String),

    #[error("Excel 解析失败: {0}")]
    ExcelParse(String),

    #[error("CSV 解析失败: {0}")]
    CsvParse(String),

    // ===== 校验与转换错误 =====
    #[error("表 {table} 校验未通过 (状态 {status})，报告: {}", .report.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string()))]
    SchemaValidationFailed {
        table: String,
        status: String,
        report: Option<PathBuf>,
    },

    #[error("转换失败 (表 {table}, 文件 {file}, 工作表 {}, 行 {}, 列 {}): {} (值: {:?})，报告: {}", .issue.sheet, .issue.row_number, .issue.column, .issue.reason, .issue.value, .report.as_ref().map(|p| p.display().to_string()).unwrap_or_else(|| "-".to_string()))]
    Transform {
        table: String,
        file: String,
        issue: Box<TransformIssue>,
        report: Option<PathBuf>,
    },

    // ===== 集市存储错误 =====
    #[error("获取表 {table} 的合并锁超时 ({waited_ms} ms)，锁文件: {}", .lock_path.display())]
    LockTimeout {
        table: String,
        waited_ms: u64,
        lock_path: PathBuf,
    },

    #[error("写入失败 (表 {table}): {message}")]
    WriteFailure { table: String, message: String },

    #[error("集市表读取失败 (表 {table}): {message}")]
    MartRead { table: String, message: String },

    // ===== 审计产物错误 =====
    #[error("校验报告已存在 (run_id {run_id}, 表 {table})")]
    ReportCollision { run_id: String, table: String },

    #[error("运行台账错误: {0}")]
    Ledger(String),

    #[error("JSON 序列化失败: {0}")]
    Json(String),

    // ===== 通用错误 =====
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EtlError {
    /// 构造配置错误
    pub fn config(path: impl Into<String>, message: impl Into<String>) -> Self {
        EtlError::Config {
            path: path.into(),
            message: message.into(),
        }
    }

    /// 进程退出码
    ///
    /// - 2: 配置 / 数据源解析错误
    /// - 3: 锁超时（调用方可重试）
    /// - 1: 其他运行失败
    pub fn exit_code(&self) -> u8 {
        match self {
            EtlError::Config { .. } | EtlError::SourceNotFound(_) => 2,
            EtlError::LockTimeout { .. } => 3,
            _ => 1,
        }
    }

    /// 是否为可重试错误
    pub fn is_retryable(&self) -> bool {
        matches!(self, EtlError::LockTimeout { .. })
    }
}

// 实现 From<std::io::Error>
impl From<std::io::Error> for EtlError {
    fn from(err: std::io::Error) -> Self {
        EtlError::FileRead(err.to_string())
    }
}

// 实现 From<csv::Error>
impl From<csv::Error> for EtlError {
    fn from(err: csv::Error) -> Self {
        EtlError::CsvParse(err.to_string())
    }
}

// 实现 From<calamine::Error>
impl From<calamine::Error> for EtlError {
    fn from(err: calamine::Error) -> Self {
        EtlError::ExcelParse(err.to_string())
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for EtlError {
    fn from(err: serde_json::Error) -> Self {
        EtlError::Json(err.to_string())
    }
}

/// Result 类型别名
pub type EtlResult<T> = Result<T, EtlError>;
