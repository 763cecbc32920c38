// ==========================================
// 能源数据集市 - 配置模型
// ==========================================
// 职责: 配置文档的类型化结构（原始文档结构 + 校验后的运行配置）
// 格式: YAML (.yml/.yaml) / TOML (.toml/.tml)
// ==========================================

use crate::domain::source::{SheetSelector, SourceSpec, UnpivotSpec};
use crate::domain::table::{ColumnConstraint, LookupRule, TableRule};
use crate::domain::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

// 台账 / 元数据 / 日志文件名
pub const LEDGER_FILE_NAME: &str = "etl_runs.jsonl";
pub const METADATA_FILE_NAME: &str = "metadata.json";
pub const LOG_FILE_NAME: &str = "etl.log";

// ==========================================
// 原始配置文档结构
// ==========================================

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawConfigDocument {
    #[serde(default)]
    pub paths: RawPaths,
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sources: BTreeMap<String, RawSource>,
    #[serde(default)]
    pub tables: BTreeMap<String, RawTableRule>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawPaths {
    pub input: Option<PathBuf>,
    pub output: Option<PathBuf>,
    pub reference: Option<PathBuf>,
    pub logs: Option<PathBuf>,
    pub reports: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSource {
    pub pattern: String,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub sheets: BTreeMap<String, RawSheetEntry>,
}

/// 工作表映射条目: 仅选择器的简写或完整形式
///
/// 简写须排在前面（结构体同样接受序列形式）
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum RawSheetEntry {
    Selector(SheetSelector),
    Detailed(RawSheetDetail),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawSheetDetail {
    pub sheet: SheetSelector,
    pub table: Option<String>,
    #[serde(default)]
    pub header_keywords: Vec<String>,
    pub unpivot: Option<UnpivotSpec>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub(crate) struct RawTableRule {
    pub required_columns: Vec<String>,
    #[serde(default)]
    pub optional_columns: Vec<String>,
    #[serde(default)]
    pub rename: BTreeMap<String, String>,
    pub key_columns: Vec<String>,
    #[serde(default)]
    pub types: BTreeMap<String, ColumnType>,
    #[serde(default)]
    pub scale: BTreeMap<String, f64>,
    #[serde(default)]
    pub constraints: BTreeMap<String, Vec<ColumnConstraint>>,
    #[serde(default)]
    pub lookups: Vec<LookupRule>,
}

// ==========================================
// RuntimeConfig - 运行参数
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RuntimeConfig {
    pub lock_timeout_secs: u64,    // 合并锁等待上限
    pub parallel_extraction: bool, // 并发抽取
    pub header_scan_rows: usize,   // 表头识别扫描行数
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            lock_timeout_secs: 30,
            parallel_extraction: true,
            header_scan_rows: 20,
        }
    }
}

// ==========================================
// PathsConfig - 目录配置（已解析为可用路径）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    pub input: PathBuf,     // 落地目录（原始文件）
    pub output: PathBuf,    // 集市目录
    pub reference: PathBuf, // 参照表目录
    pub logs: PathBuf,      // 日志与运行台账
    pub reports: PathBuf,   // 校验报告
}

impl PathsConfig {
    /// 以 base_dir 为基准的默认目录
    pub fn defaults_in(base_dir: &Path) -> Self {
        Self {
            input: base_dir.join("data_landing"),
            output: base_dir.join("data_mart"),
            reference: base_dir.join("data_reference"),
            logs: base_dir.join("logs"),
            reports: base_dir.join("reports"),
        }
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.logs.join(LEDGER_FILE_NAME)
    }

    pub fn metadata_path(&self) -> PathBuf {
        self.output.join(METADATA_FILE_NAME)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.logs.join(LOG_FILE_NAME)
    }

    /// 全部目录（用于创建）
    pub fn all(&self) -> [&Path; 5] {
        [
            self.input.as_path(),
            self.output.as_path(),
            self.reference.as_path(),
            self.logs.as_path(),
            self.reports.as_path(),
        ]
    }
}

// ==========================================
// EtlConfig - 校验后的配置
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct EtlConfig {
    pub sources: Vec<SourceSpec>, // 按名称排序
    pub tables: Vec<TableRule>,   // 按名称排序
    pub paths: PathsConfig,
    pub runtime: RuntimeConfig,
    pub source_path: Option<PathBuf>, // 配置文件路径（内存构造时为 None）
}

impl EtlConfig {
    pub fn table_rule(&self, name: &str) -> Option<&TableRule> {
        self.tables.iter().find(|t| t.name == name)
    }

    pub fn source(&self, name: &str) -> Option<&SourceSpec> {
        self.sources.iter().find(|s| s.name == name)
    }

    /// 某逻辑表的全部来源（数据源名称）
    pub fn sources_for_table(&self, table: &str) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.sheets.iter().any(|sh| sh.table == table))
            .map(|s| s.name.as_str())
            .collect()
    }
}

// ==========================================
// ConfigFormat - 配置文档格式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Toml,
}

impl ConfigFormat {
    /// 按扩展名判断格式
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())?;
        match ext.as_str() {
            "yml" | "yaml" => Some(ConfigFormat::Yaml),
            "toml" | "tml" => Some(ConfigFormat::Toml),
            _ => None,
        }
    }
}
