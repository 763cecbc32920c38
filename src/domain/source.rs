// ==========================================
// 能源数据集市 - 数据源定义
// ==========================================
// 职责: SourceSpec / SheetSpec / SheetSelector
// 约束: 运行期不可变
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// SourceSpec - 数据源声明
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub name: String,           // 数据源名称
    pub pattern: String,        // 文件名匹配模式（大小写不敏感子串）
    pub required: bool,         // 是否必需
    pub sheets: Vec<SheetSpec>, // 逻辑工作表映射（声明顺序）
}

// ==========================================
// SheetSpec - 逻辑工作表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSpec {
    pub logical_name: String,         // 逻辑名称
    pub selector: SheetSelector,      // 工作表选择器
    pub table: String,                // 目标逻辑表
    pub header_keywords: Vec<String>, // 表头识别关键字
    pub unpivot: Option<UnpivotSpec>, // 宽表转长表
}

// ==========================================
// SheetSelector - 工作表选择器
// ==========================================
// 名称 / 从 0 开始的序号 / 多个名称（每个名称产出一张原始表）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SheetSelector {
    Index(usize),
    Name(String),
    Names(Vec<String>),
}

impl fmt::Display for SheetSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SheetSelector::Index(i) => write!(f, "#{}", i),
            SheetSelector::Name(n) => write!(f, "{}", n),
            SheetSelector::Names(ns) => write!(f, "[{}]", ns.join(", ")),
        }
    }
}

// ==========================================
// UnpivotSpec - 宽表转长表规则
// ==========================================
// 用途: 月份按列展开的账单类工作表
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnpivotSpec {
    pub id_columns: Vec<String>, // 保留的标识列
    pub period_column: String,   // 生成的期间列
    pub value_column: String,    // 生成的数值列
    #[serde(default)]
    pub year: Option<i32>,       // 月份名表头所属年份
}
