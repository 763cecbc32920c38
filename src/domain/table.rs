// ==========================================
// 能源数据集市 - 逻辑表规则
// ==========================================
// 职责: TableRule / ColumnConstraint / LookupRule
// 约束: 运行期不可变；规则由固定解释器执行，不生成代码
// ==========================================

use crate::domain::types::ColumnType;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// TableRule - 逻辑表契约
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRule {
    pub name: String,
    pub required_columns: Vec<String>,      // 必需列（有序）
    pub optional_columns: Vec<String>,      // 已声明的可选列
    pub rename: BTreeMap<String, String>,   // 原始列名 → 规范列名
    pub key_columns: Vec<String>,           // 主键列（去重身份）
    pub types: BTreeMap<String, ColumnType>, // 列类型
    pub scale: BTreeMap<String, f64>,       // 单位换算系数
    pub constraints: BTreeMap<String, Vec<ColumnConstraint>>,
    pub lookups: Vec<LookupRule>,
}

impl TableRule {
    /// 创建仅含必需列与主键的规则
    pub fn new(name: &str, required_columns: &[&str], key_columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            required_columns: required_columns.iter().map(|c| c.to_string()).collect(),
            optional_columns: Vec::new(),
            rename: BTreeMap::new(),
            key_columns: key_columns.iter().map(|c| c.to_string()).collect(),
            types: BTreeMap::new(),
            scale: BTreeMap::new(),
            constraints: BTreeMap::new(),
            lookups: Vec::new(),
        }
    }

    /// 已声明列（必需列在前，其次可选列，再次查找目标列）
    pub fn declared_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = Vec::new();
        let candidates = self
            .required_columns
            .iter()
            .chain(self.optional_columns.iter())
            .chain(self.lookups.iter().map(|l| &l.target));
        for column in candidates {
            if !columns.contains(column) {
                columns.push(column.clone());
            }
        }
        columns
    }

    /// 列是否已声明
    pub fn is_declared(&self, column: &str) -> bool {
        self.required_columns.iter().any(|c| c == column)
            || self.optional_columns.iter().any(|c| c == column)
            || self.lookups.iter().any(|l| l.target == column)
    }

    /// 列类型（未声明类型时返回 None）
    pub fn column_type(&self, column: &str) -> Option<ColumnType> {
        self.types.get(column).copied()
    }

    /// 是否为主键列
    pub fn is_key(&self, column: &str) -> bool {
        self.key_columns.iter().any(|c| c == column)
    }
}

// ==========================================
// ColumnConstraint - 列域约束（标签变体）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case", deny_unknown_fields)]
pub enum ColumnConstraint {
    NotNull,
    Range {
        #[serde(default)]
        min: Option<f64>,
        #[serde(default)]
        max: Option<f64>,
    },
    OneOf {
        values: Vec<String>,
    },
    Pattern {
        regex: String,
    },
}

impl ColumnConstraint {
    /// 规则标签（用于报告）
    pub fn label(&self) -> &'static str {
        match self {
            ColumnConstraint::NotNull => "not_null",
            ColumnConstraint::Range { .. } => "range",
            ColumnConstraint::OneOf { .. } => "one_of",
            ColumnConstraint::Pattern { .. } => "pattern",
        }
    }
}

impl fmt::Display for ColumnConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnConstraint::NotNull => write!(f, "not_null"),
            ColumnConstraint::Range { min, max } => {
                let lo = min.map(|v| v.to_string()).unwrap_or_else(|| "-∞".to_string());
                let hi = max.map(|v| v.to_string()).unwrap_or_else(|| "+∞".to_string());
                write!(f, "range[{}, {}]", lo, hi)
            }
            ColumnConstraint::OneOf { values } => write!(f, "one_of{{{}}}", values.join(",")),
            ColumnConstraint::Pattern { regex } => write!(f, "pattern /{}/", regex),
        }
    }
}

// ==========================================
// LookupRule - 参照表映射
// ==========================================
// 用途: 以参照 CSV 为源，按规范化名称填充目标列
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LookupRule {
    pub column: String,       // 本表中待匹配的列
    pub reference: String,    // 参照文件（相对 reference 目录）
    pub match_column: String, // 参照文件中的名称列
    pub value_column: String, // 参照文件中的取值列
    pub target: String,       // 写入的目标列
}
