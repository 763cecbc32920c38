// ==========================================
// 能源数据集市 - 行记录模型
// ==========================================
// 职责: RawTable（抽取结果）/ CanonicalRow（规范行）/ MartTable（集市表）
// 说明: 行值为显式映射，区分已声明列与额外列
// ==========================================

use crate::domain::types::CellValue;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ==========================================
// ColumnOrigin - 列来源
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnOrigin {
    Declared, // 表规则已声明
    Extra,    // 未声明，原样透传
}

// ==========================================
// ColumnHeader - 列头
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnHeader {
    pub name: String,     // 重命名后的规范列名
    pub raw_name: String, // 原始表头
    pub origin: ColumnOrigin,
}

// ==========================================
// Provenance - 来源信息
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    pub source_name: String,
    pub source_file: String,
    pub sheet: String,
    pub extracted_at: DateTime<Utc>,
}

// ==========================================
// RawRow - 原始行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub row_number: usize,                  // 工作表内行号（从 1 开始）
    pub cells: BTreeMap<String, CellValue>, // 规范列名 → 值
    pub flags: Vec<String>,                 // 校验标记（违反的规则）
}

impl RawRow {
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            cells: BTreeMap::new(),
            flags: Vec::new(),
        }
    }

    /// 读取单元格，缺失列视为 Empty
    pub fn get(&self, column: &str) -> &CellValue {
        static EMPTY: CellValue = CellValue::Empty;
        self.cells.get(column).unwrap_or(&EMPTY)
    }

    pub fn is_flagged(&self) -> bool {
        !self.flags.is_empty()
    }
}

// ==========================================
// RawTable - 原始表（每个 数据源×工作表 一张）
// ==========================================
// 生命周期: 每次运行新建，转换后丢弃，不落盘
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawTable {
    pub source_name: String,
    pub logical_sheet: String,
    pub table: String,
    pub columns: Vec<ColumnHeader>,
    pub rows: Vec<RawRow>,
    pub provenance: Provenance,
}

impl RawTable {
    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c.name == name)
    }

    /// 未声明的额外列
    pub fn extra_columns(&self) -> Vec<String> {
        self.columns
            .iter()
            .filter(|c| c.origin == ColumnOrigin::Extra)
            .map(|c| c.name.clone())
            .collect()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

// ==========================================
// KeyTuple - 主键元组
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct KeyTuple(pub Vec<String>);

impl fmt::Display for KeyTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({})", self.0.join(", "))
    }
}

// ==========================================
// CanonicalRow - 规范行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRow {
    pub table: String,
    pub key: KeyTuple,
    pub fields: BTreeMap<String, String>, // 规范化后的字段值
    pub provenance: Option<Provenance>,   // 从集市读回的行无来源信息
}

impl CanonicalRow {
    pub fn field(&self, column: &str) -> Option<&str> {
        self.fields.get(column).map(|v| v.as_str())
    }
}

// ==========================================
// MartTable - 集市表
// ==========================================
// 约束: 行按主键唯一；仅由增量合并器写入
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MartTable {
    pub name: String,
    pub key_columns: Vec<String>,
    pub columns: Vec<String>,
    pub rows: Vec<CanonicalRow>,
}

impl MartTable {
    pub fn empty(name: &str, key_columns: &[String]) -> Self {
        Self {
            name: name.to_string(),
            key_columns: key_columns.to_vec(),
            columns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// 合并列集合（保持已有列顺序，新列追加）
    pub fn extend_columns<'a, I>(&mut self, columns: I)
    where
        I: IntoIterator<Item = &'a String>,
    {
        for column in columns {
            if !self.columns.contains(column) {
                self.columns.push(column.clone());
            }
        }
    }

    pub fn find(&self, key: &KeyTuple) -> Option<&CanonicalRow> {
        self.rows.iter().find(|r| &r.key == key)
    }
}
