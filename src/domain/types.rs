// ==========================================
// 能源数据集市 - 领域类型定义
// ==========================================
// 职责: 单元格值 / 列类型 / 运行模式等基础枚举
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// CellValue - 单元格值
// ==========================================
// 用途: 表格行的松散值表示（来自 Excel / CSV）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    Empty,
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    /// 由文本构造（去首尾空白，空串视为 Empty）
    pub fn text(value: &str) -> Self {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            CellValue::Empty
        } else {
            CellValue::Text(trimmed.to_string())
        }
    }

    /// 是否为空值（空白文本同样视为空）
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// 尝试读取为数值
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            CellValue::Int(i) => Some(*i as f64),
            CellValue::Float(f) => Some(*f),
            CellValue::Text(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Int(i) => write!(f, "{}", i),
            CellValue::Float(v) => write!(f, "{}", v),
            CellValue::Bool(b) => write!(f, "{}", b),
            CellValue::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

// ==========================================
// ColumnType - 列规范化类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,       // 去空白文本
    Identifier, // 标识符（去空白 + 合并空白 + 大写）
    Integer,    // 整数
    Decimal,    // 小数
    Date,       // 日期 YYYY-MM-DD
    Period,     // 期间 YYYYMM
}

impl ColumnType {
    /// 是否为数值类型
    pub fn is_numeric(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Decimal)
    }
}

// ==========================================
// RunMode - 运行模式
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    Strict,    // 严格模式: warn 级问题升级为中止
    NonStrict, // 宽松模式: 仅告警，继续合并
}

impl RunMode {
    pub fn from_flags(non_strict: bool) -> Self {
        if non_strict {
            RunMode::NonStrict
        } else {
            RunMode::Strict
        }
    }
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Strict => write!(f, "strict"),
            RunMode::NonStrict => write!(f, "non_strict"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_text_trims_and_empties() {
        assert_eq!(CellValue::text("  A  "), CellValue::Text("A".to_string()));
        assert_eq!(CellValue::text("   "), CellValue::Empty);
        assert!(CellValue::Text(" ".to_string()).is_empty());
    }

    #[test]
    fn test_cell_display() {
        assert_eq!(CellValue::Float(10.0).to_string(), "10");
        assert_eq!(CellValue::Float(10.5).to_string(), "10.5");
        assert_eq!(
            CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 31).unwrap()).to_string(),
            "2025-01-31"
        );
        assert_eq!(CellValue::Empty.to_string(), "");
    }

    #[test]
    fn test_cell_as_f64() {
        assert_eq!(CellValue::Int(3).as_f64(), Some(3.0));
        assert_eq!(CellValue::Text(" 2.5 ".to_string()).as_f64(), Some(2.5));
        assert_eq!(CellValue::Text("abc".to_string()).as_f64(), None);
        assert_eq!(CellValue::Empty.as_f64(), None);
    }

    #[test]
    fn test_run_mode_display() {
        assert_eq!(RunMode::from_flags(false), RunMode::Strict);
        assert_eq!(RunMode::from_flags(true).to_string(), "non_strict");
    }
}
