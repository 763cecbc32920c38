// ==========================================
// 能源数据集市 - 校验结果
// ==========================================
// 职责: ValidationOutcome / DomainViolation / TransformIssue
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// ValidationStatus - 校验状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationStatus {
    Pass, // 通过
    Warn, // 仅存在域规则违规
    Fail, // 缺少必需列
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationStatus::Pass => write!(f, "pass"),
            ValidationStatus::Warn => write!(f, "warn"),
            ValidationStatus::Fail => write!(f, "fail"),
        }
    }
}

// ==========================================
// DomainViolation - 域规则违规
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainViolation {
    pub source_name: String,
    pub sheet: String,
    pub row_number: usize,
    pub column: String,
    pub rule: String,    // 规则（含参数）
    pub value: String,   // 原始值
    pub message: String, // 违规描述
}

// ==========================================
// TransformIssue - 规范化失败的行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformIssue {
    pub source_name: String,
    pub sheet: String,
    pub row_number: usize,
    pub column: String,
    pub value: String,
    pub reason: String,
}

// ==========================================
// ValidationOutcome - 单表校验结果（每次运行每表一份）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub table: String,
    pub status: ValidationStatus,
    pub missing_columns: Vec<String>,
    pub extra_columns: Vec<String>,
    pub violations: Vec<DomainViolation>,
    pub rows_in: usize,
    pub rows_out: usize,
}

impl ValidationOutcome {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            status: ValidationStatus::Pass,
            missing_columns: Vec::new(),
            extra_columns: Vec::new(),
            violations: Vec::new(),
            rows_in: 0,
            rows_out: 0,
        }
    }

    /// 按缺失列 / 违规重新计算状态
    pub fn recompute_status(&mut self) {
        self.status = if !self.missing_columns.is_empty() {
            ValidationStatus::Fail
        } else if !self.violations.is_empty() {
            ValidationStatus::Warn
        } else {
            ValidationStatus::Pass
        };
    }

    /// 合并同一逻辑表的另一张原始表的校验结果
    pub fn absorb(&mut self, other: ValidationOutcome) {
        for column in other.missing_columns {
            if !self.missing_columns.contains(&column) {
                self.missing_columns.push(column);
            }
        }
        for column in other.extra_columns {
            if !self.extra_columns.contains(&column) {
                self.extra_columns.push(column);
            }
        }
        self.violations.extend(other.violations);
        self.rows_in += other.rows_in;
        self.rows_out += other.rows_out;
        self.recompute_status();
    }

    pub fn is_pass(&self) -> bool {
        self.status == ValidationStatus::Pass
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(row: usize) -> DomainViolation {
        DomainViolation {
            source_name: "facturacion".into(),
            sheet: "VENTAS".into(),
            row_number: row,
            column: "mwh".into(),
            rule: "range[0, +∞]".into(),
            value: "-1".into(),
            message: "小于下限".into(),
        }
    }

    #[test]
    fn test_status_precedence() {
        let mut outcome = ValidationOutcome::new("t");
        outcome.recompute_status();
        assert_eq!(outcome.status, ValidationStatus::Pass);

        outcome.violations.push(violation(2));
        outcome.recompute_status();
        assert_eq!(outcome.status, ValidationStatus::Warn);

        outcome.missing_columns.push("periodo".into());
        outcome.recompute_status();
        assert_eq!(outcome.status, ValidationStatus::Fail);
    }

    #[test]
    fn test_absorb_unions_and_sums() {
        let mut a = ValidationOutcome::new("t");
        a.rows_in = 2;
        a.missing_columns.push("periodo".into());
        a.recompute_status();

        let mut b = ValidationOutcome::new("t");
        b.rows_in = 3;
        b.missing_columns.push("periodo".into());
        b.violations.push(violation(4));
        b.recompute_status();

        a.absorb(b);
        assert_eq!(a.rows_in, 5);
        assert_eq!(a.missing_columns, vec!["periodo"]);
        assert_eq!(a.violations.len(), 1);
        assert_eq!(a.status, ValidationStatus::Fail);
    }
}
