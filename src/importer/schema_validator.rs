// ==========================================
// 能源数据集市 - 结构校验器
// ==========================================
// 职责: 必需列检查 + 列域约束（穷举校验，不快速失败）
// 规则: 固定解释器执行标签化约束（not_null / range / one_of / pattern）
// 状态: 缺少必需列 → fail；仅域违规 → warn；否则 pass
// ==========================================

use crate::domain::record::RawTable;
use crate::domain::table::{ColumnConstraint, TableRule};
use crate::domain::types::CellValue;
use crate::domain::validation::{DomainViolation, ValidationOutcome};
use crate::importer::data_cleaner::parse_decimal;
use crate::importer::importer_trait::TableValidator;
use regex::Regex;
use tracing::{debug, warn};

/// 已编译的约束（pattern 预编译）
enum CompiledConstraint<'a> {
    NotNull,
    Range(Option<f64>, Option<f64>),
    OneOf(Vec<String>),
    Pattern(&'a str, Regex),
}

impl<'a> CompiledConstraint<'a> {
    fn compile(constraint: &'a ColumnConstraint) -> Option<Self> {
        match constraint {
            ColumnConstraint::NotNull => Some(CompiledConstraint::NotNull),
            ColumnConstraint::Range { min, max } => Some(CompiledConstraint::Range(*min, *max)),
            ColumnConstraint::OneOf { values } => Some(CompiledConstraint::OneOf(
                values.iter().map(|v| v.trim().to_lowercase()).collect(),
            )),
            ColumnConstraint::Pattern { regex } => match Regex::new(regex) {
                Ok(re) => Some(CompiledConstraint::Pattern(regex, re)),
                Err(e) => {
                    warn!(regex = %regex, error = %e, "正则无法编译，忽略该约束");
                    None
                }
            },
        }
    }

    /// 校验单元格，违规时返回描述
    fn check(&self, value: &CellValue) -> Option<String> {
        if let CompiledConstraint::NotNull = self {
            return value.is_empty().then(|| "值为空".to_string());
        }
        // 其余约束对空值不生效（空值由 not_null 负责）
        if value.is_empty() {
            return None;
        }

        match self {
            CompiledConstraint::NotNull => None,
            CompiledConstraint::Range(min, max) => match parse_decimal(value) {
                Err(_) => Some("不是数值".to_string()),
                Ok(number) => {
                    if let Some(lo) = min {
                        if number < *lo {
                            return Some(format!("{} 小于下限 {}", number, lo));
                        }
                    }
                    if let Some(hi) = max {
                        if number > *hi {
                            return Some(format!("{} 大于上限 {}", number, hi));
                        }
                    }
                    None
                }
            },
            CompiledConstraint::OneOf(values) => {
                let text = value.to_string().trim().to_lowercase();
                (!values.contains(&text)).then(|| "不在允许取值集合内".to_string())
            }
            CompiledConstraint::Pattern(source, re) => {
                let text = value.to_string();
                (!re.is_match(text.trim())).then(|| format!("不匹配模式 /{}/", source))
            }
        }
    }
}

// ==========================================
// SchemaValidator
// ==========================================
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaValidator;

impl SchemaValidator {
    pub fn new() -> Self {
        Self
    }
}

impl TableValidator for SchemaValidator {
    fn validate(&self, table: &mut RawTable, rule: &TableRule) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::new(&rule.name);
        outcome.rows_in = table.rows.len();
        outcome.rows_out = table.rows.len();
        outcome.extra_columns = table.extra_columns();

        // (1) 必需列
        for column in &rule.required_columns {
            if !table.has_column(column) {
                outcome.missing_columns.push(column.clone());
            }
        }

        // (2) 列域约束: 逐行逐规则穷举
        for (column, constraints) in &rule.constraints {
            if !table.has_column(column) {
                debug!(table = %rule.name, column = %column, "约束列不存在，跳过域校验");
                continue;
            }
            let compiled: Vec<(&ColumnConstraint, CompiledConstraint)> = constraints
                .iter()
                .filter_map(|c| CompiledConstraint::compile(c).map(|cc| (c, cc)))
                .collect();

            for row in table.rows.iter_mut() {
                let value = row.get(column).clone();
                for (constraint, check) in &compiled {
                    if let Some(message) = check.check(&value) {
                        row.flags.push(format!("{}:{}", column, constraint.label()));
                        outcome.violations.push(DomainViolation {
                            source_name: table.source_name.clone(),
                            sheet: table.provenance.sheet.clone(),
                            row_number: row.row_number,
                            column: column.clone(),
                            rule: constraint.to_string(),
                            value: value.to_string(),
                            message,
                        });
                    }
                }
            }
        }

        outcome.recompute_status();
        if !outcome.is_pass() {
            warn!(
                stage = "validate",
                table = %rule.name,
                source = %table.source_name,
                status = %outcome.status,
                missing = ?outcome.missing_columns,
                violations = outcome.violations.len(),
                "校验未通过"
            );
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{ColumnHeader, ColumnOrigin, Provenance, RawRow};
    use crate::domain::validation::ValidationStatus;
    use chrono::Utc;

    fn raw_table(columns: &[&str], rows: &[&[&str]]) -> RawTable {
        RawTable {
            source_name: "facturacion".into(),
            logical_sheet: "ventas".into(),
            table: "ventas".into(),
            columns: columns
                .iter()
                .map(|c| ColumnHeader {
                    name: c.to_string(),
                    raw_name: c.to_string(),
                    origin: ColumnOrigin::Declared,
                })
                .collect(),
            rows: rows
                .iter()
                .enumerate()
                .map(|(i, values)| {
                    let mut row = RawRow::new(i + 2);
                    for (c, v) in columns.iter().zip(values.iter()) {
                        row.cells.insert(c.to_string(), CellValue::text(v));
                    }
                    row
                })
                .collect(),
            provenance: Provenance {
                source_name: "facturacion".into(),
                source_file: "facturacion.csv".into(),
                sheet: "facturacion".into(),
                extracted_at: Utc::now(),
            },
        }
    }

    fn rule() -> TableRule {
        let mut rule = TableRule::new("ventas", &["cliente", "periodo"], &["cliente", "periodo"]);
        rule.optional_columns = vec!["mwh".into(), "tipo".into()];
        rule.constraints.insert(
            "mwh".into(),
            vec![
                ColumnConstraint::NotNull,
                ColumnConstraint::Range {
                    min: Some(0.0),
                    max: None,
                },
            ],
        );
        rule.constraints.insert(
            "tipo".into(),
            vec![ColumnConstraint::OneOf {
                values: vec!["Libre".into(), "Regulado".into()],
            }],
        );
        rule.constraints.insert(
            "periodo".into(),
            vec![ColumnConstraint::Pattern {
                regex: r"^\d{6}$".into(),
            }],
        );
        rule
    }

    #[test]
    fn test_pass() {
        let mut table = raw_table(
            &["cliente", "periodo", "mwh", "tipo"],
            &[&["A", "202501", "10", "libre"]],
        );
        let outcome = SchemaValidator.validate(&mut table, &rule());
        assert_eq!(outcome.status, ValidationStatus::Pass);
        assert_eq!(outcome.rows_in, 1);
        assert!(!table.rows[0].is_flagged());
    }

    #[test]
    fn test_missing_required_column_fails() {
        let mut table = raw_table(&["cliente", "mwh"], &[&["A", "10"]]);
        let outcome = SchemaValidator.validate(&mut table, &rule());
        assert_eq!(outcome.status, ValidationStatus::Fail);
        assert_eq!(outcome.missing_columns, vec!["periodo"]);
    }

    #[test]
    fn test_exhaustive_violations_warn() {
        let mut table = raw_table(
            &["cliente", "periodo", "mwh", "tipo"],
            &[
                &["A", "202501", "-1", "Libre"],
                &["B", "2025-1", "", "Otro"],
                &["C", "202501", "abc", ""],
            ],
        );
        let outcome = SchemaValidator.validate(&mut table, &rule());
        assert_eq!(outcome.status, ValidationStatus::Warn);

        let found: Vec<(usize, &str, &str)> = outcome
            .violations
            .iter()
            .map(|v| (v.row_number, v.column.as_str(), v.value.as_str()))
            .collect();
        assert_eq!(
            found,
            vec![
                (2, "mwh", "-1"),
                (3, "mwh", ""),
                (4, "mwh", "abc"),
                (3, "periodo", "2025-1"),
                (3, "tipo", "Otro"),
            ]
        );
        // 违规行保留并被标记
        assert_eq!(outcome.rows_out, 3);
        assert!(table.rows.iter().all(|r| r.is_flagged()));
        assert_eq!(table.rows[1].flags, vec!["mwh:not_null", "periodo:pattern", "tipo:one_of"]);
    }
}
