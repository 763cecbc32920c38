// ==========================================
// 能源数据集市 - 校验报告生成器
// ==========================================
// 存储: <reports>/validation_<run_id>_<table>.json
// 约束: 每个 (run_id, 表) 只写一次；重复写入为逻辑错误
// ==========================================

use crate::domain::types::RunMode;
use crate::domain::validation::{TransformIssue, ValidationOutcome, ValidationStatus};
use crate::error::{EtlError, EtlResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::info;

// ==========================================
// ReportLevel - 报告级别
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportLevel {
    Warn,  // 问题已记录，表仍被合并
    Error, // 表的合并被阻止
}

// ==========================================
// ValidationReport - 校验报告
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub run_id: String,
    pub table: String,
    pub level: ReportLevel,
    pub mode: RunMode,
    pub generated_at: DateTime<Utc>,
    pub outcome: ValidationOutcome,
    pub transform_issues: Vec<TransformIssue>,
}

impl ValidationReport {
    pub fn new(
        run_id: &str,
        mode: RunMode,
        level: ReportLevel,
        outcome: ValidationOutcome,
        transform_issues: Vec<TransformIssue>,
    ) -> Self {
        Self {
            run_id: run_id.to_string(),
            table: outcome.table.clone(),
            level,
            mode,
            generated_at: Utc::now(),
            outcome,
            transform_issues,
        }
    }

    /// 是否需要生成报告（非 pass 或存在被丢弃的行）
    pub fn is_needed(outcome: &ValidationOutcome, transform_issues: &[TransformIssue]) -> bool {
        outcome.status != ValidationStatus::Pass || !transform_issues.is_empty()
    }
}

pub struct ReportGenerator {
    reports_dir: PathBuf,
}

impl ReportGenerator {
    pub fn new(reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            reports_dir: reports_dir.into(),
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn report_path(&self, run_id: &str, table: &str) -> PathBuf {
        self.reports_dir
            .join(format!("validation_{}_{}.json", run_id, table))
    }

    /// 写入报告（独占创建）
    ///
    /// # 错误
    /// - ReportCollision: 同一 (run_id, 表) 的报告已存在
    pub fn write(&self, report: &ValidationReport) -> EtlResult<PathBuf> {
        fs::create_dir_all(&self.reports_dir)?;
        let path = self.report_path(&report.run_id, &report.table);

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(EtlError::ReportCollision {
                    run_id: report.run_id.clone(),
                    table: report.table.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let json = serde_json::to_vec_pretty(report)?;
        file.write_all(&json)?;
        file.sync_all()?;

        info!(
            table = %report.table,
            level = ?report.level,
            status = %report.outcome.status,
            violations = report.outcome.violations.len(),
            report = %path.display(),
            "校验报告已生成"
        );
        Ok(path)
    }

    pub fn read(&self, run_id: &str, table: &str) -> EtlResult<ValidationReport> {
        let text = fs::read_to_string(self.report_path(run_id, table))?;
        Ok(serde_json::from_str(&text)?)
    }
}
