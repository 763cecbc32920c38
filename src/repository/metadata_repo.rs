// ==========================================
// 能源数据集市 - 运行元数据 Repository
// ==========================================
// 存储: <output>/metadata.json（每次运行原子覆盖）
// 用途: 下游看板据此判断数据新鲜度与数据集告警
// ==========================================

use crate::domain::record::MartTable;
use crate::domain::run::{RunStatus, SourceFileInfo, TableRunStatus};
use crate::domain::table::TableRule;
use crate::domain::types::ColumnType;
use crate::error::{EtlError, EtlResult};
use crate::repository::atomic_file::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

// 数据集告警标识
pub const ALERT_MISSING_COLUMNS: &str = "columnas_no_detectadas";
pub const ALERT_EMPTY_DATASET: &str = "dataset_vacio";
pub const ALERT_NEGATIVE_VALUES: &str = "valores_negativos";
pub const ALERT_MISSING_VALUES_PREFIX: &str = "faltantes";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileReadEntry {
    pub name: String,
    pub source: String,
    pub modified_time: Option<DateTime<Utc>>,
    pub size: u64,
}

impl From<&SourceFileInfo> for FileReadEntry {
    fn from(info: &SourceFileInfo) -> Self {
        Self {
            name: info.file_name.clone(),
            source: info.source_name.clone(),
            modified_time: info.modified_time,
            size: info.size,
        }
    }
}

// ==========================================
// DatasetMetadata - 单表概况
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub rows: usize,
    pub new_rows: usize,
    pub status: Option<TableRunStatus>, // 本次运行中的状态
    pub key_columns: Vec<String>,
    pub columns: Vec<String>,
    pub alerts: Vec<String>,
    pub date_min: Option<String>,
    pub date_max: Option<String>,
    #[serde(flatten)]
    pub unmapped: BTreeMap<String, usize>, // unmapped_<目标列> → 行数
}

impl DatasetMetadata {
    /// 对集市表做概况统计
    pub fn profile(mart: &MartTable, rule: &TableRule) -> Self {
        let mut alerts = Vec::new();

        if rule
            .required_columns
            .iter()
            .any(|c| !mart.columns.contains(c))
        {
            alerts.push(ALERT_MISSING_COLUMNS.to_string());
        }
        if mart.is_empty() {
            alerts.push(ALERT_EMPTY_DATASET.to_string());
        }

        let missing: usize = mart
            .rows
            .iter()
            .map(|row| {
                rule.required_columns
                    .iter()
                    .filter(|c| row.field(c).map_or(true, |v| v.trim().is_empty()))
                    .count()
            })
            .sum();
        if missing > 0 {
            alerts.push(format!("{}:{}", ALERT_MISSING_VALUES_PREFIX, missing));
        }

        let numeric: Vec<&String> = mart
            .columns
            .iter()
            .filter(|c| rule.column_type(c).map_or(false, |t| t.is_numeric()))
            .collect();
        let has_negative = mart.rows.iter().any(|row| {
            numeric.iter().any(|c| {
                row.field(c)
                    .and_then(|v| v.parse::<f64>().ok())
                    .map_or(false, |v| v < 0.0)
            })
        });
        if has_negative {
            alerts.push(ALERT_NEGATIVE_VALUES.to_string());
        }

        // 日期范围: 日期 / 期间类型列，或列名包含 fecha / periodo
        let date_columns: Vec<&String> = mart
            .columns
            .iter()
            .filter(|c| {
                let lowered = c.to_lowercase();
                matches!(
                    rule.column_type(c),
                    Some(ColumnType::Date) | Some(ColumnType::Period)
                ) || lowered.contains("fecha")
                    || lowered.contains("periodo")
            })
            .collect();
        let mut values: Vec<&str> = mart
            .rows
            .iter()
            .flat_map(|row| date_columns.iter().filter_map(move |c| row.field(c)))
            .filter(|v| !v.trim().is_empty())
            .collect();
        values.sort_unstable();

        Self {
            rows: mart.len(),
            new_rows: 0,
            status: None,
            key_columns: rule.key_columns.clone(),
            columns: mart.columns.clone(),
            alerts,
            date_min: values.first().map(|v| v.to_string()),
            date_max: values.last().map(|v| v.to_string()),
            unmapped: BTreeMap::new(),
        }
    }
}

// ==========================================
// RunMetadata - 最近一次运行概况
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub generated_at: DateTime<Utc>,
    pub run_id: String,
    pub status: RunStatus,
    pub month: Option<String>,
    pub files_read: Vec<FileReadEntry>,
    pub tables: BTreeMap<String, DatasetMetadata>,
}

pub struct MetadataRepository {
    path: PathBuf,
}

impl MetadataRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 原子写入 metadata.json
    pub fn write(&self, metadata: &RunMetadata) -> EtlResult<()> {
        let json = serde_json::to_vec_pretty(metadata)?;
        atomic_write(&self.path, |w| std::io::Write::write_all(w, &json)).map_err(|e| {
            EtlError::WriteFailure {
                table: "metadata".to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn read(&self) -> EtlResult<Option<RunMetadata>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let text = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&text)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::{CanonicalRow, KeyTuple};
    use tempfile::TempDir;

    fn mart(rows: &[(&str, &str, &str)]) -> MartTable {
        let keys = vec!["cliente".to_string(), "periodo".to_string()];
        let mut mart = MartTable::empty("ventas", &keys);
        mart.columns = vec!["cliente".into(), "periodo".into(), "mwh".into()];
        for (c, p, m) in rows {
            let mut fields = BTreeMap::new();
            fields.insert("cliente".to_string(), c.to_string());
            fields.insert("periodo".to_string(), p.to_string());
            fields.insert("mwh".to_string(), m.to_string());
            mart.rows.push(CanonicalRow {
                table: "ventas".into(),
                key: KeyTuple(vec![c.to_string(), p.to_string()]),
                fields,
                provenance: None,
            });
        }
        mart
    }

    fn rule() -> TableRule {
        let mut rule = TableRule::new("ventas", &["cliente", "periodo"], &["cliente", "periodo"]);
        rule.optional_columns = vec!["mwh".into()];
        rule.types.insert("mwh".into(), ColumnType::Decimal);
        rule.types.insert("periodo".into(), ColumnType::Period);
        rule
    }

    #[test]
    fn test_profile_alerts_and_range() {
        let profile = DatasetMetadata::profile(
            &mart(&[("A", "202502", "10"), ("B", "202412", "-3")]),
            &rule(),
        );
        assert_eq!(profile.rows, 2);
        assert_eq!(profile.alerts, vec!["valores_negativos"]);
        assert_eq!(profile.date_min.as_deref(), Some("202412"));
        assert_eq!(profile.date_max.as_deref(), Some("202502"));
    }

    #[test]
    fn test_profile_empty_dataset() {
        let mut empty = MartTable::empty("ventas", &["cliente".to_string()]);
        empty.columns = Vec::new();
        let profile = DatasetMetadata::profile(&empty, &rule());
        assert_eq!(profile.alerts, vec!["columnas_no_detectadas", "dataset_vacio"]);
        assert!(profile.date_min.is_none());
    }

    #[test]
    fn test_write_and_read_back() {
        let dir = TempDir::new().unwrap();
        let repo = MetadataRepository::new(dir.path().join("metadata.json"));
        let mut dataset = DatasetMetadata::profile(&mart(&[("A", "202501", "1")]), &rule());
        dataset.unmapped.insert("unmapped_cliente_id".into(), 2);

        let mut tables = BTreeMap::new();
        tables.insert("ventas".to_string(), dataset);
        let metadata = RunMetadata {
            generated_at: Utc::now(),
            run_id: "20250101000000-abcdef01".into(),
            status: RunStatus::Success,
            month: Some("202501".into()),
            files_read: Vec::new(),
            tables,
        };
        repo.write(&metadata).unwrap();

        let text = fs::read_to_string(repo.path()).unwrap();
        assert!(text.contains("\"unmapped_cliente_id\": 2"));
        assert_eq!(repo.read().unwrap(), Some(metadata));
    }
}
