// ==========================================
// 能源数据集市 - 集市表 Repository
// ==========================================
// 职责: 集市表读取 / 原子替换写入
// 存储: <output>/<table>.csv（UTF-8，首行为列名）
// 红线: 仅由增量合并器调用写入
// ==========================================

use crate::domain::record::{CanonicalRow, KeyTuple, MartTable};
use crate::error::{EtlError, EtlResult};
use crate::repository::atomic_file::atomic_write;
use csv::{ReaderBuilder, WriterBuilder};
use std::collections::BTreeMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

// ==========================================
// MartStore Trait
// ==========================================
// 用途: 集市表持久化接口
// 实现者: CsvMartRepository
pub trait MartStore: Send + Sync {
    /// 读取集市表（文件不存在时返回空表）
    fn load(&self, table: &str, key_columns: &[String]) -> EtlResult<MartTable>;

    /// 原子替换集市表
    fn replace(&self, mart: &MartTable) -> EtlResult<()>;

    /// 集市表文件路径
    fn table_path(&self, table: &str) -> PathBuf;

    fn exists(&self, table: &str) -> bool {
        self.table_path(table).is_file()
    }
}

// ==========================================
// CsvMartRepository
// ==========================================
pub struct CsvMartRepository {
    output_dir: PathBuf,
}

impl CsvMartRepository {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

impl MartStore for CsvMartRepository {
    fn load(&self, table: &str, key_columns: &[String]) -> EtlResult<MartTable> {
        let path = self.table_path(table);
        if !path.is_file() {
            debug!(table = %table, "集市表不存在，视为空表");
            return Ok(MartTable::empty(table, key_columns));
        }

        let read_err = |message: String| EtlError::MartRead {
            table: table.to_string(),
            message,
        };

        let file = File::open(&path).map_err(|e| read_err(e.to_string()))?;
        let mut reader = ReaderBuilder::new().has_headers(true).from_reader(file);
        let columns: Vec<String> = reader
            .headers()
            .map_err(|e| read_err(e.to_string()))?
            .iter()
            .map(|h| h.to_string())
            .collect();

        for key in key_columns {
            if !columns.contains(key) {
                return Err(read_err(format!("集市表缺少主键列: {}", key)));
            }
        }

        let mut mart = MartTable::empty(table, key_columns);
        mart.columns = columns.clone();
        for record in reader.records() {
            let record = record.map_err(|e| read_err(e.to_string()))?;
            let fields: BTreeMap<String, String> = columns
                .iter()
                .cloned()
                .zip(record.iter().map(|v| v.to_string()))
                .collect();
            let key = KeyTuple(
                key_columns
                    .iter()
                    .map(|k| fields.get(k).cloned().unwrap_or_default())
                    .collect(),
            );
            mart.rows.push(CanonicalRow {
                table: table.to_string(),
                key,
                fields,
                provenance: None,
            });
        }

        debug!(table = %table, rows = mart.rows.len(), "集市表已读取");
        Ok(mart)
    }

    fn replace(&self, mart: &MartTable) -> EtlResult<()> {
        let path = self.table_path(&mart.name);
        atomic_write(&path, |out| {
            let mut writer = WriterBuilder::new().from_writer(out);
            writer.write_record(&mart.columns).map_err(io::Error::from)?;
            for row in &mart.rows {
                writer
                    .write_record(
                        mart.columns
                            .iter()
                            .map(|c| row.field(c).unwrap_or_default()),
                    )
                    .map_err(io::Error::from)?;
            }
            writer.flush()
        })
        .map_err(|e| EtlError::WriteFailure {
            table: mart.name.clone(),
            message: e.to_string(),
        })?;

        debug!(table = %mart.name, rows = mart.rows.len(), path = %path.display(), "集市表已写入");
        Ok(())
    }

    fn table_path(&self, table: &str) -> PathBuf {
        self.output_dir.join(format!("{}.csv", table))
    }
}
