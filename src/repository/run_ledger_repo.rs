// ==========================================
// 能源数据集市 - 运行台账 Repository
// ==========================================
// 存储: <logs>/etl_runs.jsonl（每行一条 RunRecord）
// 约束: 只追加，不改写历史；run_id 唯一
// ==========================================

use crate::domain::run::RunRecord;
use crate::error::{EtlError, EtlResult};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub struct RunLedger {
    path: PathBuf,
}

impl RunLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取全部可解析的条目（按追加顺序），损坏行跳过
    fn read_all(&self) -> EtlResult<Vec<RunRecord>> {
        if !self.path.is_file() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&self.path)
            .map_err(|e| EtlError::Ledger(format!("打开台账失败: {}", e)))?;

        let mut records = Vec::new();
        for (idx, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| EtlError::Ledger(format!("读取台账失败: {}", e)))?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RunRecord>(&line) {
                Ok(record) => records.push(record),
                Err(e) => warn!(line = idx + 1, error = %e, "台账行无法解析，已跳过"),
            }
        }
        Ok(records)
    }

    /// 追加一条运行记录
    ///
    /// # 错误
    /// - Ledger: run_id 已存在或写入失败
    pub fn append(&self, record: &RunRecord) -> EtlResult<()> {
        if self
            .read_all()?
            .iter()
            .any(|existing| existing.run_id == record.run_id)
        {
            return Err(EtlError::Ledger(format!(
                "run_id 已存在: {}",
                record.run_id
            )));
        }

        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .map_err(|e| EtlError::Ledger(format!("创建台账目录失败: {}", e)))?;
        }

        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| EtlError::Ledger(format!("打开台账失败: {}", e)))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| EtlError::Ledger(format!("写入台账失败: {}", e)))?;

        info!(run_id = %record.run_id, status = %record.status, "运行记录已追加");
        Ok(())
    }

    /// 最近 n 条记录（最新在前）
    pub fn latest(&self, n: usize) -> EtlResult<Vec<RunRecord>> {
        let mut records = self.read_all()?;
        records.reverse();
        records.truncate(n);
        Ok(records)
    }

    /// 按 run_id 查找
    pub fn find(&self, run_id: &str) -> EtlResult<Option<RunRecord>> {
        Ok(self.read_all()?.into_iter().find(|r| r.run_id == run_id))
    }
}
