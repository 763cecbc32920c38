// ==========================================
// 能源数据集市 - 增量合并器
// ==========================================
// 职责: 规范行 × 现有集市表 → 按主键去重的并集，原子写回
// 流程: 加锁 → 读取 → 主键索引 → 新增/重复分区 → 写临时文件 → rename → 解锁
// 规则:
//   - 默认: 重复主键跳过（已有行胜出）
//   - --force: 重复主键以新行替换（保持原位置）
//   - 同批次内重复主键: 首行胜出
//   - 已有行保持相对顺序，新行按抽取顺序追加
// 红线: 唯一允许写集市表的组件
// ==========================================

use crate::domain::record::{CanonicalRow, KeyTuple, MartTable};
use crate::domain::run::RunContext;
use crate::domain::table::TableRule;
use crate::error::EtlResult;
use crate::importer::transformer::TransformedTable;
use crate::repository::mart_lock::MartLock;
use crate::repository::mart_repo::MartStore;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument};

// ==========================================
// MergeStats - 合并统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    pub rows_in: usize,         // 输入的规范行数
    pub rows_out: usize,        // 合并后集市表总行数
    pub new_count: usize,       // 新增
    pub duplicate_count: usize, // 主键已存在（含同批次内重复）
    pub replaced_count: usize,  // --force 下被替换
    pub changed: bool,          // 集市内容是否变化
}

/// 对账: 将 incoming 合并进 mart（纯函数，无 I/O）
pub fn reconcile(
    mart: &mut MartTable,
    incoming: Vec<CanonicalRow>,
    columns: &[String],
    force: bool,
) -> MergeStats {
    let mut stats = MergeStats {
        rows_in: incoming.len(),
        ..MergeStats::default()
    };

    let before_columns = mart.columns.len();
    mart.extend_columns(columns);
    stats.changed = mart.columns.len() != before_columns;

    let mut index: HashMap<KeyTuple, usize> = mart
        .rows
        .iter()
        .enumerate()
        .map(|(idx, row)| (row.key.clone(), idx))
        .collect();

    // 本批次已出现的主键: 同批次内重复时首行胜出，--force 只替换运行前已有的行
    let mut seen_in_batch: HashSet<KeyTuple> = HashSet::new();

    for row in incoming {
        let first_in_batch = seen_in_batch.insert(row.key.clone());
        match index.get(&row.key).copied() {
            Some(idx) => {
                stats.duplicate_count += 1;
                if force && first_in_batch {
                    let existing = &mut mart.rows[idx];
                    let mut fields = existing.fields.clone();
                    fields.extend(row.fields);
                    if fields != existing.fields {
                        stats.changed = true;
                    }
                    existing.fields = fields;
                    existing.provenance = row.provenance;
                    stats.replaced_count += 1;
                }
            }
            None => {
                index.insert(row.key.clone(), mart.rows.len());
                mart.rows.push(row);
                stats.new_count += 1;
                stats.changed = true;
            }
        }
    }

    stats.rows_out = mart.rows.len();
    stats
}

// ==========================================
// IncrementalMerger
// ==========================================
pub struct IncrementalMerger {
    store: Arc<dyn MartStore>,
    output_dir: PathBuf,
    lock_timeout: Duration,
}

impl IncrementalMerger {
    pub fn new(store: Arc<dyn MartStore>, output_dir: impl Into<PathBuf>, lock_timeout: Duration) -> Self {
        Self {
            store,
            output_dir: output_dir.into(),
            lock_timeout,
        }
    }

    /// 合并一张逻辑表
    ///
    /// # 错误
    /// - LockTimeout: 合并锁等待超时
    /// - MartRead / WriteFailure: 读写集市表失败（集市表保持运行前状态）
    #[instrument(skip(self, ctx, rule, transformed), fields(table = %rule.name, run_id = %ctx.run_id))]
    pub async fn merge(
        &self,
        ctx: &RunContext,
        rule: &TableRule,
        transformed: TransformedTable,
    ) -> EtlResult<MergeStats> {
        let start = Instant::now();
        let _lock =
            MartLock::acquire(&self.output_dir, &rule.name, &ctx.run_id, self.lock_timeout).await?;

        let mut mart = self.store.load(&rule.name, &rule.key_columns)?;
        let stats = reconcile(&mut mart, transformed.rows, &transformed.columns, ctx.force);

        if stats.changed || !self.store.exists(&rule.name) {
            self.store.replace(&mart)?;
        }

        info!(
            stage = "merge",
            table = %rule.name,
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            new = stats.new_count,
            duplicate = stats.duplicate_count,
            replaced = stats.replaced_count,
            force = ctx.force,
            duration_ms = start.elapsed().as_millis() as u64,
            "合并完成"
        );
        Ok(stats)
    }
}
