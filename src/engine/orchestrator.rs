// ==========================================
// 能源数据集市 - 运行编排器
// ==========================================
// 职责: 协调一次完整运行的各阶段
// 流程: 数据源解析 → 抽取（可并发） → 按表名顺序: 校验 → 转换 → 报告 → 合并
//       → metadata.json → 运行台账
// 规则:
//   - 严格模式: 校验 warn/fail、转换错误、数据源错误 → 中止运行，其余表 NotProcessed
//   - 宽松模式: 表级问题降级为告警，不影响其他表
//   - 锁超时 / 写入失败 / 集市读取失败: 两种模式下均中止
//   - 无论成功与否，台账总会写入一条记录（metadata 写入失败时记为 Failed）
// ==========================================

use crate::config::EtlConfig;
use crate::domain::record::RawTable;
use crate::domain::run::{
    RunContext, RunRecord, RunStatus, SourceFileInfo, TableRunStats, TableRunStatus,
};
use crate::domain::source::SourceSpec;
use crate::domain::table::TableRule;
use crate::domain::validation::{ValidationOutcome, ValidationStatus};
use crate::engine::incremental_merger::IncrementalMerger;
use crate::engine::report_generator::{ReportGenerator, ReportLevel, ValidationReport};
use crate::error::{EtlError, EtlResult};
use crate::importer::extractor::Extractor;
use crate::importer::importer_trait::TableValidator;
use crate::importer::schema_validator::SchemaValidator;
use crate::importer::source_resolver::{Resolution, ResolvedSource, SourceResolver};
use crate::importer::transformer::Transformer;
use crate::repository::mart_repo::{CsvMartRepository, MartStore};
use crate::repository::metadata_repo::{DatasetMetadata, FileReadEntry, MetadataRepository, RunMetadata};
use crate::repository::run_ledger_repo::RunLedger;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, info_span, instrument, warn, Instrument};

// ==========================================
// RunOutcome - 运行结果
// ==========================================
#[derive(Debug)]
pub struct RunOutcome {
    pub record: RunRecord,        // 已写入台账的记录
    pub error: Option<EtlError>,  // 中止运行的错误
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// 进程退出码（0 表示成功，含宽松模式下的告警）
    pub fn exit_code(&self) -> u8 {
        self.error.as_ref().map_or(0, EtlError::exit_code)
    }
}

// ==========================================
// MartPipeline Trait
// ==========================================
// 用途: 一次完整运行（CLI 与测试的统一入口）
// 实现者: EtlOrchestrator
#[async_trait]
pub trait MartPipeline: Send + Sync {
    /// 执行一次运行；错误记录在 RunOutcome 中，不向上传播
    async fn run(&self, ctx: &RunContext) -> RunOutcome;
}

// 运行过程中累积的状态（中止时据此记录部分结果）
struct RunState {
    tables: BTreeMap<String, TableRunStats>,
    files_read: Vec<SourceFileInfo>,
    skipped_sources: Vec<String>,
    unmapped: BTreeMap<String, BTreeMap<String, usize>>,
}

impl RunState {
    fn new(config: &EtlConfig) -> Self {
        Self {
            tables: config
                .tables
                .iter()
                .map(|t| (t.name.clone(), TableRunStats::with_status(TableRunStatus::NotProcessed)))
                .collect(),
            files_read: Vec::new(),
            skipped_sources: Vec::new(),
            unmapped: BTreeMap::new(),
        }
    }

    fn stats_mut(&mut self, table: &str) -> &mut TableRunStats {
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| TableRunStats::with_status(TableRunStatus::NotProcessed))
    }

    fn fail_table(&mut self, table: &str, message: String) {
        let stats = self.stats_mut(table);
        stats.status = TableRunStatus::Failed;
        stats.message = Some(message);
    }

    fn overall_status(&self, aborted: bool) -> RunStatus {
        if aborted {
            return RunStatus::Failed;
        }
        let degraded = self.tables.values().any(|s| {
            matches!(
                s.status,
                TableRunStatus::Failed | TableRunStatus::MergedWithWarnings
            )
        });
        if degraded {
            RunStatus::SuccessWithWarnings
        } else {
            RunStatus::Success
        }
    }
}

// ==========================================
// EtlOrchestrator - 运行编排器
// ==========================================
pub struct EtlOrchestrator {
    config: Arc<EtlConfig>,
    store: Arc<dyn MartStore>,
    resolver: SourceResolver,
    extractor: Extractor,
    validator: SchemaValidator,
    transformer: Transformer,
    merger: IncrementalMerger,
    reports: ReportGenerator,
    ledger: RunLedger,
    metadata: MetadataRepository,
}

impl EtlOrchestrator {
    /// 使用 CSV 集市存储创建编排器
    pub fn new(config: EtlConfig) -> Self {
        let store: Arc<dyn MartStore> = Arc::new(CsvMartRepository::new(&config.paths.output));
        Self::with_store(config, store)
    }

    /// 使用指定集市存储创建编排器
    pub fn with_store(config: EtlConfig, store: Arc<dyn MartStore>) -> Self {
        let paths = &config.paths;
        let lock_timeout = Duration::from_secs(config.runtime.lock_timeout_secs);
        Self {
            resolver: SourceResolver::new(&paths.input),
            extractor: Extractor::new(config.runtime.header_scan_rows),
            validator: SchemaValidator::new(),
            transformer: Transformer::new(&paths.reference),
            merger: IncrementalMerger::new(store.clone(), &paths.output, lock_timeout),
            reports: ReportGenerator::new(&paths.reports),
            ledger: RunLedger::new(paths.ledger_path()),
            metadata: MetadataRepository::new(paths.metadata_path()),
            store,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &EtlConfig {
        &self.config
    }

    pub fn ledger(&self) -> &RunLedger {
        &self.ledger
    }

    /// 检查各数据源匹配到的文件（不抽取）
    pub fn check_sources(&self) -> EtlResult<Vec<(SourceSpec, Option<ResolvedSource>)>> {
        self.resolver.inspect(&self.config.sources)
    }

    /// 最近 n 条运行记录（最新在前）
    pub fn history(&self, n: usize) -> EtlResult<Vec<RunRecord>> {
        self.ledger.latest(n)
    }

    // ==========================================
    // 阶段 1-2: 解析与抽取
    // ==========================================

    /// 抽取全部已解析数据源，结果按数据源名称排序
    async fn extract_all(
        &self,
        ctx: &RunContext,
        resolution: &Resolution,
    ) -> Vec<(String, EtlResult<Vec<RawTable>>)> {
        let rules = Arc::new(self.config.tables.clone());
        let jobs: Vec<(ResolvedSource, SourceSpec)> = resolution
            .resolved
            .values()
            .filter_map(|resolved| {
                self.config
                    .source(&resolved.source_name)
                    .map(|spec| (resolved.clone(), spec.clone()))
            })
            .collect();

        if ctx.parallel_extraction && jobs.len() > 1 {
            use futures::future::join_all;

            info!(count = jobs.len(), "并发抽取数据源");
            let tasks = jobs.into_iter().map(|(resolved, spec)| {
                let extractor = self.extractor.clone();
                let rules = rules.clone();
                let name = spec.name.clone();
                async move {
                    let result = tokio::task::spawn_blocking(move || {
                        extractor.extract_source(&resolved, &spec, &rules)
                    })
                    .await
                    .unwrap_or_else(|e| {
                        Err(EtlError::Other(anyhow::anyhow!("抽取任务异常终止: {}", e)))
                    });
                    (name, result)
                }
            });
            // join_all 保持输入顺序
            join_all(tasks).await
        } else {
            jobs.into_iter()
                .map(|(resolved, spec)| {
                    let result = self.extractor.extract_source(&resolved, &spec, &rules);
                    (spec.name, result)
                })
                .collect()
        }
    }

    /// 运行主体；返回 Err 表示运行中止
    async fn execute(&self, ctx: &RunContext, state: &mut RunState) -> EtlResult<()> {
        let resolution = self.resolver.resolve(&self.config.sources)?;
        state.skipped_sources = resolution.skipped.clone();
        state.files_read = resolution
            .resolved
            .values()
            .map(|r| SourceFileInfo {
                source_name: r.source_name.clone(),
                file_name: r.file_name.clone(),
                modified_time: r.modified,
                size: r.size,
            })
            .collect();

        let mut grouped: BTreeMap<String, Vec<RawTable>> = BTreeMap::new();
        for (source_name, result) in self.extract_all(ctx, &resolution).await {
            match result {
                Ok(raw_tables) => {
                    for raw in raw_tables {
                        grouped.entry(raw.table.clone()).or_default().push(raw);
                    }
                }
                Err(e) => {
                    let fed: Vec<String> = self
                        .config
                        .source(&source_name)
                        .map(|spec| spec.sheets.iter().map(|s| s.table.clone()).collect())
                        .unwrap_or_default();
                    for table in &fed {
                        state.fail_table(table, format!("数据源 {} 抽取失败: {}", source_name, e));
                    }
                    if ctx.is_strict() {
                        return Err(e);
                    }
                    warn!(source = %source_name, error = %e, tables = ?fed, "数据源抽取失败，相关表跳过");
                }
            }
        }

        // 按表名顺序处理，与抽取并发无关
        for rule in &self.config.tables {
            if state.tables.get(&rule.name).map(|s| s.status) == Some(TableRunStatus::Failed) {
                // 抽取失败的表：同一张表的其他数据源也不合并
                grouped.remove(&rule.name);
                continue;
            }
            let Some(raw_tables) = grouped.remove(&rule.name) else {
                let stats = state.stats_mut(&rule.name);
                stats.status = TableRunStatus::Skipped;
                stats.message = Some("无可用数据源".to_string());
                info!(table = %rule.name, "无可用数据源，跳过");
                continue;
            };
            self.process_table(ctx, rule, raw_tables, state).await?;
        }

        Ok(())
    }

    // ==========================================
    // 阶段 3-6: 单表处理
    // ==========================================
    #[instrument(skip_all, fields(stage = "table", table = %rule.name))]
    async fn process_table(
        &self,
        ctx: &RunContext,
        rule: &TableRule,
        mut raw_tables: Vec<RawTable>,
        state: &mut RunState,
    ) -> EtlResult<()> {
        let start = Instant::now();
        let rows_in: usize = raw_tables.iter().map(|t| t.rows.len()).sum();
        {
            let stats = state.stats_mut(&rule.name);
            stats.rows_in = rows_in;
        }

        // 校验（穷举）
        let mut outcome = ValidationOutcome::new(&rule.name);
        for raw in raw_tables.iter_mut() {
            outcome.absorb(self.validator.validate(raw, rule));
        }
        state.stats_mut(&rule.name).validation = Some(outcome.status);

        if ctx.is_strict() && outcome.status != ValidationStatus::Pass {
            let status = outcome.status.to_string();
            // 先标记失败: 报告写入失败时表状态同样为 Failed
            state.fail_table(&rule.name, format!("严格模式校验未通过: {}", status));
            state.stats_mut(&rule.name).duration_ms = start.elapsed().as_millis() as u64;

            let report = ValidationReport::new(&ctx.run_id, ctx.mode, ReportLevel::Error, outcome, Vec::new());
            let path = self.reports.write(&report)?;
            let err = EtlError::SchemaValidationFailed {
                table: rule.name.clone(),
                status,
                report: Some(path.clone()),
            };
            let stats = state.stats_mut(&rule.name);
            stats.report = Some(path.display().to_string());
            stats.message = Some(err.to_string());
            error!(table = %rule.name, report = %path.display(), "严格模式校验未通过，运行中止");
            return Err(err);
        }

        // 转换
        let transformed = match self.transformer.transform(rule, &raw_tables, ctx.mode) {
            Ok(t) => t,
            Err(EtlError::Transform { table, file, issue, .. }) => {
                state.fail_table(
                    &rule.name,
                    format!("转换失败: 文件 {}, 行 {}, 列 {}", file, issue.row_number, issue.column),
                );
                state.stats_mut(&rule.name).duration_ms = start.elapsed().as_millis() as u64;

                let report = ValidationReport::new(
                    &ctx.run_id,
                    ctx.mode,
                    ReportLevel::Error,
                    outcome,
                    vec![issue.as_ref().clone()],
                );
                let path = self.reports.write(&report)?;
                let err = EtlError::Transform {
                    table,
                    file,
                    issue,
                    report: Some(path.clone()),
                };
                let stats = state.stats_mut(&rule.name);
                stats.report = Some(path.display().to_string());
                stats.message = Some(err.to_string());
                error!(table = %rule.name, report = %path.display(), "严格模式转换失败，运行中止");
                return Err(err);
            }
            Err(e) => {
                state.fail_table(&rule.name, e.to_string());
                return Err(e);
            }
        };
        drop(raw_tables);
        outcome.rows_out = transformed.rows_out();

        let warned = outcome.status != ValidationStatus::Pass || !transformed.issues.is_empty();
        let report_path = if ValidationReport::is_needed(&outcome, &transformed.issues) {
            let report = ValidationReport::new(
                &ctx.run_id,
                ctx.mode,
                ReportLevel::Warn,
                outcome,
                transformed.issues.clone(),
            );
            match self.reports.write(&report) {
                Ok(path) => Some(path),
                Err(e) => {
                    state.fail_table(&rule.name, e.to_string());
                    return Err(e);
                }
            }
        } else {
            None
        };

        state
            .unmapped
            .insert(rule.name.clone(), transformed.unmapped.clone());
        let rows_out = transformed.rows_out();

        // 合并
        let merge_stats = match self.merger.merge(ctx, rule, transformed).await {
            Ok(stats) => stats,
            Err(e) => {
                state.fail_table(&rule.name, e.to_string());
                return Err(e);
            }
        };

        let stats = state.stats_mut(&rule.name);
        stats.rows_out = rows_out;
        stats.new_count = merge_stats.new_count;
        stats.duplicate_count = merge_stats.duplicate_count;
        stats.replaced_count = merge_stats.replaced_count;
        stats.mart_rows = merge_stats.rows_out;
        stats.report = report_path.map(|p| p.display().to_string());
        stats.status = if warned {
            TableRunStatus::MergedWithWarnings
        } else {
            TableRunStatus::Merged
        };
        stats.duration_ms = start.elapsed().as_millis() as u64;

        info!(
            stage = "table",
            table = %rule.name,
            rows_in = stats.rows_in,
            rows_out = stats.rows_out,
            new = stats.new_count,
            duplicate = stats.duplicate_count,
            status = %stats.status,
            duration_ms = stats.duration_ms,
            "表处理完成"
        );
        Ok(())
    }

    // ==========================================
    // 阶段 7: metadata.json
    // ==========================================
    fn build_metadata(&self, record: &RunRecord, state: &RunState) -> RunMetadata {
        let mut tables = BTreeMap::new();
        for rule in &self.config.tables {
            let mart = match self.store.load(&rule.name, &rule.key_columns) {
                Ok(mart) => mart,
                Err(e) => {
                    warn!(table = %rule.name, error = %e, "读取集市表失败，metadata 中省略");
                    continue;
                }
            };
            let mut dataset = DatasetMetadata::profile(&mart, rule);
            if let Some(stats) = record.tables.get(&rule.name) {
                dataset.new_rows = stats.new_count;
                dataset.status = Some(stats.status);
            }
            if let Some(unmapped) = state.unmapped.get(&rule.name) {
                for (target, count) in unmapped {
                    dataset.unmapped.insert(format!("unmapped_{}", target), *count);
                }
            }
            tables.insert(rule.name.clone(), dataset);
        }

        RunMetadata {
            generated_at: Utc::now(),
            run_id: record.run_id.clone(),
            status: record.status,
            month: record.month.clone(),
            files_read: record.files_read.iter().map(FileReadEntry::from).collect(),
            tables,
        }
    }
}

#[async_trait]
impl MartPipeline for EtlOrchestrator {
    async fn run(&self, ctx: &RunContext) -> RunOutcome {
        let span = info_span!(
            "etl_run",
            run_id = %ctx.run_id,
            mode = %ctx.mode,
            month = ctx.month.as_deref().unwrap_or("-")
        );

        async move {
            let start = Instant::now();
            info!(force = ctx.force, parallel = ctx.parallel_extraction, "运行开始");

            let mut state = RunState::new(&self.config);
            let mut error = self.execute(ctx, &mut state).await.err();
            if let Some(e) = &error {
                error!(error = %e, "运行中止");
            }

            let finished_at = Utc::now();
            let mut record = RunRecord {
                run_id: ctx.run_id.clone(),
                started_at: ctx.started_at,
                finished_at,
                duration_ms: start.elapsed().as_millis() as u64,
                mode: ctx.mode,
                force: ctx.force,
                month: ctx.month.clone(),
                status: state.overall_status(error.is_some()),
                tables: std::mem::take(&mut state.tables),
                files_read: std::mem::take(&mut state.files_read),
                skipped_sources: std::mem::take(&mut state.skipped_sources),
                error: error.as_ref().map(|e| e.to_string()),
            };

            let metadata = self.build_metadata(&record, &state);
            if let Err(e) = self.metadata.write(&metadata) {
                error!(error = %e, path = %self.metadata.path().display(), "metadata.json 写入失败");
                // 台账记录须反映 metadata 写入失败
                record.status = RunStatus::Failed;
                record.error.get_or_insert_with(|| e.to_string());
                error.get_or_insert(e);
            }

            if let Err(e) = self.ledger.append(&record) {
                error!(error = %e, path = %self.ledger.path().display(), "运行台账写入失败");
                error.get_or_insert(e);
            }

            info!(
                status = %record.status,
                tables = record.tables.len(),
                duration_ms = record.duration_ms,
                "运行结束"
            );
            RunOutcome { record, error }
        }
        .instrument(span)
        .await
    }
}
