// ==========================================
// 能源数据集市 - 命令行入口
// ==========================================
// 用法: mart-etl [--config PATH] [--input DIR] [--output DIR]
//               [--month YYYYMM] [--force] [--strict | --non-strict] [--sequential]
//       mart-etl history [-n N]
//       mart-etl check-sources
// 退出码: 0 成功（含告警） / 1 运行失败 / 2 配置或数据源错误 / 3 锁超时
// ==========================================

use anyhow::Context;
use clap::{Parser, Subcommand};
use energy_mart_etl::config::ConfigManager;
use energy_mart_etl::domain::run::validate_month_label;
use energy_mart_etl::engine::{EtlOrchestrator, MartPipeline};
use energy_mart_etl::{logging, EtlError, RunContext, RunMode, RunRecord, APP_NAME, VERSION};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "mart-etl")]
#[command(about = "能源数据集市: 表格导出 → 校验 → 增量合并")]
#[command(version)]
struct Cli {
    /// 配置文件（默认依次查找 config.yml / config.yaml / config.toml）
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// 覆写落地目录
    #[arg(long, global = true)]
    input: Option<PathBuf>,

    /// 覆写集市目录
    #[arg(long, global = true)]
    output: Option<PathBuf>,

    /// 月份标注（YYYYMM，仅用于日志与元数据）
    #[arg(long, value_parser = validate_month_label)]
    month: Option<String>,

    /// 主键重复时以新行替换已有行
    #[arg(long)]
    force: bool,

    /// 严格模式（默认）: 校验告警即中止
    #[arg(long, conflicts_with = "non_strict")]
    strict: bool,

    /// 宽松模式: 校验问题仅告警，继续合并
    #[arg(long)]
    non_strict: bool,

    /// 关闭并发抽取
    #[arg(long)]
    sequential: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 显示最近的运行记录
    History {
        /// 显示条数
        #[arg(short = 'n', long, default_value_t = 10)]
        count: usize,
    },
    /// 检查各数据源匹配到的文件（不抽取）
    CheckSources,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            let code = e
                .downcast_ref::<EtlError>()
                .map_or(1, EtlError::exit_code);
            eprintln!("错误: {:#}", e);
            ExitCode::from(code)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<u8> {
    let cwd = std::env::current_dir().context("无法读取当前目录")?;
    let config_path = ConfigManager::locate(cli.config.as_deref(), &cwd)?;
    let mut config = ConfigManager::load(&config_path)?;
    ConfigManager::apply_overrides(&mut config, cli.input.clone(), cli.output.clone());
    ConfigManager::ensure_directories(&config.paths)?;

    let _guard = logging::init(&config.paths.logs)?;
    info!(app = APP_NAME, version = VERSION, config = %config_path.display(), "启动");

    let parallel = config.runtime.parallel_extraction && !cli.sequential;
    let orchestrator = EtlOrchestrator::new(config);

    match cli.command {
        Some(Commands::History { count }) => {
            let records = orchestrator.history(count)?;
            if records.is_empty() {
                println!("暂无运行记录");
            }
            for record in &records {
                print_record(record);
            }
            Ok(0)
        }
        Some(Commands::CheckSources) => {
            let mut missing_required = false;
            for (spec, resolved) in orchestrator.check_sources()? {
                let flag = if spec.required { "必需" } else { "可选" };
                match resolved {
                    Some(source) => println!(
                        "[{}] {:<20} → {} (候选 {})",
                        flag, spec.name, source.file_name, source.candidates
                    ),
                    None => {
                        missing_required |= spec.required;
                        println!("[{}] {:<20} → 未找到 (模式 \"{}\")", flag, spec.name, spec.pattern);
                    }
                }
            }
            Ok(if missing_required { 2 } else { 0 })
        }
        None => {
            let mode = if cli.strict {
                RunMode::Strict
            } else {
                RunMode::from_flags(cli.non_strict)
            };
            let ctx = RunContext::new(mode, cli.force, cli.month.clone(), parallel);
            let outcome = orchestrator.run(&ctx).await;
            print_record(&outcome.record);
            if let Some(e) = &outcome.error {
                eprintln!("错误: {}", e);
            }
            Ok(outcome.exit_code())
        }
    }
}

fn print_record(record: &RunRecord) {
    println!(
        "运行 {} | 状态 {} | 模式 {} | 月份 {} | 耗时 {} ms",
        record.run_id,
        record.status,
        record.mode,
        record.month.as_deref().unwrap_or("-"),
        record.duration_ms
    );
    for (table, stats) in &record.tables {
        println!(
            "  {:<28} {:<22} 输入 {:>6} 输出 {:>6} 新增 {:>6} 重复 {:>6} 集市 {:>6}",
            table,
            stats.status.to_string(),
            stats.rows_in,
            stats.rows_out,
            stats.new_count,
            stats.duplicate_count,
            stats.mart_rows
        );
        if let Some(report) = &stats.report {
            println!("    报告: {}", report);
        }
    }
    if !record.skipped_sources.is_empty() {
        println!("  跳过的可选数据源: {}", record.skipped_sources.join(", "));
    }
}
