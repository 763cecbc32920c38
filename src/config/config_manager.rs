// ==========================================
// 能源数据集市 - 配置管理器
// ==========================================
// 职责: 配置定位、加载、校验、运行期覆写
// 约束: 除读取配置文件外无副作用（目录创建由 ensure_directories 显式触发）
// ==========================================

use crate::config::etl_config::{
    ConfigFormat, EtlConfig, PathsConfig, RawConfigDocument, RawPaths, RawSheetEntry, RawSource,
    RawTableRule,
};
use crate::domain::source::{SheetSpec, SourceSpec};
use crate::domain::table::{ColumnConstraint, TableRule};
use crate::error::{EtlError, EtlResult};
use regex::Regex;
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 未指定 --config 时的查找顺序
pub const DEFAULT_CONFIG_CANDIDATES: [&str; 3] = ["config.yml", "config.yaml", "config.toml"];

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager;

impl ConfigManager {
    /// 定位配置文件
    ///
    /// # 参数
    /// - explicit: 命令行 --config
    /// - cwd: 查找默认配置文件的目录
    pub fn locate(explicit: Option<&Path>, cwd: &Path) -> EtlResult<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Ok(path.to_path_buf());
            }
            return Err(EtlError::config(
                path.display().to_string(),
                "配置文件不存在",
            ));
        }

        DEFAULT_CONFIG_CANDIDATES
            .iter()
            .map(|name| cwd.join(name))
            .find(|p| p.is_file())
            .ok_or_else(|| {
                EtlError::config(
                    cwd.display().to_string(),
                    format!(
                        "未找到配置文件（查找顺序: {}）",
                        DEFAULT_CONFIG_CANDIDATES.join(", ")
                    ),
                )
            })
    }

    /// 加载并校验配置文件
    ///
    /// 相对路径以配置文件所在目录为基准解析
    pub fn load(path: &Path) -> EtlResult<EtlConfig> {
        let format = ConfigFormat::from_path(path).ok_or_else(|| {
            EtlError::config(
                path.display().to_string(),
                "无法识别的配置格式（支持 .yml/.yaml/.toml）",
            )
        })?;

        let text = fs::read_to_string(path).map_err(|e| {
            EtlError::config(path.display().to_string(), format!("读取失败: {}", e))
        })?;

        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));

        let mut config = Self::from_str(&text, format, &base_dir)?;
        config.source_path = Some(path.to_path_buf());

        info!(
            config = %path.display(),
            sources = config.sources.len(),
            tables = config.tables.len(),
            "配置加载完成"
        );
        Ok(config)
    }

    /// 从文本解析并校验配置
    pub fn from_str(text: &str, format: ConfigFormat, base_dir: &Path) -> EtlResult<EtlConfig> {
        let raw: RawConfigDocument = match format {
            ConfigFormat::Yaml => serde_yaml::from_str(text)
                .map_err(|e| EtlError::config("<document>", format!("YAML 结构错误: {}", e)))?,
            ConfigFormat::Toml => toml::from_str(text)
                .map_err(|e| EtlError::config("<document>", format!("TOML 结构错误: {}", e)))?,
        };
        build_config(raw, base_dir)
    }

    /// 运行期覆写（命令行 --input / --output）
    pub fn apply_overrides(
        config: &mut EtlConfig,
        input: Option<PathBuf>,
        output: Option<PathBuf>,
    ) {
        if let Some(input) = input {
            debug!(input = %input.display(), "覆写落地目录");
            config.paths.input = input;
        }
        if let Some(output) = output {
            debug!(output = %output.display(), "覆写集市目录");
            config.paths.output = output;
        }
    }

    /// 创建全部配置目录
    pub fn ensure_directories(paths: &PathsConfig) -> EtlResult<()> {
        for dir in paths.all() {
            fs::create_dir_all(dir).map_err(|e| {
                EtlError::FileRead(format!("创建目录失败 {}: {}", dir.display(), e))
            })?;
        }
        Ok(())
    }
}

// ==========================================
// 文档 → 运行配置
// ==========================================

fn build_config(raw: RawConfigDocument, base_dir: &Path) -> EtlResult<EtlConfig> {
    let paths = resolve_paths(&raw.paths, base_dir);

    if raw.runtime.lock_timeout_secs == 0 {
        return Err(EtlError::config(
            "runtime.lock_timeout_secs",
            "必须大于 0",
        ));
    }
    if raw.runtime.header_scan_rows == 0 {
        return Err(EtlError::config("runtime.header_scan_rows", "必须大于 0"));
    }

    let mut tables = Vec::with_capacity(raw.tables.len());
    for (name, rule) in raw.tables {
        tables.push(build_table_rule(&name, rule)?);
    }

    let mut sources = Vec::with_capacity(raw.sources.len());
    for (name, source) in raw.sources {
        sources.push(build_source(&name, source, &tables)?);
    }

    Ok(EtlConfig {
        sources,
        tables,
        paths,
        runtime: raw.runtime,
        source_path: None,
    })
}

fn resolve_paths(raw: &RawPaths, base_dir: &Path) -> PathsConfig {
    let defaults = PathsConfig::defaults_in(base_dir);
    let resolve = |value: &Option<PathBuf>, fallback: PathBuf| match value {
        Some(p) if p.is_absolute() => p.clone(),
        Some(p) => base_dir.join(p),
        None => fallback,
    };
    PathsConfig {
        input: resolve(&raw.input, defaults.input.clone()),
        output: resolve(&raw.output, defaults.output.clone()),
        reference: resolve(&raw.reference, defaults.reference.clone()),
        logs: resolve(&raw.logs, defaults.logs.clone()),
        reports: resolve(&raw.reports, defaults.reports.clone()),
    }
}

/// 表名用于集市文件、锁文件与报告文件名，只能是单个路径分量
fn check_table_name(name: &str) -> EtlResult<()> {
    let invalid = name.trim().is_empty()
        || name.starts_with('.')
        || name.contains("..")
        || name.chars().any(|c| matches!(c, '/' | '\\' | ':') || c.is_control());
    if invalid {
        return Err(EtlError::config(
            format!("tables.{}", name),
            "表名只能包含单个文件名分量（不能为空，不能以 . 开头，不能含 / \\ : 或 ..）",
        ));
    }
    Ok(())
}

fn build_table_rule(name: &str, raw: RawTableRule) -> EtlResult<TableRule> {
    check_table_name(name)?;
    let key = |suffix: &str| format!("tables.{}.{}", name, suffix);

    if raw.required_columns.is_empty() {
        return Err(EtlError::config(key("required_columns"), "不能为空"));
    }
    let mut seen = BTreeSet::new();
    for column in &raw.required_columns {
        if column.trim().is_empty() {
            return Err(EtlError::config(key("required_columns"), "列名不能为空"));
        }
        if !seen.insert(column.as_str()) {
            return Err(EtlError::config(
                key("required_columns"),
                format!("列重复: {}", column),
            ));
        }
    }

    let rule = TableRule {
        name: name.to_string(),
        required_columns: raw.required_columns,
        optional_columns: raw.optional_columns,
        rename: raw.rename,
        key_columns: raw.key_columns,
        types: raw.types,
        scale: raw.scale,
        constraints: raw.constraints,
        lookups: raw.lookups,
    };

    if rule.key_columns.is_empty() {
        return Err(EtlError::config(key("key_columns"), "不能为空"));
    }
    for column in &rule.key_columns {
        if !rule.is_declared(column) {
            return Err(EtlError::config(
                key("key_columns"),
                format!("主键列未声明: {}", column),
            ));
        }
    }

    for (raw_name, target) in &rule.rename {
        if !rule.is_declared(target) {
            return Err(EtlError::config(
                key(&format!("rename.{}", raw_name)),
                format!("重命名目标未声明: {}", target),
            ));
        }
    }

    for column in rule.types.keys() {
        if !rule.is_declared(column) {
            return Err(EtlError::config(
                key(&format!("types.{}", column)),
                "列未声明",
            ));
        }
    }

    for (column, factor) in &rule.scale {
        if !rule.is_declared(column) {
            return Err(EtlError::config(
                key(&format!("scale.{}", column)),
                "列未声明",
            ));
        }
        if !factor.is_finite() || *factor == 0.0 {
            return Err(EtlError::config(
                key(&format!("scale.{}", column)),
                format!("换算系数无效: {}", factor),
            ));
        }
    }

    for (column, constraints) in &rule.constraints {
        let path = key(&format!("constraints.{}", column));
        if !rule.is_declared(column) {
            return Err(EtlError::config(path, "列未声明"));
        }
        for constraint in constraints {
            validate_constraint(&path, constraint)?;
        }
    }

    for (idx, lookup) in rule.lookups.iter().enumerate() {
        let path = key(&format!("lookups[{}]", idx));
        if !rule.is_declared(&lookup.column) {
            return Err(EtlError::config(
                path,
                format!("查找列未声明: {}", lookup.column),
            ));
        }
        if lookup.reference.trim().is_empty()
            || lookup.match_column.trim().is_empty()
            || lookup.value_column.trim().is_empty()
        {
            return Err(EtlError::config(
                path,
                "reference / match_column / value_column 不能为空",
            ));
        }
        if lookup.target == lookup.column {
            return Err(EtlError::config(path, "目标列不能与查找列相同"));
        }
    }

    Ok(rule)
}

fn validate_constraint(path: &str, constraint: &ColumnConstraint) -> EtlResult<()> {
    match constraint {
        ColumnConstraint::NotNull => Ok(()),
        ColumnConstraint::Range { min, max } => {
            if min.is_none() && max.is_none() {
                return Err(EtlError::config(path, "range 至少需要 min 或 max"));
            }
            if let (Some(lo), Some(hi)) = (min, max) {
                if lo > hi {
                    return Err(EtlError::config(
                        path,
                        format!("range 下限大于上限: {} > {}", lo, hi),
                    ));
                }
            }
            Ok(())
        }
        ColumnConstraint::OneOf { values } => {
            if values.is_empty() {
                return Err(EtlError::config(path, "one_of 取值集合不能为空"));
            }
            Ok(())
        }
        ColumnConstraint::Pattern { regex } => Regex::new(regex)
            .map(|_| ())
            .map_err(|e| EtlError::config(path, format!("正则无效: {}", e))),
    }
}

fn build_source(name: &str, raw: RawSource, tables: &[TableRule]) -> EtlResult<SourceSpec> {
    let key = |suffix: &str| format!("sources.{}.{}", name, suffix);

    if raw.pattern.trim().is_empty() {
        return Err(EtlError::config(key("pattern"), "不能为空"));
    }
    if raw.sheets.is_empty() {
        return Err(EtlError::config(key("sheets"), "至少需要一个工作表映射"));
    }

    let mut sheets = Vec::with_capacity(raw.sheets.len());
    for (logical_name, entry) in raw.sheets {
        let path = key(&format!("sheets.{}", logical_name));
        let sheet = match entry {
            RawSheetEntry::Selector(selector) => SheetSpec {
                table: logical_name.clone(),
                logical_name,
                selector,
                header_keywords: Vec::new(),
                unpivot: None,
            },
            RawSheetEntry::Detailed(detail) => SheetSpec {
                table: detail.table.unwrap_or_else(|| logical_name.clone()),
                logical_name,
                selector: detail.sheet,
                header_keywords: detail.header_keywords,
                unpivot: detail.unpivot,
            },
        };

        let rule = tables
            .iter()
            .find(|t| t.name == sheet.table)
            .ok_or_else(|| {
                EtlError::config(path.clone(), format!("目标表未定义: {}", sheet.table))
            })?;

        if let crate::domain::source::SheetSelector::Names(names) = &sheet.selector {
            if names.is_empty() {
                return Err(EtlError::config(path, "工作表列表不能为空"));
            }
        }

        if let Some(unpivot) = &sheet.unpivot {
            let upath = format!("{}.unpivot", path);
            if unpivot.id_columns.is_empty() {
                return Err(EtlError::config(upath, "id_columns 不能为空"));
            }
            for column in unpivot
                .id_columns
                .iter()
                .chain([&unpivot.period_column, &unpivot.value_column])
            {
                if !rule.is_declared(column) {
                    return Err(EtlError::config(
                        upath,
                        format!("列未在表 {} 中声明: {}", rule.name, column),
                    ));
                }
            }
        }

        sheets.push(sheet);
    }

    Ok(SourceSpec {
        name: name.to_string(),
        pattern: raw.pattern,
        required: raw.required,
        sheets,
    })
}
