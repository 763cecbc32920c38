// ==========================================
// 能源数据集市 - 转换器 / 规范化
// ==========================================
// 职责: 原始行 → 规范行（类型规范化 / 单位换算 / 参照映射 / 主键构建）
// 失败: 严格模式返回 Transform 错误；宽松模式丢弃该行并计数
// ==========================================

use crate::domain::record::{CanonicalRow, KeyTuple, RawRow, RawTable};
use crate::domain::table::{LookupRule, TableRule};
use crate::domain::types::{CellValue, ColumnType, RunMode};
use crate::domain::validation::TransformIssue;
use crate::error::{EtlError, EtlResult};
use crate::importer::data_cleaner::{
    clean_identifier, format_decimal, normalize_text, parse_date, parse_decimal, parse_integer,
    parse_period,
};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::FileParser;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 模糊匹配相似度下限
pub const LOOKUP_SIMILARITY_CUTOFF: f64 = 0.6;

// ==========================================
// TransformedTable - 转换结果
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct TransformedTable {
    pub table: String,
    pub columns: Vec<String>, // 已声明列在前，额外列按出现顺序追加
    pub rows: Vec<CanonicalRow>,
    pub issues: Vec<TransformIssue>,      // 宽松模式下被丢弃的行
    pub unmapped: BTreeMap<String, usize>, // 目标列 → 未映射行数
    pub rows_in: usize,
}

impl TransformedTable {
    pub fn rows_out(&self) -> usize {
        self.rows.len()
    }
}

// ==========================================
// ReferenceLookup - 参照表（规范化名称 → 取值）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReferenceLookup {
    entries: Vec<(String, String)>,
    exact: HashMap<String, String>,
}

impl ReferenceLookup {
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut lookup = ReferenceLookup::default();
        for (name, value) in pairs {
            let key = normalize_text(&name);
            if key.is_empty() {
                continue;
            }
            // 重复名称: 保留首次出现
            if !lookup.exact.contains_key(&key) {
                lookup.exact.insert(key.clone(), value.clone());
                lookup.entries.push((key, value));
            }
        }
        lookup
    }

    /// 精确匹配（规范化后），否则取相似度最高且不低于下限者
    pub fn resolve(&self, raw: &str) -> Option<&str> {
        let key = normalize_text(raw);
        if key.is_empty() {
            return None;
        }
        if let Some(value) = self.exact.get(&key) {
            return Some(value.as_str());
        }

        let mut best: Option<(f64, &str)> = None;
        for (name, value) in &self.entries {
            let score = strsim::normalized_levenshtein(&key, name);
            if score >= LOOKUP_SIMILARITY_CUTOFF && best.map_or(true, |(b, _)| score > b) {
                best = Some((score, value.as_str()));
            }
        }
        best.map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

// ==========================================
// Transformer
// ==========================================
pub struct Transformer {
    reference_dir: PathBuf,
}

impl Transformer {
    pub fn new(reference_dir: impl Into<PathBuf>) -> Self {
        Self {
            reference_dir: reference_dir.into(),
        }
    }

    /// 读取参照表；文件或列缺失时返回 None（目标列保持为空）
    pub fn load_reference(&self, lookup: &LookupRule) -> Option<ReferenceLookup> {
        let path = self.reference_dir.join(&lookup.reference);
        match read_reference(&path, lookup) {
            Ok(reference) => {
                debug!(
                    reference = %path.display(),
                    entries = reference.len(),
                    "参照表已加载"
                );
                Some(reference)
            }
            Err(reason) => {
                warn!(
                    reference = %path.display(),
                    target = %lookup.target,
                    reason = %reason,
                    "参照表不可用，目标列保持为空"
                );
                None
            }
        }
    }

    /// 转换同一逻辑表的全部原始表（按给定顺序）
    ///
    /// # 错误
    /// - Transform: 严格模式下首个无法规范化的值
    pub fn transform(
        &self,
        rule: &TableRule,
        raw_tables: &[RawTable],
        mode: RunMode,
    ) -> EtlResult<TransformedTable> {
        let mut columns = rule.declared_columns();
        for raw in raw_tables {
            for column in raw.extra_columns() {
                if !columns.contains(&column) {
                    columns.push(column);
                }
            }
        }

        let references: Vec<(&LookupRule, Option<ReferenceLookup>)> = rule
            .lookups
            .iter()
            .map(|lookup| (lookup, self.load_reference(lookup)))
            .collect();

        let mut result = TransformedTable {
            table: rule.name.clone(),
            columns,
            rows: Vec::new(),
            issues: Vec::new(),
            unmapped: BTreeMap::new(),
            rows_in: raw_tables.iter().map(|t| t.rows.len()).sum(),
        };

        for raw in raw_tables {
            for row in &raw.rows {
                match canonicalize_row(rule, &result.columns, raw, row, &references) {
                    Ok((canonical, unmapped_targets)) => {
                        for target in unmapped_targets {
                            *result.unmapped.entry(target).or_insert(0) += 1;
                        }
                        result.rows.push(canonical);
                    }
                    Err(issue) => {
                        if mode == RunMode::Strict {
                            return Err(EtlError::Transform {
                                table: rule.name.clone(),
                                file: raw.provenance.source_file.clone(),
                                issue: Box::new(issue),
                                report: None,
                            });
                        }
                        warn!(
                            table = %rule.name,
                            source = %issue.source_name,
                            row = issue.row_number,
                            column = %issue.column,
                            reason = %issue.reason,
                            "行无法规范化，已丢弃"
                        );
                        result.issues.push(issue);
                    }
                }
            }
        }

        info!(
            stage = "transform",
            table = %rule.name,
            rows_in = result.rows_in,
            rows_out = result.rows_out(),
            dropped = result.issues.len(),
            "转换完成"
        );
        Ok(result)
    }
}

fn read_reference(path: &Path, lookup: &LookupRule) -> Result<ReferenceLookup, String> {
    if !path.is_file() {
        return Err("文件不存在".to_string());
    }
    let parser = UniversalFileParser;
    let sheet = parser
        .sheet_names(path)
        .map_err(|e| e.to_string())?
        .into_iter()
        .next()
        .ok_or_else(|| "无工作表".to_string())?;
    let grid = parser
        .read_sheet(path, &sheet)
        .map_err(|e| e.to_string())?
        .ok_or_else(|| "无工作表".to_string())?;

    let header = grid.rows.first().ok_or_else(|| "参照表为空".to_string())?;
    let find = |name: &str| {
        let wanted = normalize_text(name);
        header
            .iter()
            .position(|cell| normalize_text(&cell.to_string()) == wanted)
            .ok_or_else(|| format!("列不存在: {}", name))
    };
    let match_idx = find(&lookup.match_column)?;
    let value_idx = find(&lookup.value_column)?;

    Ok(ReferenceLookup::from_pairs(grid.rows.iter().skip(1).filter_map(
        |row| {
            let name = row.get(match_idx)?.to_string();
            let value = row.get(value_idx)?.to_string().trim().to_string();
            (!value.is_empty()).then_some((name, value))
        },
    )))
}

/// 列的有效类型: 显式类型 > 配置了换算系数的按小数处理 > 文本
fn effective_type(rule: &TableRule, column: &str) -> ColumnType {
    rule.column_type(column).unwrap_or_else(|| {
        if rule.scale.contains_key(column) {
            ColumnType::Decimal
        } else {
            ColumnType::Text
        }
    })
}

fn canonicalize_value(
    rule: &TableRule,
    column: &str,
    value: &CellValue,
) -> Result<String, String> {
    if value.is_empty() {
        return Ok(String::new());
    }
    let scale = rule.scale.get(column).copied();

    match effective_type(rule, column) {
        ColumnType::Text => Ok(value.to_string().trim().to_string()),
        ColumnType::Identifier => Ok(clean_identifier(&value.to_string())),
        ColumnType::Integer => {
            let number = parse_integer(value)?;
            Ok(match scale {
                Some(factor) => format_decimal(number as f64 * factor),
                None => number.to_string(),
            })
        }
        ColumnType::Decimal => {
            let number = parse_decimal(value)? * scale.unwrap_or(1.0);
            Ok(format_decimal(number))
        }
        ColumnType::Date => parse_date(value),
        ColumnType::Period => parse_period(value),
    }
}

type RowResult = Result<(CanonicalRow, Vec<String>), TransformIssue>;

fn canonicalize_row(
    rule: &TableRule,
    columns: &[String],
    raw: &RawTable,
    row: &RawRow,
    references: &[(&LookupRule, Option<ReferenceLookup>)],
) -> RowResult {
    let issue = |column: &str, value: &CellValue, reason: String| TransformIssue {
        source_name: raw.source_name.clone(),
        sheet: raw.provenance.sheet.clone(),
        row_number: row.row_number,
        column: column.to_string(),
        value: value.to_string(),
        reason,
    };

    let mut fields = BTreeMap::new();
    for column in columns {
        let value = row.get(column);
        let canonical =
            canonicalize_value(rule, column, value).map_err(|reason| issue(column, value, reason))?;
        fields.insert(column.clone(), canonical);
    }

    let mut unmapped = Vec::new();
    for (lookup, reference) in references {
        let source_value = fields.get(&lookup.column).cloned().unwrap_or_default();
        if source_value.is_empty() {
            continue;
        }
        let mapped = reference
            .as_ref()
            .and_then(|r| r.resolve(&source_value))
            .map(str::to_string);
        match mapped {
            Some(value) => {
                fields.insert(lookup.target.clone(), value);
            }
            None => {
                fields.entry(lookup.target.clone()).or_default();
                unmapped.push(lookup.target.clone());
            }
        }
    }

    let mut key = Vec::with_capacity(rule.key_columns.len());
    for column in &rule.key_columns {
        let value = fields.get(column).cloned().unwrap_or_default();
        if value.is_empty() {
            return Err(issue(column, row.get(column), "主键列为空".to_string()));
        }
        key.push(value);
    }

    Ok((
        CanonicalRow {
            table: rule.name.clone(),
            key: KeyTuple(key),
            fields,
            provenance: Some(raw.provenance.clone()),
        },
        unmapped,
    ))
}
