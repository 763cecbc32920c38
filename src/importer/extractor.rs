// ==========================================
// 能源数据集市 - 抽取器
// ==========================================
// 职责: 已解析数据源 → 每个 (数据源, 工作表) 一张 RawTable
// 流程: 选择工作表 → 识别表头 → 重命名列 → 构建行 → （可选）宽表转长表
// 约束: 只读，不写任何输出；额外列原样透传
// ==========================================

use crate::domain::record::{ColumnHeader, ColumnOrigin, Provenance, RawRow, RawTable};
use crate::domain::source::{SheetSelector, SheetSpec, SourceSpec, UnpivotSpec};
use crate::domain::table::TableRule;
use crate::domain::types::CellValue;
use crate::error::{EtlError, EtlResult};
use crate::importer::data_cleaner::{normalize_text, period_from_header};
use crate::importer::file_parser::UniversalFileParser;
use crate::importer::importer_trait::{FileParser, SheetGrid};
use crate::importer::source_resolver::ResolvedSource;
use chrono::Utc;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

// 表头识别: 必需列命中比例阈值
const HEADER_MATCH_RATIO: f64 = 0.6;

// ==========================================
// Extractor
// ==========================================
#[derive(Clone)]
pub struct Extractor {
    parser: Arc<dyn FileParser>,
    header_scan_rows: usize,
}

impl Extractor {
    pub fn new(header_scan_rows: usize) -> Self {
        Self::with_parser(Arc::new(UniversalFileParser), header_scan_rows)
    }

    pub fn with_parser(parser: Arc<dyn FileParser>, header_scan_rows: usize) -> Self {
        Self {
            parser,
            header_scan_rows,
        }
    }

    /// 抽取一个数据源的全部逻辑工作表（按声明顺序）
    ///
    /// # 错误
    /// - SheetNotFound: 配置的工作表不存在
    pub fn extract_source(
        &self,
        resolved: &ResolvedSource,
        spec: &SourceSpec,
        rules: &[TableRule],
    ) -> EtlResult<Vec<RawTable>> {
        let start = Instant::now();
        let available = self.parser.sheet_names(&resolved.path)?;
        let mut tables = Vec::new();

        for sheet_spec in &spec.sheets {
            let rule = rules
                .iter()
                .find(|r| r.name == sheet_spec.table)
                .ok_or_else(|| {
                    EtlError::config(
                        format!("sources.{}.sheets.{}", spec.name, sheet_spec.logical_name),
                        format!("目标表未定义: {}", sheet_spec.table),
                    )
                })?;

            for sheet_name in select_sheets(&spec.name, &sheet_spec.selector, &available)? {
                let grid = self
                    .parser
                    .read_sheet(&resolved.path, &sheet_name)?
                    .ok_or_else(|| EtlError::SheetNotFound {
                        source_name: spec.name.clone(),
                        sheet: sheet_name.clone(),
                    })?;

                let provenance = Provenance {
                    source_name: spec.name.clone(),
                    source_file: resolved.file_name.clone(),
                    sheet: grid.name.clone(),
                    extracted_at: Utc::now(),
                };
                let table = self.build_raw_table(grid, sheet_spec, rule, provenance);
                debug!(
                    source = %spec.name,
                    sheet = %sheet_name,
                    table = %table.table,
                    rows = table.rows.len(),
                    extra_columns = ?table.extra_columns(),
                    "工作表抽取完成"
                );
                tables.push(table);
            }
        }

        info!(
            stage = "extract",
            source = %spec.name,
            file = %resolved.file_name,
            rows_out = tables.iter().map(|t| t.rows.len()).sum::<usize>(),
            duration_ms = start.elapsed().as_millis() as u64,
            "数据源抽取完成"
        );
        Ok(tables)
    }

    fn build_raw_table(
        &self,
        grid: SheetGrid,
        sheet_spec: &SheetSpec,
        rule: &TableRule,
        provenance: Provenance,
    ) -> RawTable {
        let header_idx = detect_header_row(
            &grid.rows,
            &sheet_spec.header_keywords,
            rule,
            self.header_scan_rows,
        );
        let header_cells = grid.rows.get(header_idx).cloned().unwrap_or_default();
        let columns = build_headers(&header_cells, rule);

        let mut rows = Vec::new();
        for (offset, cells) in grid.rows.iter().enumerate().skip(header_idx + 1) {
            if cells.iter().all(CellValue::is_empty) {
                continue;
            }
            let mut row = RawRow::new(offset + 1);
            for (idx, column) in columns.iter().enumerate() {
                let value = cells.get(idx).cloned().unwrap_or(CellValue::Empty);
                row.cells.insert(column.name.clone(), value);
            }
            rows.push(row);
        }

        let mut table = RawTable {
            source_name: provenance.source_name.clone(),
            logical_sheet: sheet_spec.logical_name.clone(),
            table: sheet_spec.table.clone(),
            columns,
            rows,
            provenance,
        };

        if let Some(unpivot) = &sheet_spec.unpivot {
            table = unpivot_table(table, unpivot, rule);
        }
        table
    }
}

// ==========================================
// 工作表选择
// ==========================================

fn select_sheets(
    source_name: &str,
    selector: &SheetSelector,
    available: &[String],
) -> EtlResult<Vec<String>> {
    let not_found = |sheet: String| EtlError::SheetNotFound {
        source_name: source_name.to_string(),
        sheet,
    };

    let by_name = |name: &str| -> EtlResult<String> {
        available
            .iter()
            .find(|s| s.as_str() == name)
            .or_else(|| {
                available
                    .iter()
                    .find(|s| s.trim().to_lowercase() == name.trim().to_lowercase())
            })
            .cloned()
            .ok_or_else(|| not_found(name.to_string()))
    };

    match selector {
        SheetSelector::Index(idx) => available
            .get(*idx)
            .cloned()
            .map(|s| vec![s])
            .ok_or_else(|| not_found(format!("#{}", idx))),
        SheetSelector::Name(name) => Ok(vec![by_name(name)?]),
        SheetSelector::Names(names) => names.iter().map(|n| by_name(n)).collect(),
    }
}

// ==========================================
// 表头识别
// ==========================================

fn cell_key(cell: &CellValue) -> String {
    cell.to_string().trim().to_lowercase()
}

/// 识别表头行（默认第 0 行）
///
/// - 有关键字: 所有关键字均出现在该行某个单元格中（大小写不敏感子串）
/// - 无关键字: 必需列（含其重命名前的原始列名）命中比例 ≥ 60%
pub fn detect_header_row(
    rows: &[Vec<CellValue>],
    keywords: &[String],
    rule: &TableRule,
    scan_rows: usize,
) -> usize {
    let limit = rows.len().min(scan_rows);

    if !keywords.is_empty() {
        let wanted: Vec<String> = keywords.iter().map(|k| k.trim().to_lowercase()).collect();
        return (0..limit)
            .find(|&idx| {
                let cells: Vec<String> = rows[idx].iter().map(cell_key).collect();
                wanted
                    .iter()
                    .all(|kw| cells.iter().any(|c| c.contains(kw.as_str())))
            })
            .unwrap_or(0);
    }

    // 每个必需列的可接受表头
    let accepted: Vec<Vec<String>> = rule
        .required_columns
        .iter()
        .map(|column| {
            let mut names = vec![column.to_lowercase()];
            names.extend(
                rule.rename
                    .iter()
                    .filter(|(_, target)| *target == column)
                    .map(|(raw, _)| raw.trim().to_lowercase()),
            );
            names
        })
        .collect();
    if accepted.is_empty() {
        return 0;
    }

    (0..limit)
        .find(|&idx| {
            let cells: HashSet<String> = rows[idx].iter().map(cell_key).collect();
            let hits = accepted
                .iter()
                .filter(|names| names.iter().any(|n| cells.contains(n)))
                .count();
            hits as f64 / accepted.len() as f64 >= HEADER_MATCH_RATIO
        })
        .unwrap_or(0)
}

// ==========================================
// 列头构建与重命名
// ==========================================

/// 原始表头 → 规范列名
///
/// 顺序: 重命名映射（精确）→ 重命名映射（规范化比较）→ 已声明列（规范化比较）→ 原样
fn canonical_name(raw: &str, rule: &TableRule) -> String {
    if let Some(target) = rule.rename.get(raw) {
        return target.clone();
    }
    let normalized = normalize_text(raw);
    if let Some((_, target)) = rule
        .rename
        .iter()
        .find(|(key, _)| normalize_text(key) == normalized)
    {
        return target.clone();
    }
    if rule.is_declared(raw) {
        return raw.to_string();
    }
    rule.declared_columns()
        .into_iter()
        .find(|declared| normalize_text(declared) == normalized)
        .unwrap_or_else(|| raw.to_string())
}

fn build_headers(header_cells: &[CellValue], rule: &TableRule) -> Vec<ColumnHeader> {
    let mut columns: Vec<ColumnHeader> = Vec::with_capacity(header_cells.len());
    let mut used: BTreeMap<String, usize> = BTreeMap::new();

    for (idx, cell) in header_cells.iter().enumerate() {
        let raw = cell.to_string().trim().to_string();
        let raw_name = if raw.is_empty() {
            format!("col_{}", idx + 1)
        } else {
            raw
        };

        let mut name = canonical_name(&raw_name, rule);
        let count = used.entry(name.clone()).or_insert(0);
        *count += 1;
        if *count > 1 {
            name = format!("{}_{}", name, count);
        }

        let origin = if rule.is_declared(&name) {
            ColumnOrigin::Declared
        } else {
            ColumnOrigin::Extra
        };
        columns.push(ColumnHeader {
            name,
            raw_name,
            origin,
        });
    }

    columns
}

// ==========================================
// 宽表转长表
// ==========================================

/// 每个期间列展开为一行 (标识列..., 期间, 数值)
///
/// 非标识、非期间列被丢弃；空值单元格不产生行
fn unpivot_table(table: RawTable, spec: &UnpivotSpec, rule: &TableRule) -> RawTable {
    let period_columns: Vec<(String, String)> = table
        .columns
        .iter()
        .filter(|c| !spec.id_columns.contains(&c.name))
        .filter_map(|c| period_from_header(&c.raw_name, spec.year).map(|p| (c.name.clone(), p)))
        .collect();

    if period_columns.is_empty() {
        warn!(
            table = %table.table,
            sheet = %table.provenance.sheet,
            "宽表转长表: 未识别到期间列"
        );
    }

    let origin_of = |name: &str| {
        if rule.is_declared(name) {
            ColumnOrigin::Declared
        } else {
            ColumnOrigin::Extra
        }
    };

    let mut columns: Vec<ColumnHeader> = spec
        .id_columns
        .iter()
        .map(|id| {
            table
                .columns
                .iter()
                .find(|c| &c.name == id)
                .cloned()
                .unwrap_or_else(|| ColumnHeader {
                    name: id.clone(),
                    raw_name: id.clone(),
                    origin: origin_of(id),
                })
        })
        .filter(|c| table.has_column(&c.name))
        .collect();
    for generated in [&spec.period_column, &spec.value_column] {
        columns.push(ColumnHeader {
            name: generated.clone(),
            raw_name: generated.clone(),
            origin: origin_of(generated),
        });
    }

    let mut rows = Vec::new();
    for source_row in &table.rows {
        for (column, period) in &period_columns {
            let value = source_row.get(column);
            if value.is_empty() {
                continue;
            }
            let mut row = RawRow::new(source_row.row_number);
            for id in &spec.id_columns {
                if let Some(cell) = source_row.cells.get(id) {
                    row.cells.insert(id.clone(), cell.clone());
                }
            }
            row.cells
                .insert(spec.period_column.clone(), CellValue::Text(period.clone()));
            row.cells.insert(spec.value_column.clone(), value.clone());
            rows.push(row);
        }
    }

    RawTable {
        columns,
        rows,
        ..table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::file_parser::CsvParser;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn ventas_rule() -> TableRule {
        let mut rule = TableRule::new(
            "ventas_mensual_mwh",
            &["cliente", "periodo"],
            &["cliente", "periodo"],
        );
        rule.optional_columns = vec!["mwh".to_string()];
        rule.rename
            .insert("Razón Social".to_string(), "cliente".to_string());
        rule
    }

    fn resolved(path: PathBuf) -> ResolvedSource {
        ResolvedSource {
            source_name: "facturacion".into(),
            file_name: path.file_name().unwrap().to_string_lossy().to_string(),
            path,
            modified: None,
            size: 0,
            candidates: 1,
        }
    }

    fn source(selector: SheetSelector, unpivot: Option<UnpivotSpec>) -> SourceSpec {
        SourceSpec {
            name: "facturacion".into(),
            pattern: "facturacion".into(),
            required: true,
            sheets: vec![SheetSpec {
                logical_name: "ventas".into(),
                selector,
                table: "ventas_mensual_mwh".into(),
                header_keywords: Vec::new(),
                unpivot,
            }],
        }
    }

    fn text_row(values: &[&str]) -> Vec<CellValue> {
        values.iter().map(|v| CellValue::text(v)).collect()
    }

    #[test]
    fn test_detect_header_row_after_title_rows() {
        let rows = vec![
            text_row(&["REPORTE DE VENTAS 2025"]),
            text_row(&[""]),
            text_row(&["Razón Social", "PERIODO", "MWh"]),
            text_row(&["A", "202501", "10"]),
        ];
        let rule = ventas_rule();
        assert_eq!(detect_header_row(&rows, &[], &rule, 20), 2);
        assert_eq!(
            detect_header_row(&rows, &["periodo".to_string()], &rule, 20),
            2
        );
        // 超出扫描范围时退回第 0 行
        assert_eq!(detect_header_row(&rows, &[], &rule, 2), 0);
    }

    #[test]
    fn test_extract_csv_with_rename_and_extra_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facturacion.csv");
        std::fs::write(
            &path,
            "Razón Social,Periodo,MWh,Observación\nA,202501,10,ok\n,,,\nB,202501,20,\n",
        )
        .unwrap();

        let extractor = Extractor::with_parser(Arc::new(CsvParser), 20);
        let tables = extractor
            .extract_source(
                &resolved(path),
                &source(SheetSelector::Index(0), None),
                &[ventas_rule()],
            )
            .unwrap();

        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(
            table.column_names(),
            vec!["cliente", "periodo", "mwh", "Observación"]
        );
        assert_eq!(table.extra_columns(), vec!["Observación"]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].row_number, 2);
        assert_eq!(table.rows[1].row_number, 4);
        assert_eq!(table.rows[1].get("cliente"), &CellValue::text("B"));
        assert_eq!(table.provenance.source_file, "facturacion.csv");
    }

    #[test]
    fn test_missing_sheet_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facturacion.csv");
        std::fs::write(&path, "cliente,periodo\nA,202501\n").unwrap();

        let extractor = Extractor::with_parser(Arc::new(CsvParser), 20);
        let err = extractor
            .extract_source(
                &resolved(path),
                &source(SheetSelector::Name("VENTAS".into()), None),
                &[ventas_rule()],
            )
            .unwrap_err();
        assert!(matches!(err, EtlError::SheetNotFound { sheet, .. } if sheet == "VENTAS"));
    }

    #[test]
    fn test_unpivot_month_columns() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("facturacion.csv");
        std::fs::write(
            &path,
            "cliente,ENERO,FEBRERO,Total\nA,10,11,21\nB,,5,5\n",
        )
        .unwrap();

        let unpivot = UnpivotSpec {
            id_columns: vec!["cliente".into()],
            period_column: "periodo".into(),
            value_column: "mwh".into(),
            year: Some(2025),
        };
        let extractor = Extractor::with_parser(Arc::new(CsvParser), 20);
        let tables = extractor
            .extract_source(
                &resolved(path),
                &source(SheetSelector::Index(0), Some(unpivot)),
                &[ventas_rule()],
            )
            .unwrap();

        let table = &tables[0];
        assert_eq!(table.column_names(), vec!["cliente", "periodo", "mwh"]);
        let got: Vec<(String, String, String)> = table
            .rows
            .iter()
            .map(|r| {
                (
                    r.get("cliente").to_string(),
                    r.get("periodo").to_string(),
                    r.get("mwh").to_string(),
                )
            })
            .collect();
        assert_eq!(
            got,
            vec![
                ("A".into(), "202501".into(), "10".into()),
                ("A".into(), "202502".into(), "11".into()),
                ("B".into(), "202502".into(), "5".into()),
            ]
        );
    }

    #[test]
    fn test_duplicate_and_blank_headers() {
        let rule = ventas_rule();
        let headers = build_headers(&text_row(&["cliente", "", "cliente"]), &rule);
        let names: Vec<&str> = headers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["cliente", "col_2", "cliente_2"]);
        assert_eq!(headers[2].origin, ColumnOrigin::Extra);
    }
}
