// ==========================================
// 能源数据集市 - 文件解析器实现
// ==========================================
// 职责: 工作簿 → 原始单元格网格（不识别表头）
// 支持: Excel (.xlsx/.xlsm/.xls/.xlsb/.ods) / CSV (.csv)
// ==========================================

use crate::domain::types::CellValue;
use crate::error::{EtlError, EtlResult};
use crate::importer::importer_trait::{FileParser, SheetGrid};
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{Duration, NaiveDate};
use csv::ReaderBuilder;
use std::fs;
use std::path::Path;

/// 可解析的文件扩展名（小写）
pub const SUPPORTED_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xls", "xlsb", "ods", "csv"];

/// 扩展名是否受支持
pub fn is_supported(path: &Path) -> bool {
    extension_of(path)
        .map(|ext| SUPPORTED_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

fn ensure_exists(path: &Path) -> EtlResult<()> {
    if !path.is_file() {
        return Err(EtlError::FileRead(format!(
            "文件不存在: {}",
            path.display()
        )));
    }
    Ok(())
}

// ==========================================
// CSV Parser 实现
// ==========================================
// CSV 文件只有一个工作表，名称为文件名（不含扩展名）
pub struct CsvParser;

impl CsvParser {
    fn sheet_name(path: &Path) -> String {
        path.file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// 读取文本（UTF-8 优先，失败时按 Latin-1 解码）
    fn read_text(path: &Path) -> EtlResult<String> {
        let bytes = fs::read(path)?;
        let text = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(err) => err.into_bytes().iter().map(|&b| b as char).collect(),
        };
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    /// 按首行判断分隔符（; 或 ,）
    fn sniff_delimiter(text: &str) -> u8 {
        let first_line = text.lines().next().unwrap_or("");
        let semicolons = first_line.matches(';').count();
        let commas = first_line.matches(',').count();
        if semicolons > commas {
            b';'
        } else {
            b','
        }
    }
}

impl FileParser for CsvParser {
    fn sheet_names(&self, path: &Path) -> EtlResult<Vec<String>> {
        ensure_exists(path)?;
        Ok(vec![Self::sheet_name(path)])
    }

    fn read_sheet(&self, path: &Path, sheet: &str) -> EtlResult<Option<SheetGrid>> {
        ensure_exists(path)?;

        let name = Self::sheet_name(path);
        if name != sheet {
            return Ok(None);
        }

        let text = Self::read_text(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true) // 允许行长度不一致
            .delimiter(Self::sniff_delimiter(&text))
            .from_reader(text.as_bytes());

        let mut rows = Vec::new();
        for result in reader.records() {
            let record = result?;
            rows.push(record.iter().map(CellValue::text).collect());
        }

        Ok(Some(SheetGrid { name, rows }))
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn sheet_names(&self, path: &Path) -> EtlResult<Vec<String>> {
        ensure_exists(path)?;
        let workbook = open_workbook_auto(path)?;
        Ok(workbook.sheet_names())
    }

    fn read_sheet(&self, path: &Path, sheet: &str) -> EtlResult<Option<SheetGrid>> {
        ensure_exists(path)?;
        let mut workbook = open_workbook_auto(path)?;

        if !workbook.sheet_names().iter().any(|s| s == sheet) {
            return Ok(None);
        }

        let range = workbook
            .worksheet_range(sheet)
            .map_err(|e| EtlError::ExcelParse(format!("{} [{}]: {}", path.display(), sheet, e)))?;

        // Range 从第一个非空单元格开始，补齐左上角偏移以保持真实行号
        let (start_row, start_col) = range.start().unwrap_or((0, 0));
        let mut rows: Vec<Vec<CellValue>> = (0..start_row).map(|_| Vec::new()).collect();
        for data_row in range.rows() {
            let mut cells: Vec<CellValue> = (0..start_col).map(|_| CellValue::Empty).collect();
            cells.extend(data_row.iter().map(convert_cell));
            rows.push(cells);
        }

        Ok(Some(SheetGrid {
            name: sheet.to_string(),
            rows,
        }))
    }
}

/// Excel 序列日期 → 日期时间（1899-12-30 纪元）
fn excel_serial_to_cell(serial: f64) -> CellValue {
    let Some(epoch) = NaiveDate::from_ymd_opt(1899, 12, 30).and_then(|d| d.and_hms_opt(0, 0, 0))
    else {
        return CellValue::Float(serial);
    };
    let millis = (serial * 86_400_000.0).round() as i64;
    let dt = epoch + Duration::milliseconds(millis);
    if dt.time() == chrono::NaiveTime::MIN {
        CellValue::Date(dt.date())
    } else {
        CellValue::DateTime(dt)
    }
}

fn convert_cell(cell: &Data) -> CellValue {
    match cell {
        Data::Empty | Data::Error(_) => CellValue::Empty,
        Data::String(s) => CellValue::text(s),
        Data::Int(i) => CellValue::Int(*i),
        Data::Float(f) => CellValue::Float(*f),
        Data::Bool(b) => CellValue::Bool(*b),
        Data::DateTime(dt) => excel_serial_to_cell(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::text(s),
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    fn delegate(&self, path: &Path) -> EtlResult<&'static dyn FileParser> {
        let ext = extension_of(path).unwrap_or_default();
        match ext.as_str() {
            "csv" => Ok(&CsvParser),
            "xlsx" | "xlsm" | "xls" | "xlsb" | "ods" => Ok(&ExcelParser),
            _ => Err(EtlError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

impl FileParser for UniversalFileParser {
    fn sheet_names(&self, path: &Path) -> EtlResult<Vec<String>> {
        self.delegate(path)?.sheet_names(path)
    }

    fn read_sheet(&self, path: &Path, sheet: &str) -> EtlResult<Option<SheetGrid>> {
        self.delegate(path)?.read_sheet(path, sheet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, content: &[u8]) -> std::path::PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        path
    }

    #[test]
    fn test_csv_parser_single_sheet_named_after_stem() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "ventas_2025.csv", b"cliente,periodo\nA,202501\n");

        let parser = CsvParser;
        assert_eq!(parser.sheet_names(&path).unwrap(), vec!["ventas_2025"]);

        let grid = parser.read_sheet(&path, "ventas_2025").unwrap().unwrap();
        assert_eq!(grid.rows.len(), 2);
        assert_eq!(grid.rows[0][0], CellValue::Text("cliente".to_string()));
        assert_eq!(grid.rows[1][1], CellValue::Text("202501".to_string()));

        assert!(parser.read_sheet(&path, "otra").unwrap().is_none());
    }

    #[test]
    fn test_csv_parser_semicolon_and_latin1() {
        let dir = TempDir::new().unwrap();
        // "año" in Latin-1
        let path = write_file(&dir, "datos.csv", b"a\xf1o;valor\n2025;1,5\n");

        let grid = CsvParser.read_sheet(&path, "datos").unwrap().unwrap();
        assert_eq!(grid.rows[0][0], CellValue::Text("año".to_string()));
        assert_eq!(grid.rows[1][1], CellValue::Text("1,5".to_string()));
    }

    #[test]
    fn test_csv_parser_file_not_found() {
        let result = CsvParser.read_sheet(Path::new("non_existent.csv"), "non_existent");
        assert!(matches!(result, Err(EtlError::FileRead(_))));
    }

    #[test]
    fn test_universal_parser_rejects_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = write_file(&dir, "notas.txt", b"hola");
        let result = UniversalFileParser.sheet_names(&path);
        assert!(matches!(result, Err(EtlError::UnsupportedFormat(_))));
        assert!(!is_supported(&path));
        assert!(is_supported(Path::new("Facturacion.XLSX")));
    }

    #[test]
    fn test_excel_serial_conversion() {
        assert_eq!(
            excel_serial_to_cell(45658.0),
            CellValue::Date(NaiveDate::from_ymd_opt(2025, 1, 1).unwrap())
        );
        match excel_serial_to_cell(45658.5) {
            CellValue::DateTime(dt) => assert_eq!(dt.format("%H:%M").to_string(), "12:00"),
            other => panic!("unexpected {:?}", other),
        }
    }
}
