// ==========================================
// 能源数据集市 - 数据清洗工具
// ==========================================
// 职责: 文本规范化 / 标识符清洗 / 期间与日期解析 / 数值解析
// 说明: 纯函数，无 I/O
// ==========================================

use crate::domain::types::CellValue;
use chrono::{Datelike, NaiveDate, NaiveDateTime};

// 西班牙语月份名（含 SETIEMBRE / SEPTIEMBRE 两种写法）及常用缩写
const SPANISH_MONTHS: [(&str, u32); 25] = [
    ("ENERO", 1),
    ("FEBRERO", 2),
    ("MARZO", 3),
    ("ABRIL", 4),
    ("MAYO", 5),
    ("JUNIO", 6),
    ("JULIO", 7),
    ("AGOSTO", 8),
    ("SETIEMBRE", 9),
    ("SEPTIEMBRE", 9),
    ("OCTUBRE", 10),
    ("NOVIEMBRE", 11),
    ("DICIEMBRE", 12),
    ("ENE", 1),
    ("FEB", 2),
    ("MAR", 3),
    ("ABR", 4),
    ("JUN", 6),
    ("JUL", 7),
    ("AGO", 8),
    ("SET", 9),
    ("SEP", 9),
    ("OCT", 10),
    ("NOV", 11),
    ("DIC", 12),
];

const DATE_FORMATS: [&str; 6] = [
    "%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d-%m-%Y", "%Y%m%d", "%d.%m.%Y",
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"];

// Excel 序列日期的合理范围（1900-01-01 ~ 9999-12-31）
const EXCEL_SERIAL_RANGE: std::ops::RangeInclusive<f64> = 1.0..=2_958_465.0;

// ==========================================
// 文本
// ==========================================

fn fold_accent(c: char) -> char {
    match c {
        'á' | 'à' | 'ä' | 'â' | 'ã' | 'Á' | 'À' | 'Ä' | 'Â' | 'Ã' => 'A',
        'é' | 'è' | 'ë' | 'ê' | 'É' | 'È' | 'Ë' | 'Ê' => 'E',
        'í' | 'ì' | 'ï' | 'î' | 'Í' | 'Ì' | 'Ï' | 'Î' => 'I',
        'ó' | 'ò' | 'ö' | 'ô' | 'õ' | 'Ó' | 'Ò' | 'Ö' | 'Ô' | 'Õ' => 'O',
        'ú' | 'ù' | 'ü' | 'û' | 'Ú' | 'Ù' | 'Ü' | 'Û' => 'U',
        'ñ' | 'Ñ' => 'N',
        'ç' | 'Ç' => 'C',
        other => other,
    }
}

/// 名称规范化: 去重音 + 非字母数字替换为空格 + 合并空白 + 大写
///
/// 用于列名宽松匹配与参照表查找
pub fn normalize_text(value: &str) -> String {
    let replaced: String = value
        .chars()
        .map(fold_accent)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    replaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// 标识符清洗: 去首尾空白 + 合并内部空白 + 大写
pub fn clean_identifier(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_uppercase()
}

/// 西班牙语月份名 → 月份
pub fn month_from_name(token: &str) -> Option<u32> {
    let normalized = normalize_text(token);
    SPANISH_MONTHS
        .iter()
        .find(|(name, _)| *name == normalized)
        .map(|(_, month)| *month)
}

// ==========================================
// 期间 YYYYMM
// ==========================================

fn period_from_parts(year: i32, month: u32) -> Result<String, String> {
    if !(1..=12).contains(&month) {
        return Err(format!("月份超出范围: {}", month));
    }
    if !(1900..=9999).contains(&year) {
        return Err(format!("年份超出范围: {}", year));
    }
    Ok(format!("{:04}{:02}", year, month))
}

fn period_from_digits(digits: &str) -> Result<String, String> {
    if digits.len() != 6 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(format!("期间格式应为 YYYYMM: {}", digits));
    }
    let year: i32 = digits[..4].parse().map_err(|_| format!("年份无效: {}", digits))?;
    let month: u32 = digits[4..].parse().map_err(|_| format!("月份无效: {}", digits))?;
    period_from_parts(year, month)
}

fn period_from_text(text: &str) -> Result<String, String> {
    let trimmed = text.trim();

    // 202501 / 202501.0
    let digits = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    if digits.len() == 6 && digits.chars().all(|c| c.is_ascii_digit()) {
        return period_from_digits(digits);
    }

    // 2025-01 / 2025/01
    for sep in ['-', '/'] {
        let parts: Vec<&str> = trimmed.split(sep).collect();
        if parts.len() == 2 && parts[0].len() == 4 && (1..=2).contains(&parts[1].len()) {
            let year: i32 = parts[0]
                .parse()
                .map_err(|_| format!("年份无效: {}", trimmed))?;
            let month: u32 = parts[1]
                .parse()
                .map_err(|_| format!("月份无效: {}", trimmed))?;
            return period_from_parts(year, month);
        }
    }

    // 完整日期 / 日期时间
    if let Some(date) = parse_date_text(trimmed) {
        return period_from_parts(date.year(), date.month());
    }

    Err(format!("无法解析为期间: {}", trimmed))
}

/// 解析期间，规范形式 YYYYMM
///
/// 接受 `202501`、`202501.0`、`2025-01`、`2025/01`、日期与日期时间
pub fn parse_period(value: &CellValue) -> Result<String, String> {
    match value {
        CellValue::Empty => Err("值为空".to_string()),
        CellValue::Int(i) => period_from_digits(&i.to_string()),
        CellValue::Float(f) if f.fract() == 0.0 => period_from_digits(&(*f as i64).to_string()),
        CellValue::Float(f) => Err(format!("无法解析为期间: {}", f)),
        CellValue::Date(d) => period_from_parts(d.year(), d.month()),
        CellValue::DateTime(dt) => period_from_parts(dt.year(), dt.month()),
        CellValue::Text(s) => period_from_text(s),
        CellValue::Bool(b) => Err(format!("无法解析为期间: {}", b)),
    }
}

/// 由宽表列头推断期间（用于宽表转长表）
///
/// - 期间文本 / 日期: 直接解析
/// - 月份名（可带四位年份，如 `ENERO 2025`）: 与 year 组合
pub fn period_from_header(header: &str, year: Option<i32>) -> Option<String> {
    if let Ok(period) = period_from_text(header) {
        return Some(period);
    }

    let normalized = normalize_text(header);
    let tokens: Vec<&str> = normalized.split(' ').collect();
    let month = tokens.iter().find_map(|t| month_from_name(t))?;
    let header_year = tokens
        .iter()
        .find(|t| t.len() == 4 && t.chars().all(|c| c.is_ascii_digit()))
        .and_then(|t| t.parse::<i32>().ok());

    period_from_parts(header_year.or(year)?, month).ok()
}

// ==========================================
// 日期 YYYY-MM-DD
// ==========================================

fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let trimmed = text.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(trimmed, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(|dt| dt.date())
        })
}

fn date_from_excel_serial(serial: f64) -> Option<NaiveDate> {
    if !EXCEL_SERIAL_RANGE.contains(&serial) {
        return None;
    }
    NaiveDate::from_ymd_opt(1899, 12, 30)?
        .checked_add_signed(chrono::Duration::days(serial.trunc() as i64))
}

/// 解析日期，规范形式 YYYY-MM-DD
pub fn parse_date(value: &CellValue) -> Result<String, String> {
    let date = match value {
        CellValue::Empty => return Err("值为空".to_string()),
        CellValue::Date(d) => Some(*d),
        CellValue::DateTime(dt) => Some(dt.date()),
        CellValue::Int(i) => date_from_excel_serial(*i as f64),
        CellValue::Float(f) => date_from_excel_serial(*f),
        CellValue::Text(s) => parse_date_text(s),
        CellValue::Bool(_) => None,
    };
    date.map(|d| d.format("%Y-%m-%d").to_string())
        .ok_or_else(|| format!("无法解析为日期: {}", value))
}

// ==========================================
// 数值
// ==========================================

fn parse_decimal_text(text: &str) -> Option<f64> {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let commas = compact.matches(',').count();
    let dots = compact.matches('.').count();
    let normalized = match (commas, dots) {
        (0, 0) | (0, 1) => compact,
        (1, 0) => compact.replace(',', "."),
        (_, 0) => compact.replace(',', ""),
        (0, _) => compact.replace('.', ""),
        _ => {
            // 同时出现时，最后出现的为小数点
            let last_comma = compact.rfind(',').unwrap_or(0);
            let last_dot = compact.rfind('.').unwrap_or(0);
            if last_comma > last_dot {
                compact.replace('.', "").replace(',', ".")
            } else {
                compact.replace(',', "")
            }
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// 解析小数（支持千分位与小数逗号）
pub fn parse_decimal(value: &CellValue) -> Result<f64, String> {
    match value {
        CellValue::Empty => Err("值为空".to_string()),
        CellValue::Int(i) => Ok(*i as f64),
        CellValue::Float(f) => Ok(*f),
        CellValue::Text(s) => {
            parse_decimal_text(s).ok_or_else(|| format!("无法解析为数值: {}", s))
        }
        other => Err(format!("无法解析为数值: {}", other)),
    }
}

/// 解析整数（小数部分必须为 0）
pub fn parse_integer(value: &CellValue) -> Result<i64, String> {
    let number = parse_decimal(value)?;
    if number.fract() != 0.0 {
        return Err(format!("不是整数: {}", value));
    }
    if number.abs() > i64::MAX as f64 {
        return Err(format!("整数溢出: {}", value));
    }
    Ok(number as i64)
}

/// 小数规范化输出（最多 9 位小数，去除多余的 0）
pub fn format_decimal(value: f64) -> String {
    let rounded = (value * 1e9).round() / 1e9;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Hidroeléctrica  Cañón-2 "), "HIDROELECTRICA CANON 2");
        assert_eq!(normalize_text("S.A.C."), "S A C");
        assert_eq!(normalize_text(""), "");
    }

    #[test]
    fn test_clean_identifier() {
        assert_eq!(clean_identifier("  minera   sur "), "MINERA SUR");
    }

    #[test]
    fn test_parse_period_forms() {
        assert_eq!(parse_period(&CellValue::Int(202501)).unwrap(), "202501");
        assert_eq!(parse_period(&CellValue::Float(202501.0)).unwrap(), "202501");
        assert_eq!(parse_period(&CellValue::text("202501.0")).unwrap(), "202501");
        assert_eq!(parse_period(&CellValue::text("2025-1")).unwrap(), "202501");
        assert_eq!(parse_period(&CellValue::text("2025/12")).unwrap(), "202512");
        assert_eq!(parse_period(&CellValue::text("2025-03-15")).unwrap(), "202503");
        assert_eq!(
            parse_period(&CellValue::Date(NaiveDate::from_ymd_opt(2024, 7, 1).unwrap())).unwrap(),
            "202407"
        );
    }

    #[test]
    fn test_parse_period_rejects() {
        assert!(parse_period(&CellValue::text("202513")).is_err());
        assert!(parse_period(&CellValue::text("20251")).is_err());
        assert!(parse_period(&CellValue::text("enero")).is_err());
        assert!(parse_period(&CellValue::Empty).is_err());
    }

    #[test]
    fn test_period_from_header() {
        assert_eq!(period_from_header("ENERO", Some(2025)).as_deref(), Some("202501"));
        assert_eq!(period_from_header("Setiembre", Some(2025)).as_deref(), Some("202509"));
        assert_eq!(period_from_header("SEPTIEMBRE", Some(2025)).as_deref(), Some("202509"));
        assert_eq!(period_from_header("Dic-2024", None).as_deref(), Some("202412"));
        assert_eq!(period_from_header("2025-02", None).as_deref(), Some("202502"));
        assert_eq!(period_from_header("ENERO", None), None);
        assert_eq!(period_from_header("CLIENTE", Some(2025)), None);
    }

    #[test]
    fn test_parse_date() {
        assert_eq!(parse_date(&CellValue::text("31/01/2025")).unwrap(), "2025-01-31");
        assert_eq!(parse_date(&CellValue::text("2025-01-31 08:00:00")).unwrap(), "2025-01-31");
        assert_eq!(parse_date(&CellValue::Float(45658.0)).unwrap(), "2025-01-01");
        assert!(parse_date(&CellValue::text("31/02/2025")).is_err());
        assert!(parse_date(&CellValue::text("mañana")).is_err());
    }

    #[test]
    fn test_parse_decimal_separators() {
        assert_eq!(parse_decimal(&CellValue::text("10")).unwrap(), 10.0);
        assert_eq!(parse_decimal(&CellValue::text("1,5")).unwrap(), 1.5);
        assert_eq!(parse_decimal(&CellValue::text("1.234,56")).unwrap(), 1234.56);
        assert_eq!(parse_decimal(&CellValue::text("1,234.56")).unwrap(), 1234.56);
        assert_eq!(parse_decimal(&CellValue::text("1.234.567")).unwrap(), 1234567.0);
        assert!(parse_decimal(&CellValue::text("n/a")).is_err());
    }

    #[test]
    fn test_parse_integer_and_format() {
        assert_eq!(parse_integer(&CellValue::Float(12.0)).unwrap(), 12);
        assert!(parse_integer(&CellValue::Float(12.5)).is_err());
        assert_eq!(format_decimal(10.0), "10");
        assert_eq!(format_decimal(0.1 + 0.2), "0.3");
        assert_eq!(format_decimal(-0.0), "0");
    }
}
