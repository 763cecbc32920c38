// ==========================================
// 能源数据集市 - 导入层 Trait
// ==========================================
// 职责: 定义文件解析 / 表校验接口（不包含实现）
// ==========================================

use crate::domain::record::RawTable;
use crate::domain::table::TableRule;
use crate::domain::types::CellValue;
use crate::domain::validation::ValidationOutcome;
use crate::error::EtlResult;
use std::path::Path;

// ==========================================
// SheetGrid - 工作表原始网格（未识别表头）
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGrid {
    pub name: String,
    pub rows: Vec<Vec<CellValue>>,
}

impl SheetGrid {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 工作簿读取（阶段 0）
// 实现者: CsvParser, ExcelParser, UniversalFileParser
pub trait FileParser: Send + Sync {
    /// 列出工作表名称（按工作簿顺序）
    fn sheet_names(&self, path: &Path) -> EtlResult<Vec<String>>;

    /// 读取指定工作表的全部单元格
    ///
    /// # 返回
    /// - Ok(Some(grid)): 工作表存在
    /// - Ok(None): 工作表不存在
    fn read_sheet(&self, path: &Path, sheet: &str) -> EtlResult<Option<SheetGrid>>;
}

// ==========================================
// TableValidator Trait
// ==========================================
// 用途: 表级契约校验（穷举，不快速失败）
// 实现者: SchemaValidator
pub trait TableValidator: Send + Sync {
    /// 校验一张原始表，违规行被就地标记
    fn validate(&self, table: &mut RawTable, rule: &TableRule) -> ValidationOutcome;
}
