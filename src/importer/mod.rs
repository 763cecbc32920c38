// ==========================================
// 能源数据集市 - 导入层
// ==========================================
// 职责: 数据源解析 → 抽取 → 结构校验 → 转换规范化
// 管道:
//   1. 数据源解析（文件名模式匹配）
//   2. 工作表读取与表头识别
//   3. 列重命名 / 宽表转长表
//   4. 必需列与域约束校验（穷举）
//   5. 类型规范化 / 单位换算 / 参照映射 / 主键构建
// ==========================================

pub mod data_cleaner;
pub mod extractor;
pub mod file_parser;
pub mod importer_trait;
pub mod schema_validator;
pub mod source_resolver;
pub mod transformer;

// 重导出核心类型
pub use extractor::Extractor;
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use importer_trait::{FileParser, SheetGrid, TableValidator};
pub use schema_validator::SchemaValidator;
pub use source_resolver::{Resolution, ResolvedSource, SourceResolver};
pub use transformer::{ReferenceLookup, TransformedTable, Transformer};
