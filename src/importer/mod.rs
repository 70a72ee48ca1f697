// ==========================================
// POS 导入系统 - 导入层
// ==========================================
// 职责: 上传文件 → 报表序列 + 结构错误 → 预览摘要
// 支持: CSV, Excel
// ==========================================

// 模块声明
pub mod data_cleaner;
pub mod error;
pub mod file_parser;
pub mod parser_trait;
pub mod preview_builder;
pub mod restomax_parser;

// 重导出核心类型
pub use data_cleaner::DataCleaner;
pub use error::{ImportError, ImportResult};
pub use file_parser::{CsvParser, ExcelParser, UniversalFileParser};
pub use parser_trait::{FileParser, ReportParser, TabularRecord, TabularSheet};
pub use preview_builder::{build_preview, PreviewBuilder};
pub use restomax_parser::RestomaxParser;

use crate::domain::types::ParserKind;

/// 按连接器配置创建报表解析器
pub fn parser_for(kind: ParserKind) -> Box<dyn ReportParser> {
    match kind {
        ParserKind::Restomax => Box::new(RestomaxParser::new()),
    }
}
