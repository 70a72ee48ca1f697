// ==========================================
// POS 导入系统 - 解析器 Trait
// ==========================================
// 职责: 定义文件读取 / 报表解析接口（不包含实现）
// 红线: 解析为纯函数,不触碰作业持久化状态
// ==========================================

use crate::domain::report::ParsedFile;
use crate::importer::error::ImportResult;
use std::collections::HashMap;
use std::path::Path;

/// 表格文件中的一条记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabularRecord {
    /// 源文件行号（表头为第 1 行）
    pub line: usize,
    pub values: HashMap<String, String>,
}

impl TabularRecord {
    /// 读取列值（不存在时为空串）
    pub fn get(&self, column: &str) -> &str {
        self.values.get(column).map(String::as_str).unwrap_or("")
    }
}

/// 表格文件内容（表头 + 非空记录）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TabularSheet {
    pub headers: Vec<String>,
    pub records: Vec<TabularRecord>,
}

// ==========================================
// FileParser Trait
// ==========================================
// 用途: 表格文件读取（阶段 0）
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    /// 读取文件为表头 + 行记录
    ///
    /// # 返回
    /// - Ok(TabularSheet): 已跳过完全空白的行
    /// - Err: 文件不存在、格式不支持、格式错误
    fn read_sheet(&self, file_path: &Path) -> ImportResult<TabularSheet>;
}

// ==========================================
// ReportParser Trait
// ==========================================
// 用途: 将上传文件解析为有序报表序列 + 行级结构错误
// 实现者: RestomaxParser
pub trait ReportParser: Send + Sync {
    /// 解析文件
    ///
    /// # 约束
    /// - 同一文件多次解析结果完全一致
    /// - 整文件不可解析时返回 FormatError,不返回部分结果
    fn parse(&self, file_path: &Path) -> ImportResult<ParsedFile>;
}
