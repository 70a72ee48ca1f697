// ==========================================
// POS 导入系统 - 表格文件读取
// ==========================================
// 支持: CSV (.csv) / Excel (.xlsx/.xls/.xlsm) / ODS (.ods)
// CSV: UTF-8(含 BOM) 优先,失败回落 ISO-8859-1;分隔符自动识别 ; 或 ,
// ==========================================

use crate::importer::error::{ImportError, ImportResult};
use crate::importer::parser_trait::{FileParser, TabularRecord, TabularSheet};
use calamine::{open_workbook_auto, Data, DataType, Reader};
use csv::ReaderBuilder;
use std::collections::HashMap;
use std::path::Path;

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

/// 解码文本: UTF-8（去 BOM）失败时按 ISO-8859-1 逐字节映射
pub fn decode_content(bytes: &[u8]) -> String {
    const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];
    let bytes = bytes.strip_prefix(&UTF8_BOM[..]).unwrap_or(bytes);
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

/// 分隔符识别: 首行含 ';' 则用 ';',否则 ','
pub fn detect_delimiter(text: &str) -> u8 {
    let first_line = text.lines().next().unwrap_or("");
    if first_line.contains(';') {
        b';'
    } else {
        b','
    }
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser;

impl CsvParser {
    /// 从已解码文本读取
    pub fn read_text(&self, text: &str) -> ImportResult<TabularSheet> {
        let mut reader = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true) // 允许行长度不一致
            .delimiter(detect_delimiter(text))
            .from_reader(text.as_bytes());

        // 读取表头
        let headers: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result?;
            let line = record
                .position()
                .map(|p| p.line() as usize)
                .unwrap_or(row_idx + 2);

            let mut values = HashMap::new();
            for (col_idx, value) in record.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    values.insert(header.clone(), value.trim().to_string());
                }
            }

            // 跳过完全空白的行
            if values.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(TabularRecord { line, values });
        }

        Ok(TabularSheet { headers, records })
    }
}

impl FileParser for CsvParser {
    fn read_sheet(&self, file_path: &Path) -> ImportResult<TabularSheet> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "csv" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let bytes = std::fs::read(file_path)?;
        let text = decode_content(&bytes);
        if text.trim().is_empty() {
            return Err(ImportError::format("文件", "文件为空"));
        }

        self.read_text(&text)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

/// 单元格转文本: 日期统一为 YYYY-MM-DD
fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::DateTime(_) | Data::DateTimeIso(_) => cell
            .as_date()
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| cell.to_string()),
        Data::Empty => String::new(),
        _ => cell.to_string(),
    }
}

impl FileParser for ExcelParser {
    fn read_sheet(&self, file_path: &Path) -> ImportResult<TabularSheet> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if !matches!(ext.as_str(), "xlsx" | "xls" | "xlsm" | "ods") {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook = open_workbook_auto(file_path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::format("工作簿", "Excel 文件无工作表"))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        // 提取表头（第一行）
        let mut rows = range.rows();
        let header_row = rows
            .next()
            .ok_or_else(|| ImportError::format(sheet_name.clone(), "文件为空"))?;
        let headers: Vec<String> = header_row
            .iter()
            .map(|cell| cell_to_string(cell).trim().to_string())
            .collect();

        let mut records = Vec::new();
        for (row_idx, data_row) in rows.enumerate() {
            let mut values = HashMap::new();
            for (col_idx, cell) in data_row.iter().enumerate() {
                if let Some(header) = headers.get(col_idx) {
                    values.insert(header.clone(), cell_to_string(cell).trim().to_string());
                }
            }

            // 跳过完全空白的行
            if values.values().all(|v| v.is_empty()) {
                continue;
            }

            records.push(TabularRecord {
                line: row_idx + 2,
                values,
            });
        }

        Ok(TabularSheet { headers, records })
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl FileParser for UniversalFileParser {
    fn read_sheet(&self, file_path: &Path) -> ImportResult<TabularSheet> {
        match extension_of(file_path).as_str() {
            "csv" => CsvParser.read_sheet(file_path),
            "xlsx" | "xls" | "xlsm" | "ods" => ExcelParser.read_sheet(file_path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
