// ==========================================
// POS 导入系统 - 数据清洗
// ==========================================
// 职责: 欧式数字 / 多格式日期 / 文本 TRIM
// ==========================================

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use std::str::FromStr;

/// 支持的日期格式（按顺序尝试）
const DATE_FORMATS: [&str; 3] = ["%d/%m/%Y", "%Y-%m-%d", "%d-%m-%Y"];
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S", "%d/%m/%Y %H:%M:%S"];

pub struct DataCleaner;

impl DataCleaner {
    pub fn clean_text(&self, value: &str) -> String {
        value.trim().to_string()
    }

    /// 解析欧式数字（空格/不换行空格为千分位,逗号为小数点）
    ///
    /// # 返回
    /// - Ok(Decimal): 空值视为 0
    /// - Err(String): 原始文本无法解析
    pub fn parse_number(&self, value: &str) -> Result<Decimal, String> {
        let text: String = value
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '\u{00a0}' | '\u{202f}'))
            .map(|c| if c == ',' { '.' } else { c })
            .collect();

        if text.is_empty() {
            return Ok(Decimal::ZERO);
        }

        Decimal::from_str(&text)
            .or_else(|_| Decimal::from_scientific(&text))
            .map_err(|_| value.trim().to_string())
    }

    /// 解析日期（含带时间的格式）
    pub fn parse_date(&self, value: &str) -> Option<NaiveDate> {
        let text = value.trim();
        if text.is_empty() {
            return None;
        }

        DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
            .or_else(|| {
                DATETIME_FORMATS
                    .iter()
                    .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
                    .map(|dt| dt.date())
            })
    }
}
