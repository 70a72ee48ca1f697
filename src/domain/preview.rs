// ==========================================
// POS 导入系统 - 预览摘要
// ==========================================
// 每次预览整体替换,不与旧摘要合并
// 不含时间戳: 同一文件重复预览结果逐字节一致
// ==========================================

use crate::domain::report::{SkippedReport, StructuralError};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// 预览样本行
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewRow {
    pub index: usize,
    pub report_number: String,
    pub report_date: Option<NaiveDate>,
    pub line_count: usize,
    pub payment_count: usize,
    pub total_net: Decimal,
    pub total_tax: Decimal,
    pub total_gross: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreviewSummary {
    pub total_rows: usize,
    pub valid_rows: usize,
    pub invalid_rows: usize,
    pub total_revenue: Decimal,
    pub total_tax: Decimal,
    pub total_payments: Decimal,
    pub sample_size: usize,
    pub sample: Vec<PreviewRow>,
    pub structural_errors: Vec<StructuralError>,
    /// 无营业额明细而未生成导入行的报表
    #[serde(default)]
    pub skipped_reports: Vec<SkippedReport>,
}

impl PreviewSummary {
    /// 渲染为操作员可读的文本表格
    pub fn render_text(&self, currency: &str) -> String {
        let mut out = String::new();

        let _ = writeln!(
            out,
            "报表数: {}  (有效 {} / 结构错误 {})",
            self.total_rows, self.valid_rows, self.invalid_rows
        );
        let _ = writeln!(out, "营业额: {:.2} {}", self.total_revenue, currency);
        let _ = writeln!(out, "税额:   {:.2} {}", self.total_tax, currency);
        let _ = writeln!(out, "收款:   {:.2} {}", self.total_payments, currency);
        let _ = writeln!(out);

        let _ = writeln!(
            out,
            "{:<6} {:<10} {:<12} {:>6} {:>6} {:>14}",
            "#", "Z", "日期", "明细", "收款", "合计"
        );
        for row in &self.sample {
            let date = row
                .report_date
                .map(|d| d.format("%Y-%m-%d").to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                out,
                "{:<6} {:<10} {:<12} {:>6} {:>6} {:>14}",
                row.index,
                row.report_number,
                date,
                row.line_count,
                row.payment_count,
                format!("{:.2} {}", row.total_gross, currency)
            );
        }
        if self.total_rows > self.sample.len() {
            let _ = writeln!(out, "... 另有 {} 张报表未显示", self.total_rows - self.sample.len());
        }

        if !self.structural_errors.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "结构错误:");
            for err in &self.structural_errors {
                let _ = writeln!(out, "  [{}] {}", err.index, err.message);
            }
        }

        if !self.skipped_reports.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "已跳过 {} 张报表:", self.skipped_reports.len());
            for skipped in &self.skipped_reports {
                let _ = writeln!(
                    out,
                    "  Z-{} (第 {} 行) {}",
                    skipped.report_number, skipped.source_line, skipped.reason
                );
            }
        }

        out
    }
}
