// ==========================================
// POS 导入系统 - 预览构建器
// ==========================================
// 职责: 由解析结果生成预览摘要
// 约束: 统计量流式累加,仅保留前 sample_size 行样本
// ==========================================

use crate::domain::preview::{PreviewRow, PreviewSummary};
use crate::domain::report::{ParsedFile, PosReport, SkippedReport, StructuralError};
use rust_decimal::Decimal;
use std::collections::BTreeSet;

pub struct PreviewBuilder {
    sample_size: usize,
}

impl PreviewBuilder {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }

    /// 生成预览摘要
    ///
    /// # 参数
    /// - rows: 按行号顺序的报表迭代器
    /// - structural_errors: 全部结构错误（原样保留在摘要中）
    /// - skipped: 未生成导入行的报表（不计入 total_rows）
    pub fn build<'a, I>(
        &self,
        rows: I,
        structural_errors: &[StructuralError],
        skipped: &[SkippedReport],
    ) -> PreviewSummary
    where
        I: IntoIterator<Item = &'a PosReport>,
    {
        let invalid: BTreeSet<usize> = structural_errors.iter().map(|e| e.index).collect();

        let mut total_rows = 0;
        let mut invalid_rows = 0;
        let mut total_revenue = Decimal::ZERO;
        let mut total_tax = Decimal::ZERO;
        let mut total_payments = Decimal::ZERO;
        let mut sample = Vec::with_capacity(self.sample_size);

        for (index, report) in rows.into_iter().enumerate() {
            total_rows += 1;
            if invalid.contains(&index) {
                invalid_rows += 1;
            }

            let gross = report.total_gross();
            let tax = report.total_tax();
            total_revenue += gross;
            total_tax += tax;
            total_payments += report.total_payments();

            if sample.len() < self.sample_size {
                sample.push(PreviewRow {
                    index,
                    report_number: report.report_number.clone(),
                    report_date: report.report_date,
                    line_count: report.lines.len(),
                    payment_count: report.payments.len(),
                    total_net: report.total_net(),
                    total_tax: tax,
                    total_gross: gross,
                });
            }
        }

        PreviewSummary {
            total_rows,
            valid_rows: total_rows - invalid_rows,
            invalid_rows,
            total_revenue,
            total_tax,
            total_payments,
            sample_size: self.sample_size,
            sample,
            structural_errors: structural_errors.to_vec(),
            skipped_reports: skipped.to_vec(),
        }
    }
}

/// 便捷函数
pub fn build_preview(parsed: &ParsedFile, sample_size: usize) -> PreviewSummary {
    PreviewBuilder::new(sample_size).build(
        &parsed.rows,
        &parsed.structural_errors,
        &parsed.skipped_reports,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::report::PosLine;
    use std::str::FromStr;

    fn report(number: &str, net: &str) -> PosReport {
        let mut r = PosReport::new(number, None);
        let amount = Decimal::from_str(net).unwrap();
        r.lines.push(PosLine {
            source_code: "A".to_string(),
            description: "a".to_string(),
            net_amount: amount,
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            gross_amount: amount,
        });
        r
    }

    #[test]
    fn test_counts_and_bounded_sample() {
        let rows: Vec<PosReport> = (0..10).map(|i| report(&i.to_string(), "10.00")).collect();
        let errors = vec![
            StructuralError { index: 3, message: "x".to_string() },
            StructuralError { index: 3, message: "y".to_string() },
            StructuralError { index: 8, message: "z".to_string() },
        ];

        let summary = PreviewBuilder::new(4).build(&rows, &errors, &[]);
        assert_eq!(summary.total_rows, 10);
        assert_eq!(summary.invalid_rows, 2);
        assert_eq!(summary.valid_rows, 8);
        assert_eq!(summary.sample.len(), 4);
        assert_eq!(summary.total_revenue, Decimal::from_str("100.00").unwrap());
        assert_eq!(summary.structural_errors.len(), 3);
    }

    #[test]
    fn test_preview_is_repeatable() {
        let parsed = ParsedFile {
            rows: vec![report("1", "5.5"), report("2", "4.5")],
            ..Default::default()
        };
        let a = build_preview(&parsed, 20);
        let b = build_preview(&parsed, 20);
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            serde_json::to_string(&b).unwrap()
        );
        assert!(a.render_text("EUR").contains("10.00 EUR"));
    }

    #[test]
    fn test_skipped_reports_are_listed_but_not_counted() {
        let parsed = ParsedFile {
            rows: vec![report("1", "10.00")],
            skipped_reports: vec![SkippedReport {
                report_number: "2".to_string(),
                source_line: 5,
                reason: "无营业额明细行（仅汇总行）".to_string(),
            }],
            ..Default::default()
        };

        let summary = build_preview(&parsed, 20);
        assert_eq!(summary.total_rows, 1);
        assert_eq!(summary.invalid_rows, 0);
        assert_eq!(summary.skipped_reports.len(), 1);
        assert!(summary.render_text("EUR").contains("Z-2 (第 5 行)"));
    }
}
