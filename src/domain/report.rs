// ==========================================
// POS 导入系统 - Z 报表领域模型
// ==========================================
// 用途: 解析器输出,即导入行的 raw_data
// 一张 Z 报表 = 一次收银日结 = 一个导入行
// ==========================================

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// 营业额明细行（HT 金额）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosLine {
    pub source_code: String, // 用于物料映射
    pub description: String,
    pub net_amount: Decimal,
    pub tax_rate: Decimal,
    pub tax_amount: Decimal,
    pub gross_amount: Decimal,
}

/// 收款方式明细
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosPayment {
    pub source_code: String, // 用于收款方式映射
    pub source_name: String,
    pub amount: Decimal,
}

/// 按税率汇总的实际增值税（来自 451 科目）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VatAmount {
    pub rate: Decimal,
    pub amount: Decimal,
}

// ==========================================
// PosReport - Z 报表
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PosReport {
    pub report_number: String,
    pub report_date: Option<NaiveDate>,
    /// 该报表在源文件中首次出现的行号（含表头,从 1 开始）
    pub source_line: usize,
    pub lines: Vec<PosLine>,
    pub payments: Vec<PosPayment>,
    /// 按税率升序
    pub vat_by_rate: Vec<VatAmount>,
}

impl PosReport {
    pub fn new(report_number: impl Into<String>, report_date: Option<NaiveDate>) -> Self {
        Self {
            report_number: report_number.into(),
            report_date,
            source_line: 0,
            lines: Vec::new(),
            payments: Vec::new(),
            vat_by_rate: Vec::new(),
        }
    }

    /// 发票外部参考号（幂等键）
    pub fn reference(&self) -> String {
        format!("Z-{}", self.report_number)
    }

    pub fn has_actual_vat(&self) -> bool {
        !self.vat_by_rate.is_empty()
    }

    pub fn total_net(&self) -> Decimal {
        self.lines.iter().map(|l| l.net_amount).sum()
    }

    /// 有实际增值税时以其为准,否则按明细行累加
    pub fn total_tax(&self) -> Decimal {
        if self.has_actual_vat() {
            self.vat_by_rate.iter().map(|v| v.amount).sum()
        } else {
            self.lines.iter().map(|l| l.tax_amount).sum()
        }
    }

    pub fn total_gross(&self) -> Decimal {
        if self.has_actual_vat() {
            self.total_net() + self.total_tax()
        } else {
            self.lines.iter().map(|l| l.gross_amount).sum()
        }
    }

    pub fn total_payments(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

/// 行级结构错误（不致命,预览中展示,导入时转为行失败）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuralError {
    pub index: usize,
    pub message: String,
}

/// 被跳过的报表（无营业额明细,不生成导入行）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedReport {
    pub report_number: String,
    pub source_line: usize,
    pub reason: String,
}

/// 解析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParsedFile {
    pub rows: Vec<PosReport>,
    pub structural_errors: Vec<StructuralError>,
    #[serde(default)]
    pub skipped_reports: Vec<SkippedReport>,
}

impl ParsedFile {
    /// 指定行的结构错误（多条以 "; " 连接）
    pub fn structural_error_for(&self, index: usize) -> Option<String> {
        let messages: Vec<&str> = self
            .structural_errors
            .iter()
            .filter(|e| e.index == index)
            .map(|e| e.message.as_str())
            .collect();

        if messages.is_empty() {
            None
        } else {
            Some(messages.join("; "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn line(net: &str, tax: &str) -> PosLine {
        PosLine {
            source_code: "X".to_string(),
            description: "x".to_string(),
            net_amount: dec(net),
            tax_rate: dec("10"),
            tax_amount: dec(tax),
            gross_amount: dec(net) + dec(tax),
        }
    }

    #[test]
    fn test_totals_prefer_actual_vat() {
        let mut report = PosReport::new("12", None);
        report.lines.push(line("100.00", "10.00"));
        report.lines.push(line("50.00", "5.00"));

        assert_eq!(report.total_net(), dec("150.00"));
        assert_eq!(report.total_tax(), dec("15.00"));
        assert_eq!(report.total_gross(), dec("165.00"));

        report.vat_by_rate.push(VatAmount {
            rate: dec("10"),
            amount: dec("14.50"),
        });
        assert_eq!(report.total_tax(), dec("14.50"));
        assert_eq!(report.total_gross(), dec("164.50"));
    }

    #[test]
    fn test_structural_errors_are_joined_per_row() {
        let parsed = ParsedFile {
            rows: vec![],
            structural_errors: vec![
                StructuralError { index: 1, message: "a".to_string() },
                StructuralError { index: 2, message: "b".to_string() },
                StructuralError { index: 1, message: "c".to_string() },
            ],
            ..Default::default()
        };
        assert_eq!(parsed.structural_error_for(1), Some("a; c".to_string()));
        assert_eq!(parsed.structural_error_for(0), None);
    }
}
