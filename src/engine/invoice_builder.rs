// ==========================================
// POS 导入系统 - 发票构建器
// ==========================================
// 职责: Z 报表 → 销售发票草稿
// 流程: 结构校验 → 税额一致性 → 物料/税/收款映射 → 合计核对
// 红线: 转换失败只产生 ConversionError,由引擎记录到行
// ==========================================

use crate::config::ImportSettings;
use crate::domain::connector::PosConnector;
use crate::domain::invoice::{InvoiceItem, InvoicePayment, InvoiceTax, SalesInvoiceDraft};
use crate::domain::job::ImportRow;
use crate::domain::report::PosReport;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

/// 行转换错误（记录为行的 error_detail）
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("行结构无效: {0}")]
    StructurallyInvalid(String),

    #[error("报表 Z-{0} 缺少关账日期")]
    MissingDate(String),

    #[error("源编码 {0} 未配置物料映射,且连接器未设置默认物料")]
    MissingItemMapping(String),

    #[error("源编码 {0} 未配置收款方式映射")]
    MissingPaymentMapping(String),

    #[error("税额偏差 ({description}): 应为 {expected}, 实际 {actual}, 差额 {difference}")]
    TaxDiscrepancy {
        description: String,
        expected: Decimal,
        actual: Decimal,
        difference: Decimal,
    },

    #[error("Z-{report_number}: 发票金额与 Z 报表不符: {}", .details.join("; "))]
    AmountMismatch {
        report_number: String,
        details: Vec<String>,
    },

    #[error("账务网关错误: {0}")]
    Gateway(String),
}

// ==========================================
// InvoiceBuilder
// ==========================================
pub struct InvoiceBuilder<'a> {
    connector: &'a PosConnector,
    settings: &'a ImportSettings,
}

impl<'a> InvoiceBuilder<'a> {
    pub fn new(connector: &'a PosConnector, settings: &'a ImportSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// 由导入行构建发票草稿（结构错误直接判为失败）
    pub fn build(&self, row: &ImportRow) -> Result<SalesInvoiceDraft, ConversionError> {
        if let Some(message) = &row.structural_error {
            return Err(ConversionError::StructurallyInvalid(message.clone()));
        }
        self.build_from_report(&row.raw_data)
    }

    pub fn build_from_report(
        &self,
        report: &PosReport,
    ) -> Result<SalesInvoiceDraft, ConversionError> {
        let posting_date = report
            .report_date
            .ok_or_else(|| ConversionError::MissingDate(report.report_number.clone()))?;

        self.validate_tax_amounts(report)?;

        let items = report
            .lines
            .iter()
            .map(|line| {
                let mapping = self.connector.item_mapping(&line.source_code);
                let item_code = self
                    .connector
                    .item_for_source_code(&line.source_code)
                    .ok_or_else(|| ConversionError::MissingItemMapping(line.source_code.clone()))?;
                let description = if line.description.trim().is_empty() {
                    item_code.to_string()
                } else {
                    line.description.clone()
                };

                Ok(InvoiceItem {
                    item_code: item_code.to_string(),
                    description,
                    qty: Decimal::ONE,
                    uom: mapping.and_then(|m| m.uom.clone()),
                    rate: line.net_amount,
                    income_account: self.connector.default_income_account.clone(),
                })
            })
            .collect::<Result<Vec<_>, ConversionError>>()?;

        // 仅使用报表中的实际增值税; 未配置税科目时不生成税行
        let taxes = match &self.connector.default_tax_account {
            Some(account) if report.has_actual_vat() => report
                .vat_by_rate
                .iter()
                .map(|vat| InvoiceTax {
                    account_head: account.clone(),
                    description: format!("TVA {}%", vat.rate.normalize()),
                    tax_amount: vat.amount.round_dp(2),
                })
                .collect(),
            _ => Vec::new(),
        };

        let payments = report
            .payments
            .iter()
            .map(|payment| {
                let mode = self
                    .connector
                    .mode_of_payment_for_source_code(&payment.source_code)
                    .ok_or_else(|| {
                        ConversionError::MissingPaymentMapping(payment.source_code.clone())
                    })?;
                Ok(InvoicePayment {
                    mode_of_payment: mode.to_string(),
                    amount: payment.amount,
                })
            })
            .collect::<Result<Vec<_>, ConversionError>>()?;

        let draft = SalesInvoiceDraft {
            company: self.connector.company.clone(),
            customer: self.connector.default_customer.clone(),
            currency: self.connector.currency.clone(),
            posting_date,
            reference: report.reference(),
            submit: !self.connector.create_draft_invoices,
            items,
            taxes,
            payments,
        };

        self.validate_against_report(&draft, report)?;
        Ok(draft)
    }

    /// 报表内部税额一致性（报表带实际增值税时跳过）
    fn validate_tax_amounts(&self, report: &PosReport) -> Result<(), ConversionError> {
        if report.has_actual_vat() {
            return Ok(());
        }

        for line in &report.lines {
            if line.tax_rate <= Decimal::ZERO {
                continue;
            }

            let expected = line.net_amount * line.tax_rate / Decimal::ONE_HUNDRED;
            let difference = (expected - line.tax_amount).abs();

            if difference > self.settings.tax_error_threshold {
                return Err(ConversionError::TaxDiscrepancy {
                    description: line.description.clone(),
                    expected: expected.round_dp(2),
                    actual: line.tax_amount.round_dp(2),
                    difference: difference.round_dp(2),
                });
            } else if difference > self.settings.tax_warning_threshold {
                warn!(
                    report_number = %report.report_number,
                    description = %line.description,
                    expected = %expected.round_dp(2),
                    actual = %line.tax_amount,
                    "税额轻微偏差"
                );
            }
        }
        Ok(())
    }

    /// 发票合计与 Z 报表合计核对（净额/税额/总额/收款）
    fn validate_against_report(
        &self,
        draft: &SalesInvoiceDraft,
        report: &PosReport,
    ) -> Result<(), ConversionError> {
        let tolerance = self.settings.amount_tolerance;
        let checks = [
            ("净额", report.total_net(), draft.net_total()),
            ("税额", report.total_tax(), draft.tax_total()),
            ("总额", report.total_gross(), draft.grand_total()),
            ("收款", report.total_payments(), draft.payment_total()),
        ];

        let details: Vec<String> = checks
            .iter()
            .filter_map(|(label, z_value, invoice_value)| {
                let diff = (*z_value - *invoice_value).abs();
                (diff > tolerance).then(|| {
                    format!(
                        "{}: Z报表={}, 发票={}, 差额={}",
                        label,
                        z_value.round_dp(2),
                        invoice_value.round_dp(2),
                        diff.round_dp(2)
                    )
                })
            })
            .collect();

        if details.is_empty() {
            Ok(())
        } else {
            Err(ConversionError::AmountMismatch {
                report_number: report.report_number.clone(),
                details,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::connector::ItemMapping;
    use crate::domain::report::{PosLine, PosPayment, VatAmount};
    use chrono::NaiveDate;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn connector(tax_account: Option<&str>) -> PosConnector {
        let mut c = PosConnector::restomax_defaults("ACME", "Walk-in", "700000", tax_account);
        c.item_mappings.push(ItemMapping {
            source_code: "FOOD".to_string(),
            item_code: "POS-FOOD".to_string(),
            uom: Some("Unit".to_string()),
        });
        c
    }

    fn line(code: &str, net: &str) -> PosLine {
        PosLine {
            source_code: code.to_string(),
            description: code.to_lowercase(),
            net_amount: d(net),
            tax_rate: Decimal::ZERO,
            tax_amount: Decimal::ZERO,
            gross_amount: d(net),
        }
    }

    fn report_with_vat() -> PosReport {
        let mut r = PosReport::new("42", NaiveDate::from_ymd_opt(2024, 3, 1));
        r.lines.push(line("FOOD", "100.00"));
        r.lines.push(line("DRINK", "50.00"));
        r.vat_by_rate.push(VatAmount {
            rate: d("6"),
            amount: d("6.00"),
        });
        r.vat_by_rate.push(VatAmount {
            rate: d("21"),
            amount: d("10.50"),
        });
        r.payments.push(PosPayment {
            source_code: "580000".to_string(),
            source_name: "Cash".to_string(),
            amount: d("100.00"),
        });
        r.payments.push(PosPayment {
            source_code: "580100".to_string(),
            source_name: "Carte bancaire".to_string(),
            amount: d("66.50"),
        });
        r
    }

    #[test]
    fn test_build_maps_items_taxes_and_payments() {
        let c = connector(Some("451000"));
        let settings = ImportSettings::default();
        let draft = InvoiceBuilder::new(&c, &settings)
            .build_from_report(&report_with_vat())
            .unwrap();

        assert_eq!(draft.reference, "Z-42");
        assert!(draft.submit);
        assert_eq!(draft.items[0].item_code, "POS-FOOD");
        assert_eq!(draft.items[0].uom.as_deref(), Some("Unit"));
        assert_eq!(draft.items[1].item_code, "POS-OTHER");
        assert_eq!(draft.taxes.len(), 2);
        assert_eq!(draft.taxes[0].description, "TVA 6%");
        assert_eq!(draft.grand_total(), d("166.50"));
        assert_eq!(draft.payments[1].mode_of_payment, "Bank Draft");
    }

    #[test]
    fn test_draft_connector_does_not_submit() {
        let mut c = connector(Some("451000"));
        c.create_draft_invoices = true;
        let settings = ImportSettings::default();
        let draft = InvoiceBuilder::new(&c, &settings)
            .build_from_report(&report_with_vat())
            .unwrap();
        assert!(!draft.submit);
    }

    #[test]
    fn test_missing_tax_account_fails_total_check() {
        let c = connector(None);
        let settings = ImportSettings::default();
        let err = InvoiceBuilder::new(&c, &settings)
            .build_from_report(&report_with_vat())
            .unwrap_err();

        match err {
            ConversionError::AmountMismatch { details, .. } => {
                assert!(details.iter().any(|d| d.starts_with("税额")));
                assert!(details.iter().any(|d| d.starts_with("总额")));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unmapped_payment_and_item_fail() {
        let mut report = report_with_vat();
        report.payments[0].source_code = "589999".to_string();
        let c = connector(Some("451000"));
        let settings = ImportSettings::default();
        let err = InvoiceBuilder::new(&c, &settings)
            .build_from_report(&report)
            .unwrap_err();
        assert_eq!(err, ConversionError::MissingPaymentMapping("589999".to_string()));

        let mut strict = connector(Some("451000"));
        strict.default_unmapped_item = None;
        let err = InvoiceBuilder::new(&strict, &settings)
            .build_from_report(&report_with_vat())
            .unwrap_err();
        assert_eq!(err, ConversionError::MissingItemMapping("DRINK".to_string()));
    }

    #[test]
    fn test_tax_discrepancy_without_actual_vat() {
        let mut report = PosReport::new("7", NaiveDate::from_ymd_opt(2024, 3, 2));
        let mut l = line("FOOD", "100.00");
        l.tax_rate = d("21");
        l.tax_amount = d("18.00");
        l.gross_amount = d("118.00");
        report.lines.push(l);

        let c = connector(Some("451000"));
        let settings = ImportSettings::default();
        let err = InvoiceBuilder::new(&c, &settings)
            .build_from_report(&report)
            .unwrap_err();
        assert!(matches!(err, ConversionError::TaxDiscrepancy { .. }));
        assert!(err.to_string().contains("差额 3.00"));
    }

    #[test]
    fn test_structural_error_fails_row() {
        let c = connector(Some("451000"));
        let settings = ImportSettings::default();
        let row = ImportRow::pending(0, report_with_vat(), Some("日期无法解析".to_string()));
        let err = InvoiceBuilder::new(&c, &settings).build(&row).unwrap_err();
        assert_eq!(err.to_string(), "行结构无效: 日期无法解析");
    }
}
