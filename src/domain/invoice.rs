// ==========================================
// POS 导入系统 - 目标单据草稿
// ==========================================
// 发票/收款单据本身由外部单据库维护
// 导入管道只构造草稿并按标识引用
// ==========================================

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceItem {
    pub item_code: String,
    pub description: String,
    pub qty: Decimal,
    pub uom: Option<String>,
    pub rate: Decimal,
    pub income_account: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceTax {
    pub account_head: String,
    pub description: String,
    pub tax_amount: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub mode_of_payment: String,
    pub amount: Decimal,
}

// ==========================================
// SalesInvoiceDraft - 销售发票草稿
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesInvoiceDraft {
    pub company: String,
    pub customer: String,
    pub currency: String,
    pub posting_date: NaiveDate,
    /// 外部参考号（Z-<报表号>）,同公司内唯一
    pub reference: String,
    /// false 时以草稿形式保存
    pub submit: bool,
    pub items: Vec<InvoiceItem>,
    pub taxes: Vec<InvoiceTax>,
    pub payments: Vec<InvoicePayment>,
}

impl SalesInvoiceDraft {
    pub fn net_total(&self) -> Decimal {
        self.items.iter().map(|i| i.rate * i.qty).sum()
    }

    pub fn tax_total(&self) -> Decimal {
        self.taxes.iter().map(|t| t.tax_amount).sum()
    }

    pub fn grand_total(&self) -> Decimal {
        self.net_total() + self.tax_total()
    }

    pub fn payment_total(&self) -> Decimal {
        self.payments.iter().map(|p| p.amount).sum()
    }
}

/// 收款单据请求
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub invoice_id: String,
    pub company: String,
    pub party: String,
    pub posting_date: Option<NaiveDate>,
    pub amount: Decimal,
}
