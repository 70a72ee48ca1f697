// ==========================================
// POS 导入系统 - 账务网关接口
// ==========================================
// 职责: 定义开票/收款的外部调用接口（不包含实现）
// 实现者: repository::ledger_repo::SqliteLedger（本地账簿）
// ==========================================

use crate::domain::invoice::{PaymentRequest, SalesInvoiceDraft};
use crate::repository::error::RepositoryError;
use async_trait::async_trait;
use thiserror::Error;

/// 网关错误
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("账务系统拒绝: {0}")]
    Rejected(String),

    #[error("单据不存在: {0}")]
    NotFound(String),

    #[error("账务系统不可用: {0}")]
    Unavailable(String),

    #[error("账簿存储错误: {0}")]
    Storage(#[from] RepositoryError),
}

// ==========================================
// InvoiceGateway Trait
// ==========================================
#[async_trait]
pub trait InvoiceGateway: Send + Sync {
    /// 创建销售发票,返回发票号
    ///
    /// 约定: 同一公司下相同 reference 的未作废发票已存在时,返回既有发票号而不新建
    async fn create_invoice(&self, draft: &SalesInvoiceDraft) -> Result<String, GatewayError>;

    /// 作废发票（已作废视为成功）
    async fn cancel_invoice(&self, invoice_id: &str) -> Result<(), GatewayError>;
}

// ==========================================
// PaymentGateway Trait
// ==========================================
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// 针对发票创建收款单,返回收款单号
    async fn create_payment_entry(&self, request: &PaymentRequest) -> Result<String, GatewayError>;
}
