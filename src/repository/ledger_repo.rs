// ==========================================
// POS 导入系统 - 本地账簿（发票/收款）
// ==========================================
// 职责: InvoiceGateway / PaymentGateway 的 SQLite 实现
// 表: sales_invoice / payment_entry
// 幂等: 同公司 + 同 reference 的未作废发票只保留一张
// 幂等: 每张发票最多一张收款单
// docstatus: 0=草稿, 1=已提交, 2=已作废
// ==========================================

use crate::domain::invoice::{PaymentRequest, SalesInvoiceDraft};
use crate::engine::gateway::{GatewayError, InvoiceGateway, PaymentGateway};
use crate::repository::error::{RepositoryError, RepositoryResult};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

const DOCSTATUS_DRAFT: i64 = 0;
const DOCSTATUS_SUBMITTED: i64 = 1;
const DOCSTATUS_CANCELLED: i64 = 2;

/// 账簿中的发票摘要
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerInvoice {
    pub invoice_id: String,
    pub company: String,
    pub reference: String,
    pub grand_total: String,
    pub docstatus: i64,
}

// ==========================================
// SqliteLedger
// ==========================================
pub struct SqliteLedger {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteLedger {
    /// 创建新的账簿实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建账簿实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    fn new_document_id(prefix: &str) -> String {
        let id = Uuid::new_v4().simple().to_string();
        format!("{}-{}", prefix, &id[..12].to_uppercase())
    }

    /// 按公司 + reference 查找未作废发票
    pub fn find_active_by_reference(
        &self,
        company: &str,
        reference: &str,
    ) -> RepositoryResult<Option<LedgerInvoice>> {
        let conn = self.get_conn()?;
        Self::find_active_with(&conn, company, reference)
    }

    fn find_active_with(
        conn: &Connection,
        company: &str,
        reference: &str,
    ) -> RepositoryResult<Option<LedgerInvoice>> {
        let invoice = conn
            .query_row(
                r#"
                SELECT invoice_id, company, reference, grand_total, docstatus
                FROM sales_invoice
                WHERE company = ?1 AND reference = ?2 AND docstatus != ?3
                "#,
                params![company, reference, DOCSTATUS_CANCELLED],
                |row| {
                    Ok(LedgerInvoice {
                        invoice_id: row.get(0)?,
                        company: row.get(1)?,
                        reference: row.get(2)?,
                        grand_total: row.get(3)?,
                        docstatus: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(invoice)
    }

    pub fn get_invoice(&self, invoice_id: &str) -> RepositoryResult<Option<LedgerInvoice>> {
        let conn = self.get_conn()?;
        let invoice = conn
            .query_row(
                r#"
                SELECT invoice_id, company, reference, grand_total, docstatus
                FROM sales_invoice
                WHERE invoice_id = ?1
                "#,
                params![invoice_id],
                |row| {
                    Ok(LedgerInvoice {
                        invoice_id: row.get(0)?,
                        company: row.get(1)?,
                        reference: row.get(2)?,
                        grand_total: row.get(3)?,
                        docstatus: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(invoice)
    }

    pub fn count_invoices(&self, company: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sales_invoice WHERE company = ?1 AND docstatus != ?2",
            params![company, DOCSTATUS_CANCELLED],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn count_payments(&self, invoice_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM payment_entry WHERE invoice_id = ?1",
            params![invoice_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    // 引用该发票的导入作业（任意一个）
    fn referencing_job(conn: &Connection, invoice_id: &str) -> RepositoryResult<Option<String>> {
        let job_id = conn
            .query_row(
                "SELECT job_id FROM pos_import_row WHERE target_invoice_id = ?1 LIMIT 1",
                params![invoice_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(job_id)
    }

    /// 创建发票（同步部分）
    ///
    /// - 已提交的同参考号发票: 直接返回其编号
    /// - 同参考号草稿且已被导入行引用: 直接返回其编号
    /// - 同参考号草稿且无引用: 删除后重建
    fn insert_invoice(&self, draft: &SalesInvoiceDraft) -> Result<String, GatewayError> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        if let Some(existing) = Self::find_active_with(&tx, &draft.company, &draft.reference)? {
            if existing.docstatus == DOCSTATUS_SUBMITTED {
                warn!(
                    invoice_id = %existing.invoice_id,
                    reference = %draft.reference,
                    "发票已存在,复用既有发票"
                );
                return Ok(existing.invoice_id);
            }
            if let Some(job_id) = Self::referencing_job(&tx, &existing.invoice_id)? {
                warn!(
                    invoice_id = %existing.invoice_id,
                    reference = %draft.reference,
                    job_id = %job_id,
                    "草稿发票已被导入行引用,复用既有发票"
                );
                return Ok(existing.invoice_id);
            }
            tx.execute(
                "DELETE FROM sales_invoice WHERE invoice_id = ?1",
                params![existing.invoice_id],
            )
            .map_err(RepositoryError::from)?;
            warn!(
                invoice_id = %existing.invoice_id,
                reference = %draft.reference,
                "删除同参考号的草稿发票后重建"
            );
        }

        let invoice_id = Self::new_document_id("SINV");
        let docstatus = if draft.submit {
            DOCSTATUS_SUBMITTED
        } else {
            DOCSTATUS_DRAFT
        };
        let body_json = serde_json::to_string(draft).map_err(RepositoryError::from)?;

        tx.execute(
            r#"
            INSERT INTO sales_invoice (
                invoice_id, company, customer, currency, reference, posting_date,
                net_total, tax_total, grand_total, docstatus, body_json, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                invoice_id,
                draft.company,
                draft.customer,
                draft.currency,
                draft.reference,
                draft.posting_date.to_string(),
                draft.net_total().round_dp(2).to_string(),
                draft.tax_total().round_dp(2).to_string(),
                draft.grand_total().round_dp(2).to_string(),
                docstatus,
                body_json,
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(RepositoryError::from)?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        info!(invoice_id = %invoice_id, reference = %draft.reference, docstatus, "发票已创建");
        Ok(invoice_id)
    }

    fn mark_cancelled(&self, invoice_id: &str) -> Result<(), GatewayError> {
        let conn = self.get_conn()?;
        let docstatus: Option<i64> = conn
            .query_row(
                "SELECT docstatus FROM sales_invoice WHERE invoice_id = ?1",
                params![invoice_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(RepositoryError::from)?;

        match docstatus {
            None => Err(GatewayError::NotFound(invoice_id.to_string())),
            Some(DOCSTATUS_CANCELLED) => Ok(()),
            Some(_) => {
                conn.execute(
                    "UPDATE sales_invoice SET docstatus = ?2 WHERE invoice_id = ?1",
                    params![invoice_id, DOCSTATUS_CANCELLED],
                )
                .map_err(RepositoryError::from)?;
                info!(invoice_id = %invoice_id, "发票已作废");
                Ok(())
            }
        }
    }

    fn insert_payment(&self, request: &PaymentRequest) -> Result<String, GatewayError> {
        let conn = self.get_conn()?;
        let docstatus: Option<i64> = conn
            .query_row(
                "SELECT docstatus FROM sales_invoice WHERE invoice_id = ?1",
                params![request.invoice_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(RepositoryError::from)?;

        match docstatus {
            None => return Err(GatewayError::NotFound(request.invoice_id.clone())),
            Some(DOCSTATUS_CANCELLED) => {
                return Err(GatewayError::Rejected(format!(
                    "发票 {} 已作废,不能收款",
                    request.invoice_id
                )))
            }
            Some(_) => {}
        }

        let existing: Option<String> = conn
            .query_row(
                "SELECT payment_id FROM payment_entry WHERE invoice_id = ?1",
                params![request.invoice_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(RepositoryError::from)?;
        if let Some(payment_id) = existing {
            warn!(payment_id = %payment_id, invoice_id = %request.invoice_id, "收款单已存在,复用既有收款单");
            return Ok(payment_id);
        }

        let payment_id = Self::new_document_id("PE");
        conn.execute(
            r#"
            INSERT INTO payment_entry (
                payment_id, invoice_id, company, party, posting_date, amount, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                payment_id,
                request.invoice_id,
                request.company,
                request.party,
                request.posting_date.map(|d| d.to_string()),
                request.amount.round_dp(2).to_string(),
                Utc::now().to_rfc3339(),
            ],
        )
        .map_err(RepositoryError::from)?;

        info!(payment_id = %payment_id, invoice_id = %request.invoice_id, "收款单已创建");
        Ok(payment_id)
    }
}

#[async_trait]
impl InvoiceGateway for SqliteLedger {
    async fn create_invoice(&self, draft: &SalesInvoiceDraft) -> Result<String, GatewayError> {
        self.insert_invoice(draft)
    }

    async fn cancel_invoice(&self, invoice_id: &str) -> Result<(), GatewayError> {
        self.mark_cancelled(invoice_id)
    }
}

#[async_trait]
impl PaymentGateway for SqliteLedger {
    async fn create_payment_entry(&self, request: &PaymentRequest) -> Result<String, GatewayError> {
        self.insert_payment(request)
    }
}
