// ==========================================
// POS 导入系统 - 收款单生成
// ==========================================
// 职责: 为草稿发票模式的成功行补建收款单
// 幂等: 以 pos_payment_link(invoice_id 唯一) 判定是否已生成
// 红线: 单行失败只记录,不中断
// ==========================================

use crate::domain::invoice::PaymentRequest;
use crate::domain::job::{PaymentFailure, PaymentLink, PaymentResult};
use crate::domain::types::RowStatus;
use crate::engine::error::{PipelineError, PipelineResult};
use crate::engine::gateway::PaymentGateway;
use crate::engine::job_lock::JobLockRegistry;
use crate::repository::connector_repo::PosConnectorRepository;
use crate::repository::import_job_repo::ImportJobRepository;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

pub struct PaymentEntryGenerator {
    job_repo: Arc<ImportJobRepository>,
    connector_repo: Arc<PosConnectorRepository>,
    payments: Arc<dyn PaymentGateway>,
    locks: JobLockRegistry,
}

impl PaymentEntryGenerator {
    pub fn new(
        job_repo: Arc<ImportJobRepository>,
        connector_repo: Arc<PosConnectorRepository>,
        payments: Arc<dyn PaymentGateway>,
        locks: JobLockRegistry,
    ) -> Self {
        Self {
            job_repo,
            connector_repo,
            payments,
            locks,
        }
    }

    /// 为尚无收款关联的成功行生成收款单
    ///
    /// 前置条件（不满足时返回带 no_op_reason 的空结果）:
    /// - 作业启用草稿发票模式
    /// - 阶段为 Completed / PartiallyFailed
    /// - 至少一行成功
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn create_pending_payment_entries(&self, job_id: &str) -> PipelineResult<PaymentResult> {
        let _guard = self.locks.acquire(job_id)?;
        let job = self
            .job_repo
            .load_job(job_id)?
            .ok_or_else(|| PipelineError::fatal(job_id, "作业不存在"))?;

        if !job.create_draft_invoices {
            return Ok(PaymentResult::no_op("作业未启用草稿发票模式"));
        }
        let phase = job.phase();
        if !phase.is_settled() {
            return Ok(PaymentResult::no_op(format!(
                "作业阶段 {} 不允许生成收款单",
                phase
            )));
        }
        if job.count_status(RowStatus::Succeeded) == 0 {
            return Ok(PaymentResult::no_op("作业没有成功行"));
        }

        let connector = self
            .connector_repo
            .find_by_id(&job.connector_id)?
            .ok_or_else(|| {
                PipelineError::fatal(job_id, format!("连接器不存在: {}", job.connector_id))
            })?;

        let mut result = PaymentResult::default();
        let succeeded = job.rows.iter().filter_map(|r| match (&r.status, &r.target_invoice_id) {
            (RowStatus::Succeeded, Some(invoice_id)) => Some((r, invoice_id)),
            _ => None,
        });

        for (row, invoice_id) in succeeded {
            if self.job_repo.find_payment_link(invoice_id)?.is_some() {
                debug!(job_id = %job_id, index = row.index, invoice_id = %invoice_id, "收款已存在,跳过");
                result.already_linked += 1;
                continue;
            }

            let request = PaymentRequest {
                invoice_id: invoice_id.clone(),
                company: connector.company.clone(),
                party: connector.default_customer.clone(),
                posting_date: row.raw_data.report_date,
                amount: row.raw_data.total_gross(),
            };

            let outcome = match self.payments.create_payment_entry(&request).await {
                Ok(payment_id) => {
                    let link = PaymentLink {
                        invoice_id: invoice_id.clone(),
                        payment_id,
                        job_id: job_id.to_string(),
                        row_index: row.index,
                        created_at: Utc::now(),
                    };
                    self.job_repo
                        .insert_payment_link(&link)
                        .map(|_| link)
                        .map_err(|e| e.to_string())
                }
                Err(e) => Err(e.to_string()),
            };

            match outcome {
                Ok(link) => result.created.push(link),
                Err(error) => {
                    warn!(job_id = %job_id, index = row.index, invoice_id = %invoice_id, error = %error, "收款单生成失败");
                    result.failures.push(PaymentFailure {
                        index: row.index,
                        invoice_id: invoice_id.clone(),
                        error,
                    });
                }
            }
        }

        info!(
            job_id = %job_id,
            created = result.created.len(),
            already_linked = result.already_linked,
            failures = result.failures.len(),
            "收款单生成结束"
        );
        Ok(result)
    }
}
