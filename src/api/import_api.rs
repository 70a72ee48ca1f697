// ==========================================
// POS 导入系统 - 导入作业 API
// ==========================================
// 职责: 封装作业创建/预览/提交/重处理/收款/取消/查询
// 约定: 每个方法在工作完成后返回
// ==========================================

use crate::api::error::{ApiError, ApiResult};
use crate::config::ConfigManager;
use crate::domain::job::{ImportJob, JobResult, PaymentResult};
use crate::domain::preview::PreviewSummary;
use crate::domain::types::{JobPhase, JobStage, RowStatus};
use crate::engine::gateway::{InvoiceGateway, PaymentGateway};
use crate::engine::{ImportEngine, JobLockRegistry, PaymentEntryGenerator, RecoveryCoordinator};
use crate::perf::PerfGuard;
use crate::repository::{ImportJobRepository, PosConnectorRepository, SqliteLedger};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

// ==========================================
// 响应类型
// ==========================================

/// 预览响应（reload 提示调用方刷新作业视图）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewImportResponse {
    pub reload: bool,
    pub summary: PreviewSummary,
    pub rendered: String,
}

/// 当前可执行的操作
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobActions {
    pub can_preview: bool,
    pub can_submit: bool,
    pub can_reprocess: bool,
    pub can_create_payments: bool,
    pub can_cancel: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowView {
    pub index: usize,
    pub report_number: String,
    pub report_date: Option<NaiveDate>,
    pub total_amount: Decimal,
    pub status: RowStatus,
    pub target_invoice_id: Option<String>,
    pub error_detail: Option<String>,
}

/// 作业视图
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobView {
    pub job_id: String,
    pub connector_id: String,
    pub source_file: Option<String>,
    pub stage: JobStage,
    pub phase: JobPhase,
    pub indicator_color: String,
    pub indicator_label: String,
    pub create_draft_invoices: bool,
    pub total_rows: usize,
    pub pending_rows: usize,
    pub succeeded_rows: usize,
    pub failed_rows: usize,
    pub preview_rendered: Option<String>,
    pub import_log: String,
    pub rows: Vec<RowView>,
    pub actions: JobActions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobView {
    pub fn from_job(job: &ImportJob, currency: &str) -> Self {
        let phase = job.phase();
        let (color, label) = phase.indicator();

        Self {
            job_id: job.job_id.clone(),
            connector_id: job.connector_id.clone(),
            source_file: job.source_file.clone(),
            stage: job.stage,
            phase,
            indicator_color: color.to_string(),
            indicator_label: label.to_string(),
            create_draft_invoices: job.create_draft_invoices,
            total_rows: job.rows.len(),
            pending_rows: job.count_status(RowStatus::Pending),
            succeeded_rows: job.count_status(RowStatus::Succeeded),
            failed_rows: job.count_status(RowStatus::Failed),
            preview_rendered: job.preview_summary.as_ref().map(|s| s.render_text(currency)),
            import_log: job.import_log.clone(),
            rows: job
                .rows
                .iter()
                .map(|r| RowView {
                    index: r.index,
                    report_number: r.raw_data.report_number.clone(),
                    report_date: r.raw_data.report_date,
                    total_amount: r.raw_data.total_gross(),
                    status: r.status,
                    target_invoice_id: r.target_invoice_id.clone(),
                    error_detail: r.error_detail.clone(),
                })
                .collect(),
            actions: available_actions(job),
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

/// 依据阶段计算可执行操作
///
/// - 预览/提交: 提交前且已挂文件
/// - 重处理: 仅部分失败
/// - 生成收款: 已处理完毕且为草稿发票模式
/// - 取消: 未取消
pub fn available_actions(job: &ImportJob) -> JobActions {
    let phase = job.phase();
    let pre_submit = job.stage.is_pre_submit() && job.has_file();

    JobActions {
        can_preview: pre_submit,
        can_submit: pre_submit,
        can_reprocess: phase == JobPhase::PartiallyFailed,
        can_create_payments: phase.is_settled() && job.create_draft_invoices,
        can_cancel: phase != JobPhase::Cancelled,
    }
}

// ==========================================
// ImportApi
// ==========================================
pub struct ImportApi {
    job_repo: Arc<ImportJobRepository>,
    connector_repo: Arc<PosConnectorRepository>,
    engine: Arc<ImportEngine>,
    recovery: RecoveryCoordinator,
    payments: PaymentEntryGenerator,
}

impl ImportApi {
    pub fn new(
        job_repo: Arc<ImportJobRepository>,
        connector_repo: Arc<PosConnectorRepository>,
        engine: Arc<ImportEngine>,
        payments: PaymentEntryGenerator,
    ) -> Self {
        Self {
            job_repo,
            connector_repo,
            recovery: RecoveryCoordinator::new(Arc::clone(&engine)),
            engine,
            payments,
        }
    }

    /// 打开数据库并以本地账簿装配（建表幂等）
    pub fn open(db_path: &str) -> ApiResult<Self> {
        let mut conn = crate::db::open_sqlite_connection(db_path)
            .map_err(|e| ApiError::DatabaseConnectionError(e.to_string()))?;
        crate::db::init_schema(&conn).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        crate::perf::install_sqlite_tracing(&mut conn);

        let conn = Arc::new(Mutex::new(conn));
        let ledger = Arc::new(SqliteLedger::from_connection(Arc::clone(&conn)));
        Self::with_gateways(conn, ledger.clone(), ledger)
    }

    /// 以指定账务网关装配（共享同一连接）
    pub fn with_gateways(
        conn: Arc<Mutex<Connection>>,
        invoices: Arc<dyn InvoiceGateway>,
        payments: Arc<dyn PaymentGateway>,
    ) -> ApiResult<Self> {
        let job_repo = Arc::new(ImportJobRepository::from_connection(Arc::clone(&conn)));
        let connector_repo = Arc::new(PosConnectorRepository::from_connection(Arc::clone(&conn)));
        let config = Arc::new(
            ConfigManager::from_connection(conn)
                .map_err(|e| ApiError::InternalError(format!("配置初始化失败: {}", e)))?,
        );
        let locks = JobLockRegistry::new(Arc::clone(&job_repo));

        let engine = Arc::new(ImportEngine::new(
            Arc::clone(&job_repo),
            Arc::clone(&connector_repo),
            config,
            invoices,
            locks.clone(),
        ));
        let payment_generator = PaymentEntryGenerator::new(
            Arc::clone(&job_repo),
            Arc::clone(&connector_repo),
            payments,
            locks,
        );

        Ok(Self::new(job_repo, connector_repo, engine, payment_generator))
    }

    pub fn connectors(&self) -> &PosConnectorRepository {
        &self.connector_repo
    }

    fn load_job(&self, job_id: &str) -> ApiResult<ImportJob> {
        self.job_repo
            .load_job(job_id)?
            .ok_or_else(|| ApiError::NotFound(format!("导入作业(id={})不存在", job_id)))
    }

    fn currency_for(&self, job: &ImportJob) -> ApiResult<String> {
        Ok(self
            .connector_repo
            .find_by_id(&job.connector_id)?
            .map(|c| c.currency)
            .unwrap_or_default())
    }

    fn view(&self, job: &ImportJob) -> ApiResult<JobView> {
        Ok(JobView::from_job(job, &self.currency_for(job)?))
    }

    // ==========================================
    // 操作
    // ==========================================

    /// 创建导入作业（阶段 Draft）
    pub async fn create_job(
        &self,
        connector_id: &str,
        source_file: Option<&str>,
    ) -> ApiResult<JobView> {
        let _perf = PerfGuard::new("api.create_job");

        let connector = self
            .connector_repo
            .find_by_id(connector_id)?
            .ok_or_else(|| ApiError::NotFound(format!("连接器(id={})不存在", connector_id)))?;
        if !connector.enabled {
            return Err(ApiError::BusinessRuleViolation(format!(
                "连接器 {} 已停用",
                connector_id
            )));
        }
        if let Some(file) = source_file {
            if file.trim().is_empty() {
                return Err(ApiError::InvalidInput("文件路径不能为空".to_string()));
            }
        }

        let now = Utc::now();
        let job = ImportJob {
            job_id: Uuid::new_v4().to_string(),
            connector_id: connector.connector_id.clone(),
            source_file: source_file.map(str::to_string),
            stage: JobStage::Draft,
            create_draft_invoices: connector.create_draft_invoices,
            preview_summary: None,
            import_log: String::new(),
            rows: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        self.job_repo.create_job(&job)?;

        info!(job_id = %job.job_id, connector_id = %connector_id, "导入作业已创建");
        Ok(JobView::from_job(&job, &connector.currency))
    }

    /// 解析并预览
    pub async fn preview_import(&self, job_id: &str) -> ApiResult<PreviewImportResponse> {
        let _perf = PerfGuard::for_job("api.preview_import", job_id);

        let summary = self.engine.preview(job_id).await?;
        let job = self.load_job(job_id)?;
        let rendered = summary.render_text(&self.currency_for(&job)?);

        Ok(PreviewImportResponse {
            reload: true,
            summary,
            rendered,
        })
    }

    /// 提交并执行首轮开票
    pub async fn submit(&self, job_id: &str) -> ApiResult<JobResult> {
        let _perf = PerfGuard::for_job("api.submit", job_id);
        Ok(self.engine.submit(job_id).await?)
    }

    /// 重处理失败行
    pub async fn reprocess_failed(&self, job_id: &str) -> ApiResult<JobResult> {
        let _perf = PerfGuard::for_job("api.reprocess_failed", job_id);
        Ok(self.recovery.reprocess_failed(job_id).await?)
    }

    /// 为成功行生成收款单
    pub async fn create_pending_payment_entries(&self, job_id: &str) -> ApiResult<PaymentResult> {
        let _perf = PerfGuard::for_job("api.create_pending_payment_entries", job_id);
        Ok(self.payments.create_pending_payment_entries(job_id).await?)
    }

    /// 取消作业
    pub async fn cancel(&self, job_id: &str) -> ApiResult<JobView> {
        let _perf = PerfGuard::for_job("api.cancel", job_id);
        let job = self.engine.cancel(job_id).await?;
        self.view(&job)
    }

    /// 查询作业视图
    pub async fn get_job(&self, job_id: &str) -> ApiResult<JobView> {
        let job = self.load_job(job_id)?;
        self.view(&job)
    }

    /// 列出作业: (job_id, stage, source_file)
    pub async fn list_jobs(&self) -> ApiResult<Vec<(String, JobStage, Option<String>)>> {
        Ok(self.job_repo.list_jobs()?)
    }

    /// 查询作业可执行操作
    pub async fn available_actions(&self, job_id: &str) -> ApiResult<JobActions> {
        let job = self.load_job(job_id)?;
        Ok(available_actions(&job))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::ImportRow;
    use crate::domain::report::PosReport;

    fn job(stage: JobStage, statuses: &[RowStatus], drafts: bool) -> ImportJob {
        let now = Utc::now();
        ImportJob {
            job_id: "J1".to_string(),
            connector_id: "C1".to_string(),
            source_file: Some("/tmp/z.csv".to_string()),
            stage,
            create_draft_invoices: drafts,
            preview_summary: None,
            import_log: String::new(),
            rows: statuses
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let mut r = ImportRow::pending(i, PosReport::new(i.to_string(), None), None);
                    r.status = *s;
                    if *s == RowStatus::Succeeded {
                        r.target_invoice_id = Some(format!("INV-{}", i));
                    }
                    r
                })
                .collect(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_actions_before_submit() {
        let mut draft = job(JobStage::Draft, &[], true);
        let actions = available_actions(&draft);
        assert!(actions.can_preview && actions.can_submit && actions.can_cancel);
        assert!(!actions.can_reprocess && !actions.can_create_payments);

        draft.source_file = None;
        let actions = available_actions(&draft);
        assert!(!actions.can_preview && !actions.can_submit);
    }

    #[test]
    fn test_actions_after_submit() {
        let partial = job(
            JobStage::Submitted,
            &[RowStatus::Succeeded, RowStatus::Failed],
            true,
        );
        let actions = available_actions(&partial);
        assert!(!actions.can_preview && !actions.can_submit);
        assert!(actions.can_reprocess && actions.can_create_payments);

        let completed = job(JobStage::Submitted, &[RowStatus::Succeeded], false);
        let actions = available_actions(&completed);
        assert!(!actions.can_reprocess);
        assert!(!actions.can_create_payments);

        let cancelled = job(JobStage::Cancelled, &[RowStatus::Succeeded], true);
        let actions = available_actions(&cancelled);
        assert!(!actions.can_cancel && !actions.can_create_payments);
    }

    #[test]
    fn test_view_counts_and_indicator() {
        let j = job(
            JobStage::Submitted,
            &[RowStatus::Succeeded, RowStatus::Failed, RowStatus::Failed],
            false,
        );
        let view = JobView::from_job(&j, "EUR");
        assert_eq!(view.phase, JobPhase::PartiallyFailed);
        assert_eq!(view.indicator_label, "Partial Success");
        assert_eq!((view.succeeded_rows, view.failed_rows), (1, 2));
    }
}
