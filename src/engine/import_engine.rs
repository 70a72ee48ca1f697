// ==========================================
// POS 导入系统 - 导入引擎
// ==========================================
// 职责: 作业状态机 —— 预览 / 提交 / 逐行开票 / 取消
// 流程: 解析 → 预览(替换行集合) → 提交(冻结行集合) → 逐行开票
// 红线: 单行失败不中断批次; 每行终结为一次原子更新
// 红线: 已持有发票引用的行永不重复开票
// ==========================================

use crate::config::{ImportConfigReader, ImportSettings};
use crate::domain::connector::PosConnector;
use crate::domain::job::{FailedRow, ImportJob, ImportRow, JobResult};
use crate::domain::preview::PreviewSummary;
use crate::domain::report::ParsedFile;
use crate::domain::types::{ImportScope, JobPhase, JobStage};
use crate::engine::error::{PipelineError, PipelineResult};
use crate::engine::gateway::InvoiceGateway;
use crate::engine::invoice_builder::{ConversionError, InvoiceBuilder};
use crate::engine::job_lock::{JobLockGuard, JobLockRegistry};
use crate::importer::{build_preview, parser_for};
use crate::repository::connector_repo::PosConnectorRepository;
use crate::repository::error::RepositoryError;
use crate::repository::import_job_repo::ImportJobRepository;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// ImportEngine - 导入引擎
// ==========================================
/// 导入引擎
///
/// # 职责
/// 1. 预览: 解析文件,生成摘要,原子替换行集合
/// 2. 提交: 冻结行集合并执行首轮开票
/// 3. 按范围逐行开票（首轮 / 失败重处理）
/// 4. 取消: 作废已关联发票
///
/// # 并发
/// - 所有公开操作先占用作业锁,同一作业的并发调用立即返回 Concurrency
pub struct ImportEngine {
    job_repo: Arc<ImportJobRepository>,
    connector_repo: Arc<PosConnectorRepository>,
    config: Arc<dyn ImportConfigReader>,
    invoices: Arc<dyn InvoiceGateway>,
    locks: JobLockRegistry,
}

impl ImportEngine {
    pub fn new(
        job_repo: Arc<ImportJobRepository>,
        connector_repo: Arc<PosConnectorRepository>,
        config: Arc<dyn ImportConfigReader>,
        invoices: Arc<dyn InvoiceGateway>,
        locks: JobLockRegistry,
    ) -> Self {
        Self {
            job_repo,
            connector_repo,
            config,
            invoices,
            locks,
        }
    }

    pub fn locks(&self) -> &JobLockRegistry {
        &self.locks
    }

    // ==========================================
    // 公共加载
    // ==========================================

    pub(crate) fn load_job(&self, job_id: &str) -> PipelineResult<ImportJob> {
        self.job_repo
            .load_job(job_id)?
            .ok_or_else(|| PipelineError::fatal(job_id, "作业不存在"))
    }

    pub(crate) fn load_connector(&self, job: &ImportJob) -> PipelineResult<PosConnector> {
        self.connector_repo
            .find_by_id(&job.connector_id)?
            .ok_or_else(|| {
                PipelineError::fatal(
                    &job.job_id,
                    format!("连接器不存在: {}", job.connector_id),
                )
            })
    }

    pub(crate) async fn settings(&self) -> PipelineResult<ImportSettings> {
        ImportSettings::load(self.config.as_ref())
            .await
            .map_err(|e| PipelineError::Config(e.to_string()))
    }

    // 作业在处理中被删除时,仓储返回 NotFound
    fn vanished(job_id: &str, err: RepositoryError) -> PipelineError {
        match err {
            RepositoryError::NotFound { .. } => {
                PipelineError::fatal(job_id, "作业在处理过程中被删除")
            }
            other => PipelineError::Repository(other),
        }
    }

    // ==========================================
    // 预览
    // ==========================================

    /// 解析文件并生成预览（Draft / Previewed 阶段可重复执行）
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn preview(&self, job_id: &str) -> PipelineResult<PreviewSummary> {
        let _guard = self.locks.acquire(job_id)?;
        self.preview_locked(job_id).await
    }

    async fn preview_locked(&self, job_id: &str) -> PipelineResult<PreviewSummary> {
        let job = self.load_job(job_id)?;
        if !job.stage.is_pre_submit() || !job.has_file() {
            return Err(PipelineError::invalid_state(job_id, job.phase(), "preview"));
        }

        let connector = self.load_connector(&job)?;
        let settings = self.settings().await?;
        let parsed = self.parse_source(&job, &connector).await?;

        let structural: Vec<Option<String>> = (0..parsed.rows.len())
            .map(|i| parsed.structural_error_for(i))
            .collect();
        let summary = build_preview(&parsed, settings.preview_sample_size);

        let rows: Vec<ImportRow> = parsed
            .rows
            .into_iter()
            .zip(structural)
            .enumerate()
            .map(|(index, (report, err))| ImportRow::pending(index, report, err))
            .collect();

        self.job_repo
            .replace_rows_and_preview(job_id, &rows, &summary)
            .map_err(|e| Self::vanished(job_id, e))?;

        info!(
            job_id = %job_id,
            total_rows = summary.total_rows,
            invalid_rows = summary.invalid_rows,
            "预览完成"
        );
        Ok(summary)
    }

    async fn parse_source(
        &self,
        job: &ImportJob,
        connector: &PosConnector,
    ) -> PipelineResult<ParsedFile> {
        let path = PathBuf::from(job.source_file.clone().unwrap_or_default());
        let parser = parser_for(connector.parser_kind);

        // 文件读取与解析为阻塞操作
        let parsed = tokio::task::spawn_blocking(move || parser.parse(&path))
            .await
            .map_err(|e| PipelineError::fatal(&job.job_id, format!("解析任务异常终止: {}", e)))?;

        parsed.map_err(|e| {
            warn!(job_id = %job.job_id, error = %e, "文件解析失败");
            PipelineError::Format(e)
        })
    }

    // ==========================================
    // 提交
    // ==========================================

    /// 提交作业并执行首轮开票
    ///
    /// - Draft: 先解析预览,再提交
    /// - Previewed: 直接提交
    /// - Processing: 续跑剩余待处理行
    /// - Completed / PartiallyFailed: 空操作
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn submit(&self, job_id: &str) -> PipelineResult<JobResult> {
        let guard = self.locks.acquire(job_id)?;
        let job = self.load_job(job_id)?;

        match job.phase() {
            JobPhase::Draft | JobPhase::Previewed => {
                if !job.has_file() {
                    return Err(PipelineError::invalid_state(job_id, job.phase(), "submit"));
                }
                if job.stage == JobStage::Draft {
                    self.preview_locked(job_id).await?;
                }
                self.job_repo
                    .mark_submitted(job_id)
                    .map_err(|e| Self::vanished(job_id, e))?;
                info!(job_id = %job_id, "作业已提交");
                self.run_import_locked(&guard, ImportScope::AllPending).await
            }
            JobPhase::Processing => {
                warn!(job_id = %job_id, "作业存在未处理行,继续执行");
                self.run_import_locked(&guard, ImportScope::AllPending).await
            }
            phase @ (JobPhase::Completed | JobPhase::PartiallyFailed) => {
                info!(job_id = %job_id, phase = %phase, "作业已处理,提交为空操作");
                Ok(JobResult::empty(phase))
            }
            JobPhase::Cancelled => Err(PipelineError::invalid_state(
                job_id,
                JobPhase::Cancelled,
                "submit",
            )),
        }
    }

    // ==========================================
    // 逐行开票
    // ==========================================

    /// 按范围执行一轮开票
    #[instrument(skip(self), fields(job_id = %job_id, scope = %scope))]
    pub async fn run_import(&self, job_id: &str, scope: ImportScope) -> PipelineResult<JobResult> {
        let guard = self.locks.acquire(job_id)?;
        self.run_import_locked(&guard, scope).await
    }

    /// 已持有作业锁时执行一轮开票
    pub(crate) async fn run_import_locked(
        &self,
        guard: &JobLockGuard,
        scope: ImportScope,
    ) -> PipelineResult<JobResult> {
        let job_id = guard.job_id();
        let job = self.load_job(job_id)?;
        if job.stage != JobStage::Submitted {
            return Err(PipelineError::invalid_state(job_id, job.phase(), "run_import"));
        }

        let connector = self.load_connector(&job)?;
        let settings = self.settings().await?;
        let builder = InvoiceBuilder::new(&connector, &settings);

        let mut result = JobResult::empty(job.phase());
        let mut log_lines = Vec::new();

        // 行已按行号升序
        for row in job.rows.iter().filter(|r| scope.selects(r.status)) {
            let number = &row.raw_data.report_number;

            if let Some(invoice_id) = &row.target_invoice_id {
                warn!(job_id = %job_id, index = row.index, invoice_id = %invoice_id, "行已关联发票,跳过");
                result.skipped += 1;
                continue;
            }

            result.attempted += 1;
            let outcome = match builder.build(row) {
                Ok(draft) => self
                    .invoices
                    .create_invoice(&draft)
                    .await
                    .map_err(|e| ConversionError::Gateway(e.to_string())),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(invoice_id) => {
                    if !self.job_repo.mark_row_succeeded(job_id, row.index, &invoice_id)? {
                        return Err(self.row_update_missed(job_id, row.index));
                    }
                    debug!(job_id = %job_id, index = row.index, invoice_id = %invoice_id, "行开票成功");
                    log_lines.push(format!("Z-{}: 发票 {} 已创建", number, invoice_id));
                    result.succeeded += 1;
                }
                Err(err) => {
                    let message = err.to_string();
                    if !self.job_repo.mark_row_failed(job_id, row.index, &message)? {
                        return Err(self.row_update_missed(job_id, row.index));
                    }
                    debug!(job_id = %job_id, index = row.index, error = %message, "行开票失败");
                    log_lines.push(format!("Z-{}: 错误 - {}", number, message));
                    result.failed += 1;
                    result.failed_rows.push(FailedRow {
                        index: row.index,
                        report_number: number.clone(),
                        error: message,
                    });
                }
            }
        }

        if !log_lines.is_empty() {
            let pass = match scope {
                ImportScope::AllPending => "导入",
                ImportScope::FailedOnly => "重处理",
            };
            let block = format!(
                "[{}] {}\n{}\n",
                Utc::now().format("%Y-%m-%d %H:%M:%S"),
                pass,
                log_lines.join("\n")
            );
            self.job_repo
                .append_log(job_id, &block)
                .map_err(|e| Self::vanished(job_id, e))?;
        }

        let reloaded = self.load_job(job_id)?;
        result.phase = reloaded.phase();

        info!(
            job_id = %job_id,
            attempted = result.attempted,
            succeeded = result.succeeded,
            failed = result.failed,
            skipped = result.skipped,
            phase = %result.phase,
            "开票轮次结束"
        );
        Ok(result)
    }

    // 行更新未命中: 作业已删除为致命错误; 否则行已被其他途径终结
    fn row_update_missed(&self, job_id: &str, index: usize) -> PipelineError {
        match self.job_repo.row_exists(job_id, index) {
            Ok(false) => {
                error!(job_id = %job_id, index, "作业在处理过程中被删除");
                PipelineError::fatal(job_id, format!("第 {} 行已不存在", index))
            }
            Ok(true) => {
                error!(job_id = %job_id, index, "行已持有发票引用,拒绝覆盖");
                PipelineError::fatal(job_id, format!("第 {} 行已被并发终结", index))
            }
            Err(e) => PipelineError::Repository(e),
        }
    }

    // ==========================================
    // 取消
    // ==========================================

    /// 作废全部已关联发票,阶段置为 Cancelled
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn cancel(&self, job_id: &str) -> PipelineResult<ImportJob> {
        let _guard = self.locks.acquire(job_id)?;
        let job = self.load_job(job_id)?;
        if job.stage == JobStage::Cancelled {
            return Err(PipelineError::invalid_state(job_id, job.phase(), "cancel"));
        }

        let mut cancelled = 0usize;
        for invoice_id in job.rows.iter().filter_map(|r| r.target_invoice_id.as_deref()) {
            self.invoices.cancel_invoice(invoice_id).await.map_err(|e| {
                PipelineError::InvoiceCancellation {
                    invoice_id: invoice_id.to_string(),
                    message: e.to_string(),
                }
            })?;
            cancelled += 1;
        }

        self.job_repo
            .set_cancelled(job_id)
            .map_err(|e| Self::vanished(job_id, e))?;
        self.job_repo
            .append_log(
                job_id,
                &format!(
                    "[{}] 取消: 作废发票 {} 张\n",
                    Utc::now().format("%Y-%m-%d %H:%M:%S"),
                    cancelled
                ),
            )
            .map_err(|e| Self::vanished(job_id, e))?;

        info!(job_id = %job_id, cancelled_invoices = cancelled, "作业已取消");
        self.load_job(job_id)
    }
}
