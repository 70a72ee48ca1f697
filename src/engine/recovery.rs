// ==========================================
// POS 导入系统 - 失败行重处理
// ==========================================
// 职责: 仅对 PartiallyFailed 作业的失败行重新开票
// 红线: 成功行不会被重新处理（范围仅含 Failed）
// ==========================================

use crate::domain::job::JobResult;
use crate::domain::types::{ImportScope, JobPhase};
use crate::engine::error::PipelineResult;
use crate::engine::import_engine::ImportEngine;
use std::sync::Arc;
use tracing::{info, instrument};

pub struct RecoveryCoordinator {
    engine: Arc<ImportEngine>,
}

impl RecoveryCoordinator {
    pub fn new(engine: Arc<ImportEngine>) -> Self {
        Self { engine }
    }

    /// 重处理失败行
    ///
    /// # 返回
    /// - 阶段不是 PartiallyFailed: 空结果（不报错）
    /// - 否则: 本轮 FailedOnly 的处理结果
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn reprocess_failed(&self, job_id: &str) -> PipelineResult<JobResult> {
        let guard = self.engine.locks().acquire(job_id)?;
        let job = self.engine.load_job(job_id)?;

        let phase = job.phase();
        if phase != JobPhase::PartiallyFailed {
            info!(job_id = %job_id, phase = %phase, "无失败行可重处理");
            return Ok(JobResult::empty(phase));
        }

        self.engine
            .run_import_locked(&guard, ImportScope::FailedOnly)
            .await
    }
}
