// ==========================================
// POS 导入系统 - 流水线错误类型
// ==========================================
// 工具: thiserror 派生宏
// 红线: 行级错误（ConversionError）只记录到行,不向上传播
// ==========================================

use crate::domain::types::JobPhase;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 作业级错误
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Format(#[from] ImportError),

    #[error("作业正在处理中: job_id={job_id}")]
    Concurrency { job_id: String },

    #[error("作业致命错误 (job_id={job_id}): {message}")]
    FatalJob { job_id: String, message: String },

    #[error("当前阶段不允许该操作: job_id={job_id}, phase={phase}, operation={operation}")]
    InvalidState {
        job_id: String,
        phase: JobPhase,
        operation: String,
    },

    #[error("发票作废失败 (invoice_id={invoice_id}): {message}")]
    InvoiceCancellation { invoice_id: String, message: String },

    #[error("配置读取失败: {0}")]
    Config(String),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl PipelineError {
    pub fn fatal(job_id: &str, message: impl Into<String>) -> Self {
        PipelineError::FatalJob {
            job_id: job_id.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_state(job_id: &str, phase: JobPhase, operation: &str) -> Self {
        PipelineError::InvalidState {
            job_id: job_id.to_string(),
            phase,
            operation: operation.to_string(),
        }
    }
}

/// Result 类型别名
pub type PipelineResult<T> = Result<T, PipelineError>;
