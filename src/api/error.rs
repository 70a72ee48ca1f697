// ==========================================
// POS 导入系统 - API层错误类型
// ==========================================
// 职责: 定义API层错误类型，将下层错误转换为单条可读消息
// ==========================================

use crate::engine::error::PipelineError;
use crate::importer::error::ImportError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
/// 所有错误信息必须包含显式原因
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 业务规则错误
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("业务规则违反: {0}")]
    BusinessRuleViolation(String),

    #[error("无效的状态转换: from={from} to={to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("当前阶段不允许该操作: {0}")]
    OperationNotAllowed(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("作业正在处理中,请稍后重试: {0}")]
    JobBusy(String),

    // ==========================================
    // 导入错误
    // ==========================================
    #[error("文件导入失败: {0}")]
    ImportError(String),

    #[error("账务系统错误: {0}")]
    LedgerError(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库连接失败: {0}")]
    DatabaseConnectionError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseConnectionError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseTransactionError(msg) => {
                ApiError::DatabaseTransactionError(msg)
            }
            RepositoryError::DatabaseQueryError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::BusinessRuleViolation(format!("约束校验失败: {}", msg))
            }
            RepositoryError::InvalidStateTransition { from, to } => {
                ApiError::InvalidStateTransition { from, to }
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 ImportError 转换
// ==========================================
impl From<ImportError> for ApiError {
    fn from(err: ImportError) -> Self {
        match err {
            ImportError::FileNotFound(path) => ApiError::NotFound(format!("文件不存在: {}", path)),
            other => ApiError::ImportError(other.to_string()),
        }
    }
}

// ==========================================
// 从 PipelineError 转换
// ==========================================
impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::Format(e) => ApiError::from(e),
            PipelineError::Concurrency { job_id } => ApiError::JobBusy(job_id),
            e @ PipelineError::FatalJob { .. } => ApiError::InternalError(e.to_string()),
            e @ PipelineError::InvalidState { .. } => ApiError::OperationNotAllowed(e.to_string()),
            e @ PipelineError::InvoiceCancellation { .. } => ApiError::LedgerError(e.to_string()),
            PipelineError::Config(msg) => ApiError::InternalError(format!("配置读取失败: {}", msg)),
            PipelineError::Repository(e) => ApiError::from(e),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::JobPhase;

    #[test]
    fn test_pipeline_errors_become_single_messages() {
        let busy: ApiError = PipelineError::Concurrency {
            job_id: "J1".to_string(),
        }
        .into();
        assert_eq!(busy.to_string(), "作业正在处理中,请稍后重试: J1");

        let state: ApiError = PipelineError::invalid_state("J1", JobPhase::Completed, "preview").into();
        assert!(matches!(state, ApiError::OperationNotAllowed(_)));
        assert!(state.to_string().contains("COMPLETED"));

        let format: ApiError = PipelineError::Format(ImportError::format("表头", "缺少列 DEBIT")).into();
        assert!(format.to_string().contains("缺少列 DEBIT"));
    }
}
