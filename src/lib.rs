// ==========================================
// POS 导入系统 - 核心库
// ==========================================
// 流程: 上传 Z 报表 → 预览 → 提交开票 → 失败重处理 → 补建收款
// 技术栈: Rust + SQLite
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 作业状态机
pub mod engine;

// 导入层 - 文件解析与预览
pub mod importer;

// 配置层 - 导入阈值
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一/建表）
pub mod db;

// 日志系统
pub mod logging;

// 性能观测
pub mod perf;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{ImportScope, JobPhase, JobStage, ParserKind, RowStatus};

// 领域实体
pub use domain::{
    ImportJob, ImportRow, JobResult, ParsedFile, PaymentLink, PaymentResult, PosConnector,
    PosReport, PreviewSummary,
};

// 引擎
pub use engine::{
    ImportEngine, JobLockRegistry, PaymentEntryGenerator, PipelineError, RecoveryCoordinator,
};

// API
pub use api::{ApiError, ImportApi, JobActions, JobView, PreviewImportResponse};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "POS 导入系统";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
