// ==========================================
// POS 导入系统 - API 层
// ==========================================
// 职责: 对外操作入口,错误统一为 ApiError
// ==========================================

pub mod error;
pub mod import_api;

pub use error::{ApiError, ApiResult};
pub use import_api::{
    available_actions, ImportApi, JobActions, JobView, PreviewImportResponse, RowView,
};
