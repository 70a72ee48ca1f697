// ==========================================
// POS 导入系统 - 引擎层
// ==========================================
// 职责: 作业状态机、发票构建、失败重处理、收款生成
// 红线: 所有数据库操作通过 Repository; 账务调用通过 Gateway
// ==========================================

pub mod error;
pub mod gateway;
pub mod import_engine;
pub mod invoice_builder;
pub mod job_lock;
pub mod payment_generator;
pub mod recovery;

// 重导出核心类型
pub use error::{PipelineError, PipelineResult};
pub use gateway::{GatewayError, InvoiceGateway, PaymentGateway};
pub use import_engine::ImportEngine;
pub use invoice_builder::{ConversionError, InvoiceBuilder};
pub use job_lock::{JobLockGuard, JobLockRegistry};
pub use payment_generator::PaymentEntryGenerator;
pub use recovery::RecoveryCoordinator;
