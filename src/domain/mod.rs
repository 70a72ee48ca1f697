// ==========================================
// POS 导入系统 - 领域层
// ==========================================
// 职责: 导入作业/行/报表/连接器等实体与类型
// 红线: 领域层不访问数据库
// ==========================================

pub mod connector;
pub mod invoice;
pub mod job;
pub mod preview;
pub mod report;
pub mod types;

pub use connector::{ItemMapping, PaymentMapping, PosConnector};
pub use invoice::{InvoiceItem, InvoicePayment, InvoiceTax, PaymentRequest, SalesInvoiceDraft};
pub use job::{
    derive_phase, FailedRow, ImportJob, ImportRow, JobResult, PaymentFailure, PaymentLink,
    PaymentResult,
};
pub use preview::{PreviewRow, PreviewSummary};
pub use report::{ParsedFile, PosLine, PosPayment, PosReport, StructuralError, VatAmount};
pub use types::{ImportScope, JobPhase, JobStage, ParserKind, RowStatus};
