// ==========================================
// POS 导入系统 - 导入作业领域模型
// ==========================================
// 聚合根: ImportJob 独占其行集合 (Vec<ImportRow>)
// 红线: phase 由 stage + 行状态派生,不单独存储
// ==========================================

use crate::domain::preview::PreviewSummary;
use crate::domain::report::PosReport;
use crate::domain::types::{JobPhase, JobStage, RowStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ==========================================
// ImportRow - 导入行
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRow {
    pub index: usize,
    pub raw_data: PosReport,
    pub structural_error: Option<String>,
    pub status: RowStatus,
    pub target_invoice_id: Option<String>, // 仅 Succeeded 时有值,写入后不可变
    pub error_detail: Option<String>,      // 仅 Failed 时有值
}

impl ImportRow {
    pub fn pending(index: usize, raw_data: PosReport, structural_error: Option<String>) -> Self {
        Self {
            index,
            raw_data,
            structural_error,
            status: RowStatus::Pending,
            target_invoice_id: None,
            error_detail: None,
        }
    }

    /// 发票引用与状态是否一致
    pub fn is_consistent(&self) -> bool {
        (self.status == RowStatus::Succeeded) == self.target_invoice_id.is_some()
    }
}

// ==========================================
// ImportJob - 导入作业
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportJob {
    pub job_id: String,
    pub connector_id: String,
    pub source_file: Option<String>,
    pub stage: JobStage,
    pub create_draft_invoices: bool,
    pub preview_summary: Option<PreviewSummary>,
    pub import_log: String,
    pub rows: Vec<ImportRow>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ImportJob {
    pub fn phase(&self) -> JobPhase {
        derive_phase(self.stage, &self.rows)
    }

    pub fn count_status(&self, status: RowStatus) -> usize {
        self.rows.iter().filter(|r| r.status == status).count()
    }

    pub fn has_file(&self) -> bool {
        self.source_file
            .as_deref()
            .map(|f| !f.trim().is_empty())
            .unwrap_or(false)
    }
}

/// 由阶段标记与行状态派生作业阶段
///
/// - Submitted: 有 Pending → Processing; 有 Failed → PartiallyFailed; 否则 Completed
/// - 其他阶段标记直接映射
pub fn derive_phase(stage: JobStage, rows: &[ImportRow]) -> JobPhase {
    match stage {
        JobStage::Draft => JobPhase::Draft,
        JobStage::Previewed => JobPhase::Previewed,
        JobStage::Cancelled => JobPhase::Cancelled,
        JobStage::Submitted => {
            if rows.iter().any(|r| r.status == RowStatus::Pending) {
                JobPhase::Processing
            } else if rows.iter().any(|r| r.status == RowStatus::Failed) {
                JobPhase::PartiallyFailed
            } else {
                JobPhase::Completed
            }
        }
    }
}

// ==========================================
// 处理结果
// ==========================================

/// 失败行（按行号升序）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedRow {
    pub index: usize,
    pub report_number: String,
    pub error: String,
}

/// 单次处理轮次结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobResult {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failed_rows: Vec<FailedRow>,
    pub phase: JobPhase,
}

impl JobResult {
    /// 空结果（未执行任何行）
    pub fn empty(phase: JobPhase) -> Self {
        Self {
            attempted: 0,
            succeeded: 0,
            failed: 0,
            skipped: 0,
            failed_rows: Vec::new(),
            phase,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.attempted == 0 && self.skipped == 0
    }

    pub fn failed_indices(&self) -> Vec<usize> {
        self.failed_rows.iter().map(|f| f.index).collect()
    }
}

// ==========================================
// 收款记录关联
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub invoice_id: String, // 唯一: 一张发票最多一条收款
    pub payment_id: String,
    pub job_id: String,
    pub row_index: usize,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailure {
    pub index: usize,
    pub invoice_id: String,
    pub error: String,
}

/// 收款生成结果
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentResult {
    pub created: Vec<PaymentLink>,
    pub already_linked: usize,
    pub failures: Vec<PaymentFailure>,
    /// 前置条件不满足时的说明（此时其余字段为空）
    pub no_op_reason: Option<String>,
}

impl PaymentResult {
    pub fn no_op(reason: impl Into<String>) -> Self {
        Self {
            no_op_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(index: usize, status: RowStatus) -> ImportRow {
        let mut r = ImportRow::pending(index, PosReport::new(index.to_string(), None), None);
        r.status = status;
        if status == RowStatus::Succeeded {
            r.target_invoice_id = Some(format!("INV-{}", index));
        }
        r
    }

    #[test]
    fn test_derive_phase_from_row_statuses() {
        let all_ok = vec![row(0, RowStatus::Succeeded), row(1, RowStatus::Succeeded)];
        assert_eq!(derive_phase(JobStage::Submitted, &all_ok), JobPhase::Completed);

        let one_failed = vec![row(0, RowStatus::Succeeded), row(1, RowStatus::Failed)];
        assert_eq!(
            derive_phase(JobStage::Submitted, &one_failed),
            JobPhase::PartiallyFailed
        );

        let pending = vec![row(0, RowStatus::Failed), row(1, RowStatus::Pending)];
        assert_eq!(derive_phase(JobStage::Submitted, &pending), JobPhase::Processing);
    }

    #[test]
    fn test_pre_submit_stages_ignore_rows() {
        let rows = vec![row(0, RowStatus::Failed)];
        assert_eq!(derive_phase(JobStage::Draft, &rows), JobPhase::Draft);
        assert_eq!(derive_phase(JobStage::Previewed, &rows), JobPhase::Previewed);
        assert_eq!(derive_phase(JobStage::Cancelled, &rows), JobPhase::Cancelled);
    }

    #[test]
    fn test_row_consistency() {
        assert!(row(0, RowStatus::Succeeded).is_consistent());
        assert!(row(0, RowStatus::Failed).is_consistent());

        let mut broken = row(0, RowStatus::Pending);
        broken.target_invoice_id = Some("INV".to_string());
        assert!(!broken.is_consistent());
    }
}
