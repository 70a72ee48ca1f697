// ==========================================
// POS 导入系统 - 领域类型定义
// ==========================================
// 职责: 导入作业/导入行的状态枚举
// 序列化格式: SCREAMING_SNAKE_CASE (与数据库一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 作业阶段标记 (Job Stage)
// ==========================================
// 持久化字段: 只记录生命周期节点,处理结果由行状态派生
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStage {
    Draft,     // 已创建,可挂文件
    Previewed, // 已预览,行集合可被重新预览替换
    Submitted, // 已提交,行集合冻结
    Cancelled, // 已取消(终态)
}

impl JobStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStage::Draft => "DRAFT",
            JobStage::Previewed => "PREVIEWED",
            JobStage::Submitted => "SUBMITTED",
            JobStage::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<JobStage> {
        match s.trim().to_uppercase().as_str() {
            "DRAFT" => Some(JobStage::Draft),
            "PREVIEWED" => Some(JobStage::Previewed),
            "SUBMITTED" => Some(JobStage::Submitted),
            "CANCELLED" => Some(JobStage::Cancelled),
            _ => None,
        }
    }

    /// 行集合是否仍可替换（提交前）
    pub fn is_pre_submit(&self) -> bool {
        matches!(self, JobStage::Draft | JobStage::Previewed)
    }
}

impl fmt::Display for JobStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 作业阶段 (Job Phase)
// ==========================================
// 派生值: 由 JobStage + 行状态计算,不单独存储
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobPhase {
    Draft,
    Previewed,
    Processing,
    PartiallyFailed,
    Completed,
    Cancelled,
}

impl JobPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobPhase::Draft => "DRAFT",
            JobPhase::Previewed => "PREVIEWED",
            JobPhase::Processing => "PROCESSING",
            JobPhase::PartiallyFailed => "PARTIALLY_FAILED",
            JobPhase::Completed => "COMPLETED",
            JobPhase::Cancelled => "CANCELLED",
        }
    }

    /// 列表视图状态指示 (颜色, 标签)
    pub fn indicator(&self) -> (&'static str, &'static str) {
        match self {
            JobPhase::Completed => ("green", "Success"),
            JobPhase::PartiallyFailed => ("orange", "Partial Success"),
            JobPhase::Processing => ("blue", "Processing"),
            JobPhase::Cancelled => ("red", "Cancelled"),
            JobPhase::Draft | JobPhase::Previewed => ("gray", "Pending"),
        }
    }

    /// 是否已提交且首轮处理已结束
    pub fn is_settled(&self) -> bool {
        matches!(self, JobPhase::Completed | JobPhase::PartiallyFailed)
    }
}

impl fmt::Display for JobPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 导入行状态 (Row Status)
// ==========================================
// 转换: Pending → Succeeded | Failed; Failed → Succeeded | Failed
// 红线: 不允许回到 Pending
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowStatus {
    Pending,
    Succeeded,
    Failed,
}

impl RowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RowStatus::Pending => "PENDING",
            RowStatus::Succeeded => "SUCCEEDED",
            RowStatus::Failed => "FAILED",
        }
    }

    pub fn parse(s: &str) -> Option<RowStatus> {
        match s.trim().to_uppercase().as_str() {
            "PENDING" => Some(RowStatus::Pending),
            "SUCCEEDED" => Some(RowStatus::Succeeded),
            "FAILED" => Some(RowStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for RowStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 处理范围 (Import Scope)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImportScope {
    AllPending, // 首轮: 所有待处理行
    FailedOnly, // 重处理: 仅失败行
}

impl ImportScope {
    /// 该范围选取的行状态
    pub fn selects(&self, status: RowStatus) -> bool {
        match self {
            ImportScope::AllPending => status == RowStatus::Pending,
            ImportScope::FailedOnly => status == RowStatus::Failed,
        }
    }
}

impl fmt::Display for ImportScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImportScope::AllPending => write!(f, "ALL_PENDING"),
            ImportScope::FailedOnly => write!(f, "FAILED_ONLY"),
        }
    }
}

// ==========================================
// 解析器类型 (Parser Kind)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ParserKind {
    Restomax, // Restomax 会计分录导出 (CSV / Excel)
}

impl ParserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParserKind::Restomax => "RESTOMAX",
        }
    }

    pub fn parse(s: &str) -> Option<ParserKind> {
        match s.trim().to_uppercase().as_str() {
            "RESTOMAX" => Some(ParserKind::Restomax),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_round_trip_through_db_text() {
        for stage in [
            JobStage::Draft,
            JobStage::Previewed,
            JobStage::Submitted,
            JobStage::Cancelled,
        ] {
            assert_eq!(JobStage::parse(stage.as_str()), Some(stage));
        }
        assert_eq!(JobStage::parse("bogus"), None);
    }

    #[test]
    fn test_scope_selects_matching_status() {
        assert!(ImportScope::AllPending.selects(RowStatus::Pending));
        assert!(!ImportScope::AllPending.selects(RowStatus::Failed));
        assert!(ImportScope::FailedOnly.selects(RowStatus::Failed));
        assert!(!ImportScope::FailedOnly.selects(RowStatus::Succeeded));
    }
}
