// ==========================================
// POS 导入系统 - 导入配置读取 Trait
// ==========================================
// 职责: 定义导入流水线所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::error::Error;

/// 配置读取错误
pub type ConfigError = Box<dyn Error + Send + Sync>;

// ==========================================
// ImportConfigReader Trait
// ==========================================
// 用途: 预览/发票校验所需的阈值读取接口
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait ImportConfigReader: Send + Sync {
    /// 获取预览样本行数
    ///
    /// # 默认值
    /// - 20
    async fn get_preview_sample_size(&self) -> Result<usize, ConfigError>;

    /// 获取发票合计与 Z 报表合计的允许偏差（金额）
    ///
    /// # 默认值
    /// - 1.00
    async fn get_amount_tolerance(&self) -> Result<Decimal, ConfigError>;

    /// 获取行级税额偏差的失败阈值
    ///
    /// # 默认值
    /// - 1.00
    ///
    /// # 用途
    /// - 报表无实际增值税数据时,按税率复算税额; 偏差超过该值则该行失败
    async fn get_tax_error_threshold(&self) -> Result<Decimal, ConfigError>;

    /// 获取行级税额偏差的告警阈值
    ///
    /// # 默认值
    /// - 0.01
    async fn get_tax_warning_threshold(&self) -> Result<Decimal, ConfigError>;
}
