// ==========================================
// POS 导入系统 - 配置层
// ==========================================
// 职责: 导入阈值配置读取
// 存储: config_kv 表 (scope_id = 'global')
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager, ImportSettings};
pub use import_config_trait::{ConfigError, ImportConfigReader};
