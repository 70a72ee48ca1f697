// ==========================================
// POS 导入系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigError, ImportConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> Result<Self, ConfigError> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Result<Self, ConfigError> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    fn get_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> Result<Option<String>, ConfigError> {
        self.get_config_value(key)
    }

    /// 写入 global scope 配置（UPSERT）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> Result<(), ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value) VALUES ('global', ?1, ?2)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置（按键排序）
    pub fn get_config_snapshot(&self) -> Result<BTreeMap<String, String>, ConfigError> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 读取金额配置; 值无法解析时回退默认值
    fn get_decimal_or_default(&self, key: &str, default: Decimal) -> Result<Decimal, ConfigError> {
        let value = self.get_config_value(key)?;
        Ok(value
            .and_then(|v| Decimal::from_str(v.trim()).ok())
            .filter(|d| !d.is_sign_negative())
            .unwrap_or(default))
    }
}

#[async_trait]
impl ImportConfigReader for ConfigManager {
    async fn get_preview_sample_size(&self) -> Result<usize, ConfigError> {
        let value = self.get_config_value(config_keys::PREVIEW_SAMPLE_SIZE)?;
        Ok(value
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(defaults::PREVIEW_SAMPLE_SIZE))
    }

    async fn get_amount_tolerance(&self) -> Result<Decimal, ConfigError> {
        self.get_decimal_or_default(config_keys::AMOUNT_TOLERANCE, defaults::amount_tolerance())
    }

    async fn get_tax_error_threshold(&self) -> Result<Decimal, ConfigError> {
        self.get_decimal_or_default(
            config_keys::TAX_ERROR_THRESHOLD,
            defaults::tax_error_threshold(),
        )
    }

    async fn get_tax_warning_threshold(&self) -> Result<Decimal, ConfigError> {
        self.get_decimal_or_default(
            config_keys::TAX_WARNING_THRESHOLD,
            defaults::tax_warning_threshold(),
        )
    }
}

// ==========================================
// ImportSettings - 单次操作使用的配置快照
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct ImportSettings {
    pub preview_sample_size: usize,
    pub amount_tolerance: Decimal,
    pub tax_error_threshold: Decimal,
    pub tax_warning_threshold: Decimal,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            preview_sample_size: defaults::PREVIEW_SAMPLE_SIZE,
            amount_tolerance: defaults::amount_tolerance(),
            tax_error_threshold: defaults::tax_error_threshold(),
            tax_warning_threshold: defaults::tax_warning_threshold(),
        }
    }
}

impl ImportSettings {
    /// 从配置读取器加载
    pub async fn load(reader: &dyn ImportConfigReader) -> Result<Self, ConfigError> {
        Ok(Self {
            preview_sample_size: reader.get_preview_sample_size().await?,
            amount_tolerance: reader.get_amount_tolerance().await?,
            tax_error_threshold: reader.get_tax_error_threshold().await?,
            tax_warning_threshold: reader.get_tax_warning_threshold().await?,
        })
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    pub const PREVIEW_SAMPLE_SIZE: &str = "import.preview_sample_size";
    pub const AMOUNT_TOLERANCE: &str = "import.amount_tolerance";
    pub const TAX_ERROR_THRESHOLD: &str = "import.tax_error_threshold";
    pub const TAX_WARNING_THRESHOLD: &str = "import.tax_warning_threshold";
}

mod defaults {
    use rust_decimal::Decimal;

    pub const PREVIEW_SAMPLE_SIZE: usize = 20;

    pub fn amount_tolerance() -> Decimal {
        Decimal::new(100, 2)
    }

    pub fn tax_error_threshold() -> Decimal {
        Decimal::new(100, 2)
    }

    pub fn tax_warning_threshold() -> Decimal {
        Decimal::new(1, 2)
    }
}
