// ==========================================
// POS 导入系统 - 连接器配置仓储
// ==========================================
// 职责: 管理 pos_connector 表（映射表以 JSON 列存储）
// 红线: Repository 不含业务逻辑
// ==========================================

use crate::domain::connector::{ItemMapping, PaymentMapping, PosConnector};
use crate::domain::types::ParserKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex};

const SELECT_COLUMNS: &str = r#"
    SELECT connector_id, connector_name, parser_kind, company, currency,
           default_customer, default_income_account, default_tax_account,
           default_unmapped_item, create_draft_invoices, enabled,
           item_mapping_json, payment_mapping_json
    FROM pos_connector
"#;

// 原始行（JSON 列尚未解析）
struct ConnectorRow {
    connector_id: String,
    connector_name: String,
    parser_kind: String,
    company: String,
    currency: String,
    default_customer: String,
    default_income_account: String,
    default_tax_account: Option<String>,
    default_unmapped_item: Option<String>,
    create_draft_invoices: bool,
    enabled: bool,
    item_mapping_json: String,
    payment_mapping_json: String,
}

impl ConnectorRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            connector_id: row.get(0)?,
            connector_name: row.get(1)?,
            parser_kind: row.get(2)?,
            company: row.get(3)?,
            currency: row.get(4)?,
            default_customer: row.get(5)?,
            default_income_account: row.get(6)?,
            default_tax_account: row.get(7)?,
            default_unmapped_item: row.get(8)?,
            create_draft_invoices: row.get(9)?,
            enabled: row.get(10)?,
            item_mapping_json: row.get(11)?,
            payment_mapping_json: row.get(12)?,
        })
    }

    fn into_connector(self) -> RepositoryResult<PosConnector> {
        let parser_kind =
            ParserKind::parse(&self.parser_kind).ok_or_else(|| RepositoryError::FieldValueError {
                field: "parser_kind".to_string(),
                message: format!("未知解析器: {}", self.parser_kind),
            })?;
        let item_mappings: Vec<ItemMapping> = serde_json::from_str(&self.item_mapping_json)?;
        let payment_mappings: Vec<PaymentMapping> =
            serde_json::from_str(&self.payment_mapping_json)?;

        Ok(PosConnector {
            connector_id: self.connector_id,
            connector_name: self.connector_name,
            parser_kind,
            company: self.company,
            currency: self.currency,
            default_customer: self.default_customer,
            default_income_account: self.default_income_account,
            default_tax_account: self.default_tax_account,
            default_unmapped_item: self.default_unmapped_item,
            create_draft_invoices: self.create_draft_invoices,
            enabled: self.enabled,
            item_mappings,
            payment_mappings,
        })
    }
}

// ==========================================
// PosConnectorRepository
// ==========================================
pub struct PosConnectorRepository {
    conn: Arc<Mutex<Connection>>,
}

impl PosConnectorRepository {
    /// 创建新的 PosConnectorRepository 实例
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = crate::db::open_sqlite_connection(db_path)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 新增或覆盖连接器配置
    pub fn upsert(&self, connector: &PosConnector) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO pos_connector (
                connector_id, connector_name, parser_kind, company, currency,
                default_customer, default_income_account, default_tax_account,
                default_unmapped_item, create_draft_invoices, enabled,
                item_mapping_json, payment_mapping_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, datetime('now'))
            ON CONFLICT(connector_id) DO UPDATE SET
                connector_name = excluded.connector_name,
                parser_kind = excluded.parser_kind,
                company = excluded.company,
                currency = excluded.currency,
                default_customer = excluded.default_customer,
                default_income_account = excluded.default_income_account,
                default_tax_account = excluded.default_tax_account,
                default_unmapped_item = excluded.default_unmapped_item,
                create_draft_invoices = excluded.create_draft_invoices,
                enabled = excluded.enabled,
                item_mapping_json = excluded.item_mapping_json,
                payment_mapping_json = excluded.payment_mapping_json,
                updated_at = excluded.updated_at
            "#,
            params![
                connector.connector_id,
                connector.connector_name,
                connector.parser_kind.as_str(),
                connector.company,
                connector.currency,
                connector.default_customer,
                connector.default_income_account,
                connector.default_tax_account,
                connector.default_unmapped_item,
                connector.create_draft_invoices,
                connector.enabled,
                serde_json::to_string(&connector.item_mappings)?,
                serde_json::to_string(&connector.payment_mappings)?,
            ],
        )?;
        Ok(())
    }

    /// 按主键查询
    pub fn find_by_id(&self, connector_id: &str) -> RepositoryResult<Option<PosConnector>> {
        let conn = self.get_conn()?;
        let sql = format!("{} WHERE connector_id = ?1", SELECT_COLUMNS);
        let raw = conn
            .query_row(&sql, params![connector_id], ConnectorRow::from_row)
            .optional()?;
        raw.map(ConnectorRow::into_connector).transpose()
    }

    /// 列出全部连接器
    pub fn list_all(&self) -> RepositoryResult<Vec<PosConnector>> {
        let conn = self.get_conn()?;
        let sql = format!("{} ORDER BY connector_id", SELECT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let raw = stmt.query_map([], ConnectorRow::from_row)?;

        let mut connectors = Vec::new();
        for row in raw {
            connectors.push(row?.into_connector()?);
        }
        Ok(connectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> PosConnectorRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        PosConnectorRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    #[test]
    fn test_upsert_and_find_roundtrip() {
        let repo = setup();
        let mut connector = PosConnector::restomax_defaults("ACME", "Walk-in", "700000", None);
        repo.upsert(&connector).unwrap();

        let loaded = repo.find_by_id("RESTOMAX").unwrap().unwrap();
        assert_eq!(loaded, connector);

        connector.create_draft_invoices = true;
        connector.item_mappings.push(ItemMapping {
            source_code: "1001".to_string(),
            item_code: "BEER".to_string(),
            uom: None,
        });
        repo.upsert(&connector).unwrap();

        let loaded = repo.find_by_id("RESTOMAX").unwrap().unwrap();
        assert!(loaded.create_draft_invoices);
        assert_eq!(loaded.item_mappings.len(), 1);
        assert_eq!(repo.list_all().unwrap().len(), 1);
        assert!(repo.find_by_id("OTHER").unwrap().is_none());
    }
}
