// ==========================================
// POS 导入系统 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为（外键 + busy_timeout）
// - 幂等建表,记录 schema_version
// ==========================================

use rusqlite::{params, Connection, OptionalExtension};
use std::path::PathBuf;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "POS_IMPORT_DB_PATH";

/// 默认数据库路径
///
/// 优先级: 环境变量 POS_IMPORT_DB_PATH → 用户数据目录/pos-import/pos_import.db → ./pos_import.db
pub fn default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let path = match dirs::data_dir() {
        Some(data_dir) => {
            let dir = data_dir.join("pos-import");
            if let Err(e) = std::fs::create_dir_all(&dir) {
                tracing::warn!(dir = %dir.display(), error = %e, "无法创建数据目录,使用当前目录");
                PathBuf::from("./pos_import.db")
            } else {
                dir.join("pos_import.db")
            }
        }
        None => PathBuf::from("./pos_import.db"),
    };

    path.to_string_lossy().to_string()
}

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 幂等建表
///
/// 红线: pos_import_row 的 CHECK 约束保证 "SUCCEEDED ⇔ target_invoice_id 非空"
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL DEFAULT 'global',
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        CREATE TABLE IF NOT EXISTS pos_connector (
            connector_id TEXT PRIMARY KEY,
            connector_name TEXT NOT NULL,
            parser_kind TEXT NOT NULL,
            company TEXT NOT NULL,
            currency TEXT NOT NULL,
            default_customer TEXT NOT NULL,
            default_income_account TEXT NOT NULL,
            default_tax_account TEXT,
            default_unmapped_item TEXT,
            create_draft_invoices INTEGER NOT NULL DEFAULT 0,
            enabled INTEGER NOT NULL DEFAULT 1,
            item_mapping_json TEXT NOT NULL DEFAULT '[]',
            payment_mapping_json TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS pos_import_job (
            job_id TEXT PRIMARY KEY,
            connector_id TEXT NOT NULL REFERENCES pos_connector(connector_id),
            source_file TEXT,
            stage TEXT NOT NULL CHECK(stage IN ('DRAFT', 'PREVIEWED', 'SUBMITTED', 'CANCELLED')),
            create_draft_invoices INTEGER NOT NULL,
            preview_summary_json TEXT,
            import_log TEXT NOT NULL DEFAULT '',
            pass_owner TEXT,
            pass_started_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS pos_import_row (
            job_id TEXT NOT NULL REFERENCES pos_import_job(job_id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            report_number TEXT NOT NULL,
            raw_data_json TEXT NOT NULL,
            structural_error TEXT,
            status TEXT NOT NULL CHECK(status IN ('PENDING', 'SUCCEEDED', 'FAILED')),
            target_invoice_id TEXT,
            error_detail TEXT,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (job_id, row_index),
            CHECK ((status = 'SUCCEEDED') = (target_invoice_id IS NOT NULL))
        );

        CREATE TABLE IF NOT EXISTS pos_payment_link (
            invoice_id TEXT PRIMARY KEY,
            payment_id TEXT NOT NULL,
            job_id TEXT NOT NULL REFERENCES pos_import_job(job_id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS sales_invoice (
            invoice_id TEXT PRIMARY KEY,
            company TEXT NOT NULL,
            customer TEXT NOT NULL,
            currency TEXT NOT NULL,
            reference TEXT NOT NULL,
            posting_date TEXT NOT NULL,
            net_total TEXT NOT NULL,
            tax_total TEXT NOT NULL,
            grand_total TEXT NOT NULL,
            docstatus INTEGER NOT NULL CHECK(docstatus IN (0, 1, 2)),
            body_json TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_sales_invoice_reference
            ON sales_invoice(company, reference) WHERE docstatus != 2;

        CREATE TABLE IF NOT EXISTS payment_entry (
            payment_id TEXT PRIMARY KEY,
            invoice_id TEXT NOT NULL REFERENCES sales_invoice(invoice_id),
            company TEXT NOT NULL,
            party TEXT NOT NULL,
            posting_date TEXT,
            amount TEXT NOT NULL,
            created_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_import_row_status ON pos_import_row(job_id, status);
        CREATE INDEX IF NOT EXISTS idx_import_row_invoice ON pos_import_row(target_invoice_id);
        CREATE INDEX IF NOT EXISTS idx_payment_link_job ON pos_payment_link(job_id);
        "#,
    )?;

    upgrade_v1(conn)?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        params![CURRENT_SCHEMA_VERSION],
    )?;
    Ok(())
}

// v1 → v2: 作业处理租约列 + 每张发票唯一收款单
fn upgrade_v1(conn: &Connection) -> rusqlite::Result<()> {
    for (column, ddl) in [
        ("pass_owner", "ALTER TABLE pos_import_job ADD COLUMN pass_owner TEXT"),
        ("pass_started_at", "ALTER TABLE pos_import_job ADD COLUMN pass_started_at TEXT"),
    ] {
        if !has_column(conn, "pos_import_job", column)? {
            conn.execute_batch(ddl)?;
        }
    }

    conn.execute_batch(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_payment_entry_invoice ON payment_entry(invoice_id);",
    )
}

fn has_column(conn: &Connection, table: &str, column: &str) -> rusqlite::Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM pragma_table_info(?1) WHERE name = ?2",
            params![table, column],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), None);

        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap();
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_v1_database_is_upgraded() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE pos_import_job (
                job_id TEXT PRIMARY KEY,
                connector_id TEXT NOT NULL,
                source_file TEXT,
                stage TEXT NOT NULL,
                create_draft_invoices INTEGER NOT NULL,
                preview_summary_json TEXT,
                import_log TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .unwrap();

        init_schema(&conn).unwrap();
        assert!(has_column(&conn, "pos_import_job", "pass_owner").unwrap());
        assert!(has_column(&conn, "pos_import_job", "pass_started_at").unwrap());
        assert_eq!(read_schema_version(&conn).unwrap(), Some(CURRENT_SCHEMA_VERSION));
    }

    #[test]
    fn test_default_db_path() {
        let path = default_db_path();
        assert!(path.ends_with(".db"));
    }
}
