// ==========================================
// POS 导入系统 - 仓储层错误类型
// ==========================================
// 约束失败按 SQLite 扩展错误码归类:
// - UNIQUE / PRIMARY KEY: 重复发票参考号、重复收款关联
// - CHECK: 行状态与发票引用不一致
// ==========================================

use rusqlite::ffi;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("{entity}(id={id})不存在")]
    NotFound { entity: String, id: String },

    #[error("数据库连接锁不可用: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("唯一约束冲突: {0}")]
    UniqueConstraintViolation(String),

    #[error("外键约束冲突: {0}")]
    ForeignKeyViolation(String),

    #[error("约束校验失败: {0}")]
    CheckConstraintViolation(String),

    // 作业阶段不允许该写入
    #[error("作业阶段不允许: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    // 持久化字段无法还原为领域值
    #[error("字段 {field} 取值无效: {message}")]
    FieldValueError { field: String, message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(failure, message) => {
                let message = message.unwrap_or_else(|| failure.to_string());
                match failure.extended_code {
                    ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY => {
                        RepositoryError::UniqueConstraintViolation(message)
                    }
                    ffi::SQLITE_CONSTRAINT_FOREIGNKEY => RepositoryError::ForeignKeyViolation(message),
                    ffi::SQLITE_CONSTRAINT_CHECK => RepositoryError::CheckConstraintViolation(message),
                    _ => RepositoryError::DatabaseQueryError(message),
                }
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "记录".to_string(),
                id: "-".to_string(),
            },
            other => RepositoryError::DatabaseQueryError(other.to_string()),
        }
    }
}

// JSON 列（行原始数据、预览摘要、映射表）
impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::FieldValueError {
            field: "json".to_string(),
            message: err.to_string(),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_constraint_failures_are_classified() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            "PRAGMA foreign_keys = ON;
             CREATE TABLE parent (id TEXT PRIMARY KEY);
             CREATE TABLE child (
                 id TEXT PRIMARY KEY,
                 parent_id TEXT NOT NULL REFERENCES parent(id),
                 amount INTEGER NOT NULL CHECK (amount >= 0),
                 reference TEXT UNIQUE
             );
             INSERT INTO parent VALUES ('P1');
             INSERT INTO child VALUES ('C1', 'P1', 1, 'Z-1');",
        )
        .unwrap();

        let insert = |sql: &str| RepositoryError::from(conn.execute(sql, []).unwrap_err());

        assert!(matches!(
            insert("INSERT INTO child VALUES ('C2', 'P1', 1, 'Z-1')"),
            RepositoryError::UniqueConstraintViolation(_)
        ));
        assert!(matches!(
            insert("INSERT INTO child VALUES ('C1', 'P1', 1, 'Z-2')"),
            RepositoryError::UniqueConstraintViolation(_)
        ));
        assert!(matches!(
            insert("INSERT INTO child VALUES ('C3', 'NOPE', 1, 'Z-3')"),
            RepositoryError::ForeignKeyViolation(_)
        ));
        assert!(matches!(
            insert("INSERT INTO child VALUES ('C4', 'P1', -1, 'Z-4')"),
            RepositoryError::CheckConstraintViolation(_)
        ));
    }

    #[test]
    fn test_no_rows_maps_to_not_found() {
        let conn = Connection::open_in_memory().unwrap();
        let err: RepositoryError = conn
            .query_row("SELECT 1 WHERE 0", [], |row| row.get::<_, i64>(0))
            .unwrap_err()
            .into();
        assert!(matches!(err, RepositoryError::NotFound { .. }));
    }
}
