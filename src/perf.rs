// ==========================================
// POS 导入系统 - 性能观测
// ==========================================
// 职责: 慢 SQL 日志 + 作业操作耗时日志
// 开关:
// - POS_IMPORT_PERF_SQL=1      强制开启 SQL 观测（Debug 默认开启）
// - POS_IMPORT_SLOW_SQL_MS=50  慢 SQL 阈值（毫秒, 0 表示只计数）
// ==========================================

use rusqlite::Connection;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

pub const PERF_SQL_ENV: &str = "POS_IMPORT_PERF_SQL";
pub const SLOW_SQL_MS_ENV: &str = "POS_IMPORT_SLOW_SQL_MS";

const SQL_LOG_MAX_CHARS: usize = 400;

static SQL_OBSERVED: AtomicBool = AtomicBool::new(false);
static SLOW_SQL_MS: AtomicU64 = AtomicU64::new(0);
static EXECUTED_SQL: AtomicU64 = AtomicU64::new(0);

// ==========================================
// PerfSettings
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerfSettings {
    pub observe_sql: bool,
    pub slow_sql_ms: u64,
}

impl PerfSettings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 由键值查找函数构造（未设置时按构建类型取默认）
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let observe_sql = lookup(PERF_SQL_ENV)
            .map(|v| {
                matches!(
                    v.trim().to_ascii_lowercase().as_str(),
                    "1" | "true" | "yes" | "on"
                )
            })
            .unwrap_or(cfg!(debug_assertions));

        let slow_sql_ms = lookup(SLOW_SQL_MS_ENV)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(if cfg!(debug_assertions) { 50 } else { 200 });

        Self {
            observe_sql,
            slow_sql_ms,
        }
    }
}

/// 为连接安装 SQL profile（按环境变量配置）
pub fn install_sqlite_tracing(conn: &mut Connection) {
    apply_settings(conn, PerfSettings::from_env());
}

pub fn apply_settings(conn: &mut Connection, settings: PerfSettings) {
    SQL_OBSERVED.store(settings.observe_sql, Ordering::Relaxed);
    SLOW_SQL_MS.store(settings.slow_sql_ms, Ordering::Relaxed);

    if settings.observe_sql {
        conn.profile(Some(on_sql_executed));
    } else {
        conn.profile(None);
    }
}

fn on_sql_executed(sql: &str, duration: Duration) {
    if !SQL_OBSERVED.load(Ordering::Relaxed) {
        return;
    }
    EXECUTED_SQL.fetch_add(1, Ordering::Relaxed);

    let elapsed_ms = duration.as_millis() as u64;
    let slow_ms = SLOW_SQL_MS.load(Ordering::Relaxed);
    if slow_ms > 0 && elapsed_ms >= slow_ms {
        tracing::warn!(
            target: "slow_sql",
            elapsed_ms,
            sql = %compact_sql(sql),
            "慢 SQL"
        );
    }
}

/// 折叠空白并按字符截断
fn compact_sql(sql: &str) -> String {
    let flat = sql.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(SQL_LOG_MAX_CHARS) {
        Some((cut, _)) => format!("{}...", &flat[..cut]),
        None => flat,
    }
}

/// 已执行 SQL 条数（进程级）
pub fn executed_sql_count() -> u64 {
    EXECUTED_SQL.load(Ordering::Relaxed)
}

// ==========================================
// PerfGuard - 作业操作耗时
// ==========================================
/// drop 时以 debug 级别记录操作耗时与期间执行的 SQL 条数
///
/// ```ignore
/// let _perf = PerfGuard::for_job("api.submit", job_id);
/// ```
pub struct PerfGuard {
    op: &'static str,
    job_id: Option<String>,
    started: Instant,
    sql_before: u64,
}

impl PerfGuard {
    pub fn new(op: &'static str) -> Self {
        Self::start(op, None)
    }

    pub fn for_job(op: &'static str, job_id: &str) -> Self {
        Self::start(op, Some(job_id.to_string()))
    }

    fn start(op: &'static str, job_id: Option<String>) -> Self {
        Self {
            op,
            job_id,
            started: Instant::now(),
            sql_before: executed_sql_count(),
        }
    }
}

impl Drop for PerfGuard {
    fn drop(&mut self) {
        // 并发操作共享计数,结果为近似值
        let sql_count = executed_sql_count().saturating_sub(self.sql_before);
        tracing::debug!(
            target: "perf",
            op = self.op,
            job_id = self.job_id.as_deref().unwrap_or("-"),
            elapsed_ms = self.started.elapsed().as_millis() as u64,
            sql_count,
            "操作完成"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_lookup() {
        let settings = PerfSettings::from_lookup(|key| match key {
            PERF_SQL_ENV => Some(" Yes ".to_string()),
            SLOW_SQL_MS_ENV => Some("5".to_string()),
            _ => None,
        });
        assert_eq!(
            settings,
            PerfSettings {
                observe_sql: true,
                slow_sql_ms: 5
            }
        );

        let off = PerfSettings::from_lookup(|key| (key == PERF_SQL_ENV).then(|| "0".to_string()));
        assert!(!off.observe_sql);
    }

    #[test]
    fn test_compact_sql_folds_whitespace_and_truncates() {
        assert_eq!(compact_sql("SELECT\n    1\n"), "SELECT 1");

        let long = format!("SELECT '{}'", "é".repeat(SQL_LOG_MAX_CHARS));
        let compacted = compact_sql(&long);
        assert!(compacted.ends_with("..."));
        assert_eq!(compacted.chars().count(), SQL_LOG_MAX_CHARS + 3);
    }

    #[test]
    fn test_observed_connection_counts_statements() {
        let mut conn = Connection::open_in_memory().unwrap();
        apply_settings(
            &mut conn,
            PerfSettings {
                observe_sql: true,
                slow_sql_ms: 0,
            },
        );

        let before = executed_sql_count();
        conn.execute_batch("CREATE TABLE t (x INTEGER); INSERT INTO t VALUES (1);")
            .unwrap();
        assert!(executed_sql_count() > before);
    }
}
