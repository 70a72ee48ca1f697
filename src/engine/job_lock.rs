// ==========================================
// POS 导入系统 - 作业处理租约
// ==========================================
// 职责: 同一作业同一时刻只允许一个流水线操作（跨进程、跨实例）
// 实现: pos_import_job.pass_owner 条件 UPDATE 申领, Guard drop 时释放
// 约束: 申领失败立即返回,不排队等待
// 约束: 持有超过租期的租约视为失联,可被接管
// ==========================================

use crate::engine::error::{PipelineError, PipelineResult};
use crate::repository::import_job_repo::ImportJobRepository;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// 默认租期（分钟）
pub const DEFAULT_LEASE_TTL_MINUTES: i64 = 30;

/// 作业租约登记表
#[derive(Clone)]
pub struct JobLockRegistry {
    jobs: Arc<ImportJobRepository>,
    lease_ttl: Duration,
}

impl JobLockRegistry {
    pub fn new(jobs: Arc<ImportJobRepository>) -> Self {
        Self::with_lease_ttl(jobs, Duration::minutes(DEFAULT_LEASE_TTL_MINUTES))
    }

    pub fn with_lease_ttl(jobs: Arc<ImportJobRepository>, lease_ttl: Duration) -> Self {
        Self { jobs, lease_ttl }
    }

    /// 尝试占用作业
    ///
    /// # 错误
    /// - PipelineError::Concurrency: 租约被其他操作持有
    /// - PipelineError::Repository(NotFound): 作业不存在
    pub fn acquire(&self, job_id: &str) -> PipelineResult<JobLockGuard> {
        let owner = format!("{}-{}", std::process::id(), Uuid::new_v4().simple());
        let stale_before = Utc::now() - self.lease_ttl;

        if !self.jobs.claim_pass(job_id, &owner, stale_before)? {
            debug!(job_id = %job_id, "作业租约被占用");
            return Err(PipelineError::Concurrency {
                job_id: job_id.to_string(),
            });
        }

        Ok(JobLockGuard {
            job_id: job_id.to_string(),
            owner,
            jobs: Arc::clone(&self.jobs),
        })
    }
}

/// 作业租约 Guard：drop 时释放
pub struct JobLockGuard {
    job_id: String,
    owner: String,
    jobs: Arc<ImportJobRepository>,
}

impl std::fmt::Debug for JobLockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobLockGuard")
            .field("job_id", &self.job_id)
            .field("owner", &self.owner)
            .finish_non_exhaustive()
    }
}

impl JobLockGuard {
    pub fn job_id(&self) -> &str {
        &self.job_id
    }
}

impl Drop for JobLockGuard {
    fn drop(&mut self) {
        match self.jobs.release_pass(&self.job_id, &self.owner) {
            Ok(true) => {}
            // 作业已删除或租约已被接管
            Ok(false) => debug!(job_id = %self.job_id, "租约已不属于当前操作"),
            Err(e) => warn!(job_id = %self.job_id, error = %e, "租约释放失败,将在租期后失效"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::error::RepositoryError;
    use rusqlite::Connection;
    use std::sync::Mutex;

    fn setup() -> (Arc<Mutex<Connection>>, Arc<ImportJobRepository>) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute_batch(
            r#"
            INSERT INTO pos_connector (connector_id, connector_name, parser_kind, company, currency,
                default_customer, default_income_account)
            VALUES ('C1', 'Test', 'RESTOMAX', 'ACME', 'EUR', 'Walk-in', '700000');
            INSERT INTO pos_import_job (job_id, connector_id, stage, create_draft_invoices,
                created_at, updated_at)
            VALUES ('J1', 'C1', 'DRAFT', 0, '', ''), ('J2', 'C1', 'DRAFT', 0, '', '');
            "#,
        )
        .unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let repo = Arc::new(ImportJobRepository::from_connection(Arc::clone(&conn)));
        (conn, repo)
    }

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let (_conn, repo) = setup();
        let registry = JobLockRegistry::new(Arc::clone(&repo));
        let guard = registry.acquire("J1").unwrap();
        assert_eq!(guard.job_id(), "J1");

        let err = registry.acquire("J1").unwrap_err();
        assert!(matches!(err, PipelineError::Concurrency { .. }));

        // 其他作业不受影响
        let other = registry.acquire("J2").unwrap();
        drop(other);

        drop(guard);
        assert_eq!(repo.pass_owner("J1").unwrap(), None);
        assert!(registry.acquire("J1").is_ok());
    }

    #[test]
    fn test_lease_is_shared_between_registries() {
        let (_conn, repo) = setup();
        let first = JobLockRegistry::new(Arc::clone(&repo));
        let second = JobLockRegistry::new(Arc::clone(&repo));

        let guard = first.acquire("J1").unwrap();
        assert!(matches!(
            second.acquire("J1"),
            Err(PipelineError::Concurrency { .. })
        ));
        drop(guard);
        assert!(second.acquire("J1").is_ok());
    }

    #[test]
    fn test_stale_lease_is_taken_over() {
        let (conn, repo) = setup();
        conn.lock()
            .unwrap()
            .execute(
                "UPDATE pos_import_job SET pass_owner = 'crashed', pass_started_at = '2000-01-01T00:00:00.000Z' WHERE job_id = 'J1'",
                [],
            )
            .unwrap();

        let registry = JobLockRegistry::new(Arc::clone(&repo));
        let guard = registry.acquire("J1").unwrap();
        assert_ne!(repo.pass_owner("J1").unwrap().as_deref(), Some("crashed"));
        drop(guard);
        assert_eq!(repo.pass_owner("J1").unwrap(), None);
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let (_conn, repo) = setup();
        let registry = JobLockRegistry::new(repo);
        assert!(matches!(
            registry.acquire("NOPE"),
            Err(PipelineError::Repository(RepositoryError::NotFound { .. }))
        ));
    }
}
