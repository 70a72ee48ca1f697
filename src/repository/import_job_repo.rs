// ==========================================
// POS 导入系统 - 导入作业仓储
// ==========================================
// 职责: pos_import_job / pos_import_row / pos_payment_link 的数据访问
// 红线: Repository 不含业务规则，只做数据 CRUD
// 红线: 行终结为单条 UPDATE（按行原子）
// ==========================================

use crate::domain::job::{ImportJob, ImportRow, PaymentLink};
use crate::domain::preview::PreviewSummary;
use crate::domain::report::PosReport;
use crate::domain::types::{JobStage, RowStatus};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

fn parse_stage(raw: &str) -> RepositoryResult<JobStage> {
    JobStage::parse(raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: "stage".to_string(),
        message: format!("未知阶段: {}", raw),
    })
}

fn parse_status(raw: &str) -> RepositoryResult<RowStatus> {
    RowStatus::parse(raw).ok_or_else(|| RepositoryError::FieldValueError {
        field: "status".to_string(),
        message: format!("未知行状态: {}", raw),
    })
}

// 租约时间戳: 定长毫秒格式,按字符串比较即按时间比较
fn lease_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn job_not_found(job_id: &str) -> RepositoryError {
    RepositoryError::NotFound {
        entity: "ImportJob".to_string(),
        id: job_id.to_string(),
    }
}

// 作业头（不含行）
struct JobHeader {
    job_id: String,
    connector_id: String,
    source_file: Option<String>,
    stage: String,
    create_draft_invoices: bool,
    preview_summary_json: Option<String>,
    import_log: String,
    created_at: String,
    updated_at: String,
}

// ==========================================
// ImportJobRepository
// ==========================================
pub struct ImportJobRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ImportJobRepository {
    /// 创建新的 Repository 实例
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

    // ==========================================
    // 作业
    // ==========================================

    /// 创建作业（行集合为空）
    pub fn create_job(&self, job: &ImportJob) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO pos_import_job (
                job_id, connector_id, source_file, stage, create_draft_invoices,
                preview_summary_json, import_log, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                job.job_id,
                job.connector_id,
                job.source_file,
                job.stage.as_str(),
                job.create_draft_invoices,
                job.preview_summary
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                job.import_log,
                job.created_at.to_rfc3339(),
                job.updated_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// 加载作业及其全部行（按行号升序）
    ///
    /// # 返回
    /// - Ok(Some(ImportJob)): 找到作业
    /// - Ok(None): 未找到
    pub fn load_job(&self, job_id: &str) -> RepositoryResult<Option<ImportJob>> {
        let conn = self.get_conn()?;

        let header = conn
            .query_row(
                r#"
                SELECT job_id, connector_id, source_file, stage, create_draft_invoices,
                       preview_summary_json, import_log, created_at, updated_at
                FROM pos_import_job
                WHERE job_id = ?1
                "#,
                params![job_id],
                |row| {
                    Ok(JobHeader {
                        job_id: row.get(0)?,
                        connector_id: row.get(1)?,
                        source_file: row.get(2)?,
                        stage: row.get(3)?,
                        create_draft_invoices: row.get(4)?,
                        preview_summary_json: row.get(5)?,
                        import_log: row.get(6)?,
                        created_at: row.get(7)?,
                        updated_at: row.get(8)?,
                    })
                },
            )
            .optional()?;

        let header = match header {
            Some(h) => h,
            None => return Ok(None),
        };

        let rows = Self::load_rows_with(&conn, job_id)?;
        let preview_summary: Option<PreviewSummary> = header
            .preview_summary_json
            .as_deref()
            .map(serde_json::from_str)
            .transpose()?;

        Ok(Some(ImportJob {
            job_id: header.job_id,
            connector_id: header.connector_id,
            source_file: header.source_file,
            stage: parse_stage(&header.stage)?,
            create_draft_invoices: header.create_draft_invoices,
            preview_summary,
            import_log: header.import_log,
            rows,
            created_at: parse_timestamp(&header.created_at),
            updated_at: parse_timestamp(&header.updated_at),
        }))
    }

    fn load_rows_with(conn: &Connection, job_id: &str) -> RepositoryResult<Vec<ImportRow>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT row_index, raw_data_json, structural_error, status,
                   target_invoice_id, error_detail
            FROM pos_import_row
            WHERE job_id = ?1
            ORDER BY row_index ASC
            "#,
        )?;

        let raw_rows = stmt.query_map(params![job_id], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
            ))
        })?;

        let mut rows = Vec::new();
        for raw in raw_rows {
            let (index, raw_json, structural_error, status, target_invoice_id, error_detail) = raw?;
            let raw_data: PosReport = serde_json::from_str(&raw_json)?;
            rows.push(ImportRow {
                index: index as usize,
                raw_data,
                structural_error,
                status: parse_status(&status)?,
                target_invoice_id,
                error_detail,
            });
        }
        Ok(rows)
    }

    /// 列出作业（创建时间倒序）: (job_id, stage, source_file)
    pub fn list_jobs(&self) -> RepositoryResult<Vec<(String, JobStage, Option<String>)>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT job_id, stage, source_file FROM pos_import_job ORDER BY created_at DESC, job_id",
        )?;
        let raw = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
            ))
        })?;

        let mut jobs = Vec::new();
        for item in raw {
            let (job_id, stage, source_file) = item?;
            jobs.push((job_id, parse_stage(&stage)?, source_file));
        }
        Ok(jobs)
    }

    /// 原子替换行集合并写入预览摘要,阶段置为 PREVIEWED
    ///
    /// 红线: 仅当阶段为 DRAFT / PREVIEWED 时允许; 否则不做任何修改
    pub fn replace_rows_and_preview(
        &self,
        job_id: &str,
        rows: &[ImportRow],
        summary: &PreviewSummary,
    ) -> RepositoryResult<()> {
        let mut conn = self.get_conn()?;
        let tx = conn
            .transaction()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let stage: Option<String> = tx
            .query_row(
                "SELECT stage FROM pos_import_job WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        let stage = parse_stage(&stage.ok_or_else(|| job_not_found(job_id))?)?;
        if !stage.is_pre_submit() {
            return Err(RepositoryError::InvalidStateTransition {
                from: stage.to_string(),
                to: JobStage::Previewed.to_string(),
            });
        }

        let now = Utc::now().to_rfc3339();
        tx.execute("DELETE FROM pos_import_row WHERE job_id = ?1", params![job_id])?;
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO pos_import_row (
                    job_id, row_index, report_number, raw_data_json, structural_error,
                    status, target_invoice_id, error_detail, updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )?;
            for row in rows {
                stmt.execute(params![
                    job_id,
                    row.index as i64,
                    row.raw_data.report_number,
                    serde_json::to_string(&row.raw_data)?,
                    row.structural_error,
                    row.status.as_str(),
                    row.target_invoice_id,
                    row.error_detail,
                    now,
                ])?;
            }
        }

        tx.execute(
            r#"
            UPDATE pos_import_job
            SET preview_summary_json = ?2, stage = ?3, updated_at = ?4
            WHERE job_id = ?1
            "#,
            params![
                job_id,
                serde_json::to_string(summary)?,
                JobStage::Previewed.as_str(),
                now,
            ],
        )?;

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;
        Ok(())
    }

    /// 阶段置为 SUBMITTED（仅从 DRAFT / PREVIEWED）
    pub fn mark_submitted(&self, job_id: &str) -> RepositoryResult<()> {
        self.transition_stage(job_id, &[JobStage::Draft, JobStage::Previewed], JobStage::Submitted)
    }

    /// 阶段置为 CANCELLED（任意非 CANCELLED 阶段）
    pub fn set_cancelled(&self, job_id: &str) -> RepositoryResult<()> {
        self.transition_stage(
            job_id,
            &[JobStage::Draft, JobStage::Previewed, JobStage::Submitted],
            JobStage::Cancelled,
        )
    }

    fn transition_stage(
        &self,
        job_id: &str,
        from: &[JobStage],
        to: JobStage,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let current: Option<String> = conn
            .query_row(
                "SELECT stage FROM pos_import_job WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        let current = parse_stage(&current.ok_or_else(|| job_not_found(job_id))?)?;

        if !from.contains(&current) {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: to.to_string(),
            });
        }

        // 条件更新: 与读取之间若阶段被改动则影响 0 行
        let affected = conn.execute(
            "UPDATE pos_import_job SET stage = ?2, updated_at = ?3 WHERE job_id = ?1 AND stage = ?4",
            params![job_id, to.as_str(), Utc::now().to_rfc3339(), current.as_str()],
        )?;
        if affected == 0 {
            return Err(RepositoryError::InvalidStateTransition {
                from: current.to_string(),
                to: to.to_string(),
            });
        }
        Ok(())
    }

    /// 追加导入日志
    pub fn append_log(&self, job_id: &str, text: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            "UPDATE pos_import_job SET import_log = import_log || ?2, updated_at = ?3 WHERE job_id = ?1",
            params![job_id, text, Utc::now().to_rfc3339()],
        )?;
        if affected == 0 {
            return Err(job_not_found(job_id));
        }
        Ok(())
    }

    // ==========================================
    // 处理租约
    // ==========================================

    /// 申领作业处理租约（单条条件 UPDATE）
    ///
    /// 租约空闲,或开始时间早于 stale_before（持有者已失联）时可申领
    ///
    /// # 返回
    /// - Ok(true): 申领成功
    /// - Ok(false): 租约被占用
    /// - Err(NotFound): 作业不存在
    pub fn claim_pass(
        &self,
        job_id: &str,
        owner: &str,
        stale_before: DateTime<Utc>,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pos_import_job
            SET pass_owner = ?2, pass_started_at = ?3
            WHERE job_id = ?1 AND (pass_owner IS NULL OR pass_started_at < ?4)
            "#,
            params![
                job_id,
                owner,
                lease_timestamp(Utc::now()),
                lease_timestamp(stale_before)
            ],
        )?;
        if affected == 1 {
            return Ok(true);
        }

        let exists: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM pos_import_job WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        match exists {
            Some(_) => Ok(false),
            None => Err(job_not_found(job_id)),
        }
    }

    /// 释放租约（仅持有者可释放）; 作业已删除时返回 Ok(false)
    pub fn release_pass(&self, job_id: &str, owner: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pos_import_job
            SET pass_owner = NULL, pass_started_at = NULL
            WHERE job_id = ?1 AND pass_owner = ?2
            "#,
            params![job_id, owner],
        )?;
        Ok(affected == 1)
    }

    /// 当前租约持有者
    pub fn pass_owner(&self, job_id: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let owner: Option<Option<String>> = conn
            .query_row(
                "SELECT pass_owner FROM pos_import_job WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;
        owner.ok_or_else(|| job_not_found(job_id))
    }

    // ==========================================
    // 行终结
    // ==========================================

    /// 行成功: 状态、发票引用、清空错误 —— 单条 UPDATE
    ///
    /// # 返回
    /// - Ok(true): 已更新
    /// - Ok(false): 行不存在或已持有发票引用（不覆盖）
    pub fn mark_row_succeeded(
        &self,
        job_id: &str,
        index: usize,
        invoice_id: &str,
    ) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pos_import_row
            SET status = 'SUCCEEDED', target_invoice_id = ?3, error_detail = NULL, updated_at = ?4
            WHERE job_id = ?1 AND row_index = ?2 AND target_invoice_id IS NULL
            "#,
            params![job_id, index as i64, invoice_id, Utc::now().to_rfc3339()],
        )?;
        Ok(affected == 1)
    }

    /// 行失败: 状态与错误详情 —— 单条 UPDATE
    ///
    /// # 返回
    /// - Ok(false): 行不存在或已成功（成功行不可回退）
    pub fn mark_row_failed(&self, job_id: &str, index: usize, error: &str) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let affected = conn.execute(
            r#"
            UPDATE pos_import_row
            SET status = 'FAILED', error_detail = ?3, updated_at = ?4
            WHERE job_id = ?1 AND row_index = ?2 AND status != 'SUCCEEDED'
            "#,
            params![job_id, index as i64, error, Utc::now().to_rfc3339()],
        )?;
        Ok(affected == 1)
    }

    /// 行是否存在（用于区分“作业已消失”与“行已成功”）
    pub fn row_exists(&self, job_id: &str, index: usize) -> RepositoryResult<bool> {
        let conn = self.get_conn()?;
        let found: Option<i64> = conn
            .query_row(
                "SELECT 1 FROM pos_import_row WHERE job_id = ?1 AND row_index = ?2",
                params![job_id, index as i64],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// 删除作业（行与收款关联级联删除）
    pub fn delete_job(&self, job_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        Ok(conn.execute("DELETE FROM pos_import_job WHERE job_id = ?1", params![job_id])?)
    }

    // ==========================================
    // 收款关联
    // ==========================================

    pub fn find_payment_link(&self, invoice_id: &str) -> RepositoryResult<Option<PaymentLink>> {
        let conn = self.get_conn()?;
        let link = conn
            .query_row(
                r#"
                SELECT invoice_id, payment_id, job_id, row_index, created_at
                FROM pos_payment_link
                WHERE invoice_id = ?1
                "#,
                params![invoice_id],
                |row| {
                    Ok(PaymentLink {
                        invoice_id: row.get(0)?,
                        payment_id: row.get(1)?,
                        job_id: row.get(2)?,
                        row_index: row.get::<_, i64>(3)? as usize,
                        created_at: parse_timestamp(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(link)
    }

    /// 写入收款关联; invoice_id 唯一,重复写入返回 UniqueConstraintViolation
    pub fn insert_payment_link(&self, link: &PaymentLink) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO pos_payment_link (invoice_id, payment_id, job_id, row_index, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                link.invoice_id,
                link.payment_id,
                link.job_id,
                link.row_index as i64,
                link.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn count_payment_links(&self, job_id: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM pos_payment_link WHERE job_id = ?1",
            params![job_id],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::preview::PreviewSummary;
    use rust_decimal::Decimal;

    fn setup() -> ImportJobRepository {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::init_schema(&conn).unwrap();
        conn.execute(
            r#"
            INSERT INTO pos_connector (connector_id, connector_name, parser_kind, company, currency,
                default_customer, default_income_account)
            VALUES ('C1', 'Test', 'RESTOMAX', 'ACME', 'EUR', 'Walk-in', '700000')
            "#,
            [],
        )
        .unwrap();
        ImportJobRepository::from_connection(Arc::new(Mutex::new(conn)))
    }

    fn new_job(job_id: &str) -> ImportJob {
        let now = Utc::now();
        ImportJob {
            job_id: job_id.to_string(),
            connector_id: "C1".to_string(),
            source_file: Some("/tmp/z.csv".to_string()),
            stage: JobStage::Draft,
            create_draft_invoices: false,
            preview_summary: None,
            import_log: String::new(),
            rows: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn summary(total_rows: usize) -> PreviewSummary {
        PreviewSummary {
            total_rows,
            valid_rows: total_rows,
            invalid_rows: 0,
            total_revenue: Decimal::ZERO,
            total_tax: Decimal::ZERO,
            total_payments: Decimal::ZERO,
            sample_size: 20,
            sample: Vec::new(),
            structural_errors: Vec::new(),
            skipped_reports: Vec::new(),
        }
    }

    fn rows(n: usize) -> Vec<ImportRow> {
        (0..n)
            .map(|i| ImportRow::pending(i, PosReport::new((i + 1).to_string(), None), None))
            .collect()
    }

    #[test]
    fn test_replace_rows_is_wholesale() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();

        repo.replace_rows_and_preview("J1", &rows(3), &summary(3)).unwrap();
        repo.replace_rows_and_preview("J1", &rows(2), &summary(2)).unwrap();

        let job = repo.load_job("J1").unwrap().unwrap();
        assert_eq!(job.stage, JobStage::Previewed);
        assert_eq!(job.rows.len(), 2);
        assert_eq!(job.preview_summary.unwrap().total_rows, 2);
    }

    #[test]
    fn test_rows_frozen_after_submit() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        repo.replace_rows_and_preview("J1", &rows(2), &summary(2)).unwrap();
        repo.mark_submitted("J1").unwrap();

        let err = repo
            .replace_rows_and_preview("J1", &rows(5), &summary(5))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));
        assert_eq!(repo.load_job("J1").unwrap().unwrap().rows.len(), 2);
    }

    #[test]
    fn test_invoice_reference_is_never_overwritten() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        repo.replace_rows_and_preview("J1", &rows(2), &summary(2)).unwrap();

        assert!(repo.mark_row_failed("J1", 0, "boom").unwrap());
        assert!(repo.mark_row_succeeded("J1", 0, "INV-1").unwrap());
        assert!(!repo.mark_row_succeeded("J1", 0, "INV-2").unwrap());
        assert!(!repo.mark_row_failed("J1", 0, "late").unwrap());

        let job = repo.load_job("J1").unwrap().unwrap();
        assert_eq!(job.rows[0].status, RowStatus::Succeeded);
        assert_eq!(job.rows[0].target_invoice_id.as_deref(), Some("INV-1"));
        assert_eq!(job.rows[0].error_detail, None);
        assert!(job.rows.iter().all(|r| r.is_consistent()));
    }

    #[test]
    fn test_pass_lease_is_exclusive_until_released_or_stale() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        let stale_before = Utc::now() - chrono::Duration::minutes(30);

        assert!(repo.claim_pass("J1", "A", stale_before).unwrap());
        assert!(!repo.claim_pass("J1", "B", stale_before).unwrap());
        assert_eq!(repo.pass_owner("J1").unwrap().as_deref(), Some("A"));

        // 非持有者不能释放
        assert!(!repo.release_pass("J1", "B").unwrap());
        assert!(repo.release_pass("J1", "A").unwrap());
        assert_eq!(repo.pass_owner("J1").unwrap(), None);

        // 过期租约可被接管
        assert!(repo.claim_pass("J1", "A", stale_before).unwrap());
        assert!(repo.claim_pass("J1", "C", Utc::now() + chrono::Duration::seconds(1)).unwrap());
        assert_eq!(repo.pass_owner("J1").unwrap().as_deref(), Some("C"));

        assert!(matches!(
            repo.claim_pass("NOPE", "A", stale_before),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_delete_job_cascades_rows() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        repo.replace_rows_and_preview("J1", &rows(2), &summary(2)).unwrap();

        assert_eq!(repo.delete_job("J1").unwrap(), 1);
        assert!(repo.load_job("J1").unwrap().is_none());
        assert!(!repo.row_exists("J1", 0).unwrap());
        assert!(!repo.mark_row_failed("J1", 1, "gone").unwrap());
        assert_eq!(repo.delete_job("J1").unwrap(), 0);
    }

    #[test]
    fn test_check_constraint_rejects_inconsistent_row() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        let conn = repo.get_conn().unwrap();
        let err = conn
            .execute(
                r#"
                INSERT INTO pos_import_row (job_id, row_index, report_number, raw_data_json,
                    status, target_invoice_id, updated_at)
                VALUES ('J1', 0, '1', '{}', 'PENDING', 'INV-X', '')
                "#,
                [],
            )
            .unwrap_err();
        assert!(matches!(
            RepositoryError::from(err),
            RepositoryError::CheckConstraintViolation(_)
        ));
    }

    #[test]
    fn test_payment_link_is_unique_per_invoice() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        let link = PaymentLink {
            invoice_id: "INV-1".to_string(),
            payment_id: "PAY-1".to_string(),
            job_id: "J1".to_string(),
            row_index: 0,
            created_at: Utc::now(),
        };

        repo.insert_payment_link(&link).unwrap();
        assert!(repo.insert_payment_link(&link).is_err());
        assert_eq!(
            repo.find_payment_link("INV-1").unwrap().unwrap().payment_id,
            "PAY-1"
        );
        assert_eq!(repo.count_payment_links("J1").unwrap(), 1);
    }

    #[test]
    fn test_append_log_and_missing_job() {
        let repo = setup();
        repo.create_job(&new_job("J1")).unwrap();
        repo.append_log("J1", "a\n").unwrap();
        repo.append_log("J1", "b\n").unwrap();
        assert_eq!(repo.load_job("J1").unwrap().unwrap().import_log, "a\nb\n");

        assert!(matches!(
            repo.append_log("NOPE", "x"),
            Err(RepositoryError::NotFound { .. })
        ));
        assert!(repo.load_job("NOPE").unwrap().is_none());
    }
}
