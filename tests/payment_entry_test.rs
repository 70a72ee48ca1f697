// ==========================================
// 收款单生成集成测试
// ==========================================
// 职责: 验证草稿发票模式下收款单的幂等生成
// ==========================================


#[cfg(test)]
mod payment_entry_test {
    use pos_import::domain::invoice::PaymentRequest;
    use pos_import::engine::PaymentGateway;
    use pos_import::JobPhase;
    use rust_decimal::Decimal;

    use crate::test_helpers::{numbered_reports, setup_env, COMPANY};

    #[tokio::test]
    async fn test_payment_entries_are_created_once_per_invoice() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(3)).await;
        let submitted = env.api.submit(&job_id).await.unwrap();
        assert_eq!(submitted.phase, JobPhase::Completed);

        let first = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert!(first.no_op_reason.is_none());
        assert_eq!(first.created.len(), 3);
        assert_eq!(first.already_linked, 0);
        assert!(first.failures.is_empty());

        // 收款金额取报表总额: 1 号报表净额 110 + 税 11
        let view = env.api.get_job(&job_id).await.unwrap();
        let invoice_id = view.rows[0].target_invoice_id.clone().unwrap();
        assert_eq!(env.ledger.count_payments(&invoice_id).unwrap(), 1);
        let invoice = env.ledger.get_invoice(&invoice_id).unwrap().unwrap();
        assert_eq!(invoice.grand_total.parse::<Decimal>().unwrap(), Decimal::from(121));
        assert_eq!(invoice.docstatus, 0);

        let second = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert!(second.created.is_empty());
        assert_eq!(second.already_linked, 3);
        assert_eq!(env.payments.calls(), 3);
        assert_eq!(env.ledger.count_payments(&invoice_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_payment_created_before_link_write_is_reused() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(2)).await;
        env.api.submit(&job_id).await.unwrap();

        // 收款单已入账但关联未写入
        let view = env.api.get_job(&job_id).await.unwrap();
        let invoice_id = view.rows[0].target_invoice_id.clone().unwrap();
        let orphan_payment = env
            .ledger
            .create_payment_entry(&PaymentRequest {
                invoice_id: invoice_id.clone(),
                company: COMPANY.to_string(),
                party: "Walk-in".to_string(),
                posting_date: None,
                amount: Decimal::from(121),
            })
            .await
            .unwrap();

        let result = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert_eq!(result.created.len(), 2);
        assert!(result.failures.is_empty());
        let link = result
            .created
            .iter()
            .find(|l| l.invoice_id == invoice_id)
            .unwrap();
        assert_eq!(link.payment_id, orphan_payment);
        assert_eq!(env.ledger.count_payments(&invoice_id).unwrap(), 1);
    }

    #[tokio::test]
    async fn test_second_draft_job_reuses_referenced_drafts() {
        let env = setup_env(true);
        let reports = numbered_reports(2);
        let first_job = env.job_with_reports(&reports).await;
        let second_job = env.job_with_reports(&reports).await;

        assert_eq!(env.api.submit(&first_job).await.unwrap().phase, JobPhase::Completed);
        assert_eq!(env.api.submit(&second_job).await.unwrap().phase, JobPhase::Completed);

        // 首个作业的发票引用仍然有效
        let first = env.api.get_job(&first_job).await.unwrap();
        let second = env.api.get_job(&second_job).await.unwrap();
        for (a, b) in first.rows.iter().zip(&second.rows) {
            let invoice_id = a.target_invoice_id.clone().unwrap();
            assert!(env.ledger.get_invoice(&invoice_id).unwrap().is_some());
            assert_eq!(b.target_invoice_id.as_deref(), Some(invoice_id.as_str()));
        }
        assert_eq!(env.ledger.count_invoices(COMPANY).unwrap(), 2);
        assert_eq!(
            env.ledger
                .find_active_by_reference(COMPANY, "Z-1")
                .unwrap()
                .unwrap()
                .invoice_id,
            first.rows[0].target_invoice_id.clone().unwrap()
        );

        let payments = env.api.create_pending_payment_entries(&first_job).await.unwrap();
        assert_eq!(payments.created.len(), 2);
        assert!(payments.failures.is_empty());
        let again = env.api.create_pending_payment_entries(&second_job).await.unwrap();
        assert_eq!(again.already_linked, 2);
    }

    #[tokio::test]
    async fn test_payment_failures_are_collected_and_retried() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(3)).await;
        env.api.submit(&job_id).await.unwrap();

        let view = env.api.get_job(&job_id).await.unwrap();
        let rejected = view.rows[1].target_invoice_id.clone().unwrap();
        env.payments.fail_invoice(&rejected);

        let first = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert_eq!(first.created.len(), 2);
        assert_eq!(first.failures.len(), 1);
        assert_eq!(first.failures[0].index, 1);
        assert_eq!(first.failures[0].invoice_id, rejected);

        env.payments.heal_all();
        let second = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.created[0].invoice_id, rejected);
        assert_eq!(second.already_linked, 2);
    }

    #[tokio::test]
    async fn test_payment_entries_cover_succeeded_rows_of_partial_job() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(3)).await;
        env.invoices.fail_reference("Z-2");
        let submitted = env.api.submit(&job_id).await.unwrap();
        assert_eq!(submitted.phase, JobPhase::PartiallyFailed);

        let result = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        let indices: Vec<usize> = result.created.iter().map(|l| l.row_index).collect();
        assert_eq!(indices, vec![0, 2]);
    }

    // ==========================================
    // 前置条件不满足: 空操作
    // ==========================================

    #[tokio::test]
    async fn test_payment_entries_noop_without_draft_mode() {
        let env = setup_env(false);
        let job_id = env.job_with_reports(&numbered_reports(2)).await;
        env.api.submit(&job_id).await.unwrap();

        let result = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert!(result.no_op_reason.is_some());
        assert!(result.created.is_empty());
        assert_eq!(env.payments.calls(), 0);
    }

    #[tokio::test]
    async fn test_payment_entries_noop_before_processing_settles() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(2)).await;
        env.api.preview_import(&job_id).await.unwrap();

        let result = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert!(result.no_op_reason.unwrap().contains("PREVIEWED"));
        assert_eq!(env.payments.calls(), 0);
    }

    #[tokio::test]
    async fn test_payment_entries_noop_when_every_row_failed() {
        let env = setup_env(true);
        let job_id = env.job_with_reports(&numbered_reports(2)).await;
        env.invoices.fail_reference("Z-1");
        env.invoices.fail_reference("Z-2");
        env.api.submit(&job_id).await.unwrap();

        let result = env.api.create_pending_payment_entries(&job_id).await.unwrap();
        assert_eq!(result.no_op_reason.as_deref(), Some("作业没有成功行"));
    }
}
