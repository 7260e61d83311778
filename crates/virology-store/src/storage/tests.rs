//! Storage layer tests for the virology store.

use chrono::{DateTime, Utc};
use virology_core::clock::from_epoch_seconds;

use super::{
    ConditionFailure, TestResultRow, TransactWriteError, TransactWriteItem, VirologyDatabase,
};
use crate::domain::{
    CtaToken, DiagnosisKeySubmissionToken, TestEndDate, TestKit, TestOrder, TestResult,
    TestResultPollingToken,
};

async fn test_db() -> VirologyDatabase {
    VirologyDatabase::open_in_memory().await.unwrap()
}

fn at(secs: i64) -> DateTime<Utc> {
    from_epoch_seconds(secs).unwrap()
}

fn order(cta: &str, expire_at: i64) -> TestOrder {
    TestOrder::new(
        CtaToken::of(cta),
        TestResultPollingToken::of(format!("poll-{cta}")),
        DiagnosisKeySubmissionToken::of(format!("sub-{cta}")),
        at(expire_at),
    )
}

fn pending(cta: &str, expire_at: i64) -> TransactWriteItem {
    TransactWriteItem::PutPendingResult {
        polling_token: TestResultPollingToken::of(format!("poll-{cta}")),
        expire_at: at(expire_at),
    }
}

fn submission(cta: &str, expire_at: i64) -> TransactWriteItem {
    TransactWriteItem::PutSubmissionToken {
        submission_token: DiagnosisKeySubmissionToken::of(format!("sub-{cta}")),
        test_kit: TestKit::LabResult,
        expire_at: at(expire_at),
    }
}

fn mark_available(cta: &str, result: TestResult) -> TransactWriteItem {
    TransactWriteItem::MarkResultAvailable {
        polling_token: TestResultPollingToken::of(format!("poll-{cta}")),
        test_end_date: TestEndDate::parse("2020-12-01").unwrap(),
        test_result: result,
        test_kit: TestKit::RapidResult,
    }
}

// === Order tests ===

#[tokio::test]
async fn put_order_and_pending_result_together() {
    let db = test_db().await;
    db.transact_write(&[
        TransactWriteItem::PutTestOrder(order("cc8f0b6z", 100)),
        pending("cc8f0b6z", 100),
    ])
    .await
    .unwrap();

    let stored = db.get_test_order("cc8f0b6z").await.unwrap().unwrap();
    assert_eq!(stored.test_result_polling_token, "poll-cc8f0b6z");
    assert_eq!(stored.diagnosis_key_submission_token, "sub-cc8f0b6z");
    assert_eq!(stored.expire_at, 100);
    assert_eq!(stored.download_count, None);

    let result = db.get_test_result("poll-cc8f0b6z").await.unwrap().unwrap();
    assert_eq!(result.status.as_deref(), Some("pending"));
    assert_eq!(result.test_kit, None);
    assert_eq!(result.expire_at, Some(100));
}

#[tokio::test]
async fn find_order_by_polling_token() {
    let db = test_db().await;
    db.transact_write(&[TransactWriteItem::PutTestOrder(order("abc", 100))])
        .await
        .unwrap();

    let found = db
        .find_test_order_by_polling_token("poll-abc")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.cta_token, "abc");
    assert!(
        db.find_test_order_by_polling_token("poll-missing")
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn duplicate_cta_token_cancels_whole_transaction() {
    let db = test_db().await;
    db.transact_write(&[TransactWriteItem::PutTestOrder(order("dup", 100))])
        .await
        .unwrap();

    let mut clash = order("dup", 200);
    clash.test_result_polling_token = TestResultPollingToken::of("poll-other");
    let err = db
        .transact_write(&[
            TransactWriteItem::PutTestOrder(clash),
            TransactWriteItem::PutPendingResult {
                polling_token: TestResultPollingToken::of("poll-other"),
                expire_at: at(200),
            },
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransactWriteError::Cancelled(ConditionFailure::OrderTokenExists)
    ));
    let kept = db.get_test_order("dup").await.unwrap().unwrap();
    assert_eq!(kept.expire_at, 100);
    assert!(db.get_test_result("poll-other").await.unwrap().is_none());
}

#[tokio::test]
async fn later_failed_condition_rolls_back_earlier_writes() {
    let db = test_db().await;
    let err = db
        .transact_write(&[
            submission("ghost", 100),
            TransactWriteItem::UpdateSubmissionTokenExpiry {
                submission_token: DiagnosisKeySubmissionToken::of("not-there"),
                expire_at: at(5),
            },
        ])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        TransactWriteError::Cancelled(ConditionFailure::SubmissionTokenMissing)
    ));
    assert!(db.get_submission_token("sub-ghost").await.unwrap().is_none());
}

#[tokio::test]
async fn update_order_expiry_counts_downloads_up_to_limit() {
    let db = test_db().await;
    db.transact_write(&[TransactWriteItem::PutTestOrder(order("dl", 100))])
        .await
        .unwrap();

    let download = |expire_at| TransactWriteItem::UpdateOrderExpiry {
        cta_token: CtaToken::of("dl"),
        expire_at: at(expire_at),
        download_limit: Some(2),
    };

    for expected in 1..=2 {
        db.transact_write(&[download(50)]).await.unwrap();
        let stored = db.get_test_order("dl").await.unwrap().unwrap();
        assert_eq!(stored.download_count, Some(expected));
        assert_eq!(stored.expire_at, 50);
    }

    let err = db
        .transact_write(&[download(30), pending("dl", 30)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransactWriteError::Cancelled(ConditionFailure::DownloadLimitReached)
    ));
    let stored = db.get_test_order("dl").await.unwrap().unwrap();
    assert_eq!(stored.download_count, Some(2));
    assert_eq!(stored.expire_at, 50);
    assert!(db.get_test_result("poll-dl").await.unwrap().is_none());

    db.transact_write(&[TransactWriteItem::UpdateOrderExpiry {
        cta_token: CtaToken::of("dl"),
        expire_at: at(10),
        download_limit: None,
    }])
    .await
    .unwrap();
    let stored = db.get_test_order("dl").await.unwrap().unwrap();
    assert_eq!(stored.download_count, Some(2));
    assert_eq!(stored.expire_at, 10);
}

#[tokio::test]
async fn concurrent_downloads_never_exceed_limit() {
    let dir = tempfile::tempdir().unwrap();
    let db = VirologyDatabase::open(&dir.path().join("virology.db"))
        .await
        .unwrap();
    db.transact_write(&[TransactWriteItem::PutTestOrder(order("race", 100))])
        .await
        .unwrap();

    let attempts = (0..8).map(|_| {
        let db = db.clone();
        tokio::spawn(async move {
            db.transact_write(&[TransactWriteItem::UpdateOrderExpiry {
                cta_token: CtaToken::of("race"),
                expire_at: at(50),
                download_limit: Some(2),
            }])
            .await
        })
    });
    let mut counted = 0;
    for attempt in attempts.collect::<Vec<_>>() {
        match attempt.await.unwrap() {
            Ok(()) => counted += 1,
            Err(TransactWriteError::Cancelled(ConditionFailure::DownloadLimitReached)) => {}
            Err(e) => panic!("unexpected error: {e}"),
        }
    }

    assert_eq!(counted, 2);
    let stored = db.get_test_order("race").await.unwrap().unwrap();
    assert_eq!(stored.download_count, Some(2));
}

// === Result tests ===

#[tokio::test]
async fn mark_available_replaces_pending_once() {
    let db = test_db().await;
    db.transact_write(&[pending("res", 100)]).await.unwrap();

    db.transact_write(&[mark_available("res", TestResult::Negative)])
        .await
        .unwrap();

    let stored = db.get_test_result("poll-res").await.unwrap().unwrap();
    assert_eq!(stored.status.as_deref(), Some("available"));
    assert_eq!(stored.test_end_date.as_deref(), Some("2020-12-01T00:00:00Z"));
    assert_eq!(stored.test_result.as_deref(), Some("NEGATIVE"));
    assert_eq!(stored.test_kit.as_deref(), Some("RAPID_RESULT"));
    assert_eq!(stored.expire_at, Some(100));

    let err = db
        .transact_write(&[mark_available("res", TestResult::Positive)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransactWriteError::Cancelled(ConditionFailure::ResultNotPending)
    ));
    let unchanged = db.get_test_result("poll-res").await.unwrap().unwrap();
    assert_eq!(unchanged.test_result.as_deref(), Some("NEGATIVE"));
}

#[tokio::test]
async fn mark_available_on_missing_result_is_cancelled() {
    let db = test_db().await;
    let err = db
        .transact_write(&[mark_available("nothing", TestResult::Void)])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        TransactWriteError::Cancelled(ConditionFailure::ResultNotPending)
    ));
}

#[tokio::test]
async fn raw_result_put_keeps_missing_fields_missing() {
    let db = test_db().await;
    let row = TestResultRow {
        test_result_polling_token: "legacy".to_string(),
        status: Some("available".to_string()),
        test_end_date: Some("2020-04-23T00:00:00Z".to_string()),
        test_result: Some("POSITIVE".to_string()),
        ..TestResultRow::default()
    };
    db.put_test_result(&row).await.unwrap();

    assert_eq!(db.get_test_result("legacy").await.unwrap(), Some(row));
}

// === Submission token tests ===

#[tokio::test]
async fn submission_token_put_update_delete() {
    let db = test_db().await;
    db.transact_write(&[submission("tok", 100)]).await.unwrap();

    db.transact_write(&[TransactWriteItem::UpdateSubmissionTokenExpiry {
        submission_token: DiagnosisKeySubmissionToken::of("sub-tok"),
        expire_at: at(7),
    }])
    .await
    .unwrap();

    let stored = db.get_submission_token("sub-tok").await.unwrap().unwrap();
    assert_eq!(stored.test_kit.as_deref(), Some("LAB_RESULT"));
    assert_eq!(stored.expire_at, Some(7));

    assert!(db.delete_submission_token("sub-tok").await.unwrap());
    assert!(!db.delete_submission_token("sub-tok").await.unwrap());
}

// === Maintenance tests ===

#[tokio::test]
async fn empty_transaction_is_a_no_op() {
    let db = test_db().await;
    db.transact_write(&[]).await.unwrap();
    assert_eq!(db.count_records().await.unwrap().total(), 0);
}

#[tokio::test]
async fn reap_removes_only_expired_records() {
    let db = test_db().await;
    db.transact_write(&[
        TransactWriteItem::PutTestOrder(order("old", 10)),
        pending("old", 10),
        submission("old", 10),
        TransactWriteItem::PutTestOrder(order("new", 1000)),
        pending("new", 1000),
    ])
    .await
    .unwrap();
    db.put_test_result(&TestResultRow {
        test_result_polling_token: "no-ttl".to_string(),
        status: Some("pending".to_string()),
        ..TestResultRow::default()
    })
    .await
    .unwrap();

    let reaped = db.reap_expired(10).await.unwrap();
    assert_eq!(reaped.orders, 1);
    assert_eq!(reaped.results, 1);
    assert_eq!(reaped.submission_tokens, 1);

    let left = db.count_records().await.unwrap();
    assert_eq!(left.orders, 1);
    assert_eq!(left.results, 2);
    assert_eq!(left.submission_tokens, 0);
    assert!(db.get_test_order("new").await.unwrap().is_some());
}

#[tokio::test]
async fn file_database_keeps_records_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("virology.db");

    let db = VirologyDatabase::open(&path).await.unwrap();
    db.transact_write(&[TransactWriteItem::PutTestOrder(order("durable", 100))])
        .await
        .unwrap();
    db.pool().close().await;

    let reopened = VirologyDatabase::open(&path).await.unwrap();
    assert!(reopened.get_test_order("durable").await.unwrap().is_some());
}
