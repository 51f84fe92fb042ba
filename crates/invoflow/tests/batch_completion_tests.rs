//! At-most-once batch notification under concurrent completion checks.

mod common;

use common::{FileBuilder, TestHarness};

use invoflow::db::{file_repo, folder_repo};
use invoflow::{BatchOutcome, FileStatus, RenameFormat};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_checks_send_one_email() {
    let h = TestHarness::new();
    let folder = h.folder(RenameFormat::InvoiceDate);
    for (id, status) in [
        ("a", FileStatus::Completed),
        ("b", FileStatus::Completed),
        ("c", FileStatus::Failed),
    ] {
        file_repo::insert(&h.db, &FileBuilder::new(id, &folder.id).status(status).build())
            .unwrap();
    }

    let checks = (0..16).map(|_| {
        let service = h.queue_service.clone();
        let folder_id = folder.id.clone();
        tokio::spawn(async move { service.handle_batch_completion(&folder_id, "b1").await })
    });
    let outcomes: Vec<BatchOutcome> = futures_util::future::join_all(checks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    assert_eq!(outcomes.iter().filter(|o| o.is_notified()).count(), 1);
    assert_eq!(
        outcomes
            .iter()
            .filter(|o| matches!(o, BatchOutcome::AlreadyNotified(_)))
            .count(),
        15
    );

    let sent = h.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        (sent[0].total_files, sent[0].completed_files, sent[0].failed_files),
        (3, 2, 1)
    );
    assert_eq!(folder_repo::notified_batches(&h.db, &folder.id).unwrap(), vec!["b1"]);
}

#[tokio::test]
async fn test_incomplete_batch_is_not_notified() {
    let h = TestHarness::new();
    let folder = h.folder(RenameFormat::InvoiceDate);
    file_repo::insert(
        &h.db,
        &FileBuilder::new("a", &folder.id).status(FileStatus::Completed).build(),
    )
    .unwrap();
    file_repo::insert(
        &h.db,
        &FileBuilder::new("b", &folder.id).status(FileStatus::Processing).build(),
    )
    .unwrap();

    let outcome = h
        .queue_service
        .handle_batch_completion(&folder.id, "b1")
        .await
        .unwrap();
    assert!(matches!(outcome, BatchOutcome::Pending(s) if s.processing == 1));
    assert!(h.notifier.sent().is_empty());
    assert!(folder_repo::notified_batches(&h.db, &folder.id).unwrap().is_empty());
}

#[tokio::test]
async fn test_deleted_files_do_not_hold_a_batch_open() {
    let h = TestHarness::new();
    let folder = h.folder(RenameFormat::InvoiceDate);
    file_repo::insert(
        &h.db,
        &FileBuilder::new("a", &folder.id).status(FileStatus::Completed).build(),
    )
    .unwrap();
    file_repo::insert(&h.db, &FileBuilder::new("gone", &folder.id).deleted().build()).unwrap();

    let outcome = h
        .queue_service
        .handle_batch_completion(&folder.id, "b1")
        .await
        .unwrap();
    assert!(outcome.is_notified());
    assert_eq!(outcome.summary().total, 1);
}

#[tokio::test]
async fn test_batches_are_notified_independently() {
    let h = TestHarness::new();
    let folder = h.folder(RenameFormat::InvoiceDate);
    for (id, batch) in [("a", "b1"), ("b", "b2")] {
        file_repo::insert(
            &h.db,
            &FileBuilder::new(id, &folder.id)
                .status(FileStatus::Completed)
                .batch(batch)
                .build(),
        )
        .unwrap();
    }

    for batch in ["b1", "b2", "b1"] {
        h.queue_service
            .handle_batch_completion(&folder.id, batch)
            .await
            .unwrap();
    }
    assert_eq!(h.notifier.sent().len(), 2);
}
