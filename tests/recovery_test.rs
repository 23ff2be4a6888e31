//! Startup recovery settles every unfinished job in the database, so it lives
//! in its own test binary and never races the other pipeline tests.

mod helpers;

use helpers::{csv_file, seed_reference_data, setup, staged_rows, valid_row, wait_for_terminal};
use recognition_import::db::{jobs, recognitions};
use recognition_import::models::job::JobStatus;
use uuid::Uuid;

#[tokio::test]
#[ignore]
async fn test_recover_settles_unfinished_jobs() {
    let ctx = setup().await;
    let f = seed_reference_data(&ctx.pool).await;

    // PENDING with its upload still on disk: queued again.
    let survivor = Uuid::new_v4();
    let pending = jobs::create_job(&ctx.pool, "survivor.csv").await.unwrap();
    let pending_path = ctx.upload_for(pending.id);
    std::fs::write(&pending_path, csv_file(&[valid_row(&f, survivor)])).unwrap();
    jobs::set_upload_path(&ctx.pool, pending.id, &pending_path.to_string_lossy())
        .await
        .unwrap();

    // PENDING whose upload vanished.
    let lost = jobs::create_job(&ctx.pool, "lost.csv").await.unwrap();
    let lost_path = ctx.upload_for(lost.id);
    jobs::set_upload_path(&ctx.pool, lost.id, &lost_path.to_string_lossy())
        .await
        .unwrap();

    // RUNNING when the previous process died.
    let running = jobs::create_job(&ctx.pool, "interrupted.csv").await.unwrap();
    let running_path = ctx.upload_for(running.id);
    std::fs::write(&running_path, csv_file(&[valid_row(&f, Uuid::new_v4())])).unwrap();
    jobs::set_upload_path(&ctx.pool, running.id, &running_path.to_string_lossy())
        .await
        .unwrap();
    assert!(jobs::mark_running(&ctx.pool, running.id).await.unwrap());

    let requeued = ctx.imports.recover().await.expect("Recovery failed");
    assert!(requeued >= 1);

    let job = wait_for_terminal(&ctx.pool, pending.id).await;
    assert_eq!(job.status, JobStatus::Success);
    assert_eq!(job.success_count, 1);
    assert_eq!(recognitions::count_by_uuids(&ctx.pool, &[survivor]).await.unwrap(), 1);
    assert!(!pending_path.exists());

    let job = wait_for_terminal(&ctx.pool, lost.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure_reason.as_deref(), Some("upload lost before processing"));

    let job = wait_for_terminal(&ctx.pool, running.id).await;
    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.failure_reason.as_deref(), Some("interrupted by restart"));
    assert_eq!(staged_rows(&ctx.pool, running.id).await, 0);
    assert!(!running_path.exists());

    // Settled jobs are not picked up twice.
    let unfinished = jobs::list_unfinished(&ctx.pool).await.unwrap();
    assert!(unfinished
        .iter()
        .all(|j| ![pending.id, lost.id, running.id].contains(&j.id)));
}
