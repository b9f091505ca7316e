mod common;

use chrono::Utc;
use common::{MockTarget, TestContext, test_config};
use sea_orm::{ActiveModelTrait, Set};
use temp_media::config::TempMediaConfig;
use temp_media::entities::temp_media::{self as temp_media_entity, TempMediaStatus};
use temp_media::models::{CustomProperties, OwnerToken, TempMediaTransferDto};
use temp_media::services::notifications::TempMediaEvent;
use tokio::sync::watch;

#[tokio::test]
async fn test_sweep_purges_expired_and_keeps_active() {
    let mut ctx = TestContext::new().await;
    let active = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    let expired = ctx.upload_png("b.png", OwnerToken::session("s1")).await;
    ctx.force_expire(&expired.id).await;
    ctx.drain_events();

    let purged = ctx.services.sweeper.sweep().await.unwrap();

    assert_eq!(purged, 1);
    assert!(ctx.row(&expired.id).await.is_none());
    assert!(ctx.row(&active.id).await.is_some());
    assert!(ctx.staged_file_exists(&active.id).await);
    assert_eq!(ctx.staged_file_count(), 1);

    let events = ctx.drain_events();
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        TempMediaEvent::Expired { temp_media } if temp_media.id == expired.id
            && temp_media.status == TempMediaStatus::Expired
    ));
}

#[tokio::test]
async fn test_sweep_tolerates_missing_files() {
    let ctx = TestContext::new().await;
    let expired = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    ctx.force_expire(&expired.id).await;
    let key = ctx.row(&expired.id).await.unwrap().file_path;
    std::fs::remove_file(ctx.staging.base_path().join(key)).unwrap();

    assert_eq!(ctx.services.sweeper.sweep().await.unwrap(), 1);
    assert!(ctx.row(&expired.id).await.is_none());
}

#[tokio::test]
async fn test_processed_retention_is_respected() {
    let ctx = TestContext::with_config(TempMediaConfig {
        processed_retention_hours: 1,
        ..test_config()
    })
    .await;
    let a = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    let b = ctx.upload_png("b.png", OwnerToken::session("s1")).await;
    ctx.services
        .temp_media
        .mark_as_processed(&[a.id.clone(), b.id.clone()])
        .await
        .unwrap();

    // only `a` is past the grace period
    let row = ctx.row(&a.id).await.unwrap();
    let mut old: temp_media_entity::ActiveModel = row.into();
    old.processed_at = Set(Some(Utc::now() - chrono::Duration::hours(2)));
    old.update(&ctx.db).await.unwrap();

    let purged = ctx.services.transfer.cleanup_processed_temp_media().await.unwrap();

    assert_eq!(purged, 1);
    assert!(ctx.row(&a.id).await.is_none());
    assert_eq!(ctx.row(&b.id).await.unwrap().status, TempMediaStatus::Processed);
}

#[tokio::test]
async fn test_cleanup_never_removes_active_records() {
    let ctx = TestContext::new().await;
    let active = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    let done = ctx.upload_png("b.png", OwnerToken::session("s1")).await;

    ctx.services
        .transfer
        .transfer_temp_media_to_model(
            &MockTarget::new("1"),
            TempMediaTransferDto::new([done.id.clone()]),
            "gallery",
            CustomProperties::new(),
        )
        .await
        .unwrap();

    ctx.services.transfer.cleanup_processed_temp_media().await.unwrap();

    assert_eq!(ctx.row(&active.id).await.unwrap().status, TempMediaStatus::Active);
    assert!(ctx.row(&done.id).await.is_none());
    assert_eq!(
        ctx.services
            .temp_media
            .store()
            .count_with_status(TempMediaStatus::Processed)
            .await
            .unwrap(),
        0
    );
}

#[tokio::test]
async fn test_sweep_works_in_batches() {
    let ctx = TestContext::with_config(TempMediaConfig {
        sweep_batch_size: 2,
        ..test_config()
    })
    .await;

    let mut ids = Vec::new();
    for i in 0..5 {
        let dto = ctx.upload_png(&format!("{}.png", i), OwnerToken::session("s1")).await;
        ctx.force_expire(&dto.id).await;
        ids.push(dto.id);
    }

    assert_eq!(ctx.services.sweeper.purge_expired().await.unwrap(), 5);
    for id in &ids {
        assert!(ctx.row(id).await.is_none());
    }
    assert_eq!(ctx.staged_file_count(), 0);
}

#[tokio::test]
async fn test_sweep_skips_claimed_records() {
    let ctx = TestContext::new().await;
    let dto = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    let store = ctx.services.temp_media.store();
    let now = Utc::now();

    assert!(store.claim(&dto.id, "transfer-1", now).await.unwrap());
    ctx.force_expire(&dto.id).await;

    assert_eq!(ctx.services.sweeper.sweep().await.unwrap(), 0);
    assert!(ctx.row(&dto.id).await.is_some());

    // once released the sweeper can reclaim it
    assert!(store.release_claim(&dto.id, "transfer-1").await.unwrap());
    assert_eq!(ctx.services.sweeper.sweep().await.unwrap(), 1);
}

#[tokio::test]
async fn test_run_stops_on_shutdown() {
    let ctx = TestContext::with_config(TempMediaConfig {
        sweep_interval_secs: 3600,
        ..test_config()
    })
    .await;
    let expired = ctx.upload_png("a.png", OwnerToken::session("s1")).await;
    ctx.force_expire(&expired.id).await;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(ctx.services.sweeper.clone().run(shutdown_rx));

    // the first tick fires immediately
    for _ in 0..50 {
        if ctx.row(&expired.id).await.is_none() {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert!(ctx.row(&expired.id).await.is_none());

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(std::time::Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();
}
