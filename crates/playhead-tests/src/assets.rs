//! Asset sharing across clips: one decode session per source, shared
//! frame cache, exact construction and disposal counts.

use crate::support::{software_uploader, MockBackend};
use playhead_core::FrameKey;
use playhead_media::{RawSurface, SinkOptions};
use playhead_preview::{AssetKind, PreviewConfig, PreviewContext};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_acquires_share_one_session() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = MockBackend::new().gate_source_opens(Arc::clone(&gate));
    let stats = Arc::clone(&backend.stats);
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    let mut tasks = Vec::new();
    for _ in 0..3 {
        let ctx = Arc::clone(&ctx);
        tasks.push(tokio::spawn(async move {
            ctx.acquire_video_asset("clip.mp4", SinkOptions::default())
                .await
        }));
    }
    // Let all three acquires start while the source open is held.
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(3);

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(stats.sources_opened(), 1);
    assert_eq!(
        ctx.registry().ref_count(AssetKind::VideoDecode, "clip.mp4"),
        3
    );
    assert!(Arc::ptr_eq(handles[0].asset(), handles[1].asset()));
    assert!(Arc::ptr_eq(handles[1].asset(), handles[2].asset()));

    for handle in handles {
        handle.release();
    }
    assert!(ctx.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn release_during_construction_disposes_after_it_resolves() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = MockBackend::new().gate_source_opens(Arc::clone(&gate));
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    let acquire = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            ctx.acquire_video_asset("clip.mp4", SinkOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    // The clip is torn down while its asset is still constructing; the
    // by-key release pairs the acquire above.
    ctx.registry().release(AssetKind::VideoDecode, "clip.mp4");
    gate.add_permits(1);

    let result = acquire.await.unwrap();
    assert!(matches!(
        result,
        Err(playhead_preview::PreviewError::ReleasedDuringConstruction)
    ));
    assert!(ctx.registry().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn reacquire_during_construction_revives_the_entry() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = MockBackend::new().gate_source_opens(Arc::clone(&gate));
    let stats = Arc::clone(&backend.stats);
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    let first = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            let handle = ctx
                .acquire_video_asset("clip.mp4", SinkOptions::default())
                .await?;
            // The by-key release below already pairs this acquire.
            std::mem::forget(handle);
            Ok::<_, playhead_preview::PreviewError>(())
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    ctx.registry().release(AssetKind::VideoDecode, "clip.mp4");

    // A new acquire lands before construction resolves: the entry is
    // revived and the freshly constructed value must not be disposed.
    let second = {
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            ctx.acquire_video_asset("clip.mp4", SinkOptions::default())
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(1);

    first.await.unwrap().unwrap();
    let handle = second.await.unwrap().unwrap();

    assert_eq!(stats.sources_opened(), 1);
    assert_eq!(
        ctx.registry().ref_count(AssetKind::VideoDecode, "clip.mp4"),
        1
    );
    assert_eq!(handle.session.uri(), "clip.mp4");

    handle.release();
    assert!(ctx.registry().is_empty());
}

#[tokio::test]
async fn distinct_sources_get_distinct_sessions() {
    let backend = MockBackend::new();
    let stats = Arc::clone(&backend.stats);
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    let a = ctx
        .acquire_video_asset("a.mp4", SinkOptions::default())
        .await
        .unwrap();
    let b = ctx
        .acquire_video_asset("b.mp4", SinkOptions::default())
        .await
        .unwrap();

    assert_eq!(stats.sources_opened(), 2);
    assert_eq!(ctx.registry().len(), 2);
    assert!(!Arc::ptr_eq(a.asset(), b.asset()));
}

#[tokio::test]
async fn failed_open_propagates_and_later_acquire_retries() {
    let backend = MockBackend::new().without_video();
    let stats = Arc::clone(&backend.stats);
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    assert!(ctx
        .acquire_video_asset("silent.mp4", SinkOptions::default())
        .await
        .is_err());
    assert!(ctx.registry().is_empty());

    // The failure is not sticky in the registry: the next acquire
    // constructs from scratch.
    assert!(ctx
        .acquire_video_asset("silent.mp4", SinkOptions::default())
        .await
        .is_err());
    assert_eq!(stats.sources_opened(), 2);
}

#[tokio::test]
async fn frame_cache_is_shared_between_holders() {
    let backend = MockBackend::new();
    let ctx = PreviewContext::new(
        Arc::new(backend),
        software_uploader(),
        PreviewConfig::default(),
    );

    let a = ctx
        .acquire_video_asset("clip.mp4", SinkOptions::default())
        .await
        .unwrap();
    let b = ctx
        .acquire_video_asset("clip.mp4", SinkOptions::default())
        .await
        .unwrap();

    let image = ctx
        .uploader()
        .wrap(RawSurface::solid(4, 4, [9, 9, 9, 255]))
        .unwrap();
    a.frame_cache.store(FrameKey(42), image.clone());

    let hit = b.frame_cache.get(FrameKey(42)).unwrap();
    assert_eq!(hit.id(), image.id());
}
