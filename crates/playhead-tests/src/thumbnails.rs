//! Thumbnail cache behavior: LRU bounds, in-flight deduplication,
//! keyframe memoization, and native-size resolution.

use crate::support::{software_uploader, MockBackend};
use playhead_preview::{PreviewConfig, ThumbnailCache, ThumbnailKey};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

fn cache_over(backend: MockBackend, capacity: usize) -> ThumbnailCache {
    let config = PreviewConfig {
        thumbnail_capacity: capacity,
        ..PreviewConfig::default()
    };
    ThumbnailCache::new(Arc::new(backend), software_uploader(), &config)
}

#[tokio::test]
async fn bitmaps_are_bounded_and_evict_least_recent() {
    let backend = MockBackend::new();
    let cache = cache_over(backend, 3);

    for t in [0.0, 1.0, 2.0, 3.0] {
        cache.thumbnail("a.mp4", t, 32, 18).await.unwrap();
    }

    assert_eq!(cache.bitmap_count(), 3);
    let oldest = ThumbnailKey {
        source: "a.mp4".to_string(),
        time_key: cache.time_key(0.0),
        width: 32,
        height: 18,
    };
    let newest = ThumbnailKey {
        source: "a.mp4".to_string(),
        time_key: cache.time_key(3.0),
        width: 32,
        height: 18,
    };
    assert!(!cache.contains_bitmap(&oldest));
    assert!(cache.contains_bitmap(&newest));
    assert_eq!(cache.bitmap_stats().evictions, 1);
}

#[tokio::test]
async fn full_capacity_holds_eight_hundred_bitmaps() {
    let backend = MockBackend::new();
    let cache = cache_over(backend, 800);

    // 801 distinct grid slots into an 800-entry cache.
    for i in 0..=800u32 {
        let t = f64::from(i) * 0.5;
        cache.thumbnail("a.mp4", t, 16, 9).await.unwrap();
    }

    assert_eq!(cache.bitmap_count(), 800);
    assert_eq!(cache.bitmap_stats().evictions, 1);
    let first = ThumbnailKey {
        source: "a.mp4".to_string(),
        time_key: cache.time_key(0.0),
        width: 16,
        height: 9,
    };
    let second = ThumbnailKey {
        source: "a.mp4".to_string(),
        time_key: cache.time_key(0.5),
        width: 16,
        height: 9,
    };
    assert!(!cache.contains_bitmap(&first));
    assert!(cache.contains_bitmap(&second));
}

#[tokio::test]
async fn thumbnails_are_scaled_to_the_requested_size() {
    let backend = MockBackend::new();
    let cache = cache_over(backend, 8);

    let image = cache.thumbnail("a.mp4", 1.5, 32, 18).await.unwrap();
    assert_eq!((image.width(), image.height()), (32, 18));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn concurrent_requests_share_one_decode() {
    let gate = Arc::new(Semaphore::new(0));
    let backend = MockBackend::new().gate_stream_opens(Arc::clone(&gate));
    let stats = Arc::clone(&backend.stats);
    let cache = Arc::new(cache_over(backend, 8));

    let first = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.thumbnail("a.mp4", 2.0, 32, 18).await })
    };
    let second = {
        let cache = Arc::clone(&cache);
        tokio::spawn(async move { cache.thumbnail("a.mp4", 2.0, 32, 18).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    gate.add_permits(1);

    let a = first.await.unwrap().unwrap();
    let b = second.await.unwrap().unwrap();

    assert_eq!(a.id(), b.id());
    assert_eq!(stats.streams_opened(), 1);
}

#[tokio::test]
async fn keyframe_lookup_is_memoized_per_grid_slot() {
    let backend = MockBackend::new();
    let cache = cache_over(backend, 8);

    // Same quantized time at two sizes: two renders, one keyframe query.
    cache.thumbnail("a.mp4", 1.2, 32, 18).await.unwrap();
    cache.thumbnail("a.mp4", 1.2, 64, 36).await.unwrap();

    let stats = cache.keyframe_stats();
    assert_eq!(stats.misses, 1);
    assert_eq!(stats.hits, 1);
}

#[tokio::test]
async fn keyframe_snaps_down_to_the_keyframe_grid() {
    let backend = MockBackend::new();
    let stats = Arc::clone(&backend.stats);
    let cache = cache_over(backend, 8);

    cache.thumbnail("a.mp4", 2.7, 32, 18).await.unwrap();
    let times = stats.open_times();
    assert!((times[0] - 2.0).abs() < 1e-9);
}

#[tokio::test]
async fn native_size_is_resolved_once_per_source() {
    let backend = MockBackend::new();
    let stats = Arc::clone(&backend.stats);
    let cache = cache_over(backend, 8);

    assert_eq!(cache.native_size("a.mp4").await.unwrap(), (64, 36));
    assert_eq!(cache.native_size("a.mp4").await.unwrap(), (64, 36));
    assert_eq!(stats.sources_opened(), 1);
}

#[tokio::test]
async fn sourceless_media_surfaces_an_error() {
    let backend = MockBackend::new().without_video();
    let cache = cache_over(backend, 8);

    assert!(cache.thumbnail("silent.mp4", 0.0, 32, 18).await.is_err());
}

#[tokio::test]
async fn strip_renders_the_requested_count() {
    let backend = MockBackend::new();
    let cache = cache_over(backend, 16);

    let strip = cache
        .thumbnail_strip("a.mp4", 0.0, 8.0, 4, 32, 18)
        .await
        .unwrap();
    assert_eq!(strip.len(), 4);
    assert_eq!(cache.bitmap_count(), 4);
}
