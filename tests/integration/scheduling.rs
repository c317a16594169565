//! Single-flight dispatch, async delivery, frame budget and failure handling.

use std::sync::Arc;
use std::time::Duration;

use sprite_resampler::sprite_scale::Size;
use sprite_resampler::{Bounds, Quad, SourceDesc, SpriteEngine};

use crate::common::init_logging;
use crate::common::scalers::{CountingScaler, OomScaler};
use crate::common::sources::{async_config, sheet, sync_config};

const WAIT: Duration = Duration::from_secs(10);

#[test]
fn test_concurrent_requests_share_one_compute() {
    init_logging();
    let scaler = Arc::new(CountingScaler::slow(Duration::from_millis(20)));
    let engine = SpriteEngine::builder(sync_config()).scaler(scaler.clone()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    std::thread::scope(|scope| {
        for _ in 0..8 {
            scope.spawn(|| {
                // Off the render thread nothing can be installed yet.
                assert!(engine.on_draw_request(handle, bounds, 2).is_none());
            });
        }
    });

    let stats = engine.stats();
    assert_eq!(scaler.calls(), 1);
    assert_eq!(stats.dispatches_sync, 1);
    assert_eq!(stats.dedup_attaches, 7);

    assert_eq!(engine.pump(), 1);
    let image = engine.on_draw_request(handle, bounds, 2).unwrap();
    assert_eq!(image.unpadded_size.w, 32);
    assert_eq!(scaler.calls(), 1);
    assert_eq!(engine.scheduler().in_flight(), 0);
}

/// 64x64 sheet of 16x16 sprites, each with a transparent one-texel border.
fn bordered_sheet() -> SourceDesc {
    let pixels = (0..64u32 * 64)
        .flat_map(|i| {
            let (x, y) = (i % 64, i / 64);
            let edge = matches!(x % 16, 0 | 15) || matches!(y % 16, 0 | 15);
            [(x * 4) as u8, (y * 4) as u8, 128, if edge { 0 } else { 255 }]
        })
        .collect();
    SourceDesc::rgba8(Some("Characters/Abigail"), 64, 64, pixels)
}

#[test]
fn test_async_sprite_is_ready_after_wait_idle() {
    let engine = SpriteEngine::builder(async_config(2)).build().unwrap();
    let handle = engine.register_source(bordered_sheet()).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);

    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 4).is_none());
    assert!(engine.wait_idle(WAIT));

    let key = engine.key_for(handle, bounds, 4).unwrap();
    let entry = engine.fetch(&key).unwrap();
    assert!(entry.is_ready());
    let image = engine.on_draw_request(handle, bounds, 4).unwrap();
    assert_eq!(image.unpadded_size, Size::new(64, 64));
    // Two texels of padding on every side, scaled by 4.
    assert_eq!(image.padding, Quad::new(8, 8, 8, 8));
    assert_eq!(image.size, Size::new(80, 80));
    assert_eq!(image.scale, 4);
    assert_eq!(engine.stats().dispatches_async, 1);
}

#[test]
fn test_async_request_lands_after_pump() {
    let scaler = Arc::new(CountingScaler::slow(Duration::from_millis(30)));
    let engine = SpriteEngine::builder(async_config(2)).scaler(scaler.clone()).build().unwrap();
    let handle = engine.register_source(sheet("TileSheets/crops", 64, 64, 2)).unwrap();
    let bounds = Bounds::new(16, 16, 16, 16);

    engine.begin_frame();
    for _ in 0..5 {
        assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    }
    let stats = engine.stats();
    assert_eq!(stats.dispatches_async, 1);
    assert_eq!(stats.dedup_attaches, 4);
    engine.end_frame();

    let mut image = None;
    for _ in 0..500 {
        engine.begin_frame();
        engine.pump();
        image = engine.on_draw_request(handle, bounds, 2);
        engine.end_frame();
        if image.is_some() {
            break;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    let image = image.expect("async result never installed");
    assert_eq!(image.unpadded_size.h, 32);
    assert_eq!(scaler.calls(), 1);
    assert_eq!(engine.stats().installs, 1);
}

#[test]
fn test_many_async_regions_complete() {
    let engine = SpriteEngine::builder(async_config(4)).build().unwrap();
    let handle = engine.register_source(sheet("TileSheets/Craftables", 128, 128, 3)).unwrap();
    engine.begin_frame();
    for i in 0..8 {
        for j in 0..8 {
            let _ = engine.on_draw_request(handle, Bounds::new(i * 16, j * 16, 16, 16), 2);
        }
    }
    assert!(engine.wait_idle(WAIT));
    assert_eq!(engine.active_len(), 64);
    assert_eq!(engine.stats().installs, 64);
    for i in 0..8 {
        assert!(engine.on_draw_request(handle, Bounds::new(i * 16, 0, 16, 16), 2).is_some());
    }
}

#[test]
fn test_over_budget_work_is_declined() {
    let mut config = sync_config();
    config.frame_budget.enabled = true;
    config.frame_budget.target_frame_time_us = 1_000;
    config.frame_budget.safety_margin_us = 0;
    let engine = SpriteEngine::builder(config.clone()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);

    // A millisecond per texel: 256 texels never fit a 1 ms frame.
    engine.scheduler().timers().seed_all(1_000_000.0);
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    let stats = engine.stats();
    assert_eq!(stats.budget_declines, 1);
    assert_eq!(stats.dispatches_sync, 0);
    assert_eq!(engine.active_len(), 0);
    assert_eq!(engine.scheduler().in_flight(), 0);
    engine.end_frame();

    config.frame_budget.enabled = false;
    engine.reload_config(config).unwrap();
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 2).is_some());
}

#[test]
fn test_out_of_memory_retries_once_then_abandons() {
    init_logging();
    let scaler = Arc::new(OomScaler::default());
    let engine = SpriteEngine::builder(sync_config()).scaler(scaler.clone()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 5)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert_eq!(scaler.calls(), 2);
    let stats = engine.stats();
    assert_eq!(stats.oom_retries, 1);
    assert_eq!(stats.compute_failures, 1);
    assert_eq!(engine.active_len(), 0);

    // Abandoned at this revision.
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert_eq!(scaler.calls(), 2);

    // New content is worth another try.
    engine.on_source_content_changed(handle, None);
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert_eq!(scaler.calls(), 4);
}

#[test]
fn test_async_failure_is_reported_through_pump() {
    let scaler = Arc::new(OomScaler::default());
    let engine = SpriteEngine::builder(async_config(1)).scaler(scaler.clone()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 6)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert!(engine.wait_idle(WAIT));
    assert_eq!(engine.stats().compute_failures, 1);
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert_eq!(engine.stats().dispatches_async, 1);
}
