//! Content changes: stale serving, region-limited invalidation, revalidation
//! of unchanged regions and pixel writes.

use std::sync::Arc;
use std::time::Duration;

use sprite_resampler::{Bounds, HeadlessDevice, SpriteEngine, SpriteState};

use crate::common::init_logging;
use crate::common::scalers::CountingScaler;
use crate::common::sources::{async_config, opaque, sheet, sync_config};

const WAIT: Duration = Duration::from_secs(10);

#[test]
fn test_stale_image_served_until_fresh_result_lands() {
    init_logging();
    let device = Arc::new(HeadlessDevice::new());
    let scaler = Arc::new(CountingScaler::slow(Duration::from_millis(20)));
    let engine = SpriteEngine::builder(async_config(2))
        .device(device.clone())
        .scaler(scaler.clone())
        .build()
        .unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);

    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert!(engine.wait_idle(WAIT));
    let first = engine.on_draw_request(handle, bounds, 2).unwrap();
    let old_texture = first.texture();
    drop(first);

    engine.write_source_pixels(handle, Bounds::full(32, 32), &opaque(32, 32, 9)).unwrap();
    let stale = engine.on_draw_request(handle, bounds, 2).unwrap();
    assert_eq!(stale.texture(), old_texture);
    assert_eq!(engine.stats().stale_serves, 1);
    assert_eq!(engine.stats().dispatches_async, 2);
    drop(stale);

    assert!(engine.wait_idle(WAIT));
    let fresh = engine.on_draw_request(handle, bounds, 2).unwrap();
    assert_ne!(fresh.texture(), old_texture);
    assert_eq!(scaler.calls(), 2);
    assert_eq!(engine.active_len(), 1);

    engine.end_frame();
    assert!(device.pixels(old_texture).is_none());
    assert_eq!(device.live_textures(), 1);
}

#[test]
fn test_change_outside_region_keeps_sprite_fresh() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("TileSheets/crops", 32, 32, 2)).unwrap();
    let left = Bounds::new(0, 0, 16, 16);
    let right = Bounds::new(16, 16, 16, 16);
    engine.begin_frame();
    let left_entry = engine.fetch_or_create(handle, left, 2).unwrap();
    let right_entry = engine.fetch_or_create(handle, right, 2).unwrap();

    let red: Vec<u8> = [255, 0, 0, 255].repeat(4 * 4);
    engine.write_source_pixels(handle, Bounds::new(0, 0, 4, 4), &red).unwrap();
    assert!(matches!(left_entry.state(), SpriteState::Invalidated(Some(_))));
    assert!(right_entry.is_ready());

    let again = engine.fetch_or_create(handle, right, 2).unwrap();
    assert!(Arc::ptr_eq(&again, &right_entry));
    assert_eq!(engine.stats().active_hits, 1);
    assert_eq!(engine.stats().dispatches_sync, 2);

    let recomputed = engine.fetch_or_create(handle, left, 2).unwrap();
    assert!(!Arc::ptr_eq(&recomputed, &left_entry));
    assert!(recomputed.is_ready());
    assert!(left_entry.is_disposed());
    assert_eq!(engine.stats().dispatches_sync, 3);
}

#[test]
fn test_unchanged_region_is_revalidated() {
    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(sync_config(), device.clone()).unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 6)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let entry = engine.fetch_or_create(handle, bounds, 2).unwrap();
    let texture = entry.image().unwrap().texture();
    let source = engine.source(handle).unwrap();
    let mut same = vec![0; bounds.size().byte_len()];
    source.copy_region(bounds, &mut same).unwrap();

    // Same bytes written back: new revision, same content hash.
    let revision = engine.write_source_pixels(handle, bounds, &same).unwrap();
    assert!(matches!(entry.state(), SpriteState::Invalidated(Some(_))));

    let again = engine.fetch_or_create(handle, bounds, 2).unwrap();
    assert!(Arc::ptr_eq(&again, &entry));
    assert!(again.is_ready());
    assert_eq!(again.source_revision(), revision);
    assert_eq!(again.image().unwrap().texture(), texture);

    let stats = engine.stats();
    assert_eq!(stats.revalidations, 1);
    assert_eq!(stats.dispatches_sync, 1);
    assert_eq!(stats.stale_serves, 0);
    assert_eq!(engine.scheduler().in_flight(), 0);

    // A change notification without a write revalidates too.
    engine.on_source_content_changed(handle, None);
    assert!(Arc::ptr_eq(&engine.fetch_or_create(handle, bounds, 2).unwrap(), &entry));
    assert_eq!(engine.stats().revalidations, 2);
    engine.end_frame();
    assert_eq!(device.live_textures(), 1);
}

#[test]
fn test_written_pixels_reach_the_next_resample() {
    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(sync_config(), device.clone()).unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 16, 16, 3)).unwrap();
    let bounds = Bounds::new(0, 0, 8, 8);
    engine.begin_frame();

    let before = engine.on_draw_request(handle, bounds, 2).unwrap();
    let (_, old_pixels) = device.pixels(before.texture()).unwrap();
    let old_hash = engine.fetch(&engine.key_for(handle, bounds, 2).unwrap()).unwrap().content_hash();
    drop(before);

    let red: Vec<u8> = [255, 0, 0, 255].repeat(4 * 4);
    let revision = engine.write_source_pixels(handle, Bounds::new(2, 2, 4, 4), &red).unwrap();
    assert_eq!(engine.source(handle).unwrap().revision(), revision);

    let after = engine.on_draw_request(handle, bounds, 2).unwrap();
    let (_, new_pixels) = device.pixels(after.texture()).unwrap();
    assert_ne!(old_pixels, new_pixels);
    let new_hash = engine.fetch(&engine.key_for(handle, bounds, 2).unwrap()).unwrap().content_hash();
    assert_ne!(old_hash, new_hash);
}

#[test]
fn test_result_for_old_revision_is_discarded() {
    let scaler = Arc::new(CountingScaler::slow(Duration::from_millis(50)));
    let engine = SpriteEngine::builder(async_config(1)).scaler(scaler.clone()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    // Changed while the worker is still busy with revision 1.
    engine.on_source_content_changed(handle, None);
    assert!(engine.wait_idle(WAIT));

    let stats = engine.stats();
    assert_eq!(stats.stale_discards, 1);
    assert_eq!(stats.installs, 0);
    assert_eq!(engine.active_len(), 0);

    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert!(engine.wait_idle(WAIT));
    assert!(engine.on_draw_request(handle, bounds, 2).is_some());
    assert_eq!(scaler.calls(), 2);
}

#[test]
fn test_locked_source_defers_without_abandoning() {
    init_logging();
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 5)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    let source = engine.source(handle).unwrap();
    engine.begin_frame();

    {
        let _writer = source.lock_for_write();
        assert!(engine.on_draw_request(handle, bounds, 2).is_none());
        assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    }
    let stats = engine.stats();
    assert_eq!(stats.blocked_reads, 2);
    assert_eq!(stats.dispatches_sync, 0);
    assert_eq!(engine.scheduler().in_flight(), 0);

    assert!(engine.on_draw_request(handle, bounds, 2).is_some());
}
