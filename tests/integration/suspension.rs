//! Source disposal, suspension and resurrection by content hash.

use std::sync::Arc;

use sprite_resampler::sprite_scale::presets::ScalerKind;
use sprite_resampler::{Bounds, HeadlessDevice, SpriteEngine, SpriteState};

use crate::common::sources::{sheet, sync_config};

#[test]
fn test_reloaded_source_resurrects_identical_sprite() {
    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(sync_config(), device.clone()).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    let image = engine.on_draw_request(first, bounds, 2).unwrap();
    let texture = image.texture();
    drop(image);

    assert_eq!(engine.on_source_disposed(first), 1);
    assert_eq!(engine.active_len(), 0);
    assert_eq!(engine.suspended_len(), 1);
    assert!(engine.on_draw_request(first, bounds, 2).is_none());

    let second = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    let image = engine.on_draw_request(second, bounds, 2).unwrap();
    assert_eq!(image.texture(), texture);
    assert_eq!(engine.suspended_len(), 0);
    assert_eq!(engine.active_len(), 1);

    let stats = engine.stats();
    assert_eq!(stats.suspended_resurrections, 1);
    assert_eq!(stats.dispatches_sync, 1);
    assert_eq!(device.created(), 1);
}

#[test]
fn test_different_content_is_not_resurrected() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    assert!(engine.on_draw_request(first, bounds, 2).is_some());
    engine.on_source_disposed(first);

    let second = engine.register_source(sheet("Characters/Abigail", 32, 32, 8)).unwrap();
    assert!(engine.on_draw_request(second, bounds, 2).is_some());
    let stats = engine.stats();
    assert_eq!(stats.suspended_resurrections, 0);
    assert_eq!(stats.dispatches_sync, 2);
    assert_eq!(engine.suspended_len(), 1);
}

#[test]
fn test_different_scale_is_not_resurrected() {
    let mut config = sync_config();
    config.resample.dynamic_scale = false;
    config.resample.max_scale = 2;
    let engine = SpriteEngine::builder(config.clone()).build().unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    assert!(engine.on_draw_request(first, bounds, 2).is_some());
    engine.on_source_disposed(first);

    // Scale is not part of the hash here, so the geometry check has to catch it.
    config.resample.max_scale = 3;
    engine.reload_config(config).unwrap();
    let second = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    let image = engine.on_draw_request(second, bounds, 2).unwrap();
    assert_eq!(image.scale, 3);
    assert_eq!(engine.stats().suspended_resurrections, 0);
    assert_eq!(engine.suspended_len(), 1);
}

#[test]
fn test_scaler_change_drops_suspended_sprites() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    assert!(engine.on_draw_request(first, bounds, 2).is_some());
    assert_eq!(engine.on_source_disposed(first), 1);
    assert_eq!(engine.suspended_len(), 1);

    let mut epx = sync_config();
    epx.scaler.kind = ScalerKind::Epx;
    engine.reload_config(epx).unwrap();
    assert_eq!(engine.suspended_len(), 0);

    let second = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    assert!(engine.on_draw_request(second, bounds, 2).is_some());
    let entry = engine.fetch(&engine.key_for(second, bounds, 2).unwrap()).unwrap();
    assert_eq!(entry.scaler(), ScalerKind::Epx);
    let stats = engine.stats();
    assert_eq!(stats.suspended_resurrections, 0);
    assert_eq!(stats.dispatches_sync, 2);
}

#[test]
fn test_output_setting_change_drops_suspended_sprites() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();
    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 7)).unwrap();
    assert!(engine.on_draw_request(first, bounds, 2).is_some());
    engine.on_source_disposed(first);

    // Limits only: the suspended sprite is still valid.
    let mut limits = sync_config();
    limits.suspended_cache.max_count = 100;
    engine.reload_config(limits.clone()).unwrap();
    assert_eq!(engine.suspended_len(), 1);

    let mut padding = limits;
    padding.resample.padding.texels = 1;
    engine.reload_config(padding).unwrap();
    assert_eq!(engine.suspended_len(), 0);
}

#[test]
fn test_suspended_cache_evicts_least_recent() {
    let device = Arc::new(HeadlessDevice::new());
    let mut config = sync_config();
    config.suspended_cache.max_count = 1;
    let engine = SpriteEngine::new(config, device.clone()).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let older = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    let newer = engine.register_source(sheet("Characters/Haley", 32, 32, 2)).unwrap();
    assert!(engine.on_draw_request(older, bounds, 2).is_some());
    assert!(engine.on_draw_request(newer, bounds, 2).is_some());

    assert_eq!(engine.on_source_disposed(older), 1);
    assert_eq!(engine.on_source_disposed(newer), 1);
    assert_eq!(engine.suspended_len(), 1);
    assert_eq!(engine.stats().evictions, 1);
    engine.end_frame();
    assert_eq!(device.destroyed(), 1);

    engine.begin_frame();
    let again = engine.register_source(sheet("Characters/Haley", 32, 32, 2)).unwrap();
    assert!(engine.on_draw_request(again, bounds, 2).is_some());
    assert_eq!(engine.stats().suspended_resurrections, 1);

    let evicted = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    assert!(engine.on_draw_request(evicted, bounds, 2).is_some());
    assert_eq!(engine.stats().suspended_resurrections, 1);
    assert_eq!(engine.stats().dispatches_sync, 3);
}

#[test]
fn test_explicit_suspend_and_resurrect() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("TileSheets/crops", 32, 32, 3)).unwrap();
    let bounds = Bounds::new(16, 0, 16, 16);
    engine.begin_frame();

    let entry = engine.fetch_or_create(handle, bounds, 2).unwrap();
    let key = entry.key().unwrap();
    let hash = entry.content_hash();
    assert!(engine.suspend(&entry));
    assert!(matches!(entry.state(), SpriteState::Suspended(_)));
    assert!(entry.key().is_none());
    assert!(engine.fetch(&key).is_none());

    let back = engine.resurrect(hash, key).unwrap();
    assert!(Arc::ptr_eq(&back, &entry));
    assert!(back.is_ready());
    assert!(Arc::ptr_eq(&engine.fetch(&key).unwrap(), &entry));
    assert!(engine.resurrect(hash, key).is_none());
}

#[test]
fn test_disabled_suspended_cache_disposes() {
    let mut config = sync_config();
    config.suspended_cache.enabled = false;
    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(config, device.clone()).unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
    engine.begin_frame();

    assert!(engine.on_draw_request(handle, Bounds::new(0, 0, 16, 16), 2).is_some());
    assert_eq!(engine.on_source_disposed(handle), 0);
    assert_eq!(engine.suspended_len(), 0);
    engine.end_frame();
    assert_eq!(device.live_textures(), 0);
}
