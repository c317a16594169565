//! Hot reload and the scale/hash semantics selected by `dynamic_scale`.

use std::sync::Arc;

use sprite_resampler::core::hash::content_hash;
use sprite_resampler::sprite_scale::presets::ScalerKind;
use sprite_resampler::{Bounds, EngineConfig, SpriteEngine};

use crate::common::sources::{opaque, sheet, sync_config};

#[test]
fn test_reload_blacklist_applies_to_next_request() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 2).is_some());

    let mut config = sync_config();
    config.resample.blacklist = vec!["characters/*".to_string()];
    let generation = engine.reload_config(config).unwrap();
    assert_eq!(generation, 2);

    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert_eq!(engine.stats().ineligible, 1);
}

#[test]
fn test_invalid_reload_keeps_running_config() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let mut bad = sync_config();
    bad.resample.max_scale = 0;
    assert!(engine.reload_config(bad).is_err());
    assert_eq!(engine.config().resample.max_scale, 6);
    assert_eq!(*engine.config(), sync_config());
}

#[test]
fn test_scaler_change_recomputes_existing_sprites() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 2)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();
    let nearest = engine.fetch_or_create(handle, bounds, 2).unwrap();
    assert_eq!(nearest.scaler(), ScalerKind::Nearest);

    let mut config = sync_config();
    config.scaler.kind = ScalerKind::Epx;
    engine.reload_config(config).unwrap();

    let epx = engine.fetch_or_create(handle, bounds, 2).unwrap();
    assert_eq!(epx.scaler(), ScalerKind::Epx);
    assert!(!Arc::ptr_eq(&nearest, &epx));
    assert!(nearest.is_disposed());
    assert_eq!(engine.stats().dispatches_sync, 2);
}

#[test]
fn test_disabling_suspended_cache_on_reload_clears_it() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 3)).unwrap();
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, Bounds::new(0, 0, 16, 16), 2).is_some());
    engine.on_source_disposed(handle);
    assert_eq!(engine.suspended_len(), 1);

    let mut config = sync_config();
    config.suspended_cache.enabled = false;
    engine.reload_config(config).unwrap();
    assert_eq!(engine.suspended_len(), 0);
    assert_eq!(engine.stats().evictions, 1);
}

#[test]
fn test_reload_from_json() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let config = EngineConfig::from_json_str(r#"{ "resample": { "max_scale": 3 }, "async_scaling": { "enabled": false } }"#)
        .unwrap();
    engine.reload_config(config).unwrap();
    let snapshot = engine.config();
    assert_eq!(snapshot.resample.max_scale, 3);
    assert!(!snapshot.async_scaling.enabled);
    assert!(snapshot.resample.dynamic_scale);
}

#[test]
fn test_dynamic_scale_keys_and_hashes_by_scale() {
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let double = engine.fetch_or_create(handle, bounds, 2).unwrap();
    let triple = engine.fetch_or_create(handle, bounds, 3).unwrap();
    assert_ne!(double.key().unwrap(), triple.key().unwrap());
    assert_ne!(double.content_hash(), triple.content_hash());
    assert_eq!(engine.stats().dispatches_sync, 2);

    let key = triple.key().unwrap();
    let expected = content_hash(&opaque(32, 32, 4), 32, bounds, Some(3), key.class);
    assert_eq!(triple.content_hash(), expected);

    // Requests above the ceiling clamp to it.
    let clamped = engine.key_for(handle, bounds, 40).unwrap();
    assert_eq!(clamped.scale, 6);
}

#[test]
fn test_fixed_scale_shares_one_sprite() {
    let mut config = sync_config();
    config.resample.dynamic_scale = false;
    config.resample.max_scale = 4;
    let engine = SpriteEngine::builder(config).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 5)).unwrap();
    let bounds = Bounds::new(0, 0, 16, 16);
    engine.begin_frame();

    let double = engine.fetch_or_create(handle, bounds, 2).unwrap();
    let triple = engine.fetch_or_create(handle, bounds, 3).unwrap();
    assert!(Arc::ptr_eq(&double, &triple));
    assert_eq!(double.key().unwrap().scale, 4);
    assert_eq!(engine.stats().dispatches_sync, 1);
    assert_eq!(engine.stats().active_hits, 1);

    let key = double.key().unwrap();
    let expected = content_hash(&opaque(32, 32, 5), 32, bounds, None, key.class);
    assert_eq!(double.content_hash(), expected);
}
