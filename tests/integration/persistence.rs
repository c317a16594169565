//! The on-disk tier shared between engine instances.

use std::sync::Arc;
use std::time::Duration;

use sprite_resampler::cache::codec;
use sprite_resampler::sprite_scale::presets::ScalerKind;
use sprite_resampler::{Bounds, EngineConfig, HeadlessDevice, SpriteEngine};
use tempfile::tempdir;

use crate::common::sources::{async_config, sheet, sync_config};

fn disk_config(directory: &std::path::Path, compress: bool) -> EngineConfig {
    let mut config = sync_config();
    config.persistent_cache.enabled = true;
    config.persistent_cache.directory = directory.to_path_buf();
    config.persistent_cache.compress = compress;
    config
}

fn round_trip(compress: bool) {
    let dir = tempdir().unwrap();
    let config = disk_config(dir.path(), compress);
    let bounds = Bounds::new(8, 8, 16, 16);

    let first_device = Arc::new(HeadlessDevice::new());
    let (hash, expected) = {
        let engine = SpriteEngine::new(config.clone(), first_device.clone()).unwrap();
        let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 9)).unwrap();
        engine.begin_frame();
        let image = engine.on_draw_request(handle, bounds, 3).unwrap();
        let (_, pixels) = first_device.pixels(image.texture()).unwrap();
        let hash = engine.fetch(&engine.key_for(handle, bounds, 3).unwrap()).unwrap().content_hash();
        (hash, pixels)
    };

    let path = dir.path().join(format!("{}.spr", hash));
    let bytes = std::fs::read(&path).unwrap();
    let stored = codec::decode(hash, &bytes).unwrap();
    assert_eq!(stored.pixels, expected);
    assert_eq!(stored.scale, 3);

    let second_device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(config, second_device.clone()).unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 9)).unwrap();
    engine.begin_frame();
    let image = engine.on_draw_request(handle, bounds, 3).unwrap();
    let (_, pixels) = second_device.pixels(image.texture()).unwrap();
    assert_eq!(pixels, expected);
    assert_eq!(image.unpadded_size.w, 48);

    let stats = engine.stats();
    assert_eq!(stats.persistent_hits, 1);
    assert_eq!(stats.resamples, 0);
}

#[test]
fn test_disk_cache_round_trip_compressed() {
    round_trip(true);
}

#[test]
fn test_disk_cache_round_trip_uncompressed() {
    round_trip(false);
}

#[test]
fn test_corrupt_disk_entry_is_replaced() {
    let dir = tempdir().unwrap();
    let config = disk_config(dir.path(), true);
    let bounds = Bounds::new(0, 0, 16, 16);

    let hash = {
        let engine = SpriteEngine::builder(config.clone()).build().unwrap();
        let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
        engine.begin_frame();
        assert!(engine.on_draw_request(handle, bounds, 2).is_some());
        engine.fetch(&engine.key_for(handle, bounds, 2).unwrap()).unwrap().content_hash()
    };
    let path = dir.path().join(format!("{}.spr", hash));
    let mut bytes = std::fs::read(&path).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();

    let engine = SpriteEngine::builder(config).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 1)).unwrap();
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, bounds, 2).is_some());
    let stats = engine.stats();
    assert_eq!(stats.persistent_corrupt, 1);
    assert_eq!(stats.persistent_hits, 0);
    assert_eq!(stats.dispatches_sync, 1);

    // Recomputed and written back.
    let bytes = std::fs::read(&path).unwrap();
    assert!(codec::decode(hash, &bytes).is_ok());
}

#[test]
fn test_entry_written_by_other_scaler_is_recomputed() {
    let dir = tempdir().unwrap();
    let nearest = disk_config(dir.path(), true);
    let mut epx = nearest.clone();
    epx.scaler.kind = ScalerKind::Epx;
    let bounds = Bounds::new(0, 0, 16, 16);

    let (hash, nearest_pixels) = {
        let device = Arc::new(HeadlessDevice::new());
        let engine = SpriteEngine::new(nearest, device.clone()).unwrap();
        let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 3)).unwrap();
        engine.begin_frame();
        let image = engine.on_draw_request(handle, bounds, 2).unwrap();
        let hash = engine.fetch(&engine.key_for(handle, bounds, 2).unwrap()).unwrap().content_hash();
        (hash, device.pixels(image.texture()).unwrap().1)
    };
    let path = dir.path().join(format!("{}.spr", hash));
    assert_eq!(codec::decode(hash, &std::fs::read(&path).unwrap()).unwrap().fingerprint.scaler, ScalerKind::Nearest);

    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(epx, device.clone()).unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 3)).unwrap();
    engine.begin_frame();
    let image = engine.on_draw_request(handle, bounds, 2).unwrap();

    let stats = engine.stats();
    assert_eq!(stats.persistent_hits, 0);
    assert_eq!(stats.persistent_corrupt, 1);
    assert_eq!(stats.resamples, 1);
    let entry = engine.fetch(&engine.key_for(handle, bounds, 2).unwrap()).unwrap();
    assert_eq!(entry.scaler(), ScalerKind::Epx);
    assert_eq!(device.pixels(image.texture()).unwrap().1.len(), nearest_pixels.len());

    // The stored entry now belongs to the current scaler.
    let stored = codec::decode(hash, &std::fs::read(&path).unwrap()).unwrap();
    assert_eq!(stored.fingerprint, entry.fingerprint());
}

#[test]
fn test_persistent_load_runs_on_a_worker() {
    let dir = tempdir().unwrap();
    let mut config = async_config(2);
    config.persistent_cache.enabled = true;
    config.persistent_cache.directory = dir.path().to_path_buf();
    let bounds = Bounds::new(0, 0, 16, 16);

    {
        let engine = SpriteEngine::builder(config.clone()).build().unwrap();
        let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
        engine.begin_frame();
        assert!(engine.on_draw_request(handle, bounds, 2).is_none());
        assert!(engine.wait_idle(Duration::from_secs(10)));
        assert_eq!(engine.stats().resamples, 1);
    }

    let engine = SpriteEngine::builder(config).build().unwrap();
    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 4)).unwrap();
    engine.begin_frame();
    // The hit is not read on the request path.
    assert!(engine.on_draw_request(handle, bounds, 2).is_none());
    assert!(engine.wait_idle(Duration::from_secs(10)));
    assert!(engine.on_draw_request(handle, bounds, 2).is_some());

    let stats = engine.stats();
    assert_eq!(stats.persistent_hits, 1);
    assert_eq!(stats.resamples, 0);
    assert_eq!(stats.dispatches_async, 1);
    assert_eq!(stats.dispatches_sync, 0);
}

#[test]
fn test_enabling_persistence_on_reload_opens_directory() {
    let dir = tempdir().unwrap();
    let directory = dir.path().join("sprites");
    let engine = SpriteEngine::builder(sync_config()).build().unwrap();
    assert!(!directory.exists());

    engine.reload_config(disk_config(&directory, true)).unwrap();
    assert!(directory.is_dir());

    let handle = engine.register_source(sheet("Characters/Abigail", 32, 32, 2)).unwrap();
    engine.begin_frame();
    assert!(engine.on_draw_request(handle, Bounds::new(0, 0, 16, 16), 2).is_some());
    assert_eq!(std::fs::read_dir(&directory).unwrap().count(), 1);
}
