//! Texture lifetime: created and destroyed on the render thread, exactly once.

use std::sync::Arc;

use sprite_resampler::{Bounds, SpriteEngine};

use crate::common::devices::RecordingDevice;
use crate::common::sources::{opaque, sheet, sync_config};

#[test]
fn test_every_texture_destroyed_exactly_once() {
    let device = Arc::new(RecordingDevice::new());
    {
        let engine = SpriteEngine::new(sync_config(), device.clone()).unwrap();
        let handle = engine.register_source(sheet("TileSheets/crops", 64, 64, 1)).unwrap();
        let regions: Vec<Bounds> = (0..4).map(|i| Bounds::new(i * 16, 0, 16, 16)).collect();
        engine.begin_frame();

        let images: Vec<_> = regions
            .iter()
            .map(|bounds| engine.on_draw_request(handle, *bounds, 2).unwrap())
            .collect();
        // Last references dropped off the render thread.
        std::thread::spawn(move || drop(images)).join().unwrap();
        engine.end_frame();
        assert_eq!(device.live(), 4);

        engine.begin_frame();
        engine.write_source_pixels(handle, Bounds::full(64, 64), &opaque(64, 64, 9)).unwrap();
        for bounds in &regions {
            assert!(engine.on_draw_request(handle, *bounds, 2).is_some());
        }
        engine.end_frame();
        assert_eq!(device.created().len(), 8);
        assert_eq!(device.live(), 4);

        assert_eq!(engine.on_source_disposed(handle), 4);
        engine.end_frame();
        assert_eq!(device.live(), 4);
    }

    let created = device.created();
    let destroyed = device.destroy_counts();
    assert_eq!(created.len(), 8);
    assert_eq!(destroyed.len(), created.len());
    for id in &created {
        assert_eq!(destroyed.get(id), Some(&1), "texture {:?}", id);
    }
}

#[test]
fn test_active_bytes_ceiling_purges_oldest() {
    let device = Arc::new(RecordingDevice::new());
    let mut config = sync_config();
    // Two 32x32 RGBA textures.
    config.memory.max_active_bytes = 2 * 32 * 32 * 4;
    config.resample.padding.enabled = false;
    let engine = SpriteEngine::new(config, device.clone()).unwrap();
    let handle = engine.register_source(sheet("TileSheets/crops", 64, 16, 2)).unwrap();

    for i in 0..4 {
        engine.begin_frame();
        assert!(engine.on_draw_request(handle, Bounds::new(i * 16, 0, 16, 16), 2).is_some());
        engine.end_frame();
    }
    assert_eq!(engine.active_len(), 2);
    assert!(engine.active_bytes() <= 2 * 32 * 32 * 4);
    assert_eq!(device.live(), 2);

    // The newest two survived.
    let key = engine.key_for(handle, Bounds::new(48, 0, 16, 16), 2).unwrap();
    assert!(engine.fetch(&key).is_some());
    let key = engine.key_for(handle, Bounds::new(0, 0, 16, 16), 2).unwrap();
    assert!(engine.fetch(&key).is_none());
}

#[test]
fn test_purge_all_releases_everything() {
    let device = Arc::new(RecordingDevice::new());
    let engine = SpriteEngine::new(sync_config(), device.clone()).unwrap();
    let first = engine.register_source(sheet("Characters/Abigail", 32, 32, 3)).unwrap();
    let second = engine.register_source(sheet("Characters/Haley", 32, 32, 4)).unwrap();
    engine.begin_frame();
    assert!(engine.on_draw_request(first, Bounds::new(0, 0, 16, 16), 2).is_some());
    assert!(engine.on_draw_request(second, Bounds::new(0, 0, 16, 16), 2).is_some());
    engine.on_source_disposed(second);
    assert_eq!(engine.suspended_len(), 1);

    engine.purge_all();
    assert_eq!(engine.active_len(), 0);
    assert_eq!(engine.suspended_len(), 0);
    assert_eq!(engine.pending_releases(), 0);
    assert_eq!(device.live(), 0);
}
