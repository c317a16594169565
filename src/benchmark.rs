/// Frame-loop benchmark for the sprite engine.
///
/// Simulates a game drawing sprites out of a few sheets for a number of
/// frames, with sheets occasionally unloaded and reloaded, and reports how
/// long draw calls took and how the cache tiers answered them.
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use sprite_resampler::sprite_scale::presets::ScalerKind;
use sprite_resampler::{Bounds, EngineConfig, HeadlessDevice, SourceDesc, SourceHandle, SpriteEngine};

#[derive(Parser, Debug)]
#[command(name = "benchmark")]
#[command(about = "Simulated frame loop against the sprite engine")]
struct Args {
    /// Frames to simulate
    #[arg(short, long, default_value_t = 600)]
    frames: u32,

    /// Draw calls per frame
    #[arg(short, long, default_value_t = 200)]
    draws: u32,

    /// Scaler: nearest, epx, lanczos
    #[arg(long, default_value = "lanczos")]
    scaler: String,

    /// Run everything synchronously on the render thread
    #[arg(long)]
    sync: bool,
}

const SHEET_SIZE: u32 = 256;
const TILE: u32 = 16;

/// xorshift; deterministic runs without pulling in an RNG.
struct Rng(u64);

impl Rng {
    fn next(&mut self) -> u64 {
        self.0 ^= self.0 << 13;
        self.0 ^= self.0 >> 7;
        self.0 ^= self.0 << 17;
        self.0
    }

    fn below(&mut self, n: u32) -> u32 {
        (self.next() % n as u64) as u32
    }
}

fn sheet_pixels(seed: u32) -> Vec<u8> {
    (0..SHEET_SIZE * SHEET_SIZE)
        .flat_map(|i| {
            let (x, y) = (i % SHEET_SIZE, i / SHEET_SIZE);
            let tile = (x / TILE + y / TILE * 31 + seed) as u8;
            let alpha = if x % TILE == 0 || y % TILE == 0 { 0 } else { 255 };
            [tile.wrapping_mul(37), (x as u8) ^ tile, (y as u8).wrapping_add(seed as u8), alpha]
        })
        .collect()
}

fn register(engine: &SpriteEngine, index: u32) -> anyhow::Result<SourceHandle> {
    let name = format!("TileSheets/sheet{}", index);
    Ok(engine.register_source(SourceDesc::rgba8(Some(name.as_str()), SHEET_SIZE, SHEET_SIZE, sheet_pixels(index)))?)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new().filter(None, log::LevelFilter::Warn).parse_default_env().init();

    let mut config = EngineConfig::default();
    config.scaler.kind = ScalerKind::from_name(&args.scaler).ok_or_else(|| anyhow::anyhow!("Unknown scaler: {}", args.scaler))?;
    config.async_scaling.enabled = !args.sync;

    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(config, device.clone())?;
    let mut sheets: Vec<SourceHandle> = (0..4).map(|i| register(&engine, i)).collect::<anyhow::Result<_>>()?;

    println!("Sprite Engine Benchmark");
    println!("═══════════════════════════════════");
    println!(
        "{} frames × {} draws, {} scaler, {}",
        args.frames,
        args.draws,
        args.scaler,
        if args.sync { "synchronous" } else { "async workers" }
    );

    let mut rng = Rng(0x9E37_79B9_7F4A_7C15);
    let tiles = SHEET_SIZE / TILE;
    let mut draw_time = Duration::ZERO;
    let mut worst_frame = Duration::ZERO;
    let mut served = 0u64;
    let started = Instant::now();

    for frame in 0..args.frames {
        engine.begin_frame();
        let frame_start = Instant::now();

        for _ in 0..args.draws {
            let sheet = sheets[rng.below(sheets.len() as u32) as usize];
            let bounds = Bounds::new(rng.below(tiles) * TILE, rng.below(tiles) * TILE, TILE, TILE);
            let call = Instant::now();
            if engine.on_draw_request(sheet, bounds, 4).is_some() {
                served += 1;
            }
            draw_time += call.elapsed();
        }

        // Unload and reload a sheet now and then.
        if frame % 120 == 119 {
            let index = rng.below(sheets.len() as u32) as usize;
            engine.on_source_disposed(sheets[index]);
            sheets[index] = register(&engine, index as u32)?;
        }

        engine.end_frame();
        worst_frame = worst_frame.max(frame_start.elapsed());
    }
    engine.wait_idle(Duration::from_secs(30));
    let total = started.elapsed();
    let calls = args.frames as u64 * args.draws as u64;

    println!();
    println!("Results:");
    println!("───────────");
    println!("Total: {:.2} s ({:.2} ms per frame)", total.as_secs_f64(), total.as_secs_f64() * 1000.0 / args.frames as f64);
    println!("Worst frame: {:.2} ms", worst_frame.as_secs_f64() * 1000.0);
    println!("Draw call: {:.2} µs average", draw_time.as_secs_f64() * 1e6 / calls as f64);
    println!("Served resampled: {:.1}%", served as f64 * 100.0 / calls as f64);
    println!("Live textures: {}", device.live_textures());
    println!();
    println!("{}", engine.stats().report());
    Ok(())
}
