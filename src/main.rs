use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use sprite_resampler::cache::codec;
use sprite_resampler::sprite_scale::presets::ScalerKind;
use sprite_resampler::{Bounds, ContentHash, EngineConfig, HeadlessDevice, SourceDesc, SpriteEngine};

/// Upscale sprites the way the engine would at draw time, and inspect its caches.
#[derive(Parser, Debug)]
#[command(name = "spritecache")]
#[command(about = "Resample sprite regions and inspect persisted sprite caches")]
struct Args {
    /// Engine configuration (JSON); defaults apply to missing keys
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log more (repeat for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Resample one region of a PNG and write the result
    Upscale {
        /// Source image
        input: PathBuf,

        /// Output PNG path
        #[arg(short, long, default_value = "sprite.png")]
        output: PathBuf,

        /// Region as x,y,width,height (defaults to the whole image)
        #[arg(short, long)]
        region: Option<String>,

        /// Requested scale multiplier
        #[arg(short, long, default_value_t = 4)]
        scale: u32,

        /// Scaler override: nearest, epx, lanczos
        #[arg(long)]
        scaler: Option<String>,

        /// Name to register the image under (affects blacklist and slicing rules)
        #[arg(long)]
        name: Option<String>,
    },
    /// Print the header of a persisted sprite entry
    Inspect {
        /// A `<hash>.spr` file
        entry: PathBuf,
    },
    /// Print the effective configuration as JSON
    Config,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_log(args.verbose);

    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path).with_context(|| format!("loading {}", path.display()))?,
        None => EngineConfig::default(),
    };

    match args.command {
        Command::Upscale {
            input,
            output,
            region,
            scale,
            scaler,
            name,
        } => {
            if let Some(scaler) = scaler {
                config.scaler.kind =
                    ScalerKind::from_name(&scaler).ok_or_else(|| anyhow!("Unknown scaler: {}", scaler))?;
            }
            upscale(config, &input, &output, region.as_deref(), scale, name)
        }
        Command::Inspect { entry } => inspect(&entry),
        Command::Config => {
            println!("{}", config.to_json_string()?);
            Ok(())
        }
    }
}

fn init_log(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Info,
        1 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter(None, level)
        .parse_default_env()
        .format_timestamp_millis()
        .init();
}

/// Parse "x,y,w,h"
fn parse_region(text: &str) -> Result<Bounds> {
    let parts: Vec<u32> = text
        .split(',')
        .map(|p| p.trim().parse::<u32>())
        .collect::<Result<_, _>>()
        .map_err(|e| anyhow!("Invalid region '{}': {}", text, e))?;
    match parts.as_slice() {
        [x, y, w, h] => Ok(Bounds::new(*x, *y, *w, *h)),
        _ => Err(anyhow!("Invalid region '{}': expected x,y,width,height", text)),
    }
}

fn upscale(
    config: EngineConfig,
    input: &Path,
    output: &Path,
    region: Option<&str>,
    scale: u32,
    name: Option<String>,
) -> Result<()> {
    let image = image::open(input)
        .with_context(|| format!("opening {}", input.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    let bounds = match region {
        Some(text) => parse_region(text)?,
        None => Bounds::full(width, height),
    };

    let device = Arc::new(HeadlessDevice::new());
    let engine = SpriteEngine::new(config, device.clone())?;
    let name = name.unwrap_or_else(|| input.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default());
    let handle = engine.register_source(SourceDesc::rgba8(Some(name.as_str()), width, height, image.into_raw()))?;

    engine.begin_frame();
    let mut sprite = engine.on_draw_request(handle, bounds, scale);
    if sprite.is_none() {
        engine.wait_idle(Duration::from_secs(60));
        sprite = engine.on_draw_request(handle, bounds, scale);
    }
    let sprite = sprite.ok_or_else(|| anyhow!("{} {} was not resampled (see log for the reason)", name, bounds))?;
    engine.end_frame();

    let (desc, pixels) = device
        .pixels(sprite.texture())
        .ok_or_else(|| anyhow!("texture {:?} missing from device", sprite.texture()))?;
    let out = image::RgbaImage::from_raw(desc.width, desc.height, pixels)
        .ok_or_else(|| anyhow!("texture size does not match its pixels"))?;
    out.save(output).with_context(|| format!("writing {}", output.display()))?;

    println!(
        "{} {} -> {}x{} (unpadded {}x{}, padding {:?}, wrapped {:?}) at {}x",
        name,
        bounds,
        sprite.size.w,
        sprite.size.h,
        sprite.unpadded_size.w,
        sprite.unpadded_size.h,
        sprite.padding,
        sprite.wrapped,
        sprite.scale
    );
    log::debug!("{}", engine.stats().report());
    Ok(())
}

fn inspect(entry: &Path) -> Result<()> {
    let hash = entry
        .file_stem()
        .and_then(|s| s.to_str())
        .and_then(ContentHash::from_hex)
        .ok_or_else(|| anyhow!("{} is not named <hash>.spr", entry.display()))?;
    let bytes = std::fs::read(entry).with_context(|| format!("reading {}", entry.display()))?;
    let sprite = codec::decode(hash, &bytes)?;
    println!("hash:        {}", hash);
    println!("size:        {}x{}", sprite.size.w, sprite.size.h);
    println!("unpadded:    {}x{}", sprite.unpadded_size.w, sprite.unpadded_size.h);
    println!("padding:     {:?}", sprite.padding);
    println!("wrapped:     {:?}", sprite.wrapped);
    println!("scale:       {}x ({:.2}, {:.2})", sprite.scale, sprite.scale_factor.0, sprite.scale_factor.1);
    println!("pipeline:    {}", sprite.fingerprint);
    println!("stored size: {} bytes ({} raw)", bytes.len(), sprite.pixels.len());
    Ok(())
}
