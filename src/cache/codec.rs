//! On-disk format for persisted sprites.
//!
//! ```text
//! offset  size  field
//!      0     4  magic "SPRC"
//!      4     2  version
//!      6     2  flags (bit 0: payload is deflated)
//!      8    16  size w/h, unpadded size w/h (u32)
//!     24    16  padding left/top/right/bottom (i32)
//!     40     4  scale
//!     44     2  wrapped x/y (0 or 1)
//!     46     2  scaler kind
//!     48     8  raw pixel length
//!     56     8  payload length
//!     64     8  xxh64 of payload
//!     72     8  content hash
//!     80     8  scale factor x/y (f32)
//!     88     8  pipeline settings digest
//!     96     8  xxh64 of bytes 0..96
//!    104     …  payload
//! ```
//!
//! All integers are little-endian. Anything that does not check out decodes
//! to `CorruptCacheEntry`, including headers whose geometry contradicts
//! itself.

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use sprite_scale::presets::ScalerKind;
use sprite_scale::{Size, Wrapped};
use xxhash_rust::xxh64::xxh64;

use crate::core::geometry::Quad;
use crate::core::hash::ContentHash;
use crate::error::{ResampleError, ResampleResult};
use crate::processing::{PipelineFingerprint, ResampledPixels};

pub const MAGIC: [u8; 4] = *b"SPRC";
pub const VERSION: u16 = 2;
pub const HEADER_LEN: usize = 104;

/// Bytes covered by the header checksum.
const CHECKED_HEADER_LEN: usize = HEADER_LEN - 8;
const FLAG_DEFLATE: u16 = 1;

fn kind_tag(kind: ScalerKind) -> u16 {
    ScalerKind::ALL.iter().position(|k| *k == kind).unwrap_or(u16::MAX as usize) as u16
}

fn kind_from_tag(tag: u16) -> Option<ScalerKind> {
    ScalerKind::ALL.get(tag as usize).copied()
}

pub fn encode(sprite: &ResampledPixels, compress: bool) -> ResampleResult<Vec<u8>> {
    let payload = if compress {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::fast());
        encoder
            .write_all(&sprite.pixels)
            .and_then(|()| encoder.finish())
            .map_err(|e| ResampleError::io("deflate", e))?
    } else {
        sprite.pixels.clone()
    };

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(if compress { FLAG_DEFLATE } else { 0 }).to_le_bytes());
    for v in [sprite.size.w, sprite.size.h, sprite.unpadded_size.w, sprite.unpadded_size.h] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    for v in [sprite.padding.left, sprite.padding.top, sprite.padding.right, sprite.padding.bottom] {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out.extend_from_slice(&sprite.scale.to_le_bytes());
    out.push(sprite.wrapped.x as u8);
    out.push(sprite.wrapped.y as u8);
    out.extend_from_slice(&kind_tag(sprite.fingerprint.scaler).to_le_bytes());
    out.extend_from_slice(&(sprite.pixels.len() as u64).to_le_bytes());
    out.extend_from_slice(&(payload.len() as u64).to_le_bytes());
    out.extend_from_slice(&xxh64(&payload, 0).to_le_bytes());
    out.extend_from_slice(&sprite.content_hash.0.to_le_bytes());
    out.extend_from_slice(&sprite.scale_factor.0.to_le_bytes());
    out.extend_from_slice(&sprite.scale_factor.1.to_le_bytes());
    out.extend_from_slice(&sprite.fingerprint.settings.to_le_bytes());
    debug_assert_eq!(out.len(), CHECKED_HEADER_LEN);
    let header_checksum = xxh64(&out, 0);
    out.extend_from_slice(&header_checksum.to_le_bytes());
    out.extend_from_slice(&payload);
    Ok(out)
}

struct Reader<'a> {
    bytes: &'a [u8],
    at: usize,
}

impl Reader<'_> {
    fn take<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.bytes[self.at..self.at + N]);
        self.at += N;
        out
    }

    fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.take())
    }

    fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.take())
    }

    fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.take())
    }

    fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.take())
    }

    fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.take())
    }
}

fn flag(byte: u8) -> Option<bool> {
    match byte {
        0 => Some(false),
        1 => Some(true),
        _ => None,
    }
}

/// Checks that padding, sizes and scale describe one consistent sprite.
fn check_geometry(size: Size, unpadded: Size, padding: Quad, scale: u32, scale_factor: (f32, f32)) -> Result<(), String> {
    if [padding.left, padding.top, padding.right, padding.bottom].iter().any(|p| *p < 0) {
        return Err(format!("negative padding {:?}", padding));
    }
    let padded_w = unpadded.w as i64 + padding.left as i64 + padding.right as i64;
    let padded_h = unpadded.h as i64 + padding.top as i64 + padding.bottom as i64;
    if (padded_w, padded_h) != (size.w as i64, size.h as i64) {
        return Err(format!(
            "{}x{} plus padding is not {}x{}",
            unpadded.w, unpadded.h, size.w, size.h
        ));
    }
    if scale == 0 || unpadded.w % scale != 0 || unpadded.h % scale != 0 {
        return Err(format!("{}x{} is not a multiple of scale {}", unpadded.w, unpadded.h, scale));
    }
    if scale_factor != (scale as f32, scale as f32) {
        return Err(format!("scale factor {:?} does not match scale {}", scale_factor, scale));
    }
    Ok(())
}

/// Decode an entry expected to hold the sprite for `hash`.
pub fn decode(hash: ContentHash, bytes: &[u8]) -> ResampleResult<ResampledPixels> {
    let corrupt = |reason: String| ResampleError::corrupt(hash.0, reason);

    if bytes.len() < HEADER_LEN {
        return Err(corrupt(format!("{} bytes is shorter than the header", bytes.len())));
    }
    let mut r = Reader { bytes, at: 0 };
    if r.take::<4>() != MAGIC {
        return Err(corrupt("bad magic".into()));
    }
    let version = r.u16();
    if version != VERSION {
        return Err(corrupt(format!("unsupported version {}", version)));
    }
    let flags = r.u16();
    let size = Size::new(r.u32(), r.u32());
    let unpadded_size = Size::new(r.u32(), r.u32());
    let padding = Quad::new(r.i32(), r.i32(), r.i32(), r.i32());
    let scale = r.u32();
    let [wx, wy] = r.take::<2>();
    let scaler_tag = r.u16();
    let raw_len = r.u64();
    let payload_len = r.u64();
    let checksum = r.u64();
    let stored_hash = ContentHash(r.u64());
    let scale_factor = (r.f32(), r.f32());
    let settings = r.u64();
    let header_checksum = r.u64();

    if xxh64(&bytes[..CHECKED_HEADER_LEN], 0) != header_checksum {
        return Err(corrupt("header checksum mismatch".into()));
    }
    if stored_hash != hash {
        return Err(corrupt(format!("entry holds {}", stored_hash)));
    }
    let (Some(wrapped_x), Some(wrapped_y)) = (flag(wx), flag(wy)) else {
        return Err(corrupt(format!("wrap flags {}/{}", wx, wy)));
    };
    let Some(scaler) = kind_from_tag(scaler_tag) else {
        return Err(corrupt(format!("unknown scaler tag {}", scaler_tag)));
    };
    check_geometry(size, unpadded_size, padding, scale, scale_factor).map_err(corrupt)?;

    let payload = &bytes[HEADER_LEN..];
    if payload.len() as u64 != payload_len {
        return Err(corrupt(format!("payload is {} bytes, header says {}", payload.len(), payload_len)));
    }
    if xxh64(payload, 0) != checksum {
        return Err(corrupt("checksum mismatch".into()));
    }
    if raw_len != size.byte_len() as u64 {
        return Err(corrupt(format!("{} pixel bytes for {}x{}", raw_len, size.w, size.h)));
    }

    let pixels = if flags & FLAG_DEFLATE != 0 {
        let mut pixels = Vec::with_capacity(raw_len as usize);
        DeflateDecoder::new(payload)
            .take(raw_len + 1)
            .read_to_end(&mut pixels)
            .map_err(|e| corrupt(format!("inflate: {}", e)))?;
        pixels
    } else {
        payload.to_vec()
    };
    if pixels.len() as u64 != raw_len {
        return Err(corrupt(format!("inflated to {} bytes, expected {}", pixels.len(), raw_len)));
    }

    Ok(ResampledPixels {
        pixels,
        size,
        unpadded_size,
        padding,
        scale_factor,
        wrapped: Wrapped {
            x: wrapped_x,
            y: wrapped_y,
        },
        scale,
        content_hash: hash,
        fingerprint: PipelineFingerprint { scaler, settings },
    })
}
