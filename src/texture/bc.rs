//! BC1 and BC4 block compression over whole surfaces.
//!
//! Surfaces are flat RGBA8 buffers of `width × height × 4` bytes on one
//! side and row-major 4×4 blocks (8 bytes each) on the other. Partial edge
//! blocks are encoded from replicated edge pixels and cropped on decode.

use crate::utils::div_round_up;
use crate::{Error, Result};

/// Bytes per 4×4 block for both formats.
pub const BLOCK_BYTES: usize = 8;

type Rgba = [u8; 4];

fn block_count(width: usize, height: usize) -> (usize, usize) {
    (div_round_up(width, 4), div_round_up(height, 4))
}

/// Bytes needed for a surface of `width × height` pixels.
pub fn compressed_size(width: usize, height: usize) -> usize {
    let (bw, bh) = block_count(width, height);
    bw * bh * BLOCK_BYTES
}

fn decode_surface(
    data: &[u8],
    width: usize,
    height: usize,
    block: impl Fn(&[u8]) -> [Rgba; 16],
) -> Result<Vec<u8>> {
    if data.len() < compressed_size(width, height) {
        return Err(Error::UnexpectedEof);
    }
    let (bw, bh) = block_count(width, height);
    let mut out = vec![0u8; width * height * 4];
    for by in 0..bh {
        for bx in 0..bw {
            let offset = (by * bw + bx) * BLOCK_BYTES;
            let pixels = block(&data[offset..offset + BLOCK_BYTES]);
            for (i, px) in pixels.iter().enumerate() {
                let (x, y) = (bx * 4 + i % 4, by * 4 + i / 4);
                if x < width && y < height {
                    out[(y * width + x) * 4..][..4].copy_from_slice(px);
                }
            }
        }
    }
    Ok(out)
}

fn encode_surface(
    rgba: &[u8],
    width: usize,
    height: usize,
    block: impl Fn(&[Rgba; 16]) -> [u8; 8],
) -> Result<Vec<u8>> {
    if rgba.len() != width * height * 4 {
        return Err(Error::InvalidRange);
    }
    let (bw, bh) = block_count(width, height);
    let mut out = Vec::with_capacity(bw * bh * BLOCK_BYTES);
    for by in 0..bh {
        for bx in 0..bw {
            let mut pixels = [[0u8; 4]; 16];
            for (i, px) in pixels.iter_mut().enumerate() {
                let x = (bx * 4 + i % 4).min(width - 1);
                let y = (by * 4 + i / 4).min(height - 1);
                px.copy_from_slice(&rgba[(y * width + x) * 4..][..4]);
            }
            out.extend_from_slice(&block(&pixels));
        }
    }
    Ok(out)
}

fn expand565(c: u16) -> Rgba {
    let r = ((c >> 11) & 0x1F) as u8;
    let g = ((c >> 5) & 0x3F) as u8;
    let b = (c & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2), 255]
}

fn pack565(px: &Rgba) -> u16 {
    let r = (px[0] as u16 * 31 + 127) / 255;
    let g = (px[1] as u16 * 63 + 127) / 255;
    let b = (px[2] as u16 * 31 + 127) / 255;
    (r << 11) | (g << 5) | b
}

fn bc1_palette(c0: u16, c1: u16) -> [Rgba; 4] {
    let (a, b) = (expand565(c0), expand565(c1));
    let mix = |wa: u16, wb: u16, d: u16| -> Rgba {
        let ch = |i: usize| ((a[i] as u16 * wa + b[i] as u16 * wb) / d) as u8;
        [ch(0), ch(1), ch(2), 255]
    };
    if c0 > c1 {
        [a, b, mix(2, 1, 3), mix(1, 2, 3)]
    } else {
        [a, b, mix(1, 1, 2), [0, 0, 0, 0]]
    }
}

fn decode_bc1_block(block: &[u8]) -> [Rgba; 16] {
    let c0 = u16::from_le_bytes([block[0], block[1]]);
    let c1 = u16::from_le_bytes([block[2], block[3]]);
    let bits = u32::from_le_bytes([block[4], block[5], block[6], block[7]]);
    let palette = bc1_palette(c0, c1);
    std::array::from_fn(|i| palette[((bits >> (2 * i)) & 3) as usize])
}

fn ssd(a: &[u8], b: &[u8]) -> u32 {
    a.iter()
        .zip(b)
        .map(|(&x, &y)| (x as i32 - y as i32).pow(2) as u32)
        .sum()
}

/// Indices and total error of `pixels` against the palette of `c0, c1`.
fn fit_bc1(pixels: &[Rgba; 16], c0: u16, c1: u16) -> (u32, u32) {
    let palette = bc1_palette(c0, c1);
    let candidates = if c0 > c1 { 4 } else { 3 };
    let mut bits = 0u32;
    let mut error = 0u32;
    for (i, px) in pixels.iter().enumerate() {
        let (index, e) = if px[3] < 128 {
            (3, 0)
        } else {
            (0..candidates)
                .map(|k| (k, ssd(px, &palette[k])))
                .min_by_key(|&(_, e)| e)
                .unwrap_or((0, 0))
        };
        bits |= (index as u32) << (2 * i);
        error += e;
    }
    (bits, error)
}

fn encode_bc1_block(pixels: &[Rgba; 16]) -> [u8; 8] {
    let transparent = pixels.iter().any(|p| p[3] < 128);
    let opaque: Vec<&Rgba> = pixels.iter().filter(|p| p[3] >= 128).collect();

    // The two colours furthest apart become the endpoints.
    let (mut lo, mut hi) = (0u16, 0u16);
    if let Some(first) = opaque.first() {
        let (mut best, mut pair) = (0, (*first, *first));
        for (i, a) in opaque.iter().enumerate() {
            for b in &opaque[i + 1..] {
                let d = ssd(&a[..3], &b[..3]);
                if d > best {
                    best = d;
                    pair = (*a, *b);
                }
            }
        }
        let (p, q) = (pack565(pair.0), pack565(pair.1));
        (lo, hi) = (p.min(q), p.max(q));
    }

    // c0 > c1 selects four opaque colours, c0 <= c1 three plus transparent.
    // Opaque blocks may still be better served by the midpoint of the
    // three-colour mode.
    let orders = if transparent { vec![(lo, hi)] } else { vec![(hi, lo), (lo, hi)] };
    let (c0, c1, bits) = orders
        .into_iter()
        .map(|(c0, c1)| {
            let (bits, error) = fit_bc1(pixels, c0, c1);
            (error, c0, c1, bits)
        })
        .min_by_key(|&(error, ..)| error)
        .map(|(_, c0, c1, bits)| (c0, c1, bits))
        .unwrap_or((lo, hi, 0));

    let mut out = [0u8; 8];
    out[..2].copy_from_slice(&c0.to_le_bytes());
    out[2..4].copy_from_slice(&c1.to_le_bytes());
    out[4..].copy_from_slice(&bits.to_le_bytes());
    out
}

fn bc4_palette(r0: u8, r1: u8) -> [u8; 8] {
    let (a, b) = (r0 as u16, r1 as u16);
    if r0 > r1 {
        let mix = |w: u16| ((a * (7 - w) + b * w) / 7) as u8;
        [r0, r1, mix(1), mix(2), mix(3), mix(4), mix(5), mix(6)]
    } else {
        let mix = |w: u16| ((a * (5 - w) + b * w) / 5) as u8;
        [r0, r1, mix(1), mix(2), mix(3), mix(4), 0, 255]
    }
}

fn decode_bc4_block(block: &[u8]) -> [Rgba; 16] {
    let palette = bc4_palette(block[0], block[1]);
    let mut raw = [0u8; 8];
    raw[..6].copy_from_slice(&block[2..8]);
    let bits = u64::from_le_bytes(raw);
    std::array::from_fn(|i| {
        let v = palette[((bits >> (3 * i)) & 7) as usize];
        [v, v, v, 255]
    })
}

/// Indices and total error of `values` against one BC4 palette.
fn fit_bc4(values: &[u8; 16], palette: &[u8; 8]) -> (u64, u32) {
    let mut bits = 0u64;
    let mut error = 0u32;
    for (i, &v) in values.iter().enumerate() {
        let (index, e) = palette
            .iter()
            .enumerate()
            .map(|(k, &p)| (k, (v as i32 - p as i32).pow(2) as u32))
            .min_by_key(|&(_, e)| e)
            .unwrap_or((0, 0));
        bits |= (index as u64) << (3 * i);
        error += e;
    }
    (bits, error)
}

fn encode_bc4_block(pixels: &[Rgba; 16]) -> [u8; 8] {
    let values: [u8; 16] = std::array::from_fn(|i| pixels[i][0]);
    let min = values.iter().copied().min().unwrap_or(0);
    let max = values.iter().copied().max().unwrap_or(0);

    // Six interpolants between the extremes.
    let mut candidates = vec![(max, min)];
    // Four interpolants plus exact 0 and 255. An endpoint is either an
    // inner extreme or one of the fixed values itself.
    let inner = values.iter().copied().filter(|&v| v != 0 && v != 255);
    let lows = [inner.clone().min(), Some(0)];
    let highs = [inner.max(), Some(255)];
    for lo in lows.into_iter().flatten() {
        for hi in highs.into_iter().flatten() {
            candidates.push((lo, hi));
        }
    }

    let (r0, r1, bits) = candidates
        .into_iter()
        .map(|(r0, r1)| {
            let (bits, error) = fit_bc4(&values, &bc4_palette(r0, r1));
            (error, r0, r1, bits)
        })
        .min_by_key(|&(error, ..)| error)
        .map(|(_, r0, r1, bits)| (r0, r1, bits))
        .unwrap_or((max, min, 0));

    let mut out = [0u8; 8];
    out[0] = r0;
    out[1] = r1;
    out[2..].copy_from_slice(&bits.to_le_bytes()[..6]);
    out
}

/// BC1 surface to RGBA8.
pub fn decode_bc1(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    decode_surface(data, width, height, decode_bc1_block)
}

/// BC4 surface to RGBA8 grey.
pub fn decode_bc4(data: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    decode_surface(data, width, height, decode_bc4_block)
}

/// RGBA8 to BC1. Pixels with alpha below 128 become transparent.
pub fn encode_bc1(rgba: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    encode_surface(rgba, width, height, encode_bc1_block)
}

/// RGBA8 to BC4, from the red channel.
pub fn encode_bc4(rgba: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
    encode_surface(rgba, width, height, encode_bc4_block)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck_macros::quickcheck;

    #[test]
    fn bc1_four_colour_block() {
        // Pure red to black, indices 0,1,2,3 repeated.
        let mut block = [0u8; 8];
        block[..2].copy_from_slice(&0xF800u16.to_le_bytes());
        block[4..].copy_from_slice(&0xE4E4_E4E4u32.to_le_bytes());
        let rgba = decode_bc1(&block, 4, 4).unwrap();
        assert_eq!(&rgba[..16], &[255, 0, 0, 255, 0, 0, 0, 255, 170, 0, 0, 255, 85, 0, 0, 255]);
    }

    #[test]
    fn bc1_transparent_mode() {
        let mut block = [0u8; 8];
        block[2..4].copy_from_slice(&0xFFFFu16.to_le_bytes());
        block[4..].copy_from_slice(&0xFFFF_FFFFu32.to_le_bytes());
        let rgba = decode_bc1(&block, 4, 4).unwrap();
        assert!(rgba.chunks(4).all(|p| p == [0, 0, 0, 0]));

        let encoded = encode_bc1(&rgba, 4, 4).unwrap();
        assert_eq!(decode_bc1(&encoded, 4, 4).unwrap(), rgba);
    }

    #[test]
    fn bc4_modes() {
        let block = [255, 0, 0, 0, 0, 0, 0, 0];
        assert!(decode_bc4(&block, 4, 4).unwrap().chunks(4).all(|p| p == [255, 255, 255, 255]));
        // r0 <= r1, index 7 is 255 and index 6 is 0.
        let block = [10, 20, 0o77, 0, 0, 0, 0, 0];
        let rgba = decode_bc4(&block, 4, 4).unwrap();
        assert_eq!(rgba[0], 255);
        assert_eq!(rgba[4], 255);
        assert_eq!(rgba[8], 10);
    }

    #[test]
    fn partial_blocks_are_cropped() {
        let rgba: Vec<u8> = (0..6 * 5).flat_map(|i| [i as u8 * 8, 0, 0, 255]).collect();
        let encoded = encode_bc4(&rgba, 6, 5).unwrap();
        assert_eq!(encoded.len(), compressed_size(6, 5));
        assert_eq!(decode_bc4(&encoded, 6, 5).unwrap().len(), rgba.len());
        assert!(matches!(encode_bc4(&rgba[4..], 6, 5), Err(Error::InvalidRange)));
        assert!(matches!(decode_bc4(&encoded[1..], 6, 5), Err(Error::UnexpectedEof)));
    }

    #[test]
    fn bc1_opaque_three_colour_block() {
        // Black to red, indices 0, 1, 2: the midpoint has red 127.
        let mut block = [0u8; 8];
        block[2..4].copy_from_slice(&0xF800u16.to_le_bytes());
        block[4..].copy_from_slice(&0x0000_0024u32.to_le_bytes());
        let rgba = decode_bc1(&block, 4, 4).unwrap();
        assert_eq!(&rgba[8..12], &[127, 0, 0, 255]);
        assert_eq!(decode_bc1(&encode_bc1(&rgba, 4, 4).unwrap(), 4, 4).unwrap(), rgba);
    }

    #[test]
    fn bc4_four_mode_with_zero_endpoint() {
        // r0 = 0, r1 = 100; indices 0, 1, 2, 3 give 0, 100, 20, 40.
        let indices: u64 = 0b011_010_001_000;
        let mut block = [0, 100, 0, 0, 0, 0, 0, 0];
        block[2..].copy_from_slice(&indices.to_le_bytes()[..6]);
        let rgba = decode_bc4(&block, 4, 4).unwrap();
        let reds: Vec<u8> = rgba.chunks(4).take(4).map(|p| p[0]).collect();
        assert_eq!(reds, [0, 100, 20, 40]);
        assert_eq!(decode_bc4(&encode_bc4(&rgba, 4, 4).unwrap(), 4, 4).unwrap(), rgba);
    }

    #[quickcheck]
    fn bc1_on_palette_round_trip(a: u16, b: u16, three_colour: bool, indices: u32) -> bool {
        let (c0, c1) = if three_colour { (a.min(b), a.max(b)) } else { (a.max(b), a.min(b)) };
        if c0 == c1 {
            return true;
        }
        // Pixels 0 and 1 carry the endpoints.
        let indices = (indices & !0xF) | 0b0100;
        let mut block = [0u8; 8];
        block[..2].copy_from_slice(&c0.to_le_bytes());
        block[2..4].copy_from_slice(&c1.to_le_bytes());
        block[4..].copy_from_slice(&indices.to_le_bytes());
        let rgba = decode_bc1(&block, 4, 4).unwrap();
        decode_bc1(&encode_bc1(&rgba, 4, 4).unwrap(), 4, 4).unwrap() == rgba
    }

    #[quickcheck]
    fn bc4_on_palette_round_trip(a: u8, b: u8, four_mode: bool, indices: u64) -> bool {
        let (r0, r1) = if four_mode { (a.min(b), a.max(b)) } else { (a.max(b), a.min(b)) };
        if r0 == r1 {
            return true;
        }
        let indices = (indices & 0xFFFF_FFFF_FFC0) | 0b001_000;
        let mut block = [r0, r1, 0, 0, 0, 0, 0, 0];
        block[2..].copy_from_slice(&indices.to_le_bytes()[..6]);
        let rgba = decode_bc4(&block, 4, 4).unwrap();
        decode_bc4(&encode_bc4(&rgba, 4, 4).unwrap(), 4, 4).unwrap() == rgba
    }
}
