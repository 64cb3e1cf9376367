//! Glyph atlas containers.
//!
//! Three shapes of font file are understood:
//!
//! * **BNTX** - the atlas is the first texture of a BNTX container.
//! * **FNTA/FNTF** - a `FNTA` header pointing at the texture and an optional
//!   `GRID` settings block, with a 0x20-byte footer ending in `FNTF` that
//!   records the surface geometry.
//! * **Headerless** - neither is present and the title's fixed geometry is
//!   assumed: 2048×2048 BC4 at offset 0x100, 64×64 glyph cells.
//!
//! ## Layout
//! ```text
//! [0x00]            Header: Magic "FNTA" (4), Version u32 (1),
//!                   TextureOffset u32, SettingsOffset u32 (0 = none),
//!                   reserved to 0x20
//! [SettingsOffset]  "GRID" (4), Columns u16, Rows u16, CellWidth u16,
//!                   CellHeight u16
//! [TextureOffset]   block-linear surface (TextureSize bytes)
//! [EOF-0x20]        Footer: Width u32, Height u32, Format u32,
//!                   TextureSize u32, BlockHeightLog2 u32, reserved (8),
//!                   Magic "FNTF"
//! ```

use log::debug;

use super::PixelFormat;
use super::bc::{BLOCK_BYTES, compressed_size};
use super::swizzle::BlockLinear;
use crate::formats::bntx::{Bntx, TILE_MODE_BLOCK_LINEAR, TILE_MODE_LINEAR};
use crate::utils::{le_u16_at, le_u32_at, magic_at, put_bytes, put_u32, slice_at};
use crate::{Error, Result};

const HEADER_MAGIC: &[u8; 4] = b"FNTA";
const FOOTER_MAGIC: &[u8; 4] = b"FNTF";
const SETTINGS_MAGIC: &[u8; 4] = b"GRID";
const HEADER_VERSION: u32 = 1;
const HEADER_SIZE: usize = 0x20;
const FOOTER_SIZE: usize = 0x20;

pub const FALLBACK_WIDTH: u32 = 2048;
pub const FALLBACK_HEIGHT: u32 = 2048;
pub const FALLBACK_FORMAT: PixelFormat = PixelFormat::Bc4;
pub const FALLBACK_TEXTURE_OFFSET: usize = 0x100;
pub const DEFAULT_CELL_SIZE: u32 = 64;

/// Where the geometry of an atlas came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum AtlasSource {
    Bntx,
    Footer,
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Tiling {
    /// Tegra block-linear; `None` derives the block height from the
    /// surface height.
    BlockLinear { block_height_log2: Option<u32> },
    Linear,
}

/// A pixel rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Fixed-size glyph cells laid out row-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GlyphGrid {
    pub columns: u32,
    pub rows: u32,
    pub cell_width: u32,
    pub cell_height: u32,
}

impl GlyphGrid {
    /// As many `cell_width × cell_height` cells as fit the texture.
    pub fn uniform(width: u32, height: u32, cell_width: u32, cell_height: u32) -> Self {
        Self {
            columns: width / cell_width.max(1),
            rows: height / cell_height.max(1),
            cell_width,
            cell_height,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    /// Rectangle of cell `index`, or `None` past the last cell.
    pub fn cell_rect(&self, index: usize) -> Option<CellRect> {
        if index >= self.cell_count() {
            return None;
        }
        let (col, row) = (index as u32 % self.columns, index as u32 / self.columns);
        Some(CellRect {
            x: col * self.cell_width,
            y: row * self.cell_height,
            width: self.cell_width,
            height: self.cell_height,
        })
    }
}

/// Everything needed to decode and rewrite an atlas.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AtlasInfo {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub texture_offset: usize,
    /// Bytes reserved for the texture; at least [`AtlasInfo::surface_size`].
    pub texture_size: usize,
    pub tiling: Tiling,
    pub grid: GlyphGrid,
    pub source: AtlasSource,
}

impl AtlasInfo {
    fn block_linear(&self) -> BlockLinear {
        let (width, height) = (self.width as usize, self.height as usize);
        let surface = BlockLinear::new(width, height, 4, 4, BLOCK_BYTES);
        match self.tiling {
            Tiling::BlockLinear {
                block_height_log2: Some(log2),
            } => surface.with_block_height_log2(log2),
            _ => surface,
        }
    }

    /// Bytes the mip-0 surface occupies in the file.
    pub fn surface_size(&self) -> usize {
        match self.tiling {
            Tiling::BlockLinear { .. } => self.block_linear().swizzled_size(),
            Tiling::Linear => compressed_size(self.width as usize, self.height as usize),
        }
    }

    fn validate(&self, file_len: usize, reserved_tail: usize) -> Result<()> {
        let end = self
            .texture_offset
            .checked_add(self.texture_size)
            .ok_or(Error::InvalidRange)?;
        if end + reserved_tail > file_len || self.texture_size < self.surface_size() {
            return Err(Error::InvalidRange);
        }
        Ok(())
    }
}

fn analyze_bntx(data: &[u8]) -> Result<AtlasInfo> {
    let bntx = Bntx::parse(data)?;
    let tex = bntx
        .textures
        .first()
        .ok_or(Error::Parse("BNTX holds no textures"))?;
    let (start, end) = bntx.texture_range(tex, data.len())?;
    let tiling = match tex.tile_mode {
        TILE_MODE_BLOCK_LINEAR => Tiling::BlockLinear {
            block_height_log2: Some(tex.block_height_log2),
        },
        TILE_MODE_LINEAR => Tiling::Linear,
        _ => return Err(Error::Parse("unknown BNTX tile mode")),
    };
    let info = AtlasInfo {
        width: tex.width,
        height: tex.height,
        format: PixelFormat::from_code(tex.format)?,
        texture_offset: start,
        texture_size: end - start,
        tiling,
        grid: GlyphGrid::uniform(tex.width, tex.height, DEFAULT_CELL_SIZE, DEFAULT_CELL_SIZE),
        source: AtlasSource::Bntx,
    };
    info.validate(data.len(), 0)?;
    Ok(info)
}

fn read_grid(data: &[u8], offset: usize) -> Result<GlyphGrid> {
    magic_at(data, offset, SETTINGS_MAGIC)?;
    Ok(GlyphGrid {
        columns: le_u16_at(data, offset + 4)? as u32,
        rows: le_u16_at(data, offset + 6)? as u32,
        cell_width: le_u16_at(data, offset + 8)? as u32,
        cell_height: le_u16_at(data, offset + 10)? as u32,
    })
}

/// Locate the texture in a font file and describe its geometry.
pub fn analyze(data: &[u8]) -> Result<AtlasInfo> {
    if Bntx::is_bntx(data) {
        return analyze_bntx(data);
    }

    let mut texture_offset = FALLBACK_TEXTURE_OFFSET;
    let mut grid = None;
    if data.starts_with(HEADER_MAGIC) {
        let version = le_u32_at(data, 4)?;
        if version != HEADER_VERSION {
            return Err(Error::UnsupportedVersion(version as u16));
        }
        texture_offset = le_u32_at(data, 8)? as usize;
        let settings = le_u32_at(data, 0x0C)? as usize;
        if settings != 0 {
            grid = Some(read_grid(data, settings)?);
        }
    }

    let has_footer = data.len() >= HEADER_SIZE + FOOTER_SIZE && data.ends_with(FOOTER_MAGIC);
    let info = if has_footer {
        let footer = slice_at(data, data.len() - FOOTER_SIZE, FOOTER_SIZE)?;
        let (width, height) = (le_u32_at(footer, 0)?, le_u32_at(footer, 4)?);
        AtlasInfo {
            width,
            height,
            format: PixelFormat::from_code(le_u32_at(footer, 8)?)?,
            texture_offset,
            texture_size: le_u32_at(footer, 0x0C)? as usize,
            tiling: Tiling::BlockLinear {
                block_height_log2: Some(le_u32_at(footer, 0x10)?),
            },
            grid: grid.unwrap_or_else(|| {
                GlyphGrid::uniform(width, height, DEFAULT_CELL_SIZE, DEFAULT_CELL_SIZE)
            }),
            source: AtlasSource::Footer,
        }
    } else {
        let mut info = AtlasInfo {
            width: FALLBACK_WIDTH,
            height: FALLBACK_HEIGHT,
            format: FALLBACK_FORMAT,
            texture_offset,
            texture_size: 0,
            tiling: Tiling::BlockLinear {
                block_height_log2: None,
            },
            grid: grid.unwrap_or_else(|| {
                let (w, h) = (FALLBACK_WIDTH, FALLBACK_HEIGHT);
                GlyphGrid::uniform(w, h, DEFAULT_CELL_SIZE, DEFAULT_CELL_SIZE)
            }),
            source: AtlasSource::Fallback,
        };
        info.texture_size = info.surface_size();
        info
    };

    info.validate(data.len(), if has_footer { FOOTER_SIZE } else { 0 })?;
    debug!(
        "font atlas: {}x{} {:?} at {:#x} ({:?})",
        info.width, info.height, info.format, info.texture_offset, info.source
    );
    Ok(info)
}

/// Decode the atlas texture to RGBA8.
pub fn decode(data: &[u8], info: &AtlasInfo) -> Result<Vec<u8>> {
    let region = slice_at(data, info.texture_offset, info.surface_size())?;
    let blocks = match info.tiling {
        Tiling::BlockLinear { .. } => info.block_linear().deswizzle(region)?,
        Tiling::Linear => region.to_vec(),
    };
    info.format
        .decode(&blocks, info.width as usize, info.height as usize)
}

/// Encode `rgba` and write it over the texture of a copy of `original`.
///
/// Everything outside the surface is kept; for footer-described atlases
/// the footer's size field is set to the bytes written. The output has the
/// length of `original`.
pub fn rebuild(original: &[u8], info: &AtlasInfo, rgba: &[u8]) -> Result<Vec<u8>> {
    let (width, height) = (info.width as usize, info.height as usize);
    if rgba.len() != width * height * 4 {
        return Err(Error::InvalidRange);
    }
    let blocks = info.format.encode(rgba, width, height)?;
    let surface = match info.tiling {
        Tiling::BlockLinear { .. } => info.block_linear().swizzle(&blocks)?,
        Tiling::Linear => blocks,
    };

    let mut out = original.to_vec();
    put_bytes(&mut out, info.texture_offset, &surface)?;
    if info.source == AtlasSource::Footer {
        let size_field = out.len() - FOOTER_SIZE + 0x0C;
        let written = u32::try_from(surface.len()).map_err(|_| Error::InvalidRange)?;
        put_u32(&mut out, size_field, written)?;
    }
    Ok(out)
}

fn cell_bounds(info: &AtlasInfo, rgba_len: usize, index: usize) -> Result<CellRect> {
    let rect = info.grid.cell_rect(index).ok_or(Error::InvalidRange)?;
    if rect.x + rect.width > info.width
        || rect.y + rect.height > info.height
        || rgba_len != info.width as usize * info.height as usize * 4
    {
        return Err(Error::InvalidRange);
    }
    Ok(rect)
}

/// Copy glyph cell `index` out of a decoded atlas.
pub fn extract_cell(rgba: &[u8], info: &AtlasInfo, index: usize) -> Result<Vec<u8>> {
    let rect = cell_bounds(info, rgba.len(), index)?;
    let (pitch, row_len) = (info.width as usize * 4, rect.width as usize * 4);
    let mut out = Vec::with_capacity(row_len * rect.height as usize);
    for y in rect.y as usize..(rect.y + rect.height) as usize {
        let start = y * pitch + rect.x as usize * 4;
        out.extend_from_slice(&rgba[start..start + row_len]);
    }
    Ok(out)
}

/// Draw `cell` (RGBA8, one cell in size) into glyph cell `index`.
pub fn write_cell(rgba: &mut [u8], info: &AtlasInfo, index: usize, cell: &[u8]) -> Result<()> {
    let rect = cell_bounds(info, rgba.len(), index)?;
    let (pitch, row_len) = (info.width as usize * 4, rect.width as usize * 4);
    if cell.len() != row_len * rect.height as usize {
        return Err(Error::InvalidRange);
    }
    for (row, src) in cell.chunks_exact(row_len).enumerate() {
        let start = (rect.y as usize + row) * pitch + rect.x as usize * 4;
        rgba[start..start + row_len].copy_from_slice(src);
    }
    Ok(())
}

/// Write a new `FNTA` atlas file around `rgba`.
pub fn create(
    width: u32,
    height: u32,
    format: PixelFormat,
    grid: &GlyphGrid,
    rgba: &[u8],
) -> Result<Vec<u8>> {
    let surface = BlockLinear::new(width as usize, height as usize, 4, 4, BLOCK_BYTES);
    let block_height_log2 = surface.block_height().trailing_zeros();
    let info = AtlasInfo {
        width,
        height,
        format,
        texture_offset: FALLBACK_TEXTURE_OFFSET,
        texture_size: surface.swizzled_size(),
        tiling: Tiling::BlockLinear {
            block_height_log2: Some(block_height_log2),
        },
        grid: *grid,
        source: AtlasSource::Footer,
    };

    let dim = |v: u32| u16::try_from(v).map_err(|_| Error::Parse("grid dimension exceeds u16"));
    let mut out = vec![0u8; FALLBACK_TEXTURE_OFFSET + info.texture_size + FOOTER_SIZE];
    out[..4].copy_from_slice(HEADER_MAGIC);
    put_u32(&mut out, 4, HEADER_VERSION)?;
    put_u32(&mut out, 8, FALLBACK_TEXTURE_OFFSET as u32)?;
    put_u32(&mut out, 0x0C, HEADER_SIZE as u32)?;
    out[HEADER_SIZE..HEADER_SIZE + 4].copy_from_slice(SETTINGS_MAGIC);
    let cells = [grid.columns, grid.rows, grid.cell_width, grid.cell_height];
    for (i, v) in cells.into_iter().enumerate() {
        put_bytes(&mut out, HEADER_SIZE + 4 + i * 2, &dim(v)?.to_le_bytes())?;
    }

    let footer = out.len() - FOOTER_SIZE;
    for (i, v) in [width, height, format.code(), info.texture_size as u32, block_height_log2]
        .into_iter()
        .enumerate()
    {
        put_u32(&mut out, footer + i * 4, v)?;
    }
    out[footer + 0x1C..].copy_from_slice(FOOTER_MAGIC);

    rebuild(&out, &info, rgba)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glyphs(width: u32, height: u32) -> Vec<u8> {
        // Grey steps that BC4 stores exactly (block endpoints 0 and 255).
        (0..width * height)
            .flat_map(|i| {
                let v = if (i % width / 4 + i / width / 4) % 2 == 0 { 255 } else { 0 };
                [v, v, v, 255]
            })
            .collect()
    }

    #[test]
    fn footer_atlas_round_trips() {
        let grid = GlyphGrid::uniform(64, 64, 16, 16);
        let rgba = glyphs(64, 64);
        let file = create(64, 64, PixelFormat::Bc4, &grid, &rgba).unwrap();
        let info = analyze(&file).unwrap();
        assert_eq!(info.source, AtlasSource::Footer);
        assert_eq!((info.width, info.height, info.format), (64, 64, PixelFormat::Bc4));
        assert_eq!(info.grid, grid);
        assert_eq!(decode(&file, &info).unwrap(), rgba);
    }

    #[test]
    fn rebuild_keeps_size_and_frame() {
        let grid = GlyphGrid::uniform(32, 32, 16, 16);
        let file = create(32, 32, PixelFormat::Bc1, &grid, &vec![0; 32 * 32 * 4]).unwrap();
        let info = analyze(&file).unwrap();
        let mut rgba = decode(&file, &info).unwrap();
        let cell = vec![255u8; 16 * 16 * 4];
        write_cell(&mut rgba, &info, 3, &cell).unwrap();
        let rebuilt = rebuild(&file, &info, &rgba).unwrap();
        assert_eq!(rebuilt.len(), file.len());
        assert_eq!(&rebuilt[..info.texture_offset], &file[..info.texture_offset]);
        assert_eq!(&rebuilt[rebuilt.len() - FOOTER_SIZE..], &file[file.len() - FOOTER_SIZE..]);
        let decoded = decode(&rebuilt, &info).unwrap();
        assert_eq!(extract_cell(&decoded, &info, 3).unwrap(), cell);
        assert!(extract_cell(&decoded, &info, 0).unwrap().iter().step_by(4).all(|&v| v == 0));
    }

    #[test]
    fn rebuild_records_written_size() {
        let grid = GlyphGrid::uniform(32, 32, 16, 16);
        let rgba = glyphs(32, 32);
        let mut file = create(32, 32, PixelFormat::Bc4, &grid, &rgba).unwrap();
        // Reserve 0x100 spare bytes after the surface.
        let footer = file.split_off(file.len() - FOOTER_SIZE);
        file.extend_from_slice(&[0; 0x100]);
        file.extend_from_slice(&footer);
        let size_field = file.len() - FOOTER_SIZE + 0x0C;
        let surface = le_u32_at(&file, size_field).unwrap() as usize;
        put_u32(&mut file, size_field, (surface + 0x100) as u32).unwrap();

        let info = analyze(&file).unwrap();
        assert_eq!(info.texture_size, surface + 0x100);
        let rebuilt = rebuild(&file, &info, &rgba).unwrap();
        assert_eq!(rebuilt.len(), file.len());
        assert_eq!(le_u32_at(&rebuilt, size_field).unwrap() as usize, surface);
        assert_eq!(analyze(&rebuilt).unwrap().texture_size, surface);
    }

    #[test]
    fn headerless_file_uses_fallback() {
        let data = vec![0u8; FALLBACK_TEXTURE_OFFSET + 2048 * 2048 / 2];
        let info = analyze(&data).unwrap();
        assert_eq!(info.source, AtlasSource::Fallback);
        assert_eq!((info.width, info.height, info.format), (2048, 2048, PixelFormat::Bc4));
        assert_eq!(info.grid.cell_width, 64);
        assert_eq!(info.grid.cell_count(), 32 * 32);
        assert!(analyze(&data[..data.len() - 1]).is_err());
    }

    #[test]
    fn bntx_hosted_atlas() {
        let rgba = glyphs(16, 16);
        let blocks = PixelFormat::Bc4.encode(&rgba, 16, 16).unwrap();
        let surface = BlockLinear::new(16, 16, 4, 4, 8).swizzle(&blocks).unwrap();
        let file = crate::formats::bntx::build_single("Font", 16, 16, 0x1D01, 0, &surface);
        let info = analyze(&file).unwrap();
        assert_eq!(info.source, AtlasSource::Bntx);
        assert_eq!(decode(&file, &info).unwrap(), rgba);
    }

    #[test]
    fn unknown_bntx_tile_mode() {
        let mut file = crate::formats::bntx::build_single("Font", 16, 16, 0x1D01, 0, &[0; 512]);
        // BRTI at 0x50, tile mode at +0x12.
        file[0x62] = 5;
        assert!(matches!(analyze(&file), Err(Error::Parse(_))));
    }

    #[test]
    fn cell_geometry() {
        let grid = GlyphGrid::uniform(256, 128, 64, 64);
        assert_eq!(grid.cell_count(), 8);
        assert_eq!(
            grid.cell_rect(5),
            Some(CellRect {
                x: 64,
                y: 64,
                width: 64,
                height: 64
            })
        );
        assert_eq!(grid.cell_rect(8), None);
    }
}
