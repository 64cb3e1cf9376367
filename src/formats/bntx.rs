//! BNTX (Binary NX Texture) - the texture container fonts ship their glyph
//! atlases in.
//!
//! Only what the atlas codec needs is read: per-texture geometry, pixel
//! format, tiling parameters and the location of the mip-0 surface. Name
//! pointers are followed by seeking; the relocation table is ignored.
//!
//! ## Layout
//! ```text
//! [0x00] BNTX header  (0x20 bytes)
//! [0x20] NX section   (0x28 bytes)
//! [InfoPtrsOffset]
//!        Array of u64 pointers to BRTI blocks (TextureCount entries)
//! [...]  BRTI blocks  (one per texture, each 0x90 bytes)
//! [...]  String pool, data blocks, relocation table
//! ```
//!
//! ## BNTX Header (0x20 bytes)
//! ```text
//! [0x00] Magic "BNTX"                       (4 bytes)
//! [0x04] DataLength (0, unused)             (u32 LE)
//! [0x08] Padding / version                  (8 bytes)
//! [0x10] BOM (FF FE = LE, FE FF = BE)       (2 bytes)
//! [0x12] FormatRevision (0x0400)            (u16 LE)
//! [0x14] NameOffset (rel-ptr)               (u32 LE)
//! [0x18] StringPoolOffset (rel)             (u16 LE)
//! [0x1A] RelocTableOffset (rel)             (u16 LE)
//! [0x1C] FileSize                           (u32 LE)
//! ```
//!
//! ## NX Section (at 0x20)
//! ```text
//! [0x00] Magic "NX  "                        (4 bytes)
//! [0x04] TextureCount                        (u32 LE)
//! [0x08] InfoPtrsOffset (abs ptr)            (u64 LE)
//! [0x10] DataBlkOffset  (abs ptr)            (u64 LE)
//! [0x18] DictOffset     (abs ptr)            (u64 LE)
//! [0x20] StrDictOffset                       (u32 LE)
//! ```
//!
//! ## BRTI (Texture Info, per texture, 0x90 bytes)
//! ```text
//! [0x00] Magic "BRTI"                       (4 bytes)
//! [0x04] Length (always 0x90)               (u32 LE)
//! [0x08] DataLength                         (u64 LE)
//! [0x10] Flags                              (u8)
//! [0x11] Dimensions (1=1D,2=2D,3=3D,6=Cube) (u8)
//! [0x12] TileMode (0 = block linear)        (u16 LE)
//! [0x14] SwizzleValue                       (u16 LE)
//! [0x16] MipmapCount                        (u16 LE)
//! [0x18] MultiSampleCount                   (u16 LE)
//! [0x1A] Reserved                           (u16)
//! [0x1C] Format                             (u32 LE)
//! [0x20] AccessFlags                        (u32 LE)
//! [0x24] Width                              (u32 LE)
//! [0x28] Height                             (u32 LE)
//! [0x2C] Depth                              (u32 LE)
//! [0x30] ArrayCount                         (u32 LE)
//! [0x34] BlockHeightLog2                    (u32 LE)
//! [0x38] Reserved (0x14 bytes)
//! [0x4C] DataOffset (rel to DataBlkOffset)  (u32 LE)
//! [0x50] NameOffset (abs ptr)               (u64 LE)
//! [0x58] ParentOffset (abs ptr)             (u64 LE)
//! [0x60] PtrsOffset   (abs ptr)             (u64 LE)
//! ```
//!
//! Names are a `u16 LE` byte count followed by that many UTF-8 bytes.

use std::io::{Cursor, Read, Seek, SeekFrom};

use crate::utils::{bytesa, bytesv, le_u16, le_u32, le_u64, magic, u8};
use crate::{Error, Result};

/// Tile mode of a block-linear (swizzled) surface.
pub const TILE_MODE_BLOCK_LINEAR: u16 = 0;
/// Tile mode of a pitch-linear surface.
pub const TILE_MODE_LINEAR: u16 = 1;

/// Metadata for a single texture stored in a BNTX file.
#[derive(Debug, Clone)]
pub struct TextureInfo {
    pub name: String,
    pub width: u32,
    pub height: u32,
    pub mipmap_count: u16,
    /// Raw format code (`0x1A01` BC1, `0x1D01` BC4, ...).
    pub format: u32,
    pub tile_mode: u16,
    /// `log2` of the GOB block height the surface was swizzled with.
    pub block_height_log2: u32,
    /// Offset of the surface relative to `Bntx::data_block_offset`.
    pub data_offset_rel: u32,
    /// Size of the whole mip chain in bytes.
    pub data_length: u64,
}

/// Parsed BNTX texture container.
#[derive(Debug)]
pub struct Bntx {
    pub textures: Vec<TextureInfo>,
    pub le: bool,
    /// Absolute offset of the GPU data block (NX `DataBlkOffset`).
    pub data_block_offset: u64,
}

impl Bntx {
    /// Whether `data` starts with a BNTX header.
    pub fn is_bntx(data: &[u8]) -> bool {
        data.starts_with(b"BNTX")
    }

    /// Parse a BNTX held in memory.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let bntx = Self::parse_reader(&mut Cursor::new(data))?;
        for tex in &bntx.textures {
            bntx.texture_range(tex, data.len())?;
        }
        Ok(bntx)
    }

    /// Parse a BNTX from `r`, which must be positioned at the start of the
    /// file.
    pub fn parse_reader<R: Read + Seek>(r: &mut R) -> Result<Self> {
        magic(r, b"BNTX")?;
        let _data_length = le_u32(r)?;
        let _version: [u8; 8] = bytesa(r)?;

        let le = match bytesa::<2>(r)? {
            [0xFF, 0xFE] => true,
            [0xFE, 0xFF] => false,
            _ => return Err(Error::Parse("invalid BNTX BOM")),
        };
        if !le {
            return Err(Error::Parse("big-endian BNTX is not supported"));
        }

        let _format_revision = le_u16(r)?;
        let _name_offset = le_u32(r)?;
        let _string_pool_off = le_u16(r)?;
        let _reloc_table_off = le_u16(r)?;
        let _file_size = le_u32(r)?;

        magic(r, b"NX  ")?;
        let texture_count = le_u32(r)?;
        let info_ptrs_offset = le_u64(r)?;
        let data_block_offset = le_u64(r)?;
        let _dict_offset = le_u64(r)?;
        let _str_dict_offset = le_u32(r)?;

        r.seek(SeekFrom::Start(info_ptrs_offset))?;
        let mut brti_offsets = Vec::new();
        for _ in 0..texture_count {
            brti_offsets.push(le_u64(r)?);
        }

        let mut textures = Vec::with_capacity(brti_offsets.len());
        for brti_abs in brti_offsets {
            r.seek(SeekFrom::Start(brti_abs))?;
            textures.push(parse_brti(r)?);
        }

        Ok(Bntx {
            textures,
            le,
            data_block_offset,
        })
    }

    /// Absolute file offset of the GPU data for `tex`.
    pub fn texture_data_offset(&self, tex: &TextureInfo) -> u64 {
        self.data_block_offset + tex.data_offset_rel as u64
    }

    /// `(start, end)` of the texture's data, checked against `file_len`.
    pub fn texture_range(&self, tex: &TextureInfo, file_len: usize) -> Result<(usize, usize)> {
        let start =
            usize::try_from(self.texture_data_offset(tex)).map_err(|_| Error::InvalidRange)?;
        let len = usize::try_from(tex.data_length).map_err(|_| Error::InvalidRange)?;
        let end = start.checked_add(len).ok_or(Error::InvalidRange)?;
        if end > file_len {
            return Err(Error::InvalidRange);
        }
        Ok((start, end))
    }
}

fn parse_brti<R: Read + Seek>(r: &mut R) -> Result<TextureInfo> {
    magic(r, b"BRTI")?;
    let _length = le_u32(r)?;
    let data_length = le_u64(r)?;
    let _flags = u8(r)?;
    let _dimensions = u8(r)?;
    let tile_mode = le_u16(r)?;
    let _swizzle = le_u16(r)?;
    let mipmap_count = le_u16(r)?;
    let _ms_count = le_u16(r)?;
    let _reserved0 = le_u16(r)?;
    let format = le_u32(r)?;
    let _access_flags = le_u32(r)?;
    let width = le_u32(r)?;
    let height = le_u32(r)?;
    let _depth = le_u32(r)?;
    let _array_count = le_u32(r)?;
    let block_height_log2 = le_u32(r)?;
    r.seek(SeekFrom::Current(0x14))?;
    let data_offset_rel = le_u32(r)?;
    let name_abs = le_u64(r)?;
    let _parent = le_u64(r)?;
    let _ptrs = le_u64(r)?;

    let name = read_bntx_name(r, name_abs)?;

    Ok(TextureInfo {
        name,
        width,
        height,
        mipmap_count,
        format,
        tile_mode,
        block_height_log2,
        data_offset_rel,
        data_length,
    })
}

fn read_bntx_name<R: Read + Seek>(r: &mut R, ptr: u64) -> Result<String> {
    r.seek(SeekFrom::Start(ptr))?;
    let len = le_u16(r)? as usize;
    let buf = bytesv(r, len)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Build a single-texture BNTX around `surface`.
#[cfg(test)]
pub(crate) fn build_single(
    name: &str,
    width: u32,
    height: u32,
    format: u32,
    block_height_log2: u32,
    surface: &[u8],
) -> Vec<u8> {
    const INFO_PTRS: usize = 0x48;
    const BRTI: usize = 0x50;
    const NAME: usize = BRTI + 0x90;
    let data_block = crate::utils::align_up(NAME + 2 + name.len(), 0x100);

    let mut out = vec![0u8; data_block + surface.len()];
    out[..4].copy_from_slice(b"BNTX");
    out[0x10..0x12].copy_from_slice(&[0xFF, 0xFE]);
    out[0x20..0x24].copy_from_slice(b"NX  ");
    out[0x24..0x28].copy_from_slice(&1u32.to_le_bytes());
    out[0x28..0x30].copy_from_slice(&(INFO_PTRS as u64).to_le_bytes());
    out[0x30..0x38].copy_from_slice(&(data_block as u64).to_le_bytes());
    out[INFO_PTRS..INFO_PTRS + 8].copy_from_slice(&(BRTI as u64).to_le_bytes());

    let b = &mut out[BRTI..BRTI + 0x90];
    b[..4].copy_from_slice(b"BRTI");
    b[4..8].copy_from_slice(&0x90u32.to_le_bytes());
    b[8..0x10].copy_from_slice(&(surface.len() as u64).to_le_bytes());
    b[0x11] = 2;
    b[0x16..0x18].copy_from_slice(&1u16.to_le_bytes());
    b[0x1C..0x20].copy_from_slice(&format.to_le_bytes());
    b[0x24..0x28].copy_from_slice(&width.to_le_bytes());
    b[0x28..0x2C].copy_from_slice(&height.to_le_bytes());
    b[0x2C..0x30].copy_from_slice(&1u32.to_le_bytes());
    b[0x30..0x34].copy_from_slice(&1u32.to_le_bytes());
    b[0x34..0x38].copy_from_slice(&block_height_log2.to_le_bytes());
    b[0x50..0x58].copy_from_slice(&(NAME as u64).to_le_bytes());

    out[NAME..NAME + 2].copy_from_slice(&(name.len() as u16).to_le_bytes());
    out[NAME + 2..NAME + 2 + name.len()].copy_from_slice(name.as_bytes());
    out[data_block..].copy_from_slice(surface);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_texture_and_tiling() {
        let surface = vec![0x5A; 512];
        let data = build_single("Font00", 16, 16, 0x1D01, 0, &surface);
        let bntx = Bntx::parse(&data).unwrap();
        let tex = &bntx.textures[0];
        assert_eq!(tex.name, "Font00");
        assert_eq!((tex.width, tex.height, tex.format), (16, 16, 0x1D01));
        assert_eq!(tex.tile_mode, TILE_MODE_BLOCK_LINEAR);
        let (start, end) = bntx.texture_range(tex, data.len()).unwrap();
        assert_eq!(&data[start..end], &surface[..]);
    }

    #[test]
    fn rejects_truncated_surface() {
        let mut data = build_single("Font00", 16, 16, 0x1D01, 0, &[0; 512]);
        data.truncate(data.len() - 1);
        assert!(matches!(Bntx::parse(&data), Err(Error::InvalidRange)));
    }

    #[test]
    fn rejects_bad_bom() {
        let mut data = build_single("F", 4, 4, 0x1D01, 0, &[0; 8]);
        data[0x10] = 0;
        assert!(Bntx::parse(&data).is_err());
    }
}
