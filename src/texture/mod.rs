//! Font atlas textures.
//!
//! Games render text from a glyph atlas: one large block-compressed,
//! block-linear texture cut into fixed-size cells. Adding glyphs for a new
//! script means decoding that texture, drawing into free cells and writing
//! it back at exactly the same size.
//!
//! | Module | Role |
//! |--------|------|
//! | [`swizzle`] | Tegra block-linear address math |
//! | [`bc`] | BC1 / BC4 block codecs |
//! | [`atlas`] | Atlas container discovery, decode, rebuild, glyph cells |

pub mod atlas;
pub mod bc;
pub mod swizzle;

use crate::{Error, Result};

/// Pixel formats the atlas codec handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    Bc1,
    Bc4,
}

impl PixelFormat {
    /// Map a BNTX format code.
    pub fn from_code(code: u32) -> Result<Self> {
        match code {
            0x1A01 | 0x1A06 => Ok(Self::Bc1),
            0x1D01 | 0x1D02 => Ok(Self::Bc4),
            _ => Err(Error::UnsupportedFormat(code)),
        }
    }

    /// The UNORM code for this format.
    pub fn code(self) -> u32 {
        match self {
            Self::Bc1 => 0x1A01,
            Self::Bc4 => 0x1D01,
        }
    }

    pub fn decode(self, data: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        match self {
            Self::Bc1 => bc::decode_bc1(data, width, height),
            Self::Bc4 => bc::decode_bc4(data, width, height),
        }
    }

    pub fn encode(self, rgba: &[u8], width: usize, height: usize) -> Result<Vec<u8>> {
        match self {
            Self::Bc1 => bc::encode_bc1(rgba, width, height),
            Self::Bc4 => bc::encode_bc4(rgba, width, height),
        }
    }
}
