//! Tegra X1 block-linear surface layout.
//!
//! The GPU stores textures as a grid of GOBs (groups of bytes), each 64
//! bytes wide and 8 rows tall, stacked `block_height` GOBs high into a
//! block. Blocks are laid out left to right, then top to bottom. For
//! block-compressed formats a "row" is a row of 4×4 blocks and `x` is
//! measured in bytes.

use crate::utils::div_round_up;
use crate::{Error, Result};

/// Bytes in one GOB.
pub const GOB_SIZE: usize = 512;
/// Width of a GOB in bytes.
pub const GOB_WIDTH: usize = 64;
/// Height of a GOB in rows.
pub const GOB_HEIGHT: usize = 8;

/// Default GOB block height for a surface `height_in_blocks` rows tall.
///
/// The GOB row count rounded up to a power of two, clamped to `1..=16`.
pub fn block_height_for(height_in_blocks: usize) -> usize {
    div_round_up(height_in_blocks, GOB_HEIGHT)
        .max(1)
        .next_power_of_two()
        .min(16)
}

/// Geometry of one block-linear surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLinear {
    width_blocks: usize,
    height_blocks: usize,
    bytes_per_block: usize,
    block_height: usize,
}

impl BlockLinear {
    /// Surface of `width × height` pixels in `block_w × block_h` blocks of
    /// `bytes_per_block` bytes.
    pub fn new(
        width: usize,
        height: usize,
        block_w: usize,
        block_h: usize,
        bytes_per_block: usize,
    ) -> Self {
        let height_blocks = div_round_up(height, block_h);
        Self {
            width_blocks: div_round_up(width, block_w),
            height_blocks,
            bytes_per_block,
            block_height: block_height_for(height_blocks),
        }
    }

    /// Use the block height recorded in a texture header instead of the
    /// derived one.
    pub fn with_block_height_log2(mut self, log2: u32) -> Self {
        self.block_height = 1 << log2.min(4);
        self
    }

    pub fn block_height(&self) -> usize {
        self.block_height
    }

    fn width_in_gobs(&self) -> usize {
        div_round_up(self.width_blocks * self.bytes_per_block, GOB_WIDTH)
    }

    /// Size of the surface in linear (row-major block) order.
    pub fn linear_size(&self) -> usize {
        self.width_blocks * self.height_blocks * self.bytes_per_block
    }

    /// Size of the surface in block-linear order, padding included.
    pub fn swizzled_size(&self) -> usize {
        let rows_per_block = GOB_HEIGHT * self.block_height;
        let block_rows = div_round_up(self.height_blocks, rows_per_block);
        self.width_in_gobs() * GOB_SIZE * self.block_height * block_rows
    }

    /// Offset of the GOB holding byte column `x` of row `y`.
    pub fn gob_address(&self, x: usize, y: usize) -> usize {
        let bh = self.block_height;
        (y / (GOB_HEIGHT * bh)) * GOB_SIZE * bh * self.width_in_gobs()
            + (x / GOB_WIDTH) * GOB_SIZE * bh
            + (y % (GOB_HEIGHT * bh) / GOB_HEIGHT) * GOB_SIZE
    }

    /// Offset of byte column `x` of row `y` in the swizzled surface.
    pub fn address(&self, x: usize, y: usize) -> usize {
        self.gob_address(x, y)
            + ((x % 64) / 32) * 256
            + ((y % 8) / 2) * 64
            + ((x % 32) / 16) * 32
            + (y % 2) * 16
            + (x % 16)
    }

    fn check(&self) -> Result<()> {
        if !matches!(self.bytes_per_block, 1 | 2 | 4 | 8 | 16) {
            return Err(Error::Parse("block size must be a power of two up to 16 bytes"));
        }
        Ok(())
    }

    /// Block-linear to linear.
    pub fn deswizzle(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.check()?;
        if data.len() < self.swizzled_size() {
            return Err(Error::UnexpectedEof);
        }
        let bpp = self.bytes_per_block;
        let pitch = self.width_blocks * bpp;
        let mut out = vec![0u8; self.linear_size()];
        for y in 0..self.height_blocks {
            for x in (0..pitch).step_by(bpp) {
                let src = self.address(x, y);
                out[y * pitch + x..][..bpp].copy_from_slice(&data[src..src + bpp]);
            }
        }
        Ok(out)
    }

    /// Linear to block-linear. Padding bytes are zero.
    pub fn swizzle(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.check()?;
        if data.len() < self.linear_size() {
            return Err(Error::UnexpectedEof);
        }
        let bpp = self.bytes_per_block;
        let pitch = self.width_blocks * bpp;
        let mut out = vec![0u8; self.swizzled_size()];
        for y in 0..self.height_blocks {
            for x in (0..pitch).step_by(bpp) {
                let dst = self.address(x, y);
                out[dst..dst + bpp].copy_from_slice(&data[y * pitch + x..][..bpp]);
            }
        }
        Ok(out)
    }
}
