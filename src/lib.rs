//! **nxloc** - binary asset engine for localizing Nintendo Switch titles.
//!
//! Reads a game's resource containers, extracts translatable text and the
//! glyph atlas, and writes translations back without breaking the layouts
//! the game engine depends on: fixed slot sizes, hashed labels, GPU memory
//! order and dictionary-seeded compression.
//!
//! # Modules
//! | Module | Role |
//! |--------|------|
//! | [`formats::sarc`]  | SARC archives: parse, in-place repack, fresh writer |
//! | [`formats::msbt`]  | MSBT message tables: UTF-16 text with opaque tags |
//! | [`formats::rtbl`]  | RTBL record tables: hashed labels, fixed text slots |
//! | [`formats::bntx`]  | BNTX texture containers hosting font atlases |
//! | [`compression`]    | Zstd with per-family dictionaries |
//! | [`texture`]        | Block-linear swizzle, BC1/BC4, glyph atlases |
//! | [`text`]           | Control-tag protection and Arabic shaping |
//! | [`hash`]           | Label hash resolution |
//! | [`pipeline`]       | Whole-archive extract and build |
//!
//! Codecs are pure functions over byte slices. Values that cannot be
//! written (a translation longer than its slot, a tag that went missing)
//! are reported in result structs rather than returned as errors, unless a
//! strict option asks otherwise.

pub mod compression;
pub mod config;
pub mod error;
pub mod formats;
pub mod hash;
pub mod pipeline;
pub mod text;
pub mod texture;
pub(crate) mod utils;

pub use error::{Error, Result};
