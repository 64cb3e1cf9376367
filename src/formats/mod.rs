//! Codecs for the binary formats a localization touches.
//!
//! All codecs follow the same conventions:
//!
//! * **Slices in, slices out** - parsers take the whole file as `&[u8]`
//!   and validate every offset before use. [`sarc::Sarc`] and
//!   [`bntx::Bntx`] additionally parse from any [`std::io::Read`] +
//!   [`std::io::Seek`].
//! * **Size-preserving writes** - patching functions return a buffer of
//!   exactly the input's length. Values that do not fit are skipped and
//!   reported.
//! * **Compression is separate** - codecs receive decompressed bytes; see
//!   [`crate::compression`].
//!
//! ## Format overview
//!
//! | Module   | Format | Description |
//! |----------|--------|-------------|
//! | [`sarc`] | SARC   | Asset archive; usually Zstd-compressed (`.zs`) |
//! | [`msbt`] | MSBT   | Per-screen message table, UTF-16 with control tags |
//! | [`rtbl`] | RTBL   | Record tables with hashed names and fixed-size text cells |
//! | [`bntx`] | BNTX   | GPU texture container; holds font atlases |

pub mod bntx;
pub mod msbt;
pub mod rtbl;
pub mod sarc;
