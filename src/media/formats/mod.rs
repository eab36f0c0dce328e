// SPDX-License-Identifier: GPL-3.0-only

//! Encoding classification and pixel conversions

pub mod codec;
pub mod conversions;

pub use codec::{Codec, PackedYuvLayout};
