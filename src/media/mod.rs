// SPDX-License-Identifier: GPL-3.0-only

//! Media processing for captured frames
//!
//! # Modules
//!
//! - [`formats`]: Encoding classification and packed YUV pixel conversions
//! - [`decoders`]: Decoder strategy selection and per-frame decoding

pub mod decoders;
pub mod formats;

// Re-export commonly used types
pub use decoders::{DecoderStrategy, FrameDecoder, select_strategy};
pub use formats::{Codec, PackedYuvLayout};
