// SPDX-License-Identifier: GPL-3.0-only

//! Packed YUV 4:2:2 pixel conversions
//!
//! All converters walk the source in 4-byte groups (two pixels sharing one
//! chroma pair) and write into caller-provided buffers. Callers must check
//! that the source holds at least `2 * pixel_count` bytes.

use super::codec::PackedYuvLayout;

/// Fixed-point BT.601 conversion of one sample
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let y = y as i32;
    let u = u as i32 - 128;
    let v = v as i32 - 128;
    let r = (y + ((359 * v) >> 8)).clamp(0, 255) as u8;
    let g = (y - ((88 * u + 183 * v) >> 8)).clamp(0, 255) as u8;
    let b = (y + ((454 * u) >> 8)).clamp(0, 255) as u8;
    [r, g, b]
}

/// Bytes of packed 4:2:2 data needed for `pixel_count` pixels
pub fn packed_len(pixel_count: usize) -> usize {
    pixel_count * 2
}

/// Convert packed YUV to interleaved RGB (3 bytes per pixel)
pub fn packed_to_rgb(src: &[u8], layout: PackedYuvLayout, rgb: &mut [u8]) {
    let [y0, y1, cb, cr] = layout.indexes();
    for (group, out) in src.chunks_exact(4).zip(rgb.chunks_exact_mut(6)) {
        out[..3].copy_from_slice(&yuv_to_rgb(group[y0], group[cb], group[cr]));
        out[3..].copy_from_slice(&yuv_to_rgb(group[y1], group[cb], group[cr]));
    }
}

/// Extract the luma plane (1 byte per pixel)
pub fn packed_to_luma(src: &[u8], layout: PackedYuvLayout, luma: &mut [u8]) {
    let [y0, y1, _, _] = layout.indexes();
    for (group, out) in src.chunks_exact(4).zip(luma.chunks_exact_mut(2)) {
        out[0] = group[y0];
        out[1] = group[y1];
    }
}

/// Split into a luma plane and an interleaved (Cb, Cr) plane at half width
pub fn packed_to_planes(src: &[u8], layout: PackedYuvLayout, luma: &mut [u8], chroma: &mut [u8]) {
    let [y0, y1, cb, cr] = layout.indexes();
    for ((group, y_out), c_out) in src
        .chunks_exact(4)
        .zip(luma.chunks_exact_mut(2))
        .zip(chroma.chunks_exact_mut(2))
    {
        y_out[0] = group[y0];
        y_out[1] = group[y1];
        c_out[0] = group[cb];
        c_out[1] = group[cr];
    }
}
