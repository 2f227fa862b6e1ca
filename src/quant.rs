// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Inverse quantisation (ST 2042-1 clause 13).
//!
//! Quantisation factors follow the quarter-power-of-two recurrence of
//! 13.3.2: four exact integer constants per `q mod 4`, scaled by
//! `2^(q / 4)`. Each (kernel, depth) pair has a preset quantisation matrix
//! whose entries offset the per-slice quantisation index subband by subband.

use anyhow::anyhow;

use crate::transform::band_count;
use crate::transform::WaveletKernel;

/// Largest effective quantisation index the decoder accepts. Indices are
/// 7 bits on the wire; the matrix offset can push the sum slightly above
/// that, and capping here keeps `coeff * factor` inside 64 bits.
pub const MAX_QUANT_INDEX: u32 = 127;

/// The quantisation factor for index `q` (ST 2042-1 13.3.2).
pub fn quant_factor(q: u32) -> i64 {
    let base = 1i64 << (q / 4);
    match q % 4 {
        0 => base * 4,
        1 => (503829 * base + 52958) / 105917,
        2 => (665857 * base + 58854) / 117708,
        _ => (440253 * base + 32722) / 65444,
    }
}

/// The quantisation offset for index `q` (ST 2042-1 13.3.2).
pub fn quant_offset(q: u32) -> i64 {
    match q {
        0 => 1,
        1 => 2,
        _ => (quant_factor(q) + 1) / 2,
    }
}

/// Inverse quantise one coefficient, reconstructing to the middle of the
/// quantisation bucket.
pub fn inverse_quant(coeff: i32, q: u32) -> i32 {
    let factor = quant_factor(q);
    let offset = quant_offset(q);
    match coeff {
        0 => 0,
        c if c > 0 => ((i64::from(c) * factor + offset) >> 2) as i32,
        c => -((i64::from(-c) * factor + offset) >> 2) as i32,
    }
}

/// Inverse quantise without the offset term. The high quality profile path
/// reconstructs this way; see DESIGN.md for the conformance trade-off.
pub fn inverse_quant_np(coeff: i32, q: u32) -> i32 {
    let factor = quant_factor(q);
    match coeff {
        0 => 0,
        c if c > 0 => ((i64::from(c) * factor) >> 2) as i32,
        c => -((i64::from(-c) * factor) >> 2) as i32,
    }
}

/// Effective quantisation index of a subband: the slice index plus the
/// matrix entry, capped to the supported range.
pub fn effective_index(slice_index: u32, matrix_entry: u32) -> u32 {
    (slice_index + matrix_entry).min(MAX_QUANT_INDEX)
}

/// The preset quantisation matrix for a kernel and transform depth, indexed
/// by subband in traversal order. Depths above 4 have no preset matrix and
/// are rejected.
#[rustfmt::skip]
pub fn quant_matrix(kernel: WaveletKernel, depth: usize) -> anyhow::Result<Vec<u32>> {
    use WaveletKernel::*;

    let values: &[u32] = match (kernel, depth) {
        (_, 0) => &[0],

        (DeslauriersDubuc9_7 | DeslauriersDubuc13_7, 1) => &[5, 3, 3, 0],
        (DeslauriersDubuc9_7 | DeslauriersDubuc13_7, 2) => &[5, 3, 3, 0, 4, 4, 1],
        (DeslauriersDubuc9_7 | DeslauriersDubuc13_7, 3) => &[5, 3, 3, 0, 4, 4, 1, 5, 5, 2],
        (DeslauriersDubuc9_7 | DeslauriersDubuc13_7, 4) => &[5, 3, 3, 0, 4, 4, 1, 5, 5, 2, 6, 6, 3],

        (LeGall5_3, 1) => &[4, 2, 2, 0],
        (LeGall5_3, 2) => &[4, 2, 2, 0, 4, 4, 2],
        (LeGall5_3, 3) => &[4, 2, 2, 0, 4, 4, 2, 5, 5, 3],
        (LeGall5_3, 4) => &[4, 2, 2, 0, 4, 4, 2, 5, 5, 3, 7, 7, 5],

        (HaarNoShift, 1) => &[8, 4, 4, 0],
        (HaarNoShift, 2) => &[8, 4, 4, 0, 4, 4, 0],
        (HaarNoShift, 3) => &[8, 4, 4, 0, 4, 4, 0, 4, 4, 0],
        (HaarNoShift, 4) => &[8, 4, 4, 0, 4, 4, 0, 4, 4, 0, 4, 4, 0],

        (HaarSingleShift, 1) => &[8, 4, 4, 0],
        (HaarSingleShift, 2) => &[12, 8, 8, 4, 4, 4, 0],
        (HaarSingleShift, 3) => &[16, 12, 12, 8, 8, 8, 4, 4, 4, 0],
        (HaarSingleShift, 4) => &[20, 16, 16, 12, 12, 12, 8, 8, 8, 4, 4, 4, 0],

        (Fidelity, 1) => &[0, 4, 4, 8],
        (Fidelity, 2) => &[0, 4, 4, 8, 8, 8, 12],
        (Fidelity, 3) => &[0, 4, 4, 8, 8, 8, 12, 13, 13, 17],
        (Fidelity, 4) => &[0, 4, 4, 8, 8, 8, 12, 13, 13, 17, 17, 17, 21],

        (Daubechies9_7, 1) => &[3, 1, 1, 0],
        (Daubechies9_7, 2) => &[3, 1, 1, 0, 4, 4, 2],
        (Daubechies9_7, 3) => &[3, 1, 1, 0, 4, 4, 2, 6, 6, 5],
        (Daubechies9_7, 4) => &[3, 1, 1, 0, 4, 4, 2, 6, 6, 5, 9, 9, 7],

        _ => {
            return Err(anyhow!(
                "no preset quantisation matrix for {} at depth {}",
                kernel,
                depth
            ))
        }
    };

    debug_assert_eq!(values.len(), band_count(depth));
    Ok(values.to_vec())
}
