// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The inverse discrete wavelet transform (ST 2042-1 clause 15).
//!
//! Each wavelet kernel is defined by its synthesis lifting steps: in-place
//! updates of the even or odd samples of an interleaved low/high array,
//! `x[i] <- x[i] +/- ((sum of w * x[i + off] + rounding) >> shift)`, with
//! symmetric edge extension. A 2D synthesis level interleaves the four
//! subbands, filters every column and then every row, and finally undoes the
//! per-level precision shift of the analysis stage.

use enumn::N;

use crate::picture::CoeffPlane;
use crate::picture::Plane;

/// The wavelet kernels of ST 2042-1, in wavelet_index order.
#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
pub enum WaveletKernel {
    DeslauriersDubuc9_7 = 0,
    LeGall5_3 = 1,
    DeslauriersDubuc13_7 = 2,
    HaarNoShift = 3,
    HaarSingleShift = 4,
    Fidelity = 5,
    Daubechies9_7 = 6,
}

impl std::fmt::Display for WaveletKernel {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let name = match self {
            WaveletKernel::DeslauriersDubuc9_7 => "Deslauriers-Dubuc (9,7)",
            WaveletKernel::LeGall5_3 => "LeGall (5,3)",
            WaveletKernel::DeslauriersDubuc13_7 => "Deslauriers-Dubuc (13,7)",
            WaveletKernel::HaarNoShift => "Haar (no shift)",
            WaveletKernel::HaarSingleShift => "Haar (single shift)",
            WaveletKernel::Fidelity => "Fidelity",
            WaveletKernel::Daubechies9_7 => "Daubechies (9,7)",
        };
        f.write_str(name)
    }
}

#[derive(Copy, Clone, PartialEq, Eq)]
enum Parity {
    Even,
    Odd,
}

/// One synthesis lifting step. Tap offsets are relative to the target
/// sample and always land on the opposite parity.
struct LiftStep {
    parity: Parity,
    subtract: bool,
    taps: &'static [(isize, i64)],
    shift: u32,
}

const DD_9_7_SYNTHESIS: [LiftStep; 2] = [
    LiftStep { parity: Parity::Even, subtract: true, taps: &[(-1, 1), (1, 1)], shift: 2 },
    LiftStep { parity: Parity::Odd, subtract: false, taps: &[(-3, -1), (-1, 9), (1, 9), (3, -1)], shift: 4 },
];

const LEGALL_5_3_SYNTHESIS: [LiftStep; 2] = [
    LiftStep { parity: Parity::Even, subtract: true, taps: &[(-1, 1), (1, 1)], shift: 2 },
    LiftStep { parity: Parity::Odd, subtract: false, taps: &[(-1, 1), (1, 1)], shift: 1 },
];

const DD_13_7_SYNTHESIS: [LiftStep; 2] = [
    LiftStep { parity: Parity::Even, subtract: true, taps: &[(-3, -1), (-1, 9), (1, 9), (3, -1)], shift: 5 },
    LiftStep { parity: Parity::Odd, subtract: false, taps: &[(-3, -1), (-1, 9), (1, 9), (3, -1)], shift: 4 },
];

const HAAR_SYNTHESIS: [LiftStep; 2] = [
    LiftStep { parity: Parity::Even, subtract: true, taps: &[(1, 1)], shift: 1 },
    LiftStep { parity: Parity::Odd, subtract: false, taps: &[(-1, 1)], shift: 0 },
];

const FIDELITY_SYNTHESIS: [LiftStep; 2] = [
    LiftStep {
        parity: Parity::Even,
        subtract: true,
        taps: &[(-7, -2), (-5, 10), (-3, -25), (-1, 81), (1, 81), (3, -25), (5, 10), (7, -2)],
        shift: 8,
    },
    LiftStep {
        parity: Parity::Odd,
        subtract: false,
        taps: &[(-7, -8), (-5, 21), (-3, -46), (-1, 161), (1, 161), (3, -46), (5, 21), (7, -8)],
        shift: 8,
    },
];

const DAUB_9_7_SYNTHESIS: [LiftStep; 4] = [
    LiftStep { parity: Parity::Even, subtract: true, taps: &[(-1, 1817), (1, 1817)], shift: 12 },
    LiftStep { parity: Parity::Odd, subtract: true, taps: &[(-1, 3616), (1, 3616)], shift: 12 },
    LiftStep { parity: Parity::Even, subtract: false, taps: &[(-1, 217), (1, 217)], shift: 12 },
    LiftStep { parity: Parity::Odd, subtract: false, taps: &[(-1, 6497), (1, 6497)], shift: 12 },
];

impl WaveletKernel {
    fn synthesis_steps(self) -> &'static [LiftStep] {
        match self {
            WaveletKernel::DeslauriersDubuc9_7 => &DD_9_7_SYNTHESIS,
            WaveletKernel::LeGall5_3 => &LEGALL_5_3_SYNTHESIS,
            WaveletKernel::DeslauriersDubuc13_7 => &DD_13_7_SYNTHESIS,
            WaveletKernel::HaarNoShift | WaveletKernel::HaarSingleShift => &HAAR_SYNTHESIS,
            WaveletKernel::Fidelity => &FIDELITY_SYNTHESIS,
            WaveletKernel::Daubechies9_7 => &DAUB_9_7_SYNTHESIS,
        }
    }

    /// Right shift applied to every sample once per synthesis level, undoing
    /// the precision shift of the analysis stage.
    pub fn filter_shift(self) -> u32 {
        match self {
            WaveletKernel::HaarNoShift | WaveletKernel::Fidelity => 0,
            _ => 1,
        }
    }
}

/// `extent` rounded up to a multiple of 2^depth.
pub fn padded_size(extent: usize, depth: usize) -> usize {
    let unit = 1 << depth;
    (extent + unit - 1) / unit * unit
}

/// Number of subbands of a depth-D decomposition.
pub fn band_count(depth: usize) -> usize {
    3 * depth + 1
}

/// (height, width) of subband `band` (traversal order) for a component of
/// the given padded extent.
pub fn band_extent(
    padded_height: usize,
    padded_width: usize,
    depth: usize,
    band: usize,
) -> (usize, usize) {
    debug_assert!(band < band_count(depth));
    let level = if band == 0 { depth } else { depth - (band - 1) / 3 };
    (padded_height >> level, padded_width >> level)
}

/// Symmetric edge extension: reflect about the boundary sample without
/// repeating it.
fn reflect(mut i: isize, len: usize) -> usize {
    let last = (len - 1) as isize;
    loop {
        if i < 0 {
            i = -i;
        } else if i > last {
            i = 2 * last - i;
        } else {
            return i as usize;
        }
    }
}

/// Run the kernel's synthesis lifting steps over one interleaved
/// even/odd array.
fn synthesise_1d(a: &mut [i32], kernel: WaveletKernel) {
    debug_assert!(a.len() >= 2 && a.len() % 2 == 0);
    for step in kernel.synthesis_steps() {
        let start = match step.parity {
            Parity::Even => 0,
            Parity::Odd => 1,
        };
        let rounding = if step.shift > 0 { 1i64 << (step.shift - 1) } else { 0 };
        for i in (start..a.len()).step_by(2) {
            let mut sum = rounding;
            for &(off, w) in step.taps {
                sum += w * i64::from(a[reflect(i as isize + off, a.len())]);
            }
            let delta = (sum >> step.shift) as i32;
            if step.subtract {
                a[i] -= delta;
            } else {
                a[i] += delta;
            }
        }
    }
}

/// One 2D synthesis level: combine a low-resolution LL with its HL, LH and
/// HH subbands into the LL of the next finer level.
fn synthesise_level(
    ll: &Plane,
    hl: &Plane,
    lh: &Plane,
    hh: &Plane,
    kernel: WaveletKernel,
) -> Plane {
    let (h, w) = (ll.height, ll.width);
    let mut out = Plane::new(2 * h, 2 * w);

    // HL holds the horizontal high-pass samples, LH the vertical ones.
    for y in 0..h {
        for x in 0..w {
            out.set(2 * y, 2 * x, ll.get(y, x));
            out.set(2 * y, 2 * x + 1, hl.get(y, x));
            out.set(2 * y + 1, 2 * x, lh.get(y, x));
            out.set(2 * y + 1, 2 * x + 1, hh.get(y, x));
        }
    }

    let mut column = vec![0i32; 2 * h];
    for x in 0..2 * w {
        for (y, value) in column.iter_mut().enumerate() {
            *value = out.get(y, x);
        }
        synthesise_1d(&mut column, kernel);
        for (y, value) in column.iter().enumerate() {
            out.set(y, x, *value);
        }
    }

    for y in 0..2 * h {
        synthesise_1d(out.row_mut(y), kernel);
    }

    let shift = kernel.filter_shift();
    if shift > 0 {
        let rounding = 1 << (shift - 1);
        for y in 0..2 * h {
            for value in out.row_mut(y) {
                *value = (*value + rounding) >> shift;
            }
        }
    }

    out
}

/// Reconstruct one component from its subbands, levels from coarsest to
/// finest. The result has the padded extent; the caller crops.
pub fn inverse_transform(coeffs: &CoeffPlane, kernel: WaveletKernel) -> Plane {
    let mut current = coeffs.bands[0].clone();
    for level in 0..coeffs.depth {
        let hl = &coeffs.bands[1 + 3 * level];
        let lh = &coeffs.bands[2 + 3 * level];
        let hh = &coeffs.bands[3 + 3 * level];
        current = synthesise_level(&current, hl, lh, hh, kernel);
    }
    current
}
