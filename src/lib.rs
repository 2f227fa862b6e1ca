// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A decoder for SMPTE ST 2042 (VC-2) video streams.
//!
//! VC-2 is an intra-only, wavelet based compression format. The crate turns a
//! byte stream of VC-2 data units into uncompressed planar pictures: the
//! [parser] module handles framing and bit-level syntax, [quant] and
//! [transform] reverse the quantisation and the wavelet decomposition, and
//! [decoder] drives the whole pipeline and serialises the output.

pub mod bitstream;
pub mod decoder;
pub mod parser;
pub mod picture;
pub mod quant;
pub mod transform;

use std::str::FromStr;

/// Colour layout of the decoded planes.
///
/// The chroma planes are subsampled according to the format; RGB streams are
/// carried as three full-resolution planes in G, B, R order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColourFormat {
    /// Y, Cb and Cr planes, no subsampling.
    Yuv444,
    /// Y, Cb and Cr planes, chroma halved horizontally.
    Yuv422,
    /// Y, Cb and Cr planes, chroma halved in both dimensions.
    Yuv420,
    /// G, B and R planes, no subsampling.
    Rgb,
}

impl ColourFormat {
    /// Horizontal chroma subsampling ratio.
    pub fn h_ratio(self) -> usize {
        match self {
            ColourFormat::Yuv444 | ColourFormat::Rgb => 1,
            ColourFormat::Yuv422 | ColourFormat::Yuv420 => 2,
        }
    }

    /// Vertical chroma subsampling ratio.
    pub fn v_ratio(self) -> usize {
        match self {
            ColourFormat::Yuv444 | ColourFormat::Yuv422 | ColourFormat::Rgb => 1,
            ColourFormat::Yuv420 => 2,
        }
    }
}

/// What the decoder writes to its sink.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum OutputMode {
    /// Reconstructed pictures, offset binary, left justified.
    #[default]
    Decoded,
    /// Inverse-quantised wavelet coefficients, 4-byte two's complement.
    Transform,
    /// Quantised wavelet coefficients, 4-byte two's complement.
    Quantised,
    /// One unsigned byte per slice: the slice quantisation index.
    Indices,
}

impl FromStr for OutputMode {
    type Err = &'static str;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decoded" => Ok(OutputMode::Decoded),
            "transform" => Ok(OutputMode::Transform),
            "quantised" => Ok(OutputMode::Quantised),
            "indices" => Ok(OutputMode::Indices),
            _ => {
                Err("unrecognized output mode. Valid values: decoded, transform, quantised, indices")
            }
        }
    }
}

/// Ceiling of log2, as used throughout ST 2042-1 ("intlog2").
pub(crate) fn intlog2(n: u64) -> u32 {
    debug_assert!(n > 0);
    u64::BITS - (n - 1).leading_zeros()
}
