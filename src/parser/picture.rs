// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture preambles and slice decoding (ST 2042-1 clauses 12 and 13).
//!
//! A picture data unit carries a preamble (picture number and transform
//! parameters) followed by the coded slices. Low delay slices share a fixed
//! byte budget; high quality slices declare their own per-component lengths.
//! Decoded slices land in a [Slices] container and are tiled back into
//! subband-ordered coefficient planes by [merge_blocks].

use anyhow::anyhow;
use anyhow::Context;

use crate::bitstream::BitReader;
use crate::intlog2;
use crate::picture::slice_segment;
use crate::picture::CoeffPicture;
use crate::picture::CoeffPlane;
use crate::picture::PictureFormat;
use crate::transform::band_count;
use crate::transform::band_extent;
use crate::transform::padded_size;
use crate::transform::WaveletKernel;

/// Which slice carriage a picture uses, with the profile-specific preamble
/// fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SliceCoding {
    LowDelay { slice_bytes_numerator: u32, slice_bytes_denominator: u32 },
    HighQuality { slice_prefix_bytes: u32, slice_size_scalar: u32 },
}

/// The decoded preamble of a picture data unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PicturePreamble {
    pub picture_number: u32,
    pub kernel: WaveletKernel,
    pub depth: usize,
    pub slices_x: usize,
    pub slices_y: usize,
    pub coding: SliceCoding,
}

/// Profile selector for [parse_picture_preamble].
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PictureProfile {
    LowDelay,
    HighQuality,
}

/// Parse a picture preamble and leave the reader byte-aligned on the first
/// slice.
pub fn parse_picture_preamble(
    r: &mut BitReader,
    profile: PictureProfile,
) -> anyhow::Result<PicturePreamble> {
    let picture_number: u32 = r.read_bits(32).context("picture_number")?;

    let wavelet_index: u32 = r.read_uint().context("wavelet_index")?;
    let kernel = WaveletKernel::n(wavelet_index)
        .ok_or_else(|| anyhow!("unknown wavelet kernel {}", wavelet_index))?;
    let depth: u32 = r.read_uint().context("dwt_depth")?;
    let slices_x: u32 = r.read_uint().context("slices_x")?;
    let slices_y: u32 = r.read_uint().context("slices_y")?;
    if slices_x == 0 || slices_y == 0 {
        return Err(anyhow!("degenerate slice grid {}x{}", slices_x, slices_y));
    }

    let coding = match profile {
        PictureProfile::LowDelay => {
            let numerator: u32 = r.read_uint().context("slice_bytes_numerator")?;
            let denominator: u32 = r.read_uint().context("slice_bytes_denominator")?;
            if denominator == 0 {
                return Err(anyhow!("slice_bytes denominator is zero"));
            }
            SliceCoding::LowDelay {
                slice_bytes_numerator: numerator,
                slice_bytes_denominator: denominator,
            }
        }
        PictureProfile::HighQuality => SliceCoding::HighQuality {
            slice_prefix_bytes: r.read_uint().context("slice_prefix_bytes")?,
            slice_size_scalar: r.read_uint().context("slice_size_scalar")?,
        },
    };

    r.byte_align()?;

    Ok(PicturePreamble {
        picture_number,
        kernel,
        depth: depth as usize,
        slices_x: slices_x as usize,
        slices_y: slices_y as usize,
        coding,
    })
}

/// Slice grid and padded component extents of one picture's coefficient
/// space. Every slice contributes an integer number of samples to every
/// subband of every component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SliceGeometry {
    pub depth: usize,
    pub slices_x: usize,
    pub slices_y: usize,
    /// Padded (height, width) of each component.
    pub extents: [(usize, usize); 3],
}

impl SliceGeometry {
    pub fn new(format: PictureFormat, depth: usize, slices_x: usize, slices_y: usize) -> Self {
        let mut extents = [(0, 0); 3];
        for (component, extent) in extents.iter_mut().enumerate() {
            let (h, w) = format.component_extent(component);
            *extent = (padded_size(h, depth), padded_size(w, depth));
        }
        Self { depth, slices_x, slices_y, extents }
    }

    /// (height, width) of `band` of `component`.
    pub fn band_extent(&self, component: usize, band: usize) -> (usize, usize) {
        let (h, w) = self.extents[component];
        band_extent(h, w, self.depth, band)
    }

    pub fn num_slices(&self) -> usize {
        self.slices_x * self.slices_y
    }

    /// Coefficient count slice (sy, sx) owns within one component.
    fn slice_coeff_count(&self, component: usize, sy: usize, sx: usize) -> usize {
        (0..band_count(self.depth))
            .map(|band| {
                let (h, w) = self.band_extent(component, band);
                slice_segment(h, sy, self.slices_y).len() * slice_segment(w, sx, self.slices_x).len()
            })
            .sum()
    }
}

/// Decoded slices of one picture: the per-slice quantisation indices in
/// (sy, sx) raster order, and per slice and component the quantised
/// coefficients in subband traversal order, row-major within each subband
/// share.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Slices {
    pub geometry: SliceGeometry,
    pub q_indices: Vec<u8>,
    pub coefficients: Vec<[Vec<i32>; 3]>,
}

/// Byte budget of low delay slice `n` out of `num_slices` sharing
/// `total_bytes`: the cumulative schedule keeps every slice within one byte
/// of every other and makes the budgets sum exactly to the total.
pub fn ld_slice_bytes(n: usize, num_slices: usize, total_bytes: usize) -> usize {
    let next = (n as u64 + 1) * total_bytes as u64 / num_slices as u64;
    let this = n as u64 * total_bytes as u64 / num_slices as u64;
    (next - this) as usize
}

/// Decode one component's coefficient run: every subband share of the slice
/// in traversal order. Exhausted bounds read as zeros; real end-of-data is a
/// truncation error.
fn decode_component_run(
    r: &mut BitReader,
    geometry: &SliceGeometry,
    component: usize,
    sy: usize,
    sx: usize,
    out: &mut Vec<i32>,
) -> anyhow::Result<()> {
    for band in 0..band_count(geometry.depth) {
        let (h, w) = geometry.band_extent(component, band);
        let rows = slice_segment(h, sy, geometry.slices_y);
        let cols = slice_segment(w, sx, geometry.slices_x);
        for _ in 0..rows.len() * cols.len() {
            out.push(r.read_sint().context("slice coefficient")?);
        }
    }
    Ok(())
}

/// Decode the slices of a low delay picture. `picture_bytes` is the
/// compressed size of this picture (for field pictures, half the frame
/// total).
pub fn decode_ld_slices(
    r: &mut BitReader,
    geometry: &SliceGeometry,
    picture_bytes: usize,
) -> anyhow::Result<Slices> {
    let num_slices = geometry.num_slices();
    let mut q_indices = Vec::with_capacity(num_slices);
    let mut coefficients = Vec::with_capacity(num_slices);

    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            let n = sy * geometry.slices_x + sx;
            let budget = ld_slice_bytes(n, num_slices, picture_bytes);
            if budget == 0 {
                return Err(anyhow!("slice {} has an empty byte budget", n));
            }
            let slice_bits = 8 * budget as u64;
            r.push_bound(slice_bits);

            let q_index: u32 = r.read_bits(7).context("slice qindex")?;
            let length_bits = intlog2(slice_bits - 7);
            let luma_bits: u32 = r.read_bits(length_bits as usize).context("slice_y_length")?;

            let mut slice = [Vec::new(), Vec::new(), Vec::new()];

            r.push_bound(u64::from(luma_bits));
            decode_component_run(r, geometry, 0, sy, sx, &mut slice[0])?;
            r.end_bound().context("luma segment")?;

            // The chroma segment is whatever remains of the slice: both
            // colour difference components as one stream.
            decode_component_run(r, geometry, 1, sy, sx, &mut slice[1])?;
            decode_component_run(r, geometry, 2, sy, sx, &mut slice[2])?;
            r.end_bound().context("slice padding")?;

            q_indices.push(q_index as u8);
            coefficients.push(slice);
        }
    }

    Ok(Slices { geometry: *geometry, q_indices, coefficients })
}

/// Decode the slices of a high quality picture.
pub fn decode_hq_slices(
    r: &mut BitReader,
    geometry: &SliceGeometry,
    slice_prefix_bytes: u32,
    slice_size_scalar: u32,
) -> anyhow::Result<Slices> {
    let num_slices = geometry.num_slices();
    let mut q_indices = Vec::with_capacity(num_slices);
    let mut coefficients = Vec::with_capacity(num_slices);

    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            r.skip_bits(8 * u64::from(slice_prefix_bytes))
                .context("slice prefix")?;

            let mut lengths = [0u64; 3];
            for length in lengths.iter_mut() {
                let coded: u32 = r.read_bits(8).context("component length")?;
                *length = u64::from(coded) * u64::from(slice_size_scalar);
            }
            let q_index: u32 = r.read_bits(8).context("slice qindex")?;

            let mut slice = [Vec::new(), Vec::new(), Vec::new()];
            for component in 0..3 {
                r.push_bound(8 * lengths[component]);
                decode_component_run(r, geometry, component, sy, sx, &mut slice[component])?;
                r.end_bound().context("component padding")?;
            }

            q_indices.push(q_index as u8);
            coefficients.push(slice);
        }
    }

    Ok(Slices { geometry: *geometry, q_indices, coefficients })
}

/// Tile decoded slices back into subband-ordered coefficient planes.
pub fn merge_blocks(slices: &Slices) -> CoeffPicture {
    let geometry = &slices.geometry;
    let mut components = [
        CoeffPlane::new(geometry.extents[0].0, geometry.extents[0].1, geometry.depth),
        CoeffPlane::new(geometry.extents[1].0, geometry.extents[1].1, geometry.depth),
        CoeffPlane::new(geometry.extents[2].0, geometry.extents[2].1, geometry.depth),
    ];

    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            let slice = &slices.coefficients[sy * geometry.slices_x + sx];
            for (component, plane) in components.iter_mut().enumerate() {
                let mut run = slice[component].iter();
                for band in 0..band_count(geometry.depth) {
                    let (h, w) = geometry.band_extent(component, band);
                    let rows = slice_segment(h, sy, geometry.slices_y);
                    let cols = slice_segment(w, sx, geometry.slices_x);
                    for y in rows {
                        for x in cols.clone() {
                            // Short runs only happen on malformed container
                            // contents; missing coefficients stay zero.
                            let Some(&c) = run.next() else { continue };
                            plane.bands[band].set(y, x, c);
                        }
                    }
                }
            }
        }
    }

    CoeffPicture { components }
}

/// The inverse of [merge_blocks]: cut a coefficient picture into per-slice
/// runs. Kept as the partition law's dual; the test encoders build their
/// slice payloads through it.
pub fn split_into_slices(
    coeffs: &CoeffPicture,
    geometry: &SliceGeometry,
    q_indices: Vec<u8>,
) -> Slices {
    debug_assert_eq!(q_indices.len(), geometry.num_slices());
    let mut coefficients = Vec::with_capacity(geometry.num_slices());

    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            let mut slice = [Vec::new(), Vec::new(), Vec::new()];
            for (component, out) in slice.iter_mut().enumerate() {
                out.reserve(geometry.slice_coeff_count(component, sy, sx));
                let plane = &coeffs.components[component];
                for band in 0..band_count(geometry.depth) {
                    let (h, w) = geometry.band_extent(component, band);
                    for y in slice_segment(h, sy, geometry.slices_y) {
                        for x in slice_segment(w, sx, geometry.slices_x) {
                            out.push(plane.bands[band].get(y, x));
                        }
                    }
                }
            }
            coefficients.push(slice);
        }
    }

    Slices { geometry: *geometry, q_indices, coefficients }
}
