// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A minimal reference encoder for the end-to-end tests.
//!
//! Builds VC-2 streams for the LeGall and Haar kernels: forward wavelet
//! transform, forward quantisation, slice packing for both profiles, and
//! parse-info framing. The forward transform is written out independently of
//! the library so the tests do not merely invert the code under test.

use vc2_decoder::bitstream::BitWriter;
use vc2_decoder::parser::picture::ld_slice_bytes;
use vc2_decoder::parser::picture::split_into_slices;
use vc2_decoder::parser::picture::SliceGeometry;
use vc2_decoder::parser::picture::Slices;
use vc2_decoder::picture::slice_segment;
use vc2_decoder::picture::CoeffPicture;
use vc2_decoder::picture::CoeffPlane;
use vc2_decoder::picture::Picture;
use vc2_decoder::picture::PictureFormat;
use vc2_decoder::picture::Plane;
use vc2_decoder::quant::effective_index;
use vc2_decoder::quant::quant_factor;
use vc2_decoder::quant::quant_matrix;
use vc2_decoder::transform::band_count;
use vc2_decoder::transform::WaveletKernel;
use vc2_decoder::ColourFormat;

struct Step {
    odd_target: bool,
    subtract: bool,
    taps: &'static [(isize, i64)],
    shift: u32,
}

// Forward lifting, predict step first. The decoder's synthesis must be the
// exact reverse of these.
const LEGALL_ANALYSIS: [Step; 2] = [
    Step { odd_target: true, subtract: true, taps: &[(-1, 1), (1, 1)], shift: 1 },
    Step { odd_target: false, subtract: false, taps: &[(-1, 1), (1, 1)], shift: 2 },
];

const HAAR_ANALYSIS: [Step; 2] = [
    Step { odd_target: true, subtract: true, taps: &[(-1, 1)], shift: 0 },
    Step { odd_target: false, subtract: false, taps: &[(1, 1)], shift: 1 },
];

fn analysis_steps(kernel: WaveletKernel) -> &'static [Step] {
    match kernel {
        WaveletKernel::LeGall5_3 => &LEGALL_ANALYSIS,
        WaveletKernel::HaarNoShift => &HAAR_ANALYSIS,
        _ => panic!("test encoder only speaks LeGall and Haar"),
    }
}

fn analysis_shift(kernel: WaveletKernel) -> u32 {
    match kernel {
        WaveletKernel::LeGall5_3 => 1,
        WaveletKernel::HaarNoShift => 0,
        _ => panic!("test encoder only speaks LeGall and Haar"),
    }
}

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

fn analyse_1d(a: &mut [i32], kernel: WaveletKernel) {
    for step in analysis_steps(kernel) {
        let start = usize::from(step.odd_target);
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

/// Forward wavelet decomposition of one component, bands in the decoder's
/// traversal order.
pub fn forward_transform(plane: &Plane, kernel: WaveletKernel, depth: usize) -> CoeffPlane {
    let mut bands = vec![Plane::new(0, 0); band_count(depth)];
    let mut current = plane.clone();

    for level in (0..depth).rev() {
        let shift = analysis_shift(kernel);
        let (h2, w2) = (current.height, current.width);
        assert!(h2 % 2 == 0 && w2 % 2 == 0, "extent not divisible for the transform");

        let mut work = current.clone();
        for y in 0..h2 {
            for value in work.row_mut(y) {
                *value <<= shift;
            }
        }
        for y in 0..h2 {
            analyse_1d(work.row_mut(y), kernel);
        }
        let mut column = vec![0i32; h2];
        for x in 0..w2 {
            for (y, value) in column.iter_mut().enumerate() {
                *value = work.get(y, x);
            }
            analyse_1d(&mut column, kernel);
            for (y, value) in column.iter().enumerate() {
                work.set(y, x, *value);
            }
        }

        let (h, w) = (h2 / 2, w2 / 2);
        let mut ll = Plane::new(h, w);
        let mut hl = Plane::new(h, w);
        let mut lh = Plane::new(h, w);
        let mut hh = Plane::new(h, w);
        for y in 0..h {
            for x in 0..w {
                ll.set(y, x, work.get(2 * y, 2 * x));
                hl.set(y, x, work.get(2 * y, 2 * x + 1));
                lh.set(y, x, work.get(2 * y + 1, 2 * x));
                hh.set(y, x, work.get(2 * y + 1, 2 * x + 1));
            }
        }
        bands[1 + 3 * level] = hl;
        bands[2 + 3 * level] = lh;
        bands[3 + 3 * level] = hh;
        current = ll;
    }

    bands[0] = current;
    CoeffPlane { depth, bands }
}

/// Encoded size in bits of one signed codeword.
fn sint_bits(c: i32) -> u64 {
    let data_bits = u64::from(31 - (c.unsigned_abs() + 1).leading_zeros());
    2 * data_bits + 1 + u64::from(c != 0)
}

/// Serialise a coefficient run as signed codewords.
fn pack_run(run: &[i32]) -> Vec<u8> {
    let mut w = BitWriter::new(Vec::new());
    for &c in run {
        w.write_sint(c).unwrap();
    }
    w.finish().unwrap()
}

/// The signed sample planes of one coded picture, all set to `value`.
pub fn constant_picture(format: PictureFormat, value: i32) -> Picture {
    let mut picture = Picture::new(format);
    for plane in picture.planes.iter_mut() {
        for y in 0..plane.height {
            for x in 0..plane.width {
                plane.set(y, x, value);
            }
        }
    }
    picture
}

/// Stream-level framing and payload assembly.
pub struct StreamBuilder {
    data: Vec<u8>,
    unit_offsets: Vec<usize>,
}

pub struct TestFormat {
    pub base_format: u32,
    pub width: u32,
    pub height: u32,
    pub colour_format: ColourFormat,
    /// Preset signal range index: 1 for 8-bit full, 3 for 10-bit video.
    pub signal_range_index: u32,
    pub interlaced: bool,
}

impl StreamBuilder {
    pub fn new() -> Self {
        Self { data: Vec::new(), unit_offsets: Vec::new() }
    }

    fn push_unit(&mut self, parse_code: u8, payload: &[u8]) {
        self.unit_offsets.push(self.data.len());
        let next = if parse_code == 0x10 { 0 } else { 13 + payload.len() as u32 };
        self.data.extend_from_slice(&[0x42, 0x42, 0x43, 0x44, parse_code]);
        self.data.extend_from_slice(&next.to_be_bytes());
        self.data.extend_from_slice(&0u32.to_be_bytes());
        self.data.extend_from_slice(payload);
    }

    /// Byte offset of data unit `n` in the stream, for corruption tests.
    pub fn unit_offset(&self, n: usize) -> usize {
        self.unit_offsets[n]
    }

    pub fn sequence_header(&mut self, format: &TestFormat) {
        let mut w = BitWriter::new(Vec::new());
        for v in [2, 0, 3, 0] {
            w.write_uint(v).unwrap(); // major, minor, profile, level
        }
        w.write_uint(format.base_format).unwrap();

        w.write_bit(true).unwrap(); // frame size
        w.write_uint(format.width).unwrap();
        w.write_uint(format.height).unwrap();

        w.write_bit(true).unwrap(); // colour diff sampling format
        let diff_index = match format.colour_format {
            ColourFormat::Yuv444 | ColourFormat::Rgb => 0u32,
            ColourFormat::Yuv422 => 1,
            ColourFormat::Yuv420 => 2,
        };
        w.write_uint(diff_index).unwrap();

        w.write_bit(false).unwrap(); // scan format
        w.write_bit(false).unwrap(); // frame rate
        w.write_bit(false).unwrap(); // pixel aspect ratio
        w.write_bit(false).unwrap(); // clean area

        w.write_bit(true).unwrap(); // signal range
        w.write_uint(format.signal_range_index).unwrap();

        w.write_bit(false).unwrap(); // colour spec

        w.write_uint(u32::from(format.interlaced)).unwrap(); // picture coding mode

        let payload = w.finish().unwrap();
        self.push_unit(0x00, &payload);
    }

    /// Encode one picture as a high quality data unit.
    #[allow(clippy::too_many_arguments)]
    pub fn hq_picture(
        &mut self,
        picture: &Picture,
        format: PictureFormat,
        kernel: WaveletKernel,
        depth: usize,
        slices_x: usize,
        slices_y: usize,
        q_index: u8,
        scalar: u32,
        picture_number: u32,
    ) {
        let geometry = SliceGeometry::new(format, depth, slices_x, slices_y);
        let slices = encode_slices(picture, &geometry, kernel, &vec![q_index; geometry.num_slices()]);

        let mut w = BitWriter::new(Vec::new());
        w.write_bits(32, picture_number).unwrap();
        w.write_uint(kernel as u32).unwrap();
        w.write_uint(depth as u32).unwrap();
        w.write_uint(slices_x as u32).unwrap();
        w.write_uint(slices_y as u32).unwrap();
        w.write_uint(0).unwrap(); // slice prefix bytes
        w.write_uint(scalar).unwrap();
        w.byte_align().unwrap();
        let mut payload = w.finish().unwrap();

        for (n, slice) in slices.coefficients.iter().enumerate() {
            let runs: Vec<Vec<u8>> = slice.iter().map(|run| pack_run(run)).collect();
            let scalar = scalar as usize;
            let padded: Vec<usize> =
                runs.iter().map(|r| (r.len() + scalar - 1) / scalar * scalar).collect();
            for &len in &padded {
                assert!(len / scalar <= 255, "component too large for its length byte");
            }
            payload.push((padded[0] / scalar) as u8);
            payload.push((padded[1] / scalar) as u8);
            payload.push((padded[2] / scalar) as u8);
            payload.push(slices.q_indices[n]);
            for (run, &len) in runs.iter().zip(padded.iter()) {
                payload.extend_from_slice(run);
                payload.extend(std::iter::repeat(0).take(len - run.len()));
            }
        }

        self.push_unit(0xe8, &payload);
    }

    /// Encode one picture as a low delay data unit. `frame_bytes` is the
    /// compressed frame size carried by the slice_bytes rational.
    #[allow(clippy::too_many_arguments)]
    pub fn ld_picture(
        &mut self,
        picture: &Picture,
        format: PictureFormat,
        kernel: WaveletKernel,
        depth: usize,
        slices_x: usize,
        slices_y: usize,
        q_indices: &[u8],
        frame_bytes: usize,
        interlaced: bool,
        picture_number: u32,
    ) {
        let geometry = SliceGeometry::new(format, depth, slices_x, slices_y);
        let slices = encode_slices(picture, &geometry, kernel, q_indices);
        let picture_bytes = if interlaced { frame_bytes / 2 } else { frame_bytes };
        let num_slices = geometry.num_slices();
        assert_eq!(frame_bytes % num_slices, 0, "use a whole slice_bytes rational");

        let mut w = BitWriter::new(Vec::new());
        w.write_bits(32, picture_number).unwrap();
        w.write_uint(kernel as u32).unwrap();
        w.write_uint(depth as u32).unwrap();
        w.write_uint(slices_x as u32).unwrap();
        w.write_uint(slices_y as u32).unwrap();
        w.write_uint((frame_bytes / num_slices) as u32).unwrap(); // numerator
        w.write_uint(1).unwrap(); // denominator
        w.byte_align().unwrap();
        let mut payload = w.finish().unwrap();

        for n in 0..num_slices {
            let budget = ld_slice_bytes(n, num_slices, picture_bytes);
            let slice_bits = 8 * budget as u64;
            let slice = &slices.coefficients[n];

            let luma_bits: u64 = slice[0].iter().map(|&c| sint_bits(c)).sum();
            let chroma_bits: u64 = slice[1..].iter().flatten().map(|&c| sint_bits(c)).sum();
            // intlog2(8B - 7), the width of the slice_y_length field.
            let length_bits = u64::from(64 - (slice_bits - 8).leading_zeros());
            assert!(
                7 + length_bits + luma_bits + chroma_bits <= slice_bits,
                "slice {} overflows its {} byte budget",
                n,
                budget
            );

            let mut sw = BitWriter::new(Vec::new());
            sw.write_bits(7, u32::from(slices.q_indices[n])).unwrap();
            sw.write_bits(length_bits as usize, luma_bits as u32).unwrap();
            for component in slice {
                for &c in component {
                    sw.write_sint(c).unwrap();
                }
            }
            let mut bytes = sw.finish().unwrap();
            bytes.resize(budget, 0);
            payload.extend_from_slice(&bytes);
        }

        self.push_unit(0xc8, &payload);
    }

    pub fn end_of_sequence(&mut self) {
        self.push_unit(0x10, &[]);
    }

    pub fn finish(self) -> Vec<u8> {
        self.data
    }
}

/// Transform, quantise and split one picture into slices.
fn encode_slices(
    picture: &Picture,
    geometry: &SliceGeometry,
    kernel: WaveletKernel,
    q_indices: &[u8],
) -> Slices {
    let mut components = Vec::with_capacity(3);
    for (component, plane) in picture.planes.iter().enumerate() {
        let (ph, pw) = geometry.extents[component];
        assert_eq!(
            (ph, pw),
            (plane.height, plane.width),
            "test encoder expects extents already padded"
        );
        components.push(forward_transform(plane, kernel, geometry.depth));
    }
    let components: [CoeffPlane; 3] = components.try_into().unwrap();
    let mut coeffs = CoeffPicture { components };

    let matrix = quant_matrix(kernel, geometry.depth).unwrap();
    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            let slice_q = u32::from(q_indices[sy * geometry.slices_x + sx]);
            for plane in coeffs.components.iter_mut() {
                for band in 0..band_count(geometry.depth) {
                    let factor = quant_factor(effective_index(slice_q, matrix[band]));
                    let band_plane = &mut plane.bands[band];
                    let rows = slice_segment(band_plane.height, sy, geometry.slices_y);
                    let cols = slice_segment(band_plane.width, sx, geometry.slices_x);
                    for y in rows {
                        for x in cols.clone() {
                            let c = band_plane.get(y, x);
                            let q = (4 * i64::from(c).abs() / factor) as i32;
                            band_plane.set(y, x, if c < 0 { -q } else { q });
                        }
                    }
                }
            }
        }
    }

    split_into_slices(&coeffs, geometry, q_indices.to_vec())
}
