// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! The decoder driver.
//!
//! [Decoder::decode_stream] walks the data units of a stream, tracks the
//! current sequence header, decodes picture units through the slice,
//! quantiser and wavelet stages, and serialises the configured output to the
//! sink. Per-picture problems drop that picture and keep the stream going;
//! only sink errors are fatal.

use std::io::Write;

use anyhow::Context;
use byteorder::LittleEndian;
use byteorder::WriteBytesExt;
use log::debug;
use log::info;
use log::warn;
use thiserror::Error;

use crate::bitstream::BitReader;
use crate::parser::dataunit::DataUnitIterator;
use crate::parser::dataunit::ParseCode;
use crate::parser::picture::decode_hq_slices;
use crate::parser::picture::decode_ld_slices;
use crate::parser::picture::merge_blocks;
use crate::parser::picture::parse_picture_preamble;
use crate::parser::picture::PictureProfile;
use crate::parser::picture::SliceCoding;
use crate::parser::picture::SliceGeometry;
use crate::parser::picture::Slices;
use crate::parser::sequence::parse_sequence_header;
use crate::parser::sequence::SequenceHeader;
use crate::picture::slice_segment;
use crate::picture::CoeffPicture;
use crate::picture::CoeffPlane;
use crate::picture::Frame;
use crate::picture::FrameAssembler;
use crate::picture::Picture;
use crate::picture::PictureFormat;
use crate::picture::Plane;
use crate::quant::effective_index;
use crate::quant::inverse_quant;
use crate::quant::inverse_quant_np;
use crate::quant::quant_matrix;
use crate::transform;
use crate::transform::band_count;
use crate::OutputMode;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to write output")]
    Io(#[from] std::io::Error),
}

/// Counters accumulated over one stream.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodeStats {
    /// Data units consumed, including skipped ones.
    pub data_units: u64,
    /// Pictures decoded to the configured output (fields count one each).
    pub pictures: u64,
    /// Complete frames emitted in decoded mode.
    pub frames: u64,
    /// Pictures dropped because of parse or semantic errors.
    pub dropped: u64,
    /// Whether an END_OF_SEQUENCE unit terminated the stream.
    pub end_of_sequence: bool,
}

/// What one picture data unit decoded to, before serialisation.
enum PictureOutput {
    Indices(Vec<u8>),
    Coefficients(CoeffPicture),
    Frame(Box<Frame>),
    /// First field of an interlaced pair, held by the assembler.
    PendingField,
}

/// A VC-2 stream decoder with a fixed output mode.
pub struct Decoder {
    output: OutputMode,
    sequence: Option<SequenceHeader>,
    assembler: FrameAssembler,
    stats: DecodeStats,
}

impl Decoder {
    pub fn new(output: OutputMode) -> Self {
        Self {
            output,
            sequence: None,
            assembler: FrameAssembler::default(),
            stats: DecodeStats::default(),
        }
    }

    /// The current sequence header, once one has been seen.
    pub fn sequence_header(&self) -> Option<&SequenceHeader> {
        self.sequence.as_ref()
    }

    /// Decode every data unit of `data`, writing output to `sink`. Returns
    /// the stream counters.
    pub fn decode_stream(&mut self, data: &[u8], sink: &mut dyn Write) -> Result<DecodeStats> {
        let mut units = DataUnitIterator::new(data);

        while let Some(unit) = units.next() {
            self.stats.data_units += 1;
            match unit.kind() {
                Some(ParseCode::SequenceHeader) => {
                    match parse_sequence_header(&mut BitReader::new(unit.payload)) {
                        Ok(header) => {
                            info!(
                                "sequence header: {}x{} {:?} {}-bit{}, frame rate {}",
                                header.width,
                                header.height,
                                header.colour_format,
                                header.luma_depth,
                                if header.interlaced { ", fields" } else { "" },
                                header.frame_rate,
                            );
                            if self.assembler.has_pending_field() {
                                warn!("new sequence header with a field pending, dropping it");
                                self.assembler.reset();
                                self.stats.dropped += 1;
                            }
                            self.sequence = Some(header);
                        }
                        Err(e) => warn!("skipping bad sequence header: {:#}", e),
                    }
                }
                Some(ParseCode::EndOfSequence) => {
                    info!("end of sequence after {} frames", self.stats.frames);
                    self.stats.end_of_sequence = true;
                    break;
                }
                Some(ParseCode::LdPicture) => {
                    self.decode_picture(unit.payload, PictureProfile::LowDelay, sink)?
                }
                Some(ParseCode::HqPicture) => {
                    self.decode_picture(unit.payload, PictureProfile::HighQuality, sink)?
                }
                Some(ParseCode::AuxiliaryData) | Some(ParseCode::PaddingData) => {
                    debug!("skipping {} bytes of {:?}", unit.payload.len(), unit.kind())
                }
                None => debug!("skipping unknown parse code {:#04x}", unit.parse_code),
            }
        }

        Ok(self.stats)
    }

    /// Decode one picture data unit and serialise its output. Decode
    /// failures drop the picture; only sink failures propagate.
    fn decode_picture(
        &mut self,
        payload: &[u8],
        profile: PictureProfile,
        sink: &mut dyn Write,
    ) -> Result<()> {
        let Some(sequence) = self.sequence.clone() else {
            warn!("cannot decode picture, no previous sequence header");
            self.stats.dropped += 1;
            return Ok(());
        };

        match self.decode_picture_inner(payload, profile, &sequence) {
            Ok(PictureOutput::Indices(indices)) => {
                sink.write_all(&indices)?;
                self.stats.pictures += 1;
            }
            Ok(PictureOutput::Coefficients(coeffs)) => {
                write_coefficients(sink, &coeffs)?;
                self.stats.pictures += 1;
            }
            Ok(PictureOutput::Frame(frame)) => {
                self.stats.pictures += 1;
                self.stats.frames += 1;
                write_frame(sink, &frame, &sequence)?;
            }
            Ok(PictureOutput::PendingField) => self.stats.pictures += 1,
            Err(e) => {
                warn!("dropping picture: {:#}", e);
                self.stats.dropped += 1;
            }
        }

        Ok(())
    }

    fn decode_picture_inner(
        &mut self,
        payload: &[u8],
        profile: PictureProfile,
        sequence: &SequenceHeader,
    ) -> anyhow::Result<PictureOutput> {
        let mut r = BitReader::new(payload);
        let preamble = parse_picture_preamble(&mut r, profile)?;
        debug!(
            "picture {}: {} depth {}, {}x{} slices",
            preamble.picture_number,
            preamble.kernel,
            preamble.depth,
            preamble.slices_x,
            preamble.slices_y,
        );

        let picture_height = if sequence.interlaced {
            sequence.height / 2
        } else {
            sequence.height
        };
        let picture_format =
            PictureFormat::new(picture_height, sequence.width, sequence.colour_format);
        let geometry = SliceGeometry::new(
            picture_format,
            preamble.depth,
            preamble.slices_x,
            preamble.slices_y,
        );

        let matrix = quant_matrix(preamble.kernel, preamble.depth)?;
        debug!("quantisation matrix = {:?}", matrix);

        let (slices, with_offset) = match preamble.coding {
            SliceCoding::LowDelay { slice_bytes_numerator, slice_bytes_denominator } => {
                let frame_bytes = u64::from(slice_bytes_numerator) * geometry.num_slices() as u64
                    / u64::from(slice_bytes_denominator);
                let picture_bytes = if sequence.interlaced { frame_bytes / 2 } else { frame_bytes };
                let slices = decode_ld_slices(&mut r, &geometry, picture_bytes as usize)
                    .context("low delay slices")?;
                (slices, true)
            }
            SliceCoding::HighQuality { slice_prefix_bytes, slice_size_scalar } => {
                let slices =
                    decode_hq_slices(&mut r, &geometry, slice_prefix_bytes, slice_size_scalar)
                        .context("high quality slices")?;
                (slices, false)
            }
        };

        if self.output == OutputMode::Indices {
            return Ok(PictureOutput::Indices(slices.q_indices.clone()));
        }

        let quantised = merge_blocks(&slices);
        if self.output == OutputMode::Quantised {
            return Ok(PictureOutput::Coefficients(quantised));
        }

        let coefficients = inverse_quantise(&quantised, &slices, &matrix, with_offset);
        if self.output == OutputMode::Transform {
            return Ok(PictureOutput::Coefficients(coefficients));
        }

        let mut picture = Picture::new(picture_format);
        for (component, plane) in picture.planes.iter_mut().enumerate() {
            let full =
                transform::inverse_transform(&coefficients.components[component], preamble.kernel);
            *plane = full.crop(plane.height, plane.width);
        }

        let frame_format =
            PictureFormat::new(sequence.height, sequence.width, sequence.colour_format);
        match self.assembler.push(
            picture,
            frame_format,
            sequence.interlaced,
            sequence.top_field_first,
        ) {
            Some(frame) => Ok(PictureOutput::Frame(Box::new(frame))),
            None => Ok(PictureOutput::PendingField),
        }
    }
}

/// Apply the inverse quantiser to every coefficient, slice by slice: each
/// subband's effective index is the slice index plus the matrix entry.
fn inverse_quantise(
    coeffs: &CoeffPicture,
    slices: &Slices,
    matrix: &[u32],
    with_offset: bool,
) -> CoeffPicture {
    let geometry = &slices.geometry;
    let mut out = coeffs.clone();

    for sy in 0..geometry.slices_y {
        for sx in 0..geometry.slices_x {
            let slice_index = u32::from(slices.q_indices[sy * geometry.slices_x + sx]);
            for (component, plane) in out.components.iter_mut().enumerate() {
                for band in 0..band_count(geometry.depth) {
                    let q = effective_index(slice_index, matrix[band]);
                    let (h, w) = geometry.band_extent(component, band);
                    for y in slice_segment(h, sy, geometry.slices_y) {
                        for x in slice_segment(w, sx, geometry.slices_x) {
                            let c = plane.bands[band].get(y, x);
                            let r = if with_offset {
                                inverse_quant(c, q)
                            } else {
                                inverse_quant_np(c, q)
                            };
                            plane.bands[band].set(y, x, r);
                        }
                    }
                }
            }
        }
    }

    out
}

/// Lay a banded coefficient plane out spatially, subbands in their wavelet
/// quadrants, as the coefficient output modes expect.
fn compose_transform_layout(coeffs: &CoeffPlane) -> Plane {
    let depth = coeffs.depth;
    let (h0, w0) = (coeffs.bands[0].height, coeffs.bands[0].width);
    let mut out = Plane::new(h0 << depth, w0 << depth);

    for y in 0..h0 {
        for x in 0..w0 {
            out.set(y, x, coeffs.bands[0].get(y, x));
        }
    }

    for level in 0..depth {
        let hl = &coeffs.bands[1 + 3 * level];
        let lh = &coeffs.bands[2 + 3 * level];
        let hh = &coeffs.bands[3 + 3 * level];
        let (h, w) = (hl.height, hl.width);
        for y in 0..h {
            for x in 0..w {
                out.set(y, x + w, hl.get(y, x));
                out.set(y + h, x, lh.get(y, x));
                out.set(y + h, x + w, hh.get(y, x));
            }
        }
    }

    out
}

/// Write a coefficient picture as 4-byte two's complement little-endian
/// samples, component planes in Y, C1, C2 order.
fn write_coefficients(sink: &mut dyn Write, coeffs: &CoeffPicture) -> Result<()> {
    for component in coeffs.components.iter() {
        let plane = compose_transform_layout(component);
        for y in 0..plane.height {
            for &value in plane.row(y) {
                sink.write_i32::<LittleEndian>(value)?;
            }
        }
    }
    Ok(())
}

/// Clip a frame to its bit depths and write it as offset binary,
/// left-justified samples, luma plane then the chroma planes.
fn write_frame(sink: &mut dyn Write, frame: &Frame, sequence: &SequenceHeader) -> Result<()> {
    let bytes = sequence.bytes_per_sample();
    for (component, plane) in frame.picture.planes.iter().enumerate() {
        let depth = if component == 0 { sequence.luma_depth } else { sequence.chroma_depth };
        write_plane(sink, plane, depth, bytes)?;
    }
    Ok(())
}

fn write_plane(sink: &mut dyn Write, plane: &Plane, depth: u32, bytes: usize) -> Result<()> {
    let max = (1i32 << (depth - 1)) - 1;
    let min = -(1i32 << (depth - 1));
    let shift = 8 * bytes as u32 - depth;

    for y in 0..plane.height {
        for &value in plane.row(y) {
            let clipped = value.clamp(min, max);
            let coded = ((clipped + (1 << (depth - 1))) as u32) << shift;
            if bytes == 1 {
                sink.write_u8(coded as u8)?;
            } else {
                sink.write_u16::<byteorder::BigEndian>(coded as u16)?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitstream::BitWriter;
    use crate::parser::dataunit::PARSE_INFO_SIZE;

    /// Frame a payload as one data unit.
    fn data_unit(code: u8, payload: &[u8]) -> Vec<u8> {
        let mut unit = vec![0x42, 0x42, 0x43, 0x44, code];
        unit.extend_from_slice(&((PARSE_INFO_SIZE + payload.len()) as u32).to_be_bytes());
        unit.extend_from_slice(&0u32.to_be_bytes());
        unit.extend_from_slice(payload);
        unit
    }

    /// A custom-format sequence header: 16x16 4:4:4, 8-bit full range,
    /// progressive frames.
    fn sequence_header_payload() -> Vec<u8> {
        let mut w = BitWriter::new(Vec::new());
        for v in [2, 0, 3, 0] {
            w.write_uint(v).unwrap();
        }
        w.write_uint(0).unwrap(); // base format: custom
        w.write_bit(true).unwrap(); // frame size
        w.write_uint(16).unwrap();
        w.write_uint(16).unwrap();
        w.write_bit(true).unwrap(); // colour diff: 4:4:4
        w.write_uint(0).unwrap();
        for _ in 0..4 {
            w.write_bit(false).unwrap(); // scan, rate, aspect, clean area
        }
        w.write_bit(true).unwrap(); // signal range: 8-bit full
        w.write_uint(1).unwrap();
        w.write_bit(false).unwrap(); // colour spec
        w.write_uint(0).unwrap(); // frames
        w.finish().unwrap()
    }

    /// An HQ picture payload: LeGall depth 1, one slice, all component
    /// lengths zero, so every coefficient decodes to zero.
    fn hq_zero_picture_payload(q_index: u8) -> Vec<u8> {
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(32, 1u32).unwrap(); // picture number
        w.write_uint(1).unwrap(); // LeGall
        w.write_uint(1).unwrap(); // depth
        w.write_uint(1).unwrap(); // slices_x
        w.write_uint(1).unwrap(); // slices_y
        w.write_uint(0).unwrap(); // prefix
        w.write_uint(1).unwrap(); // scalar
        w.byte_align().unwrap();
        for len in [0u32, 0, 0] {
            w.write_bits(8, len).unwrap();
        }
        w.write_bits(8, u32::from(q_index)).unwrap();
        w.finish().unwrap()
    }

    fn eos() -> Vec<u8> {
        let mut unit = vec![0x42, 0x42, 0x43, 0x44, 0x10];
        unit.extend_from_slice(&0u32.to_be_bytes());
        unit.extend_from_slice(&0u32.to_be_bytes());
        unit
    }

    #[test]
    fn mid_grey_hq_frame_decodes_to_0x80() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.frames, 1);
        assert!(stats.end_of_sequence);
        assert_eq!(out.len(), 3 * 16 * 16);
        assert!(out.iter().all(|&b| b == 0x80));
    }

    #[test]
    fn picture_before_sequence_header_is_dropped() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.frames, 1);
        assert_eq!(out.len(), 3 * 16 * 16);
    }

    #[test]
    fn indices_mode_writes_one_byte_per_slice() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(42)));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Indices)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.pictures, 1);
        assert_eq!(out, vec![42]);
    }

    #[test]
    fn coefficient_modes_write_le_i32_planes() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(eos());

        for mode in [OutputMode::Quantised, OutputMode::Transform] {
            let mut out = Vec::new();
            Decoder::new(mode).decode_stream(&stream, &mut out).unwrap();
            assert_eq!(out.len(), 3 * 16 * 16 * 4);
            assert!(out.iter().all(|&b| b == 0));
        }
    }

    #[test]
    fn end_of_sequence_stops_the_stream() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(eos());
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert!(stats.end_of_sequence);
        assert_eq!(stats.pictures, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn unknown_units_are_skipped() {
        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0x42, &[1, 2, 3])); // unknown parse code
        stream.extend(data_unit(0x20, &[0; 16])); // auxiliary data
        stream.extend(data_unit(0x30, &[0; 16])); // padding
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.data_units, 6);
        assert_eq!(stats.frames, 1);
    }

    #[test]
    fn unsupported_depth_drops_the_picture() {
        // Depth 5 parses but has no preset quantisation matrix.
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(32, 0u32).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(5).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(0).unwrap();
        w.write_uint(1).unwrap();
        let payload = w.finish().unwrap();

        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &payload));
        stream.extend(data_unit(0xe8, &hq_zero_picture_payload(0)));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.dropped, 1);
        assert_eq!(stats.frames, 1);
    }

    #[test]
    fn truncated_slices_drop_the_picture() {
        // Declares a 16-unit y length but carries no slice bytes at all.
        let mut w = BitWriter::new(Vec::new());
        w.write_bits(32, 0u32).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(1).unwrap();
        w.write_uint(0).unwrap();
        w.write_uint(1).unwrap();
        w.byte_align().unwrap();
        w.write_bits(8, 16u32).unwrap(); // y length, but data is missing
        let payload = w.finish().unwrap();

        let mut stream = Vec::new();
        stream.extend(data_unit(0x00, &sequence_header_payload()));
        stream.extend(data_unit(0xe8, &payload));
        stream.extend(eos());

        let mut out = Vec::new();
        let stats = Decoder::new(OutputMode::Decoded)
            .decode_stream(&stream, &mut out)
            .unwrap();
        assert_eq!(stats.dropped, 1);
        assert!(out.is_empty());
    }
}
