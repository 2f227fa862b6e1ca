// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sequence header parsing (ST 2042-1 clause 11).
//!
//! A sequence header names one of the predefined base video formats and then
//! optionally overrides individual parameter groups. The decoder keeps the
//! resulting [SequenceHeader] as its per-stream state.

use anyhow::anyhow;
use anyhow::Context;
use log::debug;

use crate::bitstream::BitReader;
use crate::intlog2;
use crate::ColourFormat;

/// A frame rate as a rational number of frames per second.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub numerator: u32,
    pub denominator: u32,
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// The decoded contents of a SEQUENCE_HEADER data unit.
///
/// Dimensions, colour format, bit depths and the field/frame carriage are
/// what the pixel pipeline consumes; the remaining groups are retained for
/// diagnostics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SequenceHeader {
    pub major_version: u32,
    pub minor_version: u32,
    pub profile: u32,
    pub level: u32,
    pub base_video_format: u32,

    /// Frame width in luma samples.
    pub width: usize,
    /// Frame height in luma samples.
    pub height: usize,
    pub colour_format: ColourFormat,
    /// True when the *source* is interlaced (scan format group). This is
    /// metadata only; picture carriage is governed by `interlaced`.
    pub source_interlaced: bool,
    /// True when pictures are fields (picture_coding_mode of 1).
    pub interlaced: bool,
    pub top_field_first: bool,
    pub frame_rate: FrameRate,
    pub pixel_aspect_ratio: (u32, u32),
    pub clean_area: CleanArea,
    pub luma_depth: u32,
    pub chroma_depth: u32,
}

impl SequenceHeader {
    /// Bytes per sample in the planar output: 1 up to 8-bit depths, 2 above.
    pub fn bytes_per_sample(&self) -> usize {
        if self.luma_depth <= 8 {
            1
        } else {
            2
        }
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanArea {
    pub width: u32,
    pub height: u32,
    pub left_offset: u32,
    pub top_offset: u32,
}

/// One entry of the base video format table (ST 2042-1 annex C).
struct BaseVideoFormat {
    name: &'static str,
    width: u32,
    height: u32,
    /// 0 = 4:4:4, 1 = 4:2:2, 2 = 4:2:0.
    colour_diff_format: u32,
    /// 0 = progressive source, 1 = interlaced source.
    source_sampling: u32,
    top_field_first: bool,
    frame_rate_index: u32,
    pixel_aspect_ratio_index: u32,
    clean_width: u32,
    clean_height: u32,
    left_offset: u32,
    top_offset: u32,
    signal_range_index: u32,
    colour_spec_index: u32,
}

#[rustfmt::skip]
const BASE_VIDEO_FORMATS: [BaseVideoFormat; 23] = [
    BaseVideoFormat { name: "custom",      width:  640, height:  480, colour_diff_format: 2, source_sampling: 0, top_field_first: false, frame_rate_index:  1, pixel_aspect_ratio_index: 1, clean_width:  640, clean_height:  480, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 0 },
    BaseVideoFormat { name: "QSIF525",     width:  176, height:  120, colour_diff_format: 2, source_sampling: 0, top_field_first: false, frame_rate_index:  9, pixel_aspect_ratio_index: 2, clean_width:  176, clean_height:  120, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 1 },
    BaseVideoFormat { name: "QCIF",        width:  176, height:  144, colour_diff_format: 2, source_sampling: 0, top_field_first: true,  frame_rate_index: 10, pixel_aspect_ratio_index: 3, clean_width:  176, clean_height:  144, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 2 },
    BaseVideoFormat { name: "SIF525",      width:  352, height:  240, colour_diff_format: 2, source_sampling: 0, top_field_first: false, frame_rate_index:  9, pixel_aspect_ratio_index: 2, clean_width:  352, clean_height:  240, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 1 },
    BaseVideoFormat { name: "CIF",         width:  352, height:  288, colour_diff_format: 2, source_sampling: 0, top_field_first: true,  frame_rate_index: 10, pixel_aspect_ratio_index: 3, clean_width:  352, clean_height:  288, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 2 },
    BaseVideoFormat { name: "4SIF525",     width:  704, height:  480, colour_diff_format: 2, source_sampling: 0, top_field_first: false, frame_rate_index:  9, pixel_aspect_ratio_index: 2, clean_width:  704, clean_height:  480, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 1 },
    BaseVideoFormat { name: "4CIF",        width:  704, height:  576, colour_diff_format: 2, source_sampling: 0, top_field_first: true,  frame_rate_index: 10, pixel_aspect_ratio_index: 3, clean_width:  704, clean_height:  576, left_offset: 0, top_offset: 0, signal_range_index: 1, colour_spec_index: 2 },
    BaseVideoFormat { name: "SD480I-60",   width:  720, height:  480, colour_diff_format: 1, source_sampling: 1, top_field_first: false, frame_rate_index:  4, pixel_aspect_ratio_index: 2, clean_width:  704, clean_height:  480, left_offset: 8, top_offset: 0, signal_range_index: 3, colour_spec_index: 1 },
    BaseVideoFormat { name: "SD576I-50",   width:  720, height:  576, colour_diff_format: 1, source_sampling: 1, top_field_first: true,  frame_rate_index:  3, pixel_aspect_ratio_index: 3, clean_width:  704, clean_height:  576, left_offset: 8, top_offset: 0, signal_range_index: 3, colour_spec_index: 2 },
    BaseVideoFormat { name: "HD720P-60",   width: 1280, height:  720, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  7, pixel_aspect_ratio_index: 1, clean_width: 1280, clean_height:  720, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD720P-50",   width: 1280, height:  720, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  6, pixel_aspect_ratio_index: 1, clean_width: 1280, clean_height:  720, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD1080I-60",  width: 1920, height: 1080, colour_diff_format: 1, source_sampling: 1, top_field_first: true,  frame_rate_index:  4, pixel_aspect_ratio_index: 1, clean_width: 1920, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD1080I-50",  width: 1920, height: 1080, colour_diff_format: 1, source_sampling: 1, top_field_first: true,  frame_rate_index:  3, pixel_aspect_ratio_index: 1, clean_width: 1920, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD1080P-60",  width: 1920, height: 1080, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  7, pixel_aspect_ratio_index: 1, clean_width: 1920, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD1080P-50",  width: 1920, height: 1080, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  6, pixel_aspect_ratio_index: 1, clean_width: 1920, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "DC2K",        width: 2048, height: 1080, colour_diff_format: 0, source_sampling: 0, top_field_first: true,  frame_rate_index:  2, pixel_aspect_ratio_index: 1, clean_width: 2048, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 4, colour_spec_index: 4 },
    BaseVideoFormat { name: "DC4K",        width: 4096, height: 2160, colour_diff_format: 0, source_sampling: 0, top_field_first: true,  frame_rate_index:  2, pixel_aspect_ratio_index: 1, clean_width: 4096, clean_height: 2160, left_offset: 0, top_offset: 0, signal_range_index: 4, colour_spec_index: 4 },
    BaseVideoFormat { name: "UHDTV4K-60",  width: 3840, height: 2160, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  7, pixel_aspect_ratio_index: 1, clean_width: 3840, clean_height: 2160, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "UHDTV4K-50",  width: 3840, height: 2160, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  6, pixel_aspect_ratio_index: 1, clean_width: 3840, clean_height: 2160, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "UHDTV8K-60",  width: 7680, height: 4320, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  7, pixel_aspect_ratio_index: 1, clean_width: 7680, clean_height: 4320, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "UHDTV8K-50",  width: 7680, height: 4320, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  6, pixel_aspect_ratio_index: 1, clean_width: 7680, clean_height: 4320, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "HD1080P-24",  width: 1920, height: 1080, colour_diff_format: 1, source_sampling: 0, top_field_first: true,  frame_rate_index:  2, pixel_aspect_ratio_index: 1, clean_width: 1920, clean_height: 1080, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 3 },
    BaseVideoFormat { name: "SDPro486",    width:  720, height:  486, colour_diff_format: 1, source_sampling: 1, top_field_first: false, frame_rate_index:  4, pixel_aspect_ratio_index: 2, clean_width:  720, clean_height:  486, left_offset: 0, top_offset: 0, signal_range_index: 3, colour_spec_index: 1 },
];

/// Preset frame rates; index 0 means a custom rational follows in the stream.
const PRESET_FRAME_RATES: [(u32, u32); 17] = [
    (0, 1), // custom
    (24000, 1001),
    (24, 1),
    (25, 1),
    (30000, 1001),
    (30, 1),
    (50, 1),
    (60000, 1001),
    (60, 1),
    (15000, 1001),
    (25, 2),
    (48, 1),
    (48000, 1001),
    (96, 1),
    (100, 1),
    (120000, 1001),
    (120, 1),
];

/// Preset pixel aspect ratios; index 0 means a custom rational follows.
const PRESET_PIXEL_ASPECT_RATIOS: [(u32, u32); 7] =
    [(0, 1), (1, 1), (10, 11), (12, 11), (40, 33), (16, 11), (4, 3)];

/// One entry of the preset signal range table: offsets and excursions for
/// luma and colour difference samples. The bit depth follows from the
/// excursion.
#[derive(Copy, Clone)]
struct SignalRange {
    luma_offset: u32,
    luma_excursion: u32,
    colour_diff_offset: u32,
    colour_diff_excursion: u32,
}

const PRESET_SIGNAL_RANGES: [SignalRange; 5] = [
    // Custom: overwritten from the stream.
    SignalRange { luma_offset: 0, luma_excursion: 255, colour_diff_offset: 128, colour_diff_excursion: 255 },
    // 8-bit full range.
    SignalRange { luma_offset: 0, luma_excursion: 255, colour_diff_offset: 128, colour_diff_excursion: 255 },
    // 8-bit video range.
    SignalRange { luma_offset: 16, luma_excursion: 219, colour_diff_offset: 128, colour_diff_excursion: 224 },
    // 10-bit video range.
    SignalRange { luma_offset: 64, luma_excursion: 876, colour_diff_offset: 512, colour_diff_excursion: 896 },
    // 12-bit video range.
    SignalRange { luma_offset: 256, luma_excursion: 3504, colour_diff_offset: 2048, colour_diff_excursion: 3584 },
];

/// Colour matrix index signalling RGB carriage (ST 2042-1 annex E).
const COLOUR_MATRIX_RGB: u32 = 3;

/// Preset colour specifications as (primaries, matrix, transfer function).
const PRESET_COLOUR_SPECS: [(u32, u32, u32); 5] = [
    (0, 0, 0), // custom, seeded with HDTV
    (1, 1, 0), // SDTV 525
    (2, 1, 0), // SDTV 625
    (0, 0, 0), // HDTV
    (3, 0, 3), // D-Cinema
];

/// Mutable working set while the override groups are applied.
struct VideoParameters {
    width: u32,
    height: u32,
    colour_diff_format: u32,
    source_sampling: u32,
    top_field_first: bool,
    frame_rate: (u32, u32),
    pixel_aspect_ratio: (u32, u32),
    clean_area: CleanArea,
    signal_range: SignalRange,
    colour_matrix: u32,
}

impl VideoParameters {
    fn from_base_format(base: &BaseVideoFormat) -> Self {
        Self {
            width: base.width,
            height: base.height,
            colour_diff_format: base.colour_diff_format,
            source_sampling: base.source_sampling,
            top_field_first: base.top_field_first,
            frame_rate: PRESET_FRAME_RATES[base.frame_rate_index as usize],
            pixel_aspect_ratio: PRESET_PIXEL_ASPECT_RATIOS[base.pixel_aspect_ratio_index as usize],
            clean_area: CleanArea {
                width: base.clean_width,
                height: base.clean_height,
                left_offset: base.left_offset,
                top_offset: base.top_offset,
            },
            signal_range: PRESET_SIGNAL_RANGES[base.signal_range_index as usize],
            colour_matrix: PRESET_COLOUR_SPECS[base.colour_spec_index as usize].1,
        }
    }
}

/// Parse the payload of a SEQUENCE_HEADER data unit (ST 2042-1 11.1).
pub fn parse_sequence_header(r: &mut BitReader) -> anyhow::Result<SequenceHeader> {
    // 11.2.1 parse_parameters().
    let major_version = r.read_uint().context("major_version")?;
    let minor_version = r.read_uint().context("minor_version")?;
    let profile = r.read_uint().context("profile")?;
    let level = r.read_uint().context("level")?;

    let base_video_format: u32 = r.read_uint().context("base_video_format")?;
    let base = BASE_VIDEO_FORMATS
        .get(base_video_format as usize)
        .ok_or_else(|| anyhow!("unknown base video format {}", base_video_format))?;
    debug!("base video format {} ({})", base_video_format, base.name);

    let mut p = VideoParameters::from_base_format(base);

    // 11.4.3 frame_size().
    if r.read_bit()? {
        p.width = r.read_uint().context("frame_width")?;
        p.height = r.read_uint().context("frame_height")?;
    }

    // 11.4.4 color_diff_sampling_format().
    if r.read_bit()? {
        p.colour_diff_format = r.read_uint_bounded(0, 2).context("color_diff_format_index")?;
    }

    // 11.4.5 scan_format().
    if r.read_bit()? {
        p.source_sampling = r.read_uint_bounded(0, 1).context("source_sampling")?;
    }

    // 11.4.6 frame_rate().
    if r.read_bit()? {
        let index: u32 = r.read_uint().context("frame_rate_index")?;
        if index == 0 {
            p.frame_rate.0 = r.read_uint().context("frame_rate_numer")?;
            p.frame_rate.1 = r.read_uint().context("frame_rate_denom")?;
        } else {
            p.frame_rate = *PRESET_FRAME_RATES
                .get(index as usize)
                .ok_or_else(|| anyhow!("unknown frame rate index {}", index))?;
        }
    }

    // 11.4.7 pixel_aspect_ratio().
    if r.read_bit()? {
        let index: u32 = r.read_uint().context("pixel_aspect_ratio_index")?;
        if index == 0 {
            p.pixel_aspect_ratio.0 = r.read_uint().context("pixel_aspect_ratio_numer")?;
            p.pixel_aspect_ratio.1 = r.read_uint().context("pixel_aspect_ratio_denom")?;
        } else {
            p.pixel_aspect_ratio = *PRESET_PIXEL_ASPECT_RATIOS
                .get(index as usize)
                .ok_or_else(|| anyhow!("unknown pixel aspect ratio index {}", index))?;
        }
    }

    // 11.4.8 clean_area().
    if r.read_bit()? {
        p.clean_area.width = r.read_uint().context("clean_width")?;
        p.clean_area.height = r.read_uint().context("clean_height")?;
        p.clean_area.left_offset = r.read_uint().context("left_offset")?;
        p.clean_area.top_offset = r.read_uint().context("top_offset")?;
    }

    // 11.4.9 signal_range().
    if r.read_bit()? {
        let index: u32 = r.read_uint().context("signal_range_index")?;
        if index == 0 {
            p.signal_range.luma_offset = r.read_uint().context("luma_offset")?;
            p.signal_range.luma_excursion = r.read_uint().context("luma_excursion")?;
            p.signal_range.colour_diff_offset = r.read_uint().context("color_diff_offset")?;
            p.signal_range.colour_diff_excursion =
                r.read_uint().context("color_diff_excursion")?;
        } else {
            p.signal_range = *PRESET_SIGNAL_RANGES
                .get(index as usize)
                .ok_or_else(|| anyhow!("unknown signal range index {}", index))?;
        }
    }

    // 11.4.10 color_spec().
    if r.read_bit()? {
        let index: u32 = r.read_uint().context("color_spec_index")?;
        let spec = PRESET_COLOUR_SPECS
            .get(index as usize)
            .ok_or_else(|| anyhow!("unknown color spec index {}", index))?;
        p.colour_matrix = spec.1;
        if index == 0 {
            if r.read_bit()? {
                let _primaries: u32 = r.read_uint().context("color_primaries_index")?;
            }
            if r.read_bit()? {
                p.colour_matrix = r.read_uint().context("color_matrix_index")?;
            }
            if r.read_bit()? {
                let _transfer: u32 = r.read_uint().context("transfer_function_index")?;
            }
        }
    }

    // 11.5 picture_coding_mode: 0 = pictures are frames, 1 = fields.
    let picture_coding_mode = r.read_uint_bounded(0, 1).context("picture_coding_mode")?;

    let colour_format = if p.colour_matrix == COLOUR_MATRIX_RGB {
        ColourFormat::Rgb
    } else {
        match p.colour_diff_format {
            0 => ColourFormat::Yuv444,
            1 => ColourFormat::Yuv422,
            _ => ColourFormat::Yuv420,
        }
    };

    if p.width == 0 || p.height == 0 {
        return Err(anyhow!("degenerate frame size {}x{}", p.width, p.height));
    }

    Ok(SequenceHeader {
        major_version,
        minor_version,
        profile,
        level,
        base_video_format,
        width: p.width as usize,
        height: p.height as usize,
        colour_format,
        source_interlaced: p.source_sampling == 1,
        interlaced: picture_coding_mode == 1,
        top_field_first: p.top_field_first,
        frame_rate: FrameRate {
            numerator: p.frame_rate.0,
            denominator: p.frame_rate.1,
        },
        pixel_aspect_ratio: p.pixel_aspect_ratio,
        clean_area: p.clean_area,
        luma_depth: intlog2(u64::from(p.signal_range.luma_excursion) + 1),
        chroma_depth: intlog2(u64::from(p.signal_range.colour_diff_excursion) + 1),
    })
}
