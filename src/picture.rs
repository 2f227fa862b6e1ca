// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Sample and coefficient containers.
//!
//! Everything the pipeline moves around is a [Plane] of 32-bit signed
//! integers: decoded samples, wavelet coefficients and subbands alike. A
//! [Picture] is the three planes of one coded picture (a frame, or a single
//! field of an interlaced stream); [FrameAssembler] pairs fields back up
//! into frames.

use crate::ColourFormat;

/// Geometry of one picture: luma extent plus the colour format that fixes
/// the chroma extents.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct PictureFormat {
    pub height: usize,
    pub width: usize,
    pub colour_format: ColourFormat,
}

impl PictureFormat {
    pub fn new(height: usize, width: usize, colour_format: ColourFormat) -> Self {
        Self { height, width, colour_format }
    }

    /// (height, width) of the given component plane.
    pub fn component_extent(&self, component: usize) -> (usize, usize) {
        if component == 0 {
            (self.height, self.width)
        } else {
            (
                self.height / self.colour_format.v_ratio(),
                self.width / self.colour_format.h_ratio(),
            )
        }
    }
}

/// A row-major rectangle of i32 samples.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Plane {
    pub width: usize,
    pub height: usize,
    data: Vec<i32>,
}

impl Plane {
    pub fn new(height: usize, width: usize) -> Self {
        Self { width, height, data: vec![0; height * width] }
    }

    pub fn get(&self, y: usize, x: usize) -> i32 {
        self.data[y * self.width + x]
    }

    pub fn set(&mut self, y: usize, x: usize, value: i32) {
        self.data[y * self.width + x] = value;
    }

    pub fn row(&self, y: usize) -> &[i32] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn row_mut(&mut self, y: usize) -> &mut [i32] {
        &mut self.data[y * self.width..(y + 1) * self.width]
    }

    pub fn as_slice(&self) -> &[i32] {
        &self.data
    }

    /// The top-left `height` x `width` corner of this plane.
    pub fn crop(&self, height: usize, width: usize) -> Plane {
        debug_assert!(height <= self.height && width <= self.width);
        let mut out = Plane::new(height, width);
        for y in 0..height {
            out.row_mut(y).copy_from_slice(&self.row(y)[..width]);
        }
        out
    }
}

/// The three planes of one picture, luma (or G) first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Picture {
    pub planes: [Plane; 3],
}

impl Picture {
    pub fn new(format: PictureFormat) -> Self {
        let (lh, lw) = format.component_extent(0);
        let (ch, cw) = format.component_extent(1);
        Self { planes: [Plane::new(lh, lw), Plane::new(ch, cw), Plane::new(ch, cw)] }
    }
}

/// One component's wavelet coefficients, stored per subband in traversal
/// order: DC first, then HL/LH/HH per level from the coarsest level to the
/// finest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoeffPlane {
    pub depth: usize,
    pub bands: Vec<Plane>,
}

impl CoeffPlane {
    /// An all-zero coefficient plane for a padded component extent.
    pub fn new(padded_height: usize, padded_width: usize, depth: usize) -> Self {
        let bands = (0..3 * depth + 1)
            .map(|band| {
                let (h, w) = crate::transform::band_extent(padded_height, padded_width, depth, band);
                Plane::new(h, w)
            })
            .collect();
        Self { depth, bands }
    }
}

/// Coefficients for all three components of a picture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoeffPicture {
    pub components: [CoeffPlane; 3],
}

/// Rows (or columns) of a subband extent `n` owned by slice `index` out of
/// `count`: the range [index * n / count, (index + 1) * n / count).
pub fn slice_segment(extent: usize, index: usize, count: usize) -> std::ops::Range<usize> {
    index * extent / count..(index + 1) * extent / count
}

/// A fully decoded picture plus the interlace flags it was carried with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    pub format: PictureFormat,
    pub interlaced: bool,
    pub top_field_first: bool,
    pub picture: Picture,
}

/// Pairs field pictures into frames.
///
/// Progressive pictures pass straight through. For field carriage the first
/// picture of each pair is held until its partner arrives; the frame is then
/// built by interleaving scan lines according to the field order.
#[derive(Default)]
pub struct FrameAssembler {
    pending: Option<Picture>,
}

impl FrameAssembler {
    /// Forget any held field, e.g. when a new sequence header arrives.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// Whether a first field is waiting for its partner.
    pub fn has_pending_field(&self) -> bool {
        self.pending.is_some()
    }

    /// Accept one decoded picture. Returns the completed frame, or None when
    /// the picture was a first field and its partner is still to come.
    pub fn push(
        &mut self,
        picture: Picture,
        frame_format: PictureFormat,
        interlaced: bool,
        top_field_first: bool,
    ) -> Option<Frame> {
        if !interlaced {
            return Some(Frame {
                format: frame_format,
                interlaced,
                top_field_first,
                picture,
            });
        }

        match self.pending.take() {
            None => {
                self.pending = Some(picture);
                None
            }
            Some(first) => {
                let second = picture;
                let mut frame_picture = Picture::new(frame_format);
                for (plane, (f, s)) in frame_picture
                    .planes
                    .iter_mut()
                    .zip(first.planes.iter().zip(second.planes.iter()))
                {
                    interleave_fields(plane, f, s, top_field_first);
                }
                Some(Frame {
                    format: frame_format,
                    interlaced,
                    top_field_first,
                    picture: frame_picture,
                })
            }
        }
    }
}

/// Line-interleave two field planes into a frame plane. With top field
/// first, frame line 2k comes from line k of the first field and frame line
/// 2k + 1 from line k of the second; otherwise the fields swap roles.
fn interleave_fields(out: &mut Plane, first: &Plane, second: &Plane, top_field_first: bool) {
    let (top, bottom) = if top_field_first { (first, second) } else { (second, first) };
    for k in 0..top.height {
        out.row_mut(2 * k).copy_from_slice(top.row(k));
    }
    for k in 0..bottom.height {
        out.row_mut(2 * k + 1).copy_from_slice(bottom.row(k));
    }
}
