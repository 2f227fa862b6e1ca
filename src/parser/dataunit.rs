// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Data-unit framing (ST 2042-1 clause 10).
//!
//! A VC-2 stream is a sequence of data units, each introduced by a 13-byte
//! parse info block: a 4-byte prefix, a parse code, and two 32-bit big-endian
//! offsets chaining the blocks together.

use bytes::Buf;
use enumn::N;
use log::debug;
use log::warn;

/// The parse info prefix, "BBCD" (ST 2042-1 10.5.1).
pub const PARSE_INFO_PREFIX: [u8; 4] = [0x42, 0x42, 0x43, 0x44];

/// Total size in bytes of a parse info block.
pub const PARSE_INFO_SIZE: usize = 13;

/// Parse codes recognised by this decoder (ST 2042-1 table 10.1). Any other
/// code is carried through as a raw byte and skipped by the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, N)]
pub enum ParseCode {
    SequenceHeader = 0x00,
    EndOfSequence = 0x10,
    AuxiliaryData = 0x20,
    PaddingData = 0x30,
    LdPicture = 0xc8,
    HqPicture = 0xe8,
}

/// One framed message of the stream. The payload borrows from the input and
/// excludes the parse info block itself.
#[derive(Debug)]
pub struct DataUnit<'a> {
    pub parse_code: u8,
    pub payload: &'a [u8],
}

impl<'a> DataUnit<'a> {
    /// The decoded parse code, if it is one we know.
    pub fn kind(&self) -> Option<ParseCode> {
        ParseCode::n(self.parse_code)
    }
}

/// Iterator over the data units of a byte stream.
///
/// Synchronisation starts with a byte-by-byte scan for the prefix; after
/// that, each parse info block is expected exactly `next_parse_offset` bytes
/// after the previous one. On a framing mismatch the iterator rescans once
/// per stream; a second loss of synchronisation gives up on the sequence.
pub struct DataUnitIterator<'a> {
    data: &'a [u8],
    /// Byte offset of the next expected parse info block.
    pos: usize,
    synced: bool,
    resyncs_left: u32,
}

impl<'a> DataUnitIterator<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            synced: false,
            resyncs_left: 1,
        }
    }

    /// Scan forward from `from` to the next complete parse info block: the
    /// 4-byte prefix with a full 13-byte block behind it. A prefix too close
    /// to EOF to hold a block is skipped.
    fn find_block(&self, mut from: usize) -> Option<usize> {
        loop {
            if from >= self.data.len() {
                return None;
            }
            let p = from
                + self.data[from..]
                    .windows(PARSE_INFO_PREFIX.len())
                    .position(|w| w == PARSE_INFO_PREFIX)?;
            if self.data.len() - p >= PARSE_INFO_SIZE {
                return Some(p);
            }
            from = p + 1;
        }
    }

    /// Locate the first parse info block at or after the current position.
    /// Returns false when the remaining input holds none.
    pub fn synchronise(&mut self) -> bool {
        match self.find_block(self.pos) {
            Some(p) => {
                debug!("synchronised to parse info at byte {}", p);
                self.pos = p;
                self.synced = true;
                true
            }
            None => false,
        }
    }

    /// Whether a whole, prefix-valid parse info block sits at `pos`.
    fn parse_info_at(&self, pos: usize) -> bool {
        self.data.len() - pos >= PARSE_INFO_SIZE && self.data[pos..pos + 4] == PARSE_INFO_PREFIX
    }

    /// Apply the recovery policy after a framing mismatch at `pos`: rescan
    /// once per stream, give up on the second loss.
    fn lose_sync(&mut self) -> bool {
        if self.find_block(self.pos).is_none() {
            debug!("no parse info in the remaining {} bytes", self.data.len() - self.pos);
            return false;
        }
        if self.resyncs_left == 0 {
            warn!("framing lost again at byte {}, giving up on sequence", self.pos);
            return false;
        }
        self.resyncs_left -= 1;
        warn!("framing lost at byte {}, rescanning for parse info", self.pos);
        self.synced = false;
        true
    }
}

impl<'a> Iterator for DataUnitIterator<'a> {
    type Item = DataUnit<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if !self.synced && !self.synchronise() {
                return None;
            }

            if self.pos == self.data.len() {
                // Clean EOF on a data unit boundary.
                return None;
            }

            if !self.parse_info_at(self.pos) {
                if self.lose_sync() {
                    continue;
                }
                return None;
            }

            let mut header = &self.data[self.pos + 4..self.pos + PARSE_INFO_SIZE];
            let parse_code = header.get_u8();
            let next_parse_offset = header.get_u32() as usize;
            let _previous_parse_offset = header.get_u32();

            let payload_start = self.pos + PARSE_INFO_SIZE;
            let payload_end = if next_parse_offset == 0 {
                // Permitted for end-of-sequence and auxiliary units: the
                // payload runs to the next discovered parse info, or to EOF.
                self.find_block(payload_start).unwrap_or(self.data.len())
            } else if next_parse_offset < PARSE_INFO_SIZE {
                warn!(
                    "parse info at byte {} has bad next_parse_offset {}",
                    self.pos, next_parse_offset
                );
                self.pos += PARSE_INFO_PREFIX.len();
                if self.lose_sync() {
                    continue;
                }
                return None;
            } else {
                self.pos + next_parse_offset
            };

            if payload_end > self.data.len() {
                warn!(
                    "data unit at byte {} extends {} bytes past EOF, dropping it",
                    self.pos,
                    payload_end - self.data.len()
                );
                return None;
            }

            let payload = &self.data[payload_start..payload_end];
            self.pos = payload_end;
            return Some(DataUnit { parse_code, payload });
        }
    }
}
