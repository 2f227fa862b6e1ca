// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bit-level I/O for VC-2 streams.
//!
//! VC-2 reads the bitstream MSB-first and encodes variable-length values as
//! interleaved exp-Golomb codes (ST 2042-1 10.5.3). Slice payloads are read
//! through *bounded blocks* (ST 2042-1 13.4): once a block's bit budget is
//! used up, further reads return `1` bits without consuming input, which
//! makes truncated coefficient runs decode to zero.

use std::io::Cursor;
use std::io::Write;

use bytes::Buf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BitReadError {
    #[error("reader ran out of bits")]
    OutOfBits,
    #[error("more than 32 ({0}) bits were requested")]
    TooManyBitsRequested(usize),
    #[error("variable-length code does not fit in 32 bits")]
    Oversize,
    #[error("failed to convert read input to target type")]
    ConversionFailed,
}

pub type BitReadResult<T> = std::result::Result<T, BitReadError>;

/// A bit reader for VC-2 bitstreams.
pub struct BitReader<'a> {
    /// Input not yet pulled into `curr_byte`.
    data: Cursor<&'a [u8]>,
    /// The byte bits are currently served from, high bit first.
    curr_byte: u8,
    /// Unserved bits left in `curr_byte`; 0 forces a refill on the next read.
    bits_left_in_byte: usize,
    /// How many bits have been read so far.
    position: u64,
    /// Bit positions at which the enclosing bounded blocks end. The innermost
    /// bound is last.
    bounds: Vec<u64>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data: Cursor::new(data),
            curr_byte: Default::default(),
            bits_left_in_byte: Default::default(),
            position: 0,
            bounds: Vec::new(),
        }
    }

    /// Read a single bit from the stream.
    ///
    /// Past the end of a bounded block this returns `true` without consuming
    /// any input, per the `read_bitb` semantics of ST 2042-1 13.4.2.
    pub fn read_bit(&mut self) -> BitReadResult<bool> {
        if let Some(&bound) = self.bounds.last() {
            if self.position >= bound {
                return Ok(true);
            }
        }

        if self.bits_left_in_byte == 0 {
            if !self.data.has_remaining() {
                return Err(BitReadError::OutOfBits);
            }
            self.curr_byte = self.data.get_u8();
            self.bits_left_in_byte = 8;
        }

        self.bits_left_in_byte -= 1;
        self.position += 1;
        Ok((self.curr_byte >> self.bits_left_in_byte) & 1 != 0)
    }

    /// Read up to 32 bits from the stream, MSB first.
    pub fn read_bits<U: TryFrom<u32>>(&mut self, num_bits: usize) -> BitReadResult<U> {
        if num_bits > 32 {
            return Err(BitReadError::TooManyBitsRequested(num_bits));
        }

        let mut out = 0u32;
        for _ in 0..num_bits {
            out = (out << 1) | u32::from(self.read_bit()?);
        }

        U::try_from(out).map_err(|_| BitReadError::ConversionFailed)
    }

    /// Skip `num_bits` bits from the stream.
    pub fn skip_bits(&mut self, num_bits: u64) -> BitReadResult<()> {
        for _ in 0..num_bits {
            self.read_bit()?;
        }

        Ok(())
    }

    /// Read a VC-2 interleaved exp-Golomb unsigned value (ST 2042-1 10.5.3.1):
    /// a `0` follow bit announces one more data bit, a `1` bit terminates;
    /// with N data bits the value is (1 << N) - 1 plus the data bits read MSB
    /// first.
    pub fn read_uint<U: TryFrom<u32>>(&mut self) -> BitReadResult<U> {
        let mut value = 1u32;

        while !self.read_bit()? {
            if value >= 1 << 30 {
                return Err(BitReadError::Oversize);
            }
            value = (value << 1) | u32::from(self.read_bit()?);
        }

        U::try_from(value - 1).map_err(|_| BitReadError::ConversionFailed)
    }

    /// Read an unsigned value and verify it lies in `min..=max`.
    pub fn read_uint_bounded(&mut self, min: u32, max: u32) -> anyhow::Result<u32> {
        let value = self.read_uint::<u32>()?;
        if value < min || value > max {
            Err(anyhow::anyhow!(
                "value out of bounds: expected {} - {}, got {}",
                min,
                max,
                value
            ))
        } else {
            Ok(value)
        }
    }

    /// Read a VC-2 signed value (ST 2042-1 10.5.3.2): the magnitude as
    /// `read_uint`, followed, when nonzero, by one sign bit where `1` means
    /// negative.
    pub fn read_sint<U: TryFrom<i32>>(&mut self) -> BitReadResult<U> {
        let magnitude = self.read_uint::<u32>()? as i32;

        let value = if magnitude != 0 && self.read_bit()? {
            -magnitude
        } else {
            magnitude
        };

        U::try_from(value).map_err(|_| BitReadError::ConversionFailed)
    }

    /// Discard bits up to the next byte boundary.
    pub fn byte_align(&mut self) -> BitReadResult<()> {
        self.skip_bits((8 - self.position % 8) % 8)
    }

    /// Whether the read position is on a byte boundary.
    pub fn is_aligned(&self) -> bool {
        self.position % 8 == 0
    }

    /// Return the position of this bitstream in bits.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of real (unbounded) bits left in the stream.
    pub fn bits_remaining(&self) -> u64 {
        self.data.remaining() as u64 * 8 + self.bits_left_in_byte as u64
    }

    /// Open a bounded block of `num_bits` bits at the current position.
    /// Blocks nest: a block never extends past the one enclosing it, so an
    /// oversized length field cannot make reads escape its slice.
    pub fn push_bound(&mut self, num_bits: u64) {
        let mut end = self.position + num_bits;
        if let Some(&outer) = self.bounds.last() {
            end = end.min(outer);
        }
        self.bounds.push(end);
    }

    /// Close the innermost bounded block, discarding any of its bits that
    /// were not consumed. Fails only if the underlying stream is truncated.
    pub fn end_bound(&mut self) -> BitReadResult<()> {
        let bound = self.bounds.pop().expect("no bounded block open");
        if self.position < bound {
            let skip = bound - self.position;
            if skip > self.bits_remaining() {
                return Err(BitReadError::OutOfBits);
            }
            for _ in 0..skip {
                if self.bits_left_in_byte == 0 {
                    self.curr_byte = self.data.get_u8();
                    self.bits_left_in_byte = 8;
                }
                self.bits_left_in_byte -= 1;
                self.position += 1;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum BitWriteError {
    #[error("invalid bit count")]
    InvalidBitCount,
    #[error("value does not fit in an unsigned code")]
    Oversize,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type BitWriteResult<T> = std::result::Result<T, BitWriteError>;

/// MSB-first bit writer, the dual of [`BitReader`].
pub struct BitWriter<W: Write> {
    out: W,
    nth_bit: u8,
    curr_byte: u8,
}

impl<W: Write> BitWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            out: writer,
            curr_byte: 0,
            nth_bit: 0,
        }
    }

    /// Queue a single bit for output.
    pub fn write_bit(&mut self, bit: bool) -> BitWriteResult<()> {
        self.curr_byte |= (bit as u8) << (7u8 - self.nth_bit);
        self.nth_bit += 1;

        if self.nth_bit == 8 {
            self.out.write_all(&[self.curr_byte])?;
            self.nth_bit = 0;
            self.curr_byte = 0;
        }

        Ok(())
    }

    /// Write a fixed-size integer of up to 32 bits, MSB first.
    pub fn write_bits<T: Into<u32>>(&mut self, num_bits: usize, value: T) -> BitWriteResult<()> {
        if num_bits > 32 {
            return Err(BitWriteError::InvalidBitCount);
        }

        let value = value.into();
        for bit in (0..num_bits).rev() {
            self.write_bit((value >> bit) & 1 != 0)?;
        }

        Ok(())
    }

    /// Write a VC-2 interleaved exp-Golomb unsigned value.
    pub fn write_uint(&mut self, value: u32) -> BitWriteResult<()> {
        if value > (1 << 31) - 2 {
            return Err(BitWriteError::Oversize);
        }

        let m = value + 1;
        let top = 31 - m.leading_zeros();
        for bit in (0..top).rev() {
            self.write_bit(false)?;
            self.write_bit((m >> bit) & 1 != 0)?;
        }

        self.write_bit(true)
    }

    /// Write a VC-2 signed value: magnitude, then a sign bit when nonzero.
    pub fn write_sint(&mut self, value: i32) -> BitWriteResult<()> {
        self.write_uint(value.unsigned_abs())?;
        if value != 0 {
            self.write_bit(value < 0)?;
        }

        Ok(())
    }

    /// Pad with zero bits to the next byte boundary.
    pub fn byte_align(&mut self) -> BitWriteResult<()> {
        while self.nth_bit != 0 {
            self.write_bit(false)?;
        }

        Ok(())
    }

    /// Number of bits queued so far in the current partial byte.
    pub fn pending_bits(&self) -> u8 {
        self.nth_bit
    }

    /// Flush any partial byte (zero padded) and return the underlying writer.
    pub fn finish(mut self) -> BitWriteResult<W> {
        self.byte_align()?;
        self.out.flush()?;
        Ok(self.out)
    }
}
