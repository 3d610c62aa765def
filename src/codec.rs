//! Bit-field codec.
//!
//! Every wire structure in this crate is written as a sequence of
//! [`BitWriter::write`] / [`BitWriter::write_bytes`] calls and read back
//! with the mirrored [`BitReader`] calls. Fields are packed big-endian, most
//! significant bit first, and need not be byte aligned.

use nom::bits::complete::take as take_bits;
use nom::bytes::complete::take as take_bytes;
use nom::IResult;

use crate::buffer::Buf;
use crate::Error;

type BitInput<'a> = (&'a [u8], usize);

/// Reads bit fields and byte spans from a borrowed buffer.
///
/// Running past the end of the input yields [`Error::TruncatedMessage`].
#[derive(Debug, Clone)]
pub struct BitReader<'a> {
    input: &'a [u8],
    bit_offset: usize,
}

impl<'a> BitReader<'a> {
    pub fn new(input: &'a [u8]) -> Self {
        BitReader {
            input,
            bit_offset: 0,
        }
    }

    /// Consume `width_bits` bits as an unsigned integer.
    pub fn read(&mut self, width_bits: usize) -> Result<u64, Error> {
        if width_bits > 64 {
            return Err(Error::ParseError(format!(
                "Field width {} exceeds 64 bits",
                width_bits
            )));
        }

        let res: IResult<BitInput<'a>, u64, nom::error::Error<BitInput<'a>>> =
            take_bits(width_bits)((self.input, self.bit_offset));

        let ((input, bit_offset), value) = res.map_err(|_| Error::TruncatedMessage)?;
        self.input = input;
        self.bit_offset = bit_offset;

        Ok(value)
    }

    pub fn read_u8(&mut self) -> Result<u8, Error> {
        Ok(self.read(8)? as u8)
    }

    pub fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read(16)? as u16)
    }

    pub fn read_u24(&mut self) -> Result<u32, Error> {
        Ok(self.read(24)? as u32)
    }

    pub fn read_u48(&mut self) -> Result<u64, Error> {
        self.read(48)
    }

    /// Consume `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>, Error> {
        if self.bit_offset == 0 {
            let res: IResult<&'a [u8], &'a [u8], nom::error::Error<&'a [u8]>> =
                take_bytes(n)(self.input);
            let (rest, bytes) = res.map_err(|_| Error::TruncatedMessage)?;
            self.input = rest;
            return Ok(bytes.to_vec());
        }

        if self.remaining_bits() < n * 8 {
            return Err(Error::TruncatedMessage);
        }
        (0..n).map(|_| self.read_u8()).collect()
    }

    /// Consume `N` raw bytes into an array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut out = [0; N];
        let bytes = self.read_bytes(N)?;
        out.copy_from_slice(&bytes);
        Ok(out)
    }

    /// Drain the remaining whole bytes. Trailing bits of a partial byte are dropped.
    pub fn read_bytes_remaining(&mut self) -> Vec<u8> {
        let n = self.remaining_bits() / 8;
        let bytes = self.read_bytes(n).unwrap_or_default();
        self.input = &[];
        self.bit_offset = 0;
        bytes
    }

    /// Read a length prefix of `len_bits` and then that many bytes.
    pub fn read_prefixed(&mut self, len_bits: usize) -> Result<Vec<u8>, Error> {
        let len = self.read(len_bits)? as usize;
        self.read_bytes(len)
    }

    pub fn remaining_bits(&self) -> usize {
        (self.input.len() * 8).saturating_sub(self.bit_offset)
    }

    pub fn remaining_bytes(&self) -> usize {
        self.remaining_bits() / 8
    }

    pub fn is_empty(&self) -> bool {
        self.remaining_bits() == 0
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 0
    }

    /// The remaining input, when the reader is byte aligned.
    pub fn rest(&self) -> Option<&'a [u8]> {
        self.is_byte_aligned().then_some(self.input)
    }
}

/// Accumulates bit fields into a [`Buf`].
#[derive(Debug, Default)]
pub struct BitWriter {
    buf: Buf,
    current: u8,
    bits_in_current: usize,
}

impl BitWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue writing at the end of an existing buffer.
    pub fn with_buf(buf: Buf) -> Self {
        BitWriter {
            buf,
            current: 0,
            bits_in_current: 0,
        }
    }

    /// Append the low `width_bits` bits of `value`.
    pub fn write(&mut self, value: u64, width_bits: usize) {
        debug_assert!(width_bits <= 64, "field width {} > 64", width_bits);

        if self.bits_in_current == 0 && width_bits % 8 == 0 {
            for i in (0..width_bits / 8).rev() {
                self.buf.push((value >> (i * 8)) as u8);
            }
            return;
        }

        for i in (0..width_bits).rev() {
            self.write_bit((value >> i) & 1 == 1);
        }
    }

    fn write_bit(&mut self, bit: bool) {
        self.current = (self.current << 1) | bit as u8;
        self.bits_in_current += 1;
        if self.bits_in_current == 8 {
            self.buf.push(self.current);
            self.current = 0;
            self.bits_in_current = 0;
        }
    }

    pub fn write_u8(&mut self, v: u8) {
        self.write(v as u64, 8);
    }

    pub fn write_u16(&mut self, v: u16) {
        self.write(v as u64, 16);
    }

    pub fn write_u24(&mut self, v: u32) {
        self.write(v as u64, 24);
    }

    pub fn write_u48(&mut self, v: u64) {
        self.write(v, 48);
    }

    /// Append raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        if self.bits_in_current == 0 {
            self.buf.extend_from_slice(bytes);
        } else {
            for b in bytes {
                self.write(*b as u64, 8);
            }
        }
    }

    /// Write `bytes` preceded by its length in `len_bits`.
    pub fn write_prefixed(&mut self, len_bits: usize, bytes: &[u8]) {
        self.write(bytes.len() as u64, len_bits);
        self.write_bytes(bytes);
    }

    /// Number of bytes written so far, counting a partial byte.
    pub fn len(&self) -> usize {
        self.buf.len() + usize::from(self.bits_in_current > 0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Finish writing, padding a partial byte with zero bits.
    pub fn finish(mut self) -> Buf {
        if self.bits_in_current > 0 {
            let pad = 8 - self.bits_in_current;
            self.buf.push(self.current << pad);
        }
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unaligned_fields() {
        let mut w = BitWriter::new();
        w.write(0b101, 3);
        w.write(0x1f, 5);
        w.write(0xabc, 12);
        let out = w.finish();
        assert_eq!(&out[..], &[0b1011_1111, 0xab, 0xc0]);

        let mut r = BitReader::new(&out);
        assert_eq!(r.read(3).unwrap(), 0b101);
        assert_eq!(r.read(5).unwrap(), 0x1f);
        assert_eq!(r.read(12).unwrap(), 0xabc);
        assert_eq!(r.remaining_bits(), 4);
    }

    #[test]
    fn bytes_after_unaligned_field() {
        let mut w = BitWriter::new();
        w.write(1, 4);
        w.write_bytes(&[0xff, 0x00]);
        let out = w.finish();
        assert_eq!(&out[..], &[0x1f, 0xf0, 0x00]);

        let mut r = BitReader::new(&out);
        assert_eq!(r.read(4).unwrap(), 1);
        assert_eq!(r.read_bytes(2).unwrap(), vec![0xff, 0x00]);
    }

    #[test]
    fn read_past_end_is_truncated() {
        let mut r = BitReader::new(&[0x01]);
        assert_eq!(r.read(16), Err(Error::TruncatedMessage));
        assert_eq!(r.read_bytes(2), Err(Error::TruncatedMessage));
        // A failed read consumes nothing.
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read(1), Err(Error::TruncatedMessage));
    }

    #[test]
    fn prefixed_and_remaining() {
        let mut w = BitWriter::new();
        w.write_prefixed(16, b"hello");
        w.write_bytes(b"tail");
        let out = w.finish();

        let mut r = BitReader::new(&out);
        assert_eq!(r.read_prefixed(16).unwrap(), b"hello");
        assert_eq!(r.read_bytes_remaining(), b"tail");
        assert!(r.is_empty());
        assert_eq!(r.read_bytes_remaining(), Vec::<u8>::new());
    }

    #[test]
    fn wide_integers() {
        let mut w = BitWriter::new();
        w.write_u48(0x0102_0304_0506);
        w.write_u24(0x0a0b0c);
        w.write(u64::MAX, 64);
        let out = w.finish();
        assert_eq!(out.len(), 6 + 3 + 8);

        let mut r = BitReader::new(&out);
        assert_eq!(r.read_u48().unwrap(), 0x0102_0304_0506);
        assert_eq!(r.read_u24().unwrap(), 0x0a0b0c);
        assert_eq!(r.read(64).unwrap(), u64::MAX);
        assert!(r.read(65).is_err());
    }
}
