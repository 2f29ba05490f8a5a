use std::net::{Ipv4Addr, Ipv6Addr};

use super::error::DecodeError;

/// Positional big-endian reader over one immutable datagram buffer.
///
/// Every read is bounds-checked and fails with [`DecodeError::Truncated`]
/// instead of panicking; the input is never copied or mutated.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Move to an absolute offset within the buffer.
    pub fn seek(&mut self, pos: usize) -> Result<(), DecodeError> {
        if pos > self.data.len() {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: pos - self.pos,
                remaining: self.remaining(),
            });
        }
        self.pos = pos;
        Ok(())
    }

    /// Borrow `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, DecodeError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_u64(&mut self) -> Result<u64, DecodeError> {
        let b = self.read_bytes(8)?;
        Ok(u64::from_be_bytes([
            b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7],
        ]))
    }

    pub fn read_ipv4(&mut self) -> Result<Ipv4Addr, DecodeError> {
        let b = self.read_bytes(4)?;
        Ok(Ipv4Addr::new(b[0], b[1], b[2], b[3]))
    }

    pub fn read_ipv6(&mut self) -> Result<Ipv6Addr, DecodeError> {
        let b = self.read_bytes(16)?;
        let mut octets = [0u8; 16];
        octets.copy_from_slice(b);
        Ok(Ipv6Addr::from(octets))
    }

    /// Read one IPFIX variable-length field (RFC 7011 section 7).
    ///
    /// A single length octet, or 255 followed by a 16-bit length, prefixes
    /// the value.
    pub fn read_varlen(&mut self) -> Result<&'a [u8], DecodeError> {
        let short = self.read_u8()?;
        let len = if short == 255 {
            self.read_u16()? as usize
        } else {
            short as usize
        };
        self.read_bytes(len)
    }
}
