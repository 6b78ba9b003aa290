//! Cursor over a hex-encoded pgoutput payload.
//!
//! The SQL replication interface returns `bytea` in hex output, so every
//! logical byte of a message occupies two ASCII characters. Offsets and
//! lengths here are counted in hex characters.

use byteorder::{BigEndian, ByteOrder};

use crate::error::{PgError, PgResult};

/// Strip the `\x` prefix Postgres puts in front of hex-encoded `bytea`.
pub fn strip_hex_prefix(payload: &str) -> &str {
    payload.strip_prefix("\\x").unwrap_or(payload)
}

#[derive(Debug, Clone)]
pub struct HexReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> HexReader<'a> {
    pub fn new(payload: &'a str) -> Self {
        Self {
            data: strip_hex_prefix(payload).as_bytes(),
            pos: 0,
        }
    }

    /// Current offset, in hex characters.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Hex characters left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, bytes: usize, out: &mut [u8]) -> PgResult<()> {
        let needed = bytes * 2;
        if needed > self.remaining() {
            return Err(PgError::BufferUnderrun {
                offset: self.pos,
                needed,
                available: self.remaining(),
            });
        }
        hex::decode_to_slice(&self.data[self.pos..self.pos + needed], &mut out[..bytes])
            .map_err(|e| {
                PgError::MalformedPayload(format!("invalid hex at offset {}: {}", self.pos, e))
            })?;
        self.pos += needed;
        Ok(())
    }

    pub fn read_u8(&mut self) -> PgResult<u8> {
        let mut buf = [0u8; 1];
        self.take(1, &mut buf)?;
        Ok(buf[0])
    }

    pub fn read_i8(&mut self) -> PgResult<i8> {
        Ok(self.read_u8()? as i8)
    }

    pub fn read_i16(&mut self) -> PgResult<i16> {
        let mut buf = [0u8; 2];
        self.take(2, &mut buf)?;
        Ok(BigEndian::read_i16(&buf))
    }

    pub fn read_i32(&mut self) -> PgResult<i32> {
        let mut buf = [0u8; 4];
        self.take(4, &mut buf)?;
        Ok(BigEndian::read_i32(&buf))
    }

    pub fn read_i64(&mut self) -> PgResult<i64> {
        let mut buf = [0u8; 8];
        self.take(8, &mut buf)?;
        Ok(BigEndian::read_i64(&buf))
    }

    /// Read `len` raw bytes.
    pub fn read_bytes(&mut self, len: usize) -> PgResult<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.take(len, &mut buf)?;
        Ok(buf)
    }

    /// Read `len` bytes as UTF-8 text.
    pub fn read_text(&mut self, len: usize) -> PgResult<String> {
        let offset = self.pos;
        let bytes = self.read_bytes(len)?;
        String::from_utf8(bytes)
            .map_err(|_| PgError::MalformedPayload(format!("invalid UTF-8 text at offset {}", offset)))
    }

    /// Read a null-terminated string.
    pub fn read_string(&mut self) -> PgResult<String> {
        let offset = self.pos;
        let mut bytes = Vec::new();
        loop {
            let b = self.read_u8()?;
            if b == 0 {
                break;
            }
            bytes.push(b);
        }
        String::from_utf8(bytes)
            .map_err(|_| PgError::MalformedPayload(format!("invalid UTF-8 string at offset {}", offset)))
    }
}
