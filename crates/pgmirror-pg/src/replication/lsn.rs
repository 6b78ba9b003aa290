//! LSN (Log Sequence Number) utilities for PostgreSQL replication.

use std::fmt;
use std::str::FromStr;

use crate::error::{PgError, PgResult};

/// Parse LSN from "X/Y" format to u64.
pub fn parse_lsn(lsn: &str) -> PgResult<u64> {
    let parts: Vec<&str> = lsn.split('/').collect();
    if parts.len() != 2 {
        return Err(PgError::InvalidLsn(lsn.to_string()));
    }

    let high =
        u64::from_str_radix(parts[0], 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;
    let low =
        u64::from_str_radix(parts[1], 16).map_err(|_| PgError::InvalidLsn(lsn.to_string()))?;

    if low > 0xFFFF_FFFF {
        return Err(PgError::InvalidLsn(lsn.to_string()));
    }

    Ok((high << 32) | low)
}

/// Format u64 LSN to "X/Y" format.
pub fn format_lsn(lsn: u64) -> String {
    let high = lsn >> 32;
    let low = lsn & 0xFFFFFFFF;
    format!("{:X}/{:X}", high, low)
}

/// A position in the upstream change stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Lsn(pub u64);

impl Lsn {
    pub const ZERO: Lsn = Lsn(0);

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl From<u64> for Lsn {
    fn from(value: u64) -> Self {
        Lsn(value)
    }
}

impl From<Lsn> for u64 {
    fn from(lsn: Lsn) -> Self {
        lsn.0
    }
}

impl fmt::Display for Lsn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&format_lsn(self.0))
    }
}

impl FromStr for Lsn {
    type Err = PgError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_lsn(s).map(Lsn)
    }
}
