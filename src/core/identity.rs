//! Instance identifiers: POSIX `cksum` CRC of a canonical path plus newline.
//!
//! The registry and the provisioning tooling both derive instance ids with
//! `echo "$APP_DIR" | cksum`, so the digest here must stay bit-for-bit
//! compatible with that command: CRC-32 (polynomial `0x04C11DB7`, MSB first,
//! zero init) over the data, then over the data length in little-endian
//! bytes with leading zero bytes dropped, then complemented.

#![allow(clippy::cast_possible_truncation)]

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

const POLY: u32 = 0x04C1_1DB7;

const TABLE: [u32; 256] = build_table();

const fn build_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u32) << 24;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000_0000 == 0 {
                crc << 1
            } else {
                (crc << 1) ^ POLY
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

#[inline]
fn feed(crc: u32, byte: u8) -> u32 {
    (crc << 8) ^ TABLE[(((crc >> 24) as u8) ^ byte) as usize]
}

/// POSIX `cksum` digest of `data`.
#[must_use]
pub fn cksum(data: &[u8]) -> u32 {
    let mut crc = data.iter().fold(0u32, |crc, &b| feed(crc, b));
    let mut len = data.len() as u64;
    while len != 0 {
        let byte = (len & 0xff) as u8;
        crc = feed(crc, byte);
        len >>= 8;
    }
    !crc
}

/// Numeric identity of a monitored application deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Instance(u32);

impl Instance {
    /// Derive the instance id for a path string.
    #[must_use]
    pub fn identify(path: &str) -> Self {
        let mut buf = Vec::with_capacity(path.len() + 1);
        buf.extend_from_slice(path.as_bytes());
        buf.push(b'\n');
        Self(cksum(&buf))
    }

    /// Derive the instance id for a filesystem path (lossy UTF-8 rendering).
    #[must_use]
    pub fn for_path(path: &Path) -> Self {
        Self::identify(&path.to_string_lossy())
    }

    #[must_use]
    pub const fn value(self) -> u32 {
        self.0
    }

    /// Parse a decimal instance id as it appears in registry keys and CLI args.
    ///
    /// Only the canonical rendering is accepted (ASCII digits, no sign, no
    /// padding, no leading zero) so that `parse(s).to_string() == s`.
    pub fn parse(raw: &str) -> Option<Self> {
        let canonical = !raw.is_empty()
            && raw.bytes().all(|b| b.is_ascii_digit())
            && (raw.len() == 1 || !raw.starts_with('0'));
        if !canonical {
            return None;
        }
        raw.parse::<u32>().ok().map(Self)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Instance> for String {
    fn from(value: Instance) -> Self {
        value.to_string()
    }
}

impl TryFrom<String> for Instance {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid instance id: {value:?}"))
    }
}
