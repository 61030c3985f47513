//! Block codec seam for the bundle envelope.
//!
//! Unity stores raw LZ4 blocks (no frame, no length prefix); the mode is
//! the low 6 bits of the enclosing flags field. LZMA is recognised so the
//! caller can report it, but never decoded.

use crate::error::{Error, Result};

pub const COMPRESSION_MASK: u32 = 0x3F;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionMode {
    None,
    Lzma,
    Lz4,
    Lz4hc,
    Unknown(u8),
}

impl CompressionMode {
    pub fn from_flags(flags: u32) -> Self {
        match flags & COMPRESSION_MASK {
            0 => CompressionMode::None,
            1 => CompressionMode::Lzma,
            2 => CompressionMode::Lz4,
            3 => CompressionMode::Lz4hc,
            mode => CompressionMode::Unknown(mode as u8),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            CompressionMode::None => "none",
            CompressionMode::Lzma => "lzma",
            CompressionMode::Lz4 | CompressionMode::Lz4hc => "lz4",
            CompressionMode::Unknown(_) => "unknown",
        }
    }

    fn raw(&self) -> u32 {
        match self {
            CompressionMode::None => 0,
            CompressionMode::Lzma => 1,
            CompressionMode::Lz4 => 2,
            CompressionMode::Lz4hc => 3,
            CompressionMode::Unknown(mode) => *mode as u32,
        }
    }
}

/// Inflate one block to exactly `expected` bytes. A size disagreement is
/// corruption, not a warning.
pub fn decompress_block(mode: CompressionMode, data: &[u8], expected: usize) -> Result<Vec<u8>> {
    let out = match mode {
        CompressionMode::None => data.to_vec(),
        CompressionMode::Lz4 | CompressionMode::Lz4hc => {
            let bound = i32::try_from(expected).map_err(|_| Error::InvalidOffset {
                offset: expected as u64,
                reason: "block size exceeds lz4 bound",
            })?;
            lz4::block::decompress(data, Some(bound))?
        }
        CompressionMode::Lzma | CompressionMode::Unknown(_) => {
            return Err(Error::UnsupportedCompression { mode: mode.raw() })
        }
    };

    if out.len() != expected {
        return Err(Error::CorruptBlock {
            expected,
            actual: out.len(),
        });
    }
    Ok(out)
}

pub fn compress_block(mode: CompressionMode, data: &[u8]) -> Result<Vec<u8>> {
    match mode {
        CompressionMode::None => Ok(data.to_vec()),
        CompressionMode::Lz4 => Ok(lz4::block::compress(data, None, false)?),
        CompressionMode::Lz4hc => Ok(lz4::block::compress(
            data,
            Some(lz4::block::CompressionMode::HIGHCOMPRESSION(9)),
            false,
        )?),
        CompressionMode::Lzma | CompressionMode::Unknown(_) => {
            Err(Error::UnsupportedCompression { mode: mode.raw() })
        }
    }
}
