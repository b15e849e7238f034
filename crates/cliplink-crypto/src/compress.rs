//! zstd compression for transfer chunks.
//!
//! Chunks are compressed before sealing. Decompression takes an explicit
//! output bound so a hostile frame cannot inflate into an arbitrary amount
//! of memory.

use crate::error::{CryptoError, Result};

/// zstd level used for transfer chunks.
pub const DEFAULT_COMPRESSION_LEVEL: i32 = 3;

/// Compress one chunk.
pub fn compress(data: &[u8], level: i32) -> Result<Vec<u8>> {
    zstd::bulk::compress(data, level).map_err(|e| CryptoError::Compression(e.to_string()))
}

/// Decompress one chunk, failing if the output would exceed `max_len` bytes.
pub fn decompress(data: &[u8], max_len: usize) -> Result<Vec<u8>> {
    zstd::bulk::decompress(data, max_len).map_err(|e| CryptoError::Decompression(e.to_string()))
}
