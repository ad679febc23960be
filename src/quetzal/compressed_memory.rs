//! XOR-RLE compression for Quetzal `CMem` chunks (§4.2 "Quetzal save").
//!
//! Dynamic memory is XORed byte-for-byte against the original story bytes;
//! runs of zero XOR bytes (unchanged bytes) are run-length encoded as a
//! zero byte followed by a count of *additional* zeros in `0..=255`.

use crate::error::{Error, Result};
use log::debug;

/// XOR `current` against `original` and RLE-encode the runs of zero bytes.
/// Both slices must be the same length (always true for dynamic memory
/// compressed against its own story's prefix).
pub fn compress_memory(current: &[u8], original: &[u8]) -> Vec<u8> {
    debug_assert_eq!(current.len(), original.len());

    let mut compressed = Vec::new();
    let mut i = 0;

    while i < current.len() {
        let xor_byte = current[i] ^ original[i];

        if xor_byte == 0 {
            let start = i;
            while i < current.len() && (current[i] ^ original[i]) == 0 {
                i += 1;
            }
            let run_length = i - start;

            if run_length <= 256 {
                compressed.push(0);
                compressed.push((run_length - 1) as u8);
            } else {
                let mut remaining = run_length;
                while remaining > 256 {
                    compressed.push(0);
                    compressed.push(255);
                    remaining -= 256;
                }
                if remaining > 0 {
                    compressed.push(0);
                    compressed.push((remaining - 1) as u8);
                }
            }
        } else {
            compressed.push(xor_byte);
            i += 1;
        }
    }

    debug!("Compressed {} bytes to {} bytes", current.len(), compressed.len());
    compressed
}

/// Reverse of [`compress_memory`]: replay the RLE runs and XOR back against `original`.
pub fn decompress_memory(compressed: &[u8], original: &[u8]) -> Result<Vec<u8>> {
    let mut decompressed = Vec::with_capacity(original.len());
    let mut compressed_idx = 0;
    let mut original_idx = 0;

    while compressed_idx < compressed.len() && original_idx < original.len() {
        let byte = compressed[compressed_idx];
        compressed_idx += 1;

        if byte == 0 {
            if compressed_idx >= compressed.len() {
                return Err(Error::Format("incomplete RLE sequence in CMem chunk".to_string()));
            }

            let run_length = (compressed[compressed_idx] as usize) + 1;
            compressed_idx += 1;

            for _ in 0..run_length {
                if original_idx >= original.len() {
                    return Err(Error::Format("RLE run extends beyond memory".to_string()));
                }
                decompressed.push(original[original_idx]);
                original_idx += 1;
            }
        } else {
            if original_idx >= original.len() {
                return Err(Error::Format("compressed data extends beyond memory".to_string()));
            }
            decompressed.push(original[original_idx] ^ byte);
            original_idx += 1;
        }
    }

    while original_idx < original.len() {
        decompressed.push(original[original_idx]);
        original_idx += 1;
    }

    if decompressed.len() != original.len() {
        return Err(Error::Format(format!(
            "decompressed size {} doesn't match original size {}",
            decompressed.len(),
            original.len()
        )));
    }

    Ok(decompressed)
}

/// CMem chunk - Compressed memory
pub struct CMemChunk {
    /// Compressed memory data
    pub data: Vec<u8>,
}

impl CMemChunk {
    /// Create from current and original memory
    pub fn from_memory(current: &[u8], original: &[u8]) -> Self {
        let data = compress_memory(current, original);
        CMemChunk { data }
    }

    /// Get compressed data as bytes
    pub fn to_bytes(&self) -> Vec<u8> {
        self.data.clone()
    }

    /// Restore to memory given the original
    pub fn restore_to_memory(&self, original: &[u8]) -> Result<Vec<u8>> {
        decompress_memory(&self.data, original)
    }
}
