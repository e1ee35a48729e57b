//! Symmetric delta codec for fixed-size input blocks.
//!
//! The first frame of an input packet carries its block raw; every later
//! frame is encoded against the previous decoded block as a change mask
//! (one bit per byte) followed by the changed bytes in order. Both endpoints
//! run the same codec, so `decode_delta` is the exact inverse of
//! `encode_delta` for blocks of the agreed size.

use thiserror::Error;

use crate::wire::{ByteReader, ByteWriter, WireError};

/// Errors that can occur while decoding a delta block
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeltaError {
    /// Encoder and decoder disagree on the input block size.
    #[error("delta block size mismatch: base is {base} byte(s), output is {out} byte(s)")]
    SizeMismatch { base: usize, out: usize },

    /// The packet ended before the bytes promised by the change mask.
    #[error("truncated delta block: {0}")]
    Truncated(#[from] WireError),
}

/// Number of bytes a delta-encoded block occupies at minimum: the change
/// mask, one bit per input byte.
pub fn min_delta_size(input_size: usize) -> usize {
    (input_size + 7) / 8
}

/// Writes `cur` as a delta against `base`. Both slices must be the same
/// length. Returns the number of bytes written.
pub fn encode_delta(base: &[u8], cur: &[u8], writer: &mut ByteWriter) -> Result<usize, DeltaError> {
    if base.len() != cur.len() {
        return Err(DeltaError::SizeMismatch {
            base: base.len(),
            out: cur.len(),
        });
    }

    let start = writer.position();
    let mask_len = min_delta_size(cur.len());
    let mask_offset = writer.position();
    for _ in 0..mask_len {
        writer.write_u8(0);
    }

    for (i, (&old, &new)) in base.iter().zip(cur.iter()).enumerate() {
        if old != new {
            let offset = mask_offset + i / 8;
            let patched = writer.as_slice()[offset] | 1 << (i % 8);
            writer.patch_u8(offset, patched);
            writer.write_u8(new);
        }
    }

    Ok(writer.position() - start)
}

/// Reconstructs a block into `out` from `base` plus the delta at `reader`.
pub fn decode_delta(base: &[u8], out: &mut [u8], reader: &mut ByteReader) -> Result<(), DeltaError> {
    if base.len() != out.len() {
        return Err(DeltaError::SizeMismatch {
            base: base.len(),
            out: out.len(),
        });
    }

    let mask_len = min_delta_size(base.len());
    let mask = reader.read_bytes(mask_len)?.to_vec();

    out.copy_from_slice(base);
    for (i, slot) in out.iter_mut().enumerate() {
        if mask[i / 8] & 1 << (i % 8) != 0 {
            *slot = reader.read_u8()?;
        }
    }

    Ok(())
}
