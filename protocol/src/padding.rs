//! Fixed-block padding for sealed-sender envelopes (spec §4.4). Pads to the smallest
//! block size in [`BLOCK_SIZES`] that is `>= |data| + 2`, filling the gap with random
//! bytes and writing the original length as the last two bytes (big-endian).

use crate::error::{PqcError, Result};
use crate::rand::generate_random;

pub const BLOCK_SIZES: [usize; 5] = [256, 1024, 4096, 16384, 65536];
const LENGTH_FIELD_LEN: usize = 2;

pub fn pad_to_block(data: &[u8]) -> Result<Vec<u8>> {
    let needed = data.len() + LENGTH_FIELD_LEN;
    let block = BLOCK_SIZES
        .into_iter()
        .find(|&size| size >= needed)
        .ok_or(PqcError::InvalidPadding)?;
    if data.len() > u16::MAX as usize {
        return Err(PqcError::InvalidPadding);
    }

    let mut out = Vec::with_capacity(block);
    out.extend_from_slice(data);
    let filler_len = block - data.len() - LENGTH_FIELD_LEN;
    out.extend_from_slice(&generate_random(filler_len));
    out.extend_from_slice(&(data.len() as u16).to_be_bytes());
    Ok(out)
}

pub fn unpad(padded: &[u8]) -> Result<Vec<u8>> {
    if padded.len() < LENGTH_FIELD_LEN {
        return Err(PqcError::InvalidPadding);
    }
    let (body, length_field) = padded.split_at(padded.len() - LENGTH_FIELD_LEN);
    let original_len = u16::from_be_bytes([length_field[0], length_field[1]]) as usize;
    if original_len > body.len() {
        return Err(PqcError::InvalidPadding);
    }
    Ok(body[..original_len].to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_smallest_sufficient_block() {
        let data = vec![0u8; 10];
        let padded = pad_to_block(&data).unwrap();
        assert_eq!(padded.len(), 256);
    }

    #[test]
    fn pads_to_next_block_when_exactly_at_boundary() {
        // 256 - 2 = 254 is the largest payload that still fits the 256 block.
        let data = vec![1u8; 254];
        assert_eq!(pad_to_block(&data).unwrap().len(), 256);
        let data = vec![1u8; 255];
        assert_eq!(pad_to_block(&data).unwrap().len(), 1024);
    }

    #[test]
    fn round_trips_for_every_block_boundary() {
        for &size in &BLOCK_SIZES {
            for len in [0usize, 1, size.saturating_sub(3), size.saturating_sub(2)] {
                if len + LENGTH_FIELD_LEN > BLOCK_SIZES[BLOCK_SIZES.len() - 1] {
                    continue;
                }
                let data = vec![0x42u8; len];
                let padded = pad_to_block(&data).unwrap();
                assert!(BLOCK_SIZES.contains(&padded.len()));
                assert_eq!(unpad(&padded).unwrap(), data);
            }
        }
    }

    #[test]
    fn rejects_oversized_length_field() {
        let mut padded = vec![0u8; 256];
        let too_long = (300u16).to_be_bytes();
        padded[254] = too_long[0];
        padded[255] = too_long[1];
        assert_eq!(unpad(&padded).unwrap_err(), PqcError::InvalidPadding);
    }

    #[test]
    fn rejects_undersized_buffer() {
        assert_eq!(unpad(&[0u8]).unwrap_err(), PqcError::InvalidPadding);
    }

    #[test]
    fn too_large_payload_is_rejected() {
        let data = vec![0u8; 70_000];
        assert_eq!(pad_to_block(&data).unwrap_err(), PqcError::InvalidPadding);
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn unpad_inverts_pad_for_any_payload_up_to_the_largest_block(data in prop::collection::vec(any::<u8>(), 0..65_535)) {
            let padded = pad_to_block(&data).unwrap();
            prop_assert!(BLOCK_SIZES.contains(&padded.len()));
            prop_assert_eq!(unpad(&padded).unwrap(), data);
        }
    }
}
