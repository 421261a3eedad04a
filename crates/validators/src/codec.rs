//! Binary encoding of validator sets.
//!
//! # Wire Format
//!
//! Validators are written in ascending address order, each as its fixed-width
//! public key followed by its power as an unsigned LEB128 varint:
//!
//! ```text
//! (public_key[32] || varint(power))*
//! ```
//!
//! There is no length prefix, padding or separator. A buffer decodes only if
//! it is consumed exactly.

use crate::{DecodeError, DecodeErrorKind, Validators, ValidatorsError};
use integer_encoding::VarInt;
use meridian_types::PublicKey;

/// Maximum number of bytes in a u64 varint.
const MAX_VARINT_LENGTH: usize = 10;

fn extend_vec_with_varint(buffer: &mut Vec<u8>, value: u64) {
    let mut scratch = [0u8; MAX_VARINT_LENGTH];
    let written = value.encode_var(&mut scratch);
    buffer.extend_from_slice(&scratch[..written]);
}

impl Validators {
    /// Encode the set in address order.
    pub fn encode(&self) -> Vec<u8> {
        let mut buffer = Vec::with_capacity(self.len() * (PublicKey::BYTES + MAX_VARINT_LENGTH));
        for (public_key, power) in self.iter() {
            buffer.extend_from_slice(public_key.as_bytes());
            extend_vec_with_varint(&mut buffer, power);
        }
        buffer
    }

    /// Decode a set from its encoding.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        let mut validators = Validators::new();
        decode_into(bytes, &mut validators)?;
        Ok(validators)
    }
}

/// Decode `bytes` and apply every entry to `dst` with `alter_power`.
///
/// On error `dst` is left as it was.
pub fn decode_validators(bytes: &[u8], dst: &mut Validators) -> Result<(), ValidatorsError> {
    let mut decoded = dst.clone();
    decode_into(bytes, &mut decoded)?;
    *dst = decoded;
    Ok(())
}

fn decode_into(bytes: &[u8], dst: &mut Validators) -> Result<(), DecodeError> {
    let mut offset = 0;
    while offset < bytes.len() {
        let entry_offset = offset;

        let public_key = PublicKey::from_slice(&bytes[offset..])
            .ok_or_else(|| DecodeError::new(offset, DecodeErrorKind::TruncatedPublicKey))?;
        offset += PublicKey::BYTES;

        let (power, read) = u64::decode_var(&bytes[offset..])
            .ok_or_else(|| DecodeError::new(offset, DecodeErrorKind::InvalidVarint))?;
        offset += read;

        dst.alter_power(&public_key, power).map_err(|e| {
            DecodeError::new(entry_offset, DecodeErrorKind::InvalidEntry(Box::new(e)))
        })?;
    }
    Ok(())
}
