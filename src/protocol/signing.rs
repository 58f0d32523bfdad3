//! SMB2 message signing (HMAC-SHA256)

use crate::error::{Error, Result};
use crate::protocol::smb2_constants::{
    Smb2HeaderFlags, SMB2_HEADER_SIZE, SMB2_SIGNATURE_OFFSET, SMB2_SIGNATURE_SIZE,
};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const FLAGS_OFFSET: usize = 16;

/// MAC over `message` with its signature field zeroed
fn message_mac(key: &[u8], message: &[u8]) -> Result<HmacSha256> {
    if message.len() < SMB2_HEADER_SIZE {
        return Err(Error::BufferTooSmall {
            need: SMB2_HEADER_SIZE,
            have: message.len(),
        });
    }

    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::SigningError(format!("HMAC error: {}", e)))?;
    mac.update(&message[..SMB2_SIGNATURE_OFFSET]);
    mac.update(&[0u8; SMB2_SIGNATURE_SIZE]);
    mac.update(&message[SMB2_SIGNATURE_OFFSET + SMB2_SIGNATURE_SIZE..]);
    Ok(mac)
}

/// Compute the 16-byte signature of an SMB2 message.
///
/// The signature field is treated as zero regardless of its contents.
pub fn compute_signature(key: &[u8], message: &[u8]) -> Result<[u8; SMB2_SIGNATURE_SIZE]> {
    let digest = message_mac(key, message)?.finalize().into_bytes();
    let mut signature = [0u8; SMB2_SIGNATURE_SIZE];
    signature.copy_from_slice(&digest[..SMB2_SIGNATURE_SIZE]);
    Ok(signature)
}

/// Set the SIGNED flag and write the signature into a serialized message.
pub fn sign_message(key: &[u8], message: &mut [u8]) -> Result<()> {
    if message.len() < SMB2_HEADER_SIZE {
        return Err(Error::BufferTooSmall {
            need: SMB2_HEADER_SIZE,
            have: message.len(),
        });
    }

    let flags = u32::from_le_bytes([
        message[FLAGS_OFFSET],
        message[FLAGS_OFFSET + 1],
        message[FLAGS_OFFSET + 2],
        message[FLAGS_OFFSET + 3],
    ]) | Smb2HeaderFlags::SIGNED.bits();
    message[FLAGS_OFFSET..FLAGS_OFFSET + 4].copy_from_slice(&flags.to_le_bytes());

    let signature = compute_signature(key, message)?;
    message[SMB2_SIGNATURE_OFFSET..SMB2_SIGNATURE_OFFSET + SMB2_SIGNATURE_SIZE]
        .copy_from_slice(&signature);
    Ok(())
}

/// Check the signature carried by a serialized message in constant time.
pub fn verify_message(key: &[u8], message: &[u8]) -> Result<()> {
    let mac = message_mac(key, message)?;
    let actual = &message[SMB2_SIGNATURE_OFFSET..SMB2_SIGNATURE_OFFSET + SMB2_SIGNATURE_SIZE];
    mac.verify_truncated_left(actual)
        .map_err(|_| Error::SigningError("Signature mismatch".to_string()))
}
