//! Node identity.

use ed25519_dalek::VerifyingKey;

/// Fingerprint of a node: hex of BLAKE3(BLAKE3(pubkey)).
pub fn fingerprint(pubkey: &VerifyingKey) -> String {
    fingerprint_from_bytes(pubkey.as_bytes())
}

pub fn fingerprint_from_bytes(pubkey_bytes: &[u8]) -> String {
    let hash1 = blake3::hash(pubkey_bytes);
    let hash2 = blake3::hash(hash1.as_bytes());
    hex::encode(hash2.as_bytes())
}
