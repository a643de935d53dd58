//! Identity and content-address primitives.

use serde::{Deserialize, Serialize};

/// A 32-byte peer address derived from an ed25519 verifying key.
///
/// Computed as double-BLAKE3 of the raw key bytes:
/// `hash₁ = BLAKE3(pubkey)`, `address = BLAKE3(hash₁)`.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Address(#[serde(with = "crate::hexser")] [u8; 32]);

impl Address {
    /// Create an address from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive the address committing to an ed25519 verifying key.
    pub fn from_public_key(public_key: &[u8]) -> Self {
        let hash1 = blake3::hash(public_key);
        let hash2 = blake3::hash(hash1.as_bytes());
        Self(*hash2.as_bytes())
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Show first 8 hex chars
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

/// A content address in the storage network (32-byte BLAKE3 digest).
///
/// Assigned by the storage collaborator when an object is uploaded;
/// downloading the reference yields the original bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectRef(#[serde(with = "crate::hexser")] [u8; 32]);

impl ObjectRef {
    /// Create a reference from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        if bytes.len() != 32 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        let mut arr = [0u8; 32];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

impl std::fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_hex_roundtrip() {
        let addr = Address::from_bytes([7u8; 32]);
        let parsed = Address::from_hex(&addr.to_hex()).unwrap();
        assert_eq!(addr, parsed);
    }

    #[test]
    fn address_from_key_deterministic() {
        let key = [42u8; 32];
        assert_eq!(Address::from_public_key(&key), Address::from_public_key(&key));
        assert_ne!(
            Address::from_public_key(&key),
            Address::from_public_key(&[43u8; 32])
        );
    }

    #[test]
    fn address_serializes_as_hex_string() {
        let addr = Address::from_bytes([1u8; 32]);
        let json = serde_json::to_string(&addr).unwrap();
        assert_eq!(json, format!("\"{}\"", addr.to_hex()));

        let back: Address = serde_json::from_str(&json).unwrap();
        assert_eq!(back, addr);
    }

    #[test]
    fn object_ref_rejects_short_hex() {
        assert!(ObjectRef::from_hex("abcd").is_err());
    }
}
