//! Boundary validation of untrusted network payloads.
//!
//! Every byte buffer arriving from the broadcast primitive or the storage
//! network passes through one of the `parse_*` functions before anything
//! else touches it. Each function checks shape, protocol constraints and
//! (for signed payloads) the address/key binding and signature. Rejected
//! payloads never escape this module as typed values.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

use crate::{
    ActiveUser, Address, CheckpointEntry, Error, HistorySnapshot, Message, ObjectRef, Result,
};

/// Maximum accepted username length, in bytes.
pub const MAX_USERNAME_LEN: usize = 64;

/// Maximum accepted message text length, in bytes.
pub const MAX_TEXT_LEN: usize = 4096;

/// Verify an ed25519 signature over `payload` with a raw 32-byte key.
///
/// Returns `false` (never errors) for keys or signatures of the wrong
/// shape; a malformed signature is just an invalid one.
pub fn verify_signature(payload: &[u8], signature: &[u8], public_key: &[u8]) -> bool {
    let Ok(key_bytes) = <&[u8; 32]>::try_from(public_key) else {
        return false;
    };
    let Ok(key) = VerifyingKey::from_bytes(key_bytes) else {
        return false;
    };
    let Ok(sig) = Signature::from_slice(signature) else {
        return false;
    };
    key.verify(payload, &sig).is_ok()
}

fn check_username(username: &str) -> Result<()> {
    if username.is_empty() || username.len() > MAX_USERNAME_LEN {
        return Err(Error::Invalid {
            field: "username",
            reason: format!("length {} outside 1..={}", username.len(), MAX_USERNAME_LEN),
        });
    }
    Ok(())
}

fn check_identity(address: &Address, public_key: &[u8], payload: &[u8], signature: &[u8]) -> Result<()> {
    if Address::from_public_key(public_key) != *address {
        return Err(Error::AddressMismatch);
    }
    if !verify_signature(payload, signature, public_key) {
        return Err(Error::BadSignature);
    }
    Ok(())
}

/// Validate an active-user announcement from the broadcast primitive.
pub fn parse_active_user(bytes: &[u8]) -> Result<ActiveUser> {
    let user: ActiveUser = serde_json::from_slice(bytes)?;
    check_username(&user.username)?;
    check_identity(&user.address, &user.public_key, &user.signable_bytes(), &user.signature)?;
    Ok(user)
}

/// Validate a chat message downloaded from the storage network.
pub fn parse_message(bytes: &[u8]) -> Result<Message> {
    let msg: Message = serde_json::from_slice(bytes)?;
    check_username(&msg.username)?;
    if msg.text.len() > MAX_TEXT_LEN {
        return Err(Error::Invalid {
            field: "text",
            reason: format!("length {} exceeds {}", msg.text.len(), MAX_TEXT_LEN),
        });
    }
    if msg.kind != crate::MessageKind::Text && msg.target_id.is_none() {
        return Err(Error::Invalid {
            field: "target_id",
            reason: "threads and reactions must name a target message".into(),
        });
    }
    check_identity(&msg.address, &msg.public_key, &msg.signable_bytes(), &msg.signature)?;
    Ok(msg)
}

/// Validate a checkpoint entry from the broadcast primitive.
///
/// Checkpoint entries are unsigned pointers; validation is structural.
/// A non-bootstrap generation must carry a snapshot reference.
pub fn parse_checkpoint(bytes: &[u8]) -> Result<CheckpointEntry> {
    let entry: CheckpointEntry = serde_json::from_slice(bytes)?;
    if entry.generation > 0 && entry.reference.is_none() {
        return Err(Error::Invalid {
            field: "reference",
            reason: format!("generation {} without a snapshot reference", entry.generation),
        });
    }
    Ok(entry)
}

/// Validate a history snapshot downloaded from the storage network.
pub fn parse_snapshot(bytes: &[u8]) -> Result<HistorySnapshot> {
    let snapshot: HistorySnapshot = serde_json::from_slice(bytes)?;
    for (address, user) in &snapshot.users {
        if user.username.len() > MAX_USERNAME_LEN {
            return Err(Error::Invalid {
                field: "username",
                reason: format!("user {address} username exceeds {MAX_USERNAME_LEN} bytes"),
            });
        }
    }
    Ok(snapshot)
}

/// Validate a feed entry payload: the content reference of an uploaded
/// message object.
pub fn parse_feed_ref(bytes: &[u8]) -> Result<ObjectRef> {
    Ok(serde_json::from_slice(bytes)?)
}
