// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//     http://www.apache.org/licenses/LICENSE-2.0
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Announcement signing and verification.
//!
//! Canonical signing content is the record with `sig` and `pid` cleared,
//! serialized with the compact wire field names, SHA-256 hashed. The
//! verification key is the one embedded in the announcer's peer id
//! (identity multihash). Any algorithm the peer id can embed verifies
//! through one interface; hashed peer ids (large RSA/ECDSA keys) carry no
//! recoverable key and are rejected as unverifiable.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use libp2p::identity::{Keypair, PublicKey};
use libp2p::PeerId;
use ring::digest;
use thiserror::Error;

use crate::announce::record::Announcement;

/// Multihash code for identity-hashed peer ids.
const MULTIHASH_IDENTITY: u8 = 0x00;

/// Signing errors.
#[derive(Debug, Error)]
pub enum SignError {
    /// Canonical serialization failed.
    #[error("canonical encode")]
    Encode,
    /// Keypair refused to sign.
    #[error("sign")]
    Sign,
    /// Peer id does not parse.
    #[error("bad peer id")]
    PeerId,
    /// Peer id does not embed its public key (hashed multihash).
    #[error("key not embedded in peer id")]
    KeyNotEmbedded,
    /// Embedded key bytes do not decode.
    #[error("bad public key")]
    BadKey,
    /// Signature bytes do not decode.
    #[error("bad signature encoding")]
    BadEncoding,
    /// Signature verification failed.
    #[error("signature invalid")]
    SignatureInvalid,
    /// Record is unsigned but the verifier requires a signature.
    #[error("missing signature")]
    MissingSignature,
    /// Signed record without a peer id.
    #[error("missing peer id")]
    MissingPeer,
}

/// SHA-256 over the canonical signing content.
pub fn canonical_signing_digest(a: &Announcement) -> Result<[u8; 32], SignError> {
    let mut unsigned = a.clone();
    unsigned.signature = None;
    unsigned.peer_id = None;
    let json = serde_json::to_vec(&unsigned).map_err(|_| SignError::Encode)?;
    let d = digest::digest(&digest::SHA256, &json);
    let mut out = [0u8; 32];
    out.copy_from_slice(d.as_ref());
    Ok(out)
}

/// Sign in place: sets `peer_id` from the keypair and `signature` over the
/// canonical digest.
pub fn sign_announcement(a: &mut Announcement, keypair: &Keypair) -> Result<(), SignError> {
    a.peer_id = Some(keypair.public().to_peer_id().to_string());
    a.signature = None;
    let digest = canonical_signing_digest(a)?;
    let sig = keypair.sign(&digest).map_err(|_| SignError::Sign)?;
    a.signature = Some(BASE64.encode(sig));
    Ok(())
}

/// Verify a record against the key embedded in its peer id.
///
/// Unsigned records pass unless `require_signature` is set.
pub fn verify_announcement(a: &Announcement, require_signature: bool) -> Result<(), SignError> {
    let Some(sig_b64) = &a.signature else {
        if require_signature {
            return Err(SignError::MissingSignature);
        }
        return Ok(());
    };
    let Some(peer_id) = &a.peer_id else {
        return Err(SignError::MissingPeer);
    };

    let sig = BASE64.decode(sig_b64).map_err(|_| SignError::BadEncoding)?;
    let key = peer_public_key(peer_id)?;
    let digest = canonical_signing_digest(a)?;
    if !key.verify(&digest, &sig) {
        return Err(SignError::SignatureInvalid);
    }
    Ok(())
}

/// Extract the public key embedded in a peer id.
///
/// Peer ids for keys up to 42 bytes are identity multihashes whose digest is
/// the protobuf-encoded key. Hashed peer ids (large RSA) carry no
/// recoverable key and fail with [`SignError::KeyNotEmbedded`].
pub fn peer_public_key(peer_id: &str) -> Result<PublicKey, SignError> {
    let pid: PeerId = peer_id.parse().map_err(|_| SignError::PeerId)?;
    let bytes = pid.to_bytes();
    // Multihash layout: code varint, length varint, digest. The identity
    // code is 0x00 and identity digests fit a single-byte length.
    if bytes.len() < 2 || bytes[0] != MULTIHASH_IDENTITY {
        return Err(SignError::KeyNotEmbedded);
    }
    let len = bytes[1] as usize;
    if len >= 0x80 || bytes.len() != 2 + len {
        return Err(SignError::KeyNotEmbedded);
    }
    PublicKey::try_decode_protobuf(&bytes[2..]).map_err(|_| SignError::BadKey)
}
