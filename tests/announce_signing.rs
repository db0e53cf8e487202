// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use libp2p::identity::Keypair;
use noisefs::announce::record::{Announcement, Category, SizeClass};
use noisefs::announce::signing::{
    canonical_signing_digest, peer_public_key, sign_announcement, verify_announcement, SignError,
};
use noisefs::announce::topics::hash_topic;

fn sample() -> Announcement {
    Announcement::new(
        "QmSigned",
        &hash_topic("files/docs"),
        Category::Document,
        SizeClass::Tiny,
        600,
        1_700_000_000,
    )
}

#[test]
fn signed_record_verifies() {
    let kp = Keypair::generate_ed25519();
    let mut a = sample();
    sign_announcement(&mut a, &kp).expect("sign");
    assert!(a.peer_id.is_some());
    assert!(a.signature.is_some());
    verify_announcement(&a, true).expect("verify");
}

#[test]
fn flipped_signature_bit_rejected() {
    let kp = Keypair::generate_ed25519();
    let mut a = sample();
    sign_announcement(&mut a, &kp).expect("sign");

    let sig = a.signature.take().expect("sig");
    let mut raw = BASE64.decode(&sig).expect("b64");
    raw[0] ^= 0x01;
    a.signature = Some(BASE64.encode(raw));

    assert!(matches!(
        verify_announcement(&a, true),
        Err(SignError::SignatureInvalid)
    ));
}

#[test]
fn tampered_content_rejected() {
    let kp = Keypair::generate_ed25519();
    let mut a = sample();
    sign_announcement(&mut a, &kp).expect("sign");
    a.descriptor = "QmTampered".to_string();
    assert!(matches!(
        verify_announcement(&a, true),
        Err(SignError::SignatureInvalid)
    ));
}

#[test]
fn unsigned_records_follow_policy() {
    let a = sample();
    verify_announcement(&a, false).expect("optional signature");
    assert!(matches!(
        verify_announcement(&a, true),
        Err(SignError::MissingSignature)
    ));
}

#[test]
fn canonical_digest_excludes_identity_fields() {
    let kp = Keypair::generate_ed25519();
    let unsigned = sample();
    let before = canonical_signing_digest(&unsigned).expect("digest");

    let mut signed = unsigned.clone();
    sign_announcement(&mut signed, &kp).expect("sign");
    let after = canonical_signing_digest(&signed).expect("digest");
    assert_eq!(before, after, "sig and pid never enter the digest");
}

#[test]
fn peer_id_embeds_verification_key() {
    let kp = Keypair::generate_ed25519();
    let pid = kp.public().to_peer_id().to_string();
    let key = peer_public_key(&pid).expect("embedded key");
    assert_eq!(key.to_peer_id().to_string(), pid);

    assert!(matches!(
        peer_public_key("not a peer id"),
        Err(SignError::PeerId)
    ));
}

#[test]
fn secp256k1_keys_verify_too() {
    let kp = Keypair::generate_secp256k1();
    let mut a = sample();
    sign_announcement(&mut a, &kp).expect("sign");
    verify_announcement(&a, true).expect("verify");
}

#[test]
fn hashed_peer_ids_are_unverifiable() {
    // ECDSA public keys exceed the inline multihash threshold, so their
    // peer ids carry only a hash; no key can be recovered from the id.
    let kp = Keypair::generate_ecdsa();
    let mut a = sample();
    sign_announcement(&mut a, &kp).expect("sign");
    assert!(matches!(
        verify_announcement(&a, true),
        Err(SignError::KeyNotEmbedded)
    ));
}
