// Copyright (c) 2026 NoiseFS
// Licensed under the Apache License, Version 2.0

#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! Persistent announce identity.
//!
//! Loads an Ed25519 keypair from `<data_dir>/announce_identity.key` or
//! creates and persists one. The file holds the protobuf keypair encoding,
//! written atomically with private permissions.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use libp2p::identity::Keypair;
use libp2p::PeerId;
use thiserror::Error;
use zeroize::Zeroize;

const IDENTITY_FILE: &str = "announce_identity.key";

/// Identity errors.
#[derive(Debug, Error)]
pub enum IdentityError {
    /// Filesystem failure.
    #[error("io")]
    Io,
    /// Key bytes do not decode.
    #[error("key decode")]
    Decode,
}

impl From<std::io::Error> for IdentityError {
    fn from(_: std::io::Error) -> Self {
        IdentityError::Io
    }
}

fn set_private_perms_best_effort(path: &Path) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
}

/// Load or create the announce keypair under `data_dir`.
///
/// Returns `(PeerId, Keypair)`.
pub fn load_or_create_identity(
    data_dir: impl AsRef<Path>,
) -> Result<(PeerId, Keypair), IdentityError> {
    let dir = data_dir.as_ref();
    fs::create_dir_all(dir)?;

    let path: PathBuf = dir.join(IDENTITY_FILE);

    if path.exists() {
        let mut bytes = fs::read(&path)?;
        let kp = Keypair::from_protobuf_encoding(&bytes).map_err(|_| IdentityError::Decode)?;
        bytes.zeroize();
        let pid = PeerId::from(kp.public());
        return Ok((pid, kp));
    }

    let kp = Keypair::generate_ed25519();
    let mut bytes = kp
        .to_protobuf_encoding()
        .map_err(|_| IdentityError::Decode)?;

    // Write to tmp, fsync, rename.
    let tmp = dir.join(format!("{IDENTITY_FILE}.tmp"));
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(&bytes)?;
        f.sync_all()?;
    }
    bytes.zeroize();
    set_private_perms_best_effort(&tmp);
    fs::rename(&tmp, &path)?;
    set_private_perms_best_effort(&path);

    let pid = PeerId::from(kp.public());
    Ok((pid, kp))
}
