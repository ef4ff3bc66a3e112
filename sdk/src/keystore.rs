// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    crypto::{Ed25519KeyPair, SignatureScheme},
    error::SdkError,
};
use policy_upgrade_types::AccountAddress;
use std::{collections::BTreeMap, path::Path};
use tracing::debug;

/// Keys of a local keystore file, indexed by the address they control.
///
/// The file is a JSON array of base64 strings, each decoding to
/// `scheme flag || 32 byte secret key`. Only Ed25519 keys are loaded.
#[derive(Debug, Default)]
pub struct Keystore {
    keys: BTreeMap<AccountAddress, Ed25519KeyPair>,
}

impl Keystore {
    pub fn load(path: &Path) -> Result<Self, SdkError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            SdkError::InvalidKeystore(format!("Unable to read {}: {}", path.display(), err))
        })?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> Result<Self, SdkError> {
        let entries: Vec<String> = serde_json::from_str(contents)
            .map_err(|err| SdkError::InvalidKeystore(format!("expected a JSON array: {}", err)))?;

        let mut keys = BTreeMap::new();
        for (index, entry) in entries.iter().enumerate() {
            let bytes = base64::decode(entry.trim()).map_err(|err| {
                SdkError::InvalidKeystore(format!("entry {} is not base64: {}", index, err))
            })?;
            let Some((flag, secret)) = bytes.split_first() else {
                return Err(SdkError::InvalidKeystore(format!("entry {} is empty", index)));
            };
            if SignatureScheme::try_from(*flag).is_err() {
                debug!(index, flag, "Skipping keystore entry with an unsupported scheme");
                continue;
            }
            let keypair = Ed25519KeyPair::from_secret_bytes(secret).map_err(|err| {
                SdkError::InvalidKeystore(format!("entry {}: {}", index, err))
            })?;
            keys.insert(keypair.address(), keypair);
        }
        debug!(keys = keys.len(), "Loaded keystore");
        Ok(Self { keys })
    }

    /// Never falls back to some other key.
    pub fn keypair(&self, address: &AccountAddress) -> Result<&Ed25519KeyPair, SdkError> {
        self.keys
            .get(address)
            .ok_or(SdkError::KeyNotFound { address: *address })
    }

    pub fn addresses(&self) -> impl Iterator<Item = &AccountAddress> + '_ {
        self.keys.keys()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Encodes an Ed25519 secret the way keystore files store it.
pub fn encode_ed25519_entry(secret: &[u8; 32]) -> String {
    let mut bytes = vec![SignatureScheme::Ed25519.flag()];
    bytes.extend_from_slice(secret);
    base64::encode(bytes)
}
