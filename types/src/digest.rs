// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::object_id::ObjectId;
use blake2::{digest::consts::U32, Blake2b, Digest as _};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use thiserror::Error;

pub type Blake2b256 = Blake2b<U32>;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Digest must be {expected} bytes, got {actual}")]
pub struct DigestLengthError {
    expected: usize,
    actual: usize,
}

/// A 32 byte Blake2b-256 hash.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Digest([u8; Digest::LENGTH]);

impl Digest {
    pub const LENGTH: usize = 32;

    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, DigestLengthError> {
        let bytes: [u8; Self::LENGTH] = bytes.try_into().map_err(|_| DigestLengthError {
            expected: Self::LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(bytes))
    }

    /// Hashes a single buffer.
    pub fn hash(bytes: &[u8]) -> Self {
        Self(Blake2b256::digest(bytes).into())
    }

    /// Hashes the concatenation of several buffers without copying them together.
    pub fn hash_all<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut hasher = Blake2b256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// Content digest of a package: every module hash and every dependency id
    /// is a 32 byte component, components are sorted, then hashed together.
    /// Module and dependency order therefore do not change the digest.
    pub fn compute_package_digest(modules: &[Vec<u8>], dependencies: &[ObjectId]) -> Self {
        let mut components: Vec<[u8; 32]> = modules
            .iter()
            .map(|module| Blake2b256::digest(module).into())
            .chain(dependencies.iter().map(|dep| dep.into_bytes()))
            .collect();
        components.sort_unstable();
        Self::hash_all(components.iter().map(|component| component.as_slice()))
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.0.to_vec()
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", self.to_hex())
    }
}

impl fmt::Debug for Digest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Digest({})", self)
    }
}

impl Serialize for Digest {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            self.to_string().serialize(serializer)
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Digest {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let literal = String::deserialize(deserializer)?;
            let bytes = hex::decode(literal.strip_prefix("0x").unwrap_or(&literal))
                .map_err(D::Error::custom)?;
            Self::from_slice(&bytes).map_err(D::Error::custom)
        } else {
            <[u8; 32]>::deserialize(deserializer).map(Self)
        }
    }
}
