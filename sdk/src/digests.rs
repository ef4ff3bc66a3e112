// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Transaction and object digests, and the versioned references that owned
//! object inputs are passed by.
//!
//! Full nodes print digests in base58. In BCS a digest is a length prefixed
//! byte vector.

use crate::{error::SdkError, serde_helpers::lenient_u64};
use policy_upgrade_types::{Digest, ObjectId};
use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};

macro_rules! define_base58_digest {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(Digest);

        impl $name {
            pub const fn new(digest: Digest) -> Self {
                Self(digest)
            }

            pub fn inner(&self) -> &Digest {
                &self.0
            }

            pub fn base58_encode(&self) -> String {
                bs58::encode(self.0.as_bytes()).into_string()
            }
        }

        impl From<Digest> for $name {
            fn from(digest: Digest) -> Self {
                Self(digest)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.base58_encode())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.base58_encode())
            }
        }

        impl FromStr for $name {
            type Err = SdkError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = bs58::decode(s).into_vec().map_err(|err| {
                    SdkError::Serialization(format!("invalid base58 digest '{}': {}", s, err))
                })?;
                let digest = Digest::from_slice(&bytes).map_err(|err| {
                    SdkError::Serialization(format!("invalid digest '{}': {}", s, err))
                })?;
                Ok(Self(digest))
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    serializer.serialize_str(&self.base58_encode())
                } else {
                    serializer.serialize_bytes(self.0.as_bytes())
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let encoded = String::deserialize(deserializer)?;
                    Self::from_str(&encoded).map_err(D::Error::custom)
                } else {
                    let bytes = Vec::<u8>::deserialize(deserializer)?;
                    Digest::from_slice(&bytes).map(Self).map_err(D::Error::custom)
                }
            }
        }
    };
}

define_base58_digest!(
    /// `Blake2b-256("TransactionData::" || BCS(transaction data))`
    TransactionDigest
);

define_base58_digest!(
    /// Digest of one version of an object's contents.
    ObjectDigest
);

/// An object at a specific version. Owned inputs are passed by reference so
/// a transaction built against a stale version is refused.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectRef {
    pub object_id: ObjectId,
    #[serde(with = "lenient_u64")]
    pub version: u64,
    pub digest: ObjectDigest,
}

impl ObjectRef {
    pub fn new(object_id: ObjectId, version: u64, digest: ObjectDigest) -> Self {
        Self {
            object_id,
            version,
            digest,
        }
    }
}
