// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use serde::{de::Error as _, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("Unable to parse identifier {input:?}: {reason}")]
pub struct IdParseError {
    input: String,
    reason: &'static str,
}

impl IdParseError {
    fn new(input: &str, reason: &'static str) -> Self {
        Self {
            input: input.to_string(),
            reason,
        }
    }
}

/// Parses `0x`-prefixed or bare hex into 32 bytes, left padding short literals.
fn parse_hex_id(literal: &str) -> Result<[u8; 32], IdParseError> {
    let hex_str = literal.strip_prefix("0x").unwrap_or(literal);
    if hex_str.is_empty() {
        return Err(IdParseError::new(literal, "empty hex literal"));
    }
    if hex_str.len() > 64 {
        return Err(IdParseError::new(literal, "longer than 32 bytes"));
    }

    let padded = format!("{:0>64}", hex_str);
    let mut bytes = [0u8; 32];
    hex::decode_to_slice(padded, &mut bytes)
        .map_err(|_| IdParseError::new(literal, "invalid hex character"))?;
    Ok(bytes)
}

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name([u8; Self::LENGTH]);

        impl $name {
            pub const LENGTH: usize = 32;
            pub const ZERO: Self = Self([0u8; Self::LENGTH]);

            pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
                Self(bytes)
            }

            pub fn from_bytes(bytes: &[u8]) -> Result<Self, IdParseError> {
                let bytes: [u8; Self::LENGTH] = bytes
                    .try_into()
                    .map_err(|_| IdParseError::new(&hex::encode(bytes), "must be 32 bytes"))?;
                Ok(Self(bytes))
            }

            pub fn from_hex_literal(literal: &str) -> Result<Self, IdParseError> {
                parse_hex_id(literal).map(Self)
            }

            pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
                &self.0
            }

            pub fn into_bytes(self) -> [u8; Self::LENGTH] {
                self.0
            }

            pub fn to_hex_literal(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.to_hex_literal())
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.to_hex_literal())
            }
        }

        impl FromStr for $name {
            type Err = IdParseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::from_hex_literal(s.trim())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                if serializer.is_human_readable() {
                    self.to_hex_literal().serialize(serializer)
                } else {
                    // Fixed-size array, so BCS writes exactly 32 bytes with no length prefix.
                    self.0.serialize(serializer)
                }
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                if deserializer.is_human_readable() {
                    let literal = <String>::deserialize(deserializer)?;
                    Self::from_hex_literal(&literal).map_err(D::Error::custom)
                } else {
                    <[u8; 32]>::deserialize(deserializer).map(Self)
                }
            }
        }
    };
}

define_id!(
    /// Identifier of an on-chain object: a package, an `UpgradeCap` or a policy object.
    ObjectId
);

define_id!(
    /// Address of an account, derived from its public key.
    AccountAddress
);
