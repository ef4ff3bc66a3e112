// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::error::UpgradeError;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// How far an upgrade may diverge from the code it replaces.
///
/// Levels are ordered by restrictiveness: a capability restricted to
/// `Additive` can never authorize a `Compatible` upgrade again.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UpgradeLevel {
    /// Any upgrade that keeps public signatures and struct layouts.
    #[default]
    Compatible,
    /// Only new functions, structs and modules may be added.
    Additive,
    /// Only dependencies may change, module bytes stay the same.
    DepOnly,
}

impl UpgradeLevel {
    pub const fn as_u8(self) -> u8 {
        match self {
            UpgradeLevel::Compatible => 0,
            UpgradeLevel::Additive => 128,
            UpgradeLevel::DepOnly => 192,
        }
    }

    /// Whether an upgrade at `self` is allowed under a capability at `floor`.
    pub fn satisfies(self, floor: UpgradeLevel) -> bool {
        self >= floor
    }
}

impl TryFrom<u8> for UpgradeLevel {
    type Error = UpgradeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(UpgradeLevel::Compatible),
            128 => Ok(UpgradeLevel::Additive),
            192 => Ok(UpgradeLevel::DepOnly),
            other => Err(UpgradeError::InvalidUpgradeLevel(other)),
        }
    }
}

impl fmt::Display for UpgradeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let str = match self {
            UpgradeLevel::Compatible => "compatible",
            UpgradeLevel::Additive => "additive",
            UpgradeLevel::DepOnly => "dep_only",
        };
        write!(f, "{}", str)
    }
}

impl FromStr for UpgradeLevel {
    type Err = UpgradeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "compatible" => Ok(UpgradeLevel::Compatible),
            "additive" => Ok(UpgradeLevel::Additive),
            "dep_only" | "dep-only" => Ok(UpgradeLevel::DepOnly),
            other => other
                .parse::<u8>()
                .map_err(|_| UpgradeError::InvalidArgument(format!("Unknown upgrade level '{}'", s)))
                .and_then(UpgradeLevel::try_from),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_round_trip_through_u8() {
        for level in [
            UpgradeLevel::Compatible,
            UpgradeLevel::Additive,
            UpgradeLevel::DepOnly,
        ] {
            assert_eq!(UpgradeLevel::try_from(level.as_u8()).unwrap(), level);
        }
        assert_eq!(
            UpgradeLevel::try_from(7),
            Err(UpgradeError::InvalidUpgradeLevel(7))
        );
    }

    #[test]
    fn restrictiveness_order() {
        assert!(UpgradeLevel::DepOnly.satisfies(UpgradeLevel::Compatible));
        assert!(UpgradeLevel::Additive.satisfies(UpgradeLevel::Additive));
        assert!(!UpgradeLevel::Compatible.satisfies(UpgradeLevel::Additive));
    }

    #[test]
    fn parses_names_and_numbers() {
        assert_eq!("dep-only".parse::<UpgradeLevel>().unwrap(), UpgradeLevel::DepOnly);
        assert_eq!("128".parse::<UpgradeLevel>().unwrap(), UpgradeLevel::Additive);
        assert!("strict".parse::<UpgradeLevel>().is_err());
    }
}
