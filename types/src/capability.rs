// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! The capability to upgrade one deployed package.

use crate::{
    error::{UpgradeError, UpgradeResult},
    object_id::ObjectId,
    upgrade_level::UpgradeLevel,
};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapState {
    /// No upgrade in flight.
    Idle,
    /// An upgrade was authorized and its receipt has not been committed yet.
    Authorized,
    /// The package was made immutable; the capability can never be used again.
    Revoked,
}

/// Exclusive right to replace the code of `package`.
///
/// Created once at publish time. Every committed upgrade moves `package` to the
/// id of the new version and bumps `version`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeCap {
    id: ObjectId,
    package: ObjectId,
    version: u64,
    policy: UpgradeLevel,
    state: CapState,
}

impl UpgradeCap {
    pub fn new(id: ObjectId, package: ObjectId) -> Self {
        Self {
            id,
            package,
            version: 1,
            policy: UpgradeLevel::Compatible,
            state: CapState::Idle,
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn package(&self) -> ObjectId {
        self.package
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn policy(&self) -> UpgradeLevel {
        self.policy
    }

    pub fn state(&self) -> CapState {
        self.state
    }

    /// Fresh means nothing is in flight and the capability was never revoked.
    pub fn is_fresh(&self) -> bool {
        self.state == CapState::Idle
    }

    fn ensure_usable(&self) -> UpgradeResult<()> {
        if self.state == CapState::Revoked {
            return Err(self.invalid("package was made immutable"));
        }
        Ok(())
    }

    fn invalid(&self, reason: &str) -> UpgradeError {
        UpgradeError::InvalidCapability {
            cap: self.id,
            reason: reason.to_string(),
        }
    }

    /// Marks an upgrade at `level` as in flight.
    ///
    /// `policy` identifies the wrapper for error reporting.
    pub fn authorize(&mut self, policy: ObjectId, level: UpgradeLevel) -> UpgradeResult<()> {
        self.ensure_usable()?;
        if self.state == CapState::Authorized {
            return Err(UpgradeError::AlreadyAuthorized { policy });
        }
        if !level.satisfies(self.policy) {
            return Err(UpgradeError::TooPermissive {
                requested: level,
                current: self.policy,
            });
        }
        self.state = CapState::Authorized;
        Ok(())
    }

    /// Finishes the in-flight upgrade, pointing the capability at `new_package`.
    pub fn commit(&mut self, policy: ObjectId, new_package: ObjectId) -> UpgradeResult<()> {
        self.ensure_usable()?;
        if self.state != CapState::Authorized {
            return Err(UpgradeError::TicketMismatch { policy });
        }
        self.package = new_package;
        self.version += 1;
        self.state = CapState::Idle;
        Ok(())
    }

    /// Drops the in-flight upgrade without touching the package.
    pub fn abandon(&mut self) {
        if self.state == CapState::Authorized {
            self.state = CapState::Idle;
        }
    }

    /// Tightens the policy. Loosening is never allowed.
    pub fn restrict(&mut self, policy: ObjectId, level: UpgradeLevel) -> UpgradeResult<()> {
        self.ensure_usable()?;
        if self.state == CapState::Authorized {
            return Err(UpgradeError::AlreadyAuthorized { policy });
        }
        if !level.satisfies(self.policy) {
            return Err(UpgradeError::TooPermissive {
                requested: level,
                current: self.policy,
            });
        }
        self.policy = level;
        Ok(())
    }

    pub fn revoke(&mut self, policy: ObjectId) -> UpgradeResult<()> {
        self.ensure_usable()?;
        if self.state == CapState::Authorized {
            return Err(UpgradeError::AlreadyAuthorized { policy });
        }
        self.state = CapState::Revoked;
        Ok(())
    }
}
