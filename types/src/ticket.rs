// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Single use proofs threaded through one upgrade.
//!
//! Neither type implements `Clone`: a ticket is moved into
//! [`UpgradeTicket::redeem`], and the resulting receipt is moved into the
//! policy's commit. Holding one therefore means holding the only copy.

use crate::{
    digest::Digest,
    error::{UpgradeError, UpgradeResult},
    object_id::ObjectId,
    upgrade_level::UpgradeLevel,
};
use serde::Serialize;

/// Permission to replace `package` with code hashing to `digest`.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeTicket {
    policy: ObjectId,
    cap: ObjectId,
    package: ObjectId,
    level: UpgradeLevel,
    digest: Digest,
    sequence: u64,
}

impl UpgradeTicket {
    pub(crate) fn new(
        policy: ObjectId,
        cap: ObjectId,
        package: ObjectId,
        level: UpgradeLevel,
        digest: Digest,
        sequence: u64,
    ) -> Self {
        Self {
            policy,
            cap,
            package,
            level,
            digest,
            sequence,
        }
    }

    pub fn policy(&self) -> ObjectId {
        self.policy
    }

    pub fn cap(&self) -> ObjectId {
        self.cap
    }

    pub fn package(&self) -> ObjectId {
        self.package
    }

    pub fn level(&self) -> UpgradeLevel {
        self.level
    }

    pub fn digest(&self) -> Digest {
        self.digest
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Consumes the ticket for the replacement of `package` by code hashing
    /// to `computed_digest`, now living at `new_package`.
    ///
    /// The ticket is gone whether or not this succeeds.
    pub fn redeem(
        self,
        package: ObjectId,
        computed_digest: Digest,
        new_package: ObjectId,
    ) -> UpgradeResult<UpgradeReceipt> {
        if package != self.package {
            return Err(UpgradeError::PackageMismatch {
                expected: self.package,
                actual: package,
            });
        }
        if computed_digest != self.digest {
            return Err(UpgradeError::DigestMismatch {
                expected: self.digest,
                actual: computed_digest,
            });
        }
        Ok(UpgradeReceipt {
            policy: self.policy,
            cap: self.cap,
            sequence: self.sequence,
            package: new_package,
        })
    }
}

/// Proof that the upgrade authorized by one ticket happened.
#[derive(Debug, PartialEq, Eq, Serialize)]
pub struct UpgradeReceipt {
    policy: ObjectId,
    cap: ObjectId,
    sequence: u64,
    package: ObjectId,
}

impl UpgradeReceipt {
    pub fn policy(&self) -> ObjectId {
        self.policy
    }

    pub fn cap(&self) -> ObjectId {
        self.cap
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Id of the freshly written package version.
    pub fn package(&self) -> ObjectId {
        self.package
    }
}
