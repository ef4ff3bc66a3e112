// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    error::{UpgradeError, UpgradeResult},
    object_id::AccountAddress,
    policy::{PolicyContext, UpgradePredicate},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Permits upgrades signed by at least `threshold` of the `approvers`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiSigner {
    approvers: BTreeSet<AccountAddress>,
    threshold: u64,
}

impl MultiSigner {
    pub fn new(approvers: impl IntoIterator<Item = AccountAddress>, threshold: u64) -> Self {
        Self {
            approvers: approvers.into_iter().collect(),
            threshold,
        }
    }

    pub fn approvers(&self) -> &BTreeSet<AccountAddress> {
        &self.approvers
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }
}

impl UpgradePredicate for MultiSigner {
    fn name(&self) -> &'static str {
        "multi_signer"
    }

    fn check_config(&self) -> UpgradeResult<()> {
        if self.threshold == 0 || self.threshold > self.approvers.len() as u64 {
            return Err(UpgradeError::InvalidPolicyConfig(format!(
                "threshold {} must be between 1 and the {} approvers",
                self.threshold,
                self.approvers.len()
            )));
        }
        Ok(())
    }

    fn validate(&self, context: &PolicyContext) -> bool {
        let approvals = self.approvers.intersection(&context.signers).count() as u64;
        approvals >= self.threshold
    }
}
