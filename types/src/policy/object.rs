// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    capability::{CapState, UpgradeCap},
    digest::Digest,
    error::{UpgradeError, UpgradeResult},
    object_id::ObjectId,
    policy::{PolicyContext, PolicyRule, UpgradePredicate},
    ticket::{UpgradeReceipt, UpgradeTicket},
    upgrade_level::UpgradeLevel,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PolicyState {
    Idle,
    AuthorizedPending { sequence: u64, digest: Digest },
}

/// An [`UpgradeCap`] that can only be exercised when its [`PolicyRule`] agrees.
///
/// ```text
///            authorize_upgrade
///   Idle ─────────────────────────▶ AuthorizedPending
///    ▲                                    │
///    └──── commit_upgrade / discard ──────┘
/// ```
///
/// The wrapped capability is never handed back out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyObject {
    id: ObjectId,
    cap: UpgradeCap,
    rule: PolicyRule,
    state: PolicyState,
    next_sequence: u64,
}

impl PolicyObject {
    /// Takes ownership of `cap`. The capability must be fresh, and the rule's
    /// configuration must be valid.
    pub fn wrap_capability(id: ObjectId, cap: UpgradeCap, rule: PolicyRule) -> UpgradeResult<Self> {
        if !cap.is_fresh() {
            return Err(UpgradeError::InvalidCapability {
                cap: cap.id(),
                reason: format!("capability is {:?}, expected a fresh one", cap.state()),
            });
        }
        rule.check_config()?;

        debug!(policy = %id, cap = %cap.id(), rule = %rule, "Wrapping upgrade capability");
        Ok(Self {
            id,
            cap,
            rule,
            state: PolicyState::Idle,
            next_sequence: 0,
        })
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn cap(&self) -> &UpgradeCap {
        &self.cap
    }

    pub fn rule(&self) -> &PolicyRule {
        &self.rule
    }

    pub fn state(&self) -> &PolicyState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        self.state == PolicyState::Idle
    }

    /// The package currently governed, i.e. the latest committed version.
    pub fn package(&self) -> ObjectId {
        self.cap.package()
    }

    pub fn version(&self) -> u64 {
        self.cap.version()
    }

    /// Issues the single ticket for an upgrade to code hashing to `digest`.
    pub fn authorize_upgrade(
        &mut self,
        level: UpgradeLevel,
        digest: Digest,
        context: &PolicyContext,
    ) -> UpgradeResult<UpgradeTicket> {
        if !self.is_idle() {
            return Err(UpgradeError::AlreadyAuthorized { policy: self.id });
        }
        if self.cap.state() == CapState::Revoked {
            return Err(UpgradeError::InvalidCapability {
                cap: self.cap.id(),
                reason: "package was made immutable".to_string(),
            });
        }
        if !self.rule.validate(context) {
            return Err(UpgradeError::PolicyRejected {
                policy: self.id,
                rule: self.rule.to_string(),
            });
        }
        self.cap.authorize(self.id, level)?;

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.state = PolicyState::AuthorizedPending { sequence, digest };

        debug!(policy = %self.id, sequence, digest = %digest, "Upgrade authorized");
        Ok(UpgradeTicket::new(
            self.id,
            self.cap.id(),
            self.cap.package(),
            level,
            digest,
            sequence,
        ))
    }

    /// Closes the pending upgrade with its receipt.
    pub fn commit_upgrade(&mut self, receipt: UpgradeReceipt) -> UpgradeResult<()> {
        self.ensure_pending(receipt.policy(), receipt.cap(), receipt.sequence())?;
        self.cap.commit(self.id, receipt.package())?;
        self.state = PolicyState::Idle;

        debug!(
            policy = %self.id,
            package = %receipt.package(),
            version = self.cap.version(),
            "Upgrade committed"
        );
        Ok(())
    }

    /// Abandons the pending ticket without upgrading.
    pub fn discard_ticket(&mut self, ticket: UpgradeTicket) -> UpgradeResult<()> {
        self.ensure_pending(ticket.policy(), ticket.cap(), ticket.sequence())?;
        self.cap.abandon();
        self.state = PolicyState::Idle;
        Ok(())
    }

    /// Tightens the upgrade level of the wrapped capability.
    pub fn restrict(&mut self, level: UpgradeLevel) -> UpgradeResult<()> {
        self.cap.restrict(self.id, level)
    }

    /// Revokes the wrapped capability for good.
    pub fn make_immutable(&mut self) -> UpgradeResult<()> {
        self.cap.revoke(self.id)
    }

    fn ensure_pending(&self, policy: ObjectId, cap: ObjectId, sequence: u64) -> UpgradeResult<()> {
        let matches = match self.state {
            PolicyState::AuthorizedPending {
                sequence: pending, ..
            } => policy == self.id && cap == self.cap.id() && sequence == pending,
            PolicyState::Idle => false,
        };
        if !matches {
            return Err(UpgradeError::TicketMismatch { policy: self.id });
        }
        Ok(())
    }
}
