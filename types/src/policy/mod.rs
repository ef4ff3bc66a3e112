// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Custom upgrade policies.
//!
//! A policy object wraps an [`UpgradeCap`](crate::capability::UpgradeCap) and
//! only lets it authorize an upgrade when its [`PolicyRule`] accepts the
//! current [`PolicyContext`]. Rules are pluggable: the ticket and receipt
//! machinery in [`object`] never looks inside them.

mod day_of_week;
mod multi_signer;
pub mod object;
mod time_window;

pub use day_of_week::{week_day, DayOfWeek, Weekday};
pub use multi_signer::MultiSigner;
pub use object::{PolicyObject, PolicyState};
pub use time_window::TimeWindow;

use crate::{error::UpgradeResult, object_id::AccountAddress};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// What a policy can observe while evaluating an authorization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PolicyContext {
    /// Chain clock, in milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Accounts that signed the enclosing transaction.
    pub signers: BTreeSet<AccountAddress>,
}

impl PolicyContext {
    pub fn new(timestamp_ms: u64) -> Self {
        Self {
            timestamp_ms,
            signers: BTreeSet::new(),
        }
    }

    pub fn with_signers(mut self, signers: impl IntoIterator<Item = AccountAddress>) -> Self {
        self.signers.extend(signers);
        self
    }
}

/// A predicate deciding whether an upgrade may be authorized right now.
pub trait UpgradePredicate {
    /// Short name used in rejection errors and logs.
    fn name(&self) -> &'static str;

    /// Checks the configuration once, when the policy is created.
    fn check_config(&self) -> UpgradeResult<()>;

    fn validate(&self, context: &PolicyContext) -> bool;
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyRule {
    DayOfWeek(DayOfWeek),
    TimeWindow(TimeWindow),
    MultiSigner(MultiSigner),
}

impl PolicyRule {
    fn inner(&self) -> &dyn UpgradePredicate {
        match self {
            PolicyRule::DayOfWeek(rule) => rule,
            PolicyRule::TimeWindow(rule) => rule,
            PolicyRule::MultiSigner(rule) => rule,
        }
    }
}

impl UpgradePredicate for PolicyRule {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn check_config(&self) -> UpgradeResult<()> {
        self.inner().check_config()
    }

    fn validate(&self, context: &PolicyContext) -> bool {
        self.inner().validate(context)
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicyRule::DayOfWeek(rule) => write!(f, "{} ({})", self.name(), rule.day()),
            PolicyRule::TimeWindow(rule) => write!(
                f,
                "{} [{}, {})",
                self.name(),
                rule.start_ms(),
                rule.end_ms()
            ),
            PolicyRule::MultiSigner(rule) => write!(
                f,
                "{} ({} of {})",
                self.name(),
                rule.threshold(),
                rule.approvers().len()
            ),
        }
    }
}

impl From<DayOfWeek> for PolicyRule {
    fn from(rule: DayOfWeek) -> Self {
        PolicyRule::DayOfWeek(rule)
    }
}

impl From<TimeWindow> for PolicyRule {
    fn from(rule: TimeWindow) -> Self {
        PolicyRule::TimeWindow(rule)
    }
}

impl From<MultiSigner> for PolicyRule {
    fn from(rule: MultiSigner) -> Self {
        PolicyRule::MultiSigner(rule)
    }
}
