// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Core types of policy gated package upgrades: identifiers, digests, the
//! upgrade capability, tickets and receipts, and the policy object state
//! machine.

#![forbid(unsafe_code)]

pub mod capability;
pub mod digest;
pub mod error;
pub mod object_id;
pub mod policy;
pub mod ticket;
pub mod upgrade_level;

pub use capability::UpgradeCap;
pub use digest::Digest;
pub use error::{UpgradeError, UpgradeResult};
pub use object_id::{AccountAddress, ObjectId};
pub use policy::{PolicyContext, PolicyObject, PolicyRule, PolicyState, UpgradePredicate};
pub use ticket::{UpgradeReceipt, UpgradeTicket};
pub use upgrade_level::UpgradeLevel;

#[cfg(test)]
mod unit_tests;
