// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{digest::Digest, object_id::ObjectId, upgrade_level::UpgradeLevel};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failures of the upgrade authorization protocol.
///
/// These travel inside transaction effects, so they are serializable and
/// carry ids rather than references.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "details", rename_all = "snake_case")]
pub enum UpgradeError {
    #[error("Upgrade rejected by {rule} policy of {policy}")]
    PolicyRejected { policy: ObjectId, rule: String },
    #[error("Upgrade capability {cap} is not usable: {reason}")]
    InvalidCapability { cap: ObjectId, reason: String },
    #[error("Policy {policy} already has an outstanding upgrade ticket")]
    AlreadyAuthorized { policy: ObjectId },
    #[error("Receipt or ticket does not belong to the pending upgrade of policy {policy}")]
    TicketMismatch { policy: ObjectId },
    #[error("Package digest mismatch: ticket authorized {expected}, modules hash to {actual}")]
    DigestMismatch { expected: Digest, actual: Digest },
    #[error("Ticket is for package {expected}, upgrade targets {actual}")]
    PackageMismatch { expected: ObjectId, actual: ObjectId },
    #[error("Upgrade level {requested} is less restrictive than the capability's {current}")]
    TooPermissive {
        requested: UpgradeLevel,
        current: UpgradeLevel,
    },
    #[error("Invalid policy configuration: {0}")]
    InvalidPolicyConfig(String),
    #[error("Invalid upgrade level {0}, must be one of [0, 128, 192]")]
    InvalidUpgradeLevel(u8),
    #[error("Malformed package: {0}")]
    MalformedPackage(String),
    #[error("Object {0} does not exist")]
    ObjectNotFound(ObjectId),
    #[error("Object {id} is at version {current}, the transaction passed version {given}")]
    StaleObject { id: ObjectId, given: u64, current: u64 },
    #[error("Object {0} is not owned by the transaction sender")]
    ObjectNotOwned(ObjectId),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Unknown function {0}")]
    UnknownFunction(String),
    #[error("Value produced by command {command} was never consumed: {value}")]
    UnusedValue { command: u16, value: String },
}

pub type UpgradeResult<T> = Result<T, UpgradeError>;
