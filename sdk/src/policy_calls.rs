// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Call encoding for the entry points of a deployed policy module.
//!
//! A policy package hosts one module per rule kind (`day_of_week`,
//! `time_window`, `multi_signer`). Each module exposes the same entry points;
//! only the configuration arguments of `new_policy` differ.

use crate::{
    error::SdkError,
    transaction_builder::{Argument, MoveCallTarget, ProgrammableTransactionBuilder},
};
use policy_upgrade_types::{
    policy::{DayOfWeek, MultiSigner, TimeWindow},
    AccountAddress, Digest, ObjectId, PolicyRule, UpgradeError, UpgradeLevel, UpgradePredicate,
    UpgradeResult,
};
use serde::de::DeserializeOwned;

pub const NEW_POLICY: &str = "new_policy";
pub const AUTHORIZE_UPGRADE: &str = "authorize_upgrade";
pub const COMMIT_UPGRADE: &str = "commit_upgrade";
pub const DISCARD_TICKET: &str = "discard_ticket";
pub const RESTRICT: &str = "restrict";
pub const MAKE_IMMUTABLE: &str = "make_immutable";

/// Modules every policy package hosts, one per rule kind.
pub const POLICY_MODULES: [&str; 3] = ["day_of_week", "time_window", "multi_signer"];

/// Name of the struct a policy module stores its policy objects as. Each
/// module wraps the framework's `UpgradeCap` in its own `UpgradeCap`.
pub const POLICY_STRUCT: &str = "UpgradeCap";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PolicyModule {
    package: ObjectId,
    module: String,
}

impl PolicyModule {
    pub fn new(package: ObjectId, module: &str) -> Self {
        Self {
            package,
            module: module.to_string(),
        }
    }

    /// The module implementing `rule` inside `package`.
    pub fn for_rule(package: ObjectId, rule: &PolicyRule) -> Self {
        Self::new(package, rule.name())
    }

    pub fn package(&self) -> ObjectId {
        self.package
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    /// Fully qualified type of the policy objects this module creates.
    pub fn policy_type(&self) -> String {
        format!("{}::{}::{}", self.package, self.module, POLICY_STRUCT)
    }

    /// Whether a node-printed object type names this module's policy struct.
    /// The package address may be printed in short or full form.
    pub fn is_policy_type(&self, object_type: &str) -> bool {
        let mut parts = object_type.splitn(3, "::");
        match (parts.next(), parts.next(), parts.next()) {
            (Some(package), Some(module), Some(name)) => {
                module == self.module
                    && name == POLICY_STRUCT
                    && ObjectId::from_hex_literal(package).is_ok_and(|id| id == self.package)
            },
            _ => false,
        }
    }

    pub fn target(&self, function: &str) -> MoveCallTarget {
        MoveCallTarget::new(self.package, &self.module, function)
    }

    /// Wraps `cap` into a new policy object configured with `rule`.
    pub fn new_policy(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        cap: Argument,
        rule: &PolicyRule,
    ) -> Result<Argument, SdkError> {
        if rule.name() != self.module {
            return Err(SdkError::InvalidTransaction(format!(
                "Rule {} cannot be created by policy module {}",
                rule, self.module
            )));
        }
        let mut arguments = vec![cap];
        match rule {
            PolicyRule::DayOfWeek(rule) => {
                arguments.push(builder.pure(&rule.day())?);
            },
            PolicyRule::TimeWindow(rule) => {
                arguments.push(builder.pure(&rule.start_ms())?);
                arguments.push(builder.pure(&rule.end_ms())?);
            },
            PolicyRule::MultiSigner(rule) => {
                let approvers: Vec<AccountAddress> = rule.approvers().iter().copied().collect();
                arguments.push(builder.pure(&approvers)?);
                arguments.push(builder.pure(&rule.threshold())?);
            },
        }
        builder.move_call(self.target(NEW_POLICY), arguments)
    }

    /// Returns the upgrade ticket.
    pub fn authorize_upgrade(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        policy: Argument,
        level: UpgradeLevel,
        digest: &Digest,
    ) -> Result<Argument, SdkError> {
        let level = builder.pure(&level.as_u8())?;
        let digest = builder.pure(&digest.to_vec())?;
        builder.move_call(self.target(AUTHORIZE_UPGRADE), vec![policy, level, digest])
    }

    pub fn commit_upgrade(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        policy: Argument,
        receipt: Argument,
    ) -> Result<Argument, SdkError> {
        builder.move_call(self.target(COMMIT_UPGRADE), vec![policy, receipt])
    }

    pub fn discard_ticket(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        policy: Argument,
        ticket: Argument,
    ) -> Result<Argument, SdkError> {
        builder.move_call(self.target(DISCARD_TICKET), vec![policy, ticket])
    }

    pub fn restrict(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        policy: Argument,
        level: UpgradeLevel,
    ) -> Result<Argument, SdkError> {
        let level = builder.pure(&level.as_u8())?;
        builder.move_call(self.target(RESTRICT), vec![policy, level])
    }

    pub fn make_immutable(
        &self,
        builder: &mut ProgrammableTransactionBuilder,
        policy: Argument,
    ) -> Result<Argument, SdkError> {
        builder.move_call(self.target(MAKE_IMMUTABLE), vec![policy])
    }
}

/// Decodes one pure argument.
pub fn decode_pure<T: DeserializeOwned>(bytes: &[u8], what: &str) -> UpgradeResult<T> {
    bcs::from_bytes(bytes)
        .map_err(|err| UpgradeError::InvalidArgument(format!("cannot decode {}: {}", what, err)))
}

/// Rebuilds the rule that `new_policy` of `module` was called with.
pub fn decode_rule(module: &str, config: &[&[u8]]) -> UpgradeResult<PolicyRule> {
    let expect_args = |count: usize| {
        if config.len() != count {
            return Err(UpgradeError::InvalidArgument(format!(
                "{}::{} takes {} configuration arguments, got {}",
                module,
                NEW_POLICY,
                count,
                config.len()
            )));
        }
        Ok(())
    };
    let rule: PolicyRule = match module {
        "day_of_week" => {
            expect_args(1)?;
            DayOfWeek::new(decode_pure(config[0], "weekday")?).into()
        },
        "time_window" => {
            expect_args(2)?;
            TimeWindow::new(
                decode_pure(config[0], "window start")?,
                decode_pure(config[1], "window end")?,
            )
            .into()
        },
        "multi_signer" => {
            expect_args(2)?;
            let approvers: Vec<AccountAddress> = decode_pure(config[0], "approvers")?;
            MultiSigner::new(approvers, decode_pure(config[1], "threshold")?).into()
        },
        _ => {
            return Err(UpgradeError::UnknownFunction(format!(
                "{}::{}",
                module, NEW_POLICY
            )))
        },
    };
    Ok(rule)
}
