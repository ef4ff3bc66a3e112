// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Where signed transactions go: a remote node over JSON-RPC or the
//! in-memory [`LocalLedger`].
//!
//! Responses follow the JSON a full node returns from
//! `sui_executeTransactionBlock`; unknown fields are ignored.

mod local;
mod rpc;

pub use local::{LocalLedger, LOCAL_GAS_PRICE};
pub use rpc::RpcClient;

use crate::{
    crypto::SignedTransaction,
    digests::{ObjectDigest, ObjectRef, TransactionDigest},
    error::SdkError,
    serde_helpers::{lenient_u64, string_u64},
};
use async_trait::async_trait;
use policy_upgrade_types::{AccountAddress, ObjectId, UpgradeError};
use serde::{Deserialize, Serialize};

/// Which parts of the outcome the response should carry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseOptions {
    pub show_effects: bool,
    pub show_object_changes: bool,
}

impl ResponseOptions {
    pub fn full() -> Self {
        Self {
            show_effects: true,
            show_object_changes: true,
        }
    }
}

impl Default for ResponseOptions {
    fn default() -> Self {
        Self::full()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionStatus {
    #[default]
    Success,
    Failure {
        /// As the node prints it, e.g. `MoveAbort(..) in command 0`.
        error: String,
        /// The protocol error behind the failure, known only for local execution.
        #[serde(skip)]
        abort: Option<UpgradeError>,
    },
}

impl ExecutionStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionStatus::Success)
    }

    /// A failure, worded the way full nodes word it.
    pub fn failure(command: Option<u16>, error: UpgradeError) -> Self {
        let message = match command {
            Some(command) => format!("{} in command {}", error, command),
            None => error.to_string(),
        };
        ExecutionStatus::Failure {
            error: message,
            abort: Some(error),
        }
    }
}

/// Why a transaction did not take effect.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExecutionFailure {
    /// Index of the failing command; `None` when the inputs were refused.
    pub command: Option<u16>,
    pub error: String,
    pub abort: Option<UpgradeError>,
}

fn failed_command(error: &str) -> Option<u16> {
    let (_, index) = error.rsplit_once(" in command ")?;
    index.trim().parse().ok()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    AddressOwner(AccountAddress),
    ObjectOwner(AccountAddress),
    Shared {
        #[serde(with = "lenient_u64")]
        initial_shared_version: u64,
    },
    Immutable,
    ConsensusAddressOwner {
        #[serde(with = "lenient_u64")]
        start_version: u64,
        owner: AccountAddress,
    },
}

impl Owner {
    /// The owning account, if an account owns the object.
    pub fn address(&self) -> Option<AccountAddress> {
        match self {
            Owner::AddressOwner(address) => Some(*address),
            Owner::ConsensusAddressOwner { owner, .. } => Some(*owner),
            _ => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnedObjectRef {
    pub owner: Owner,
    pub reference: ObjectRef,
}

/// Gas charged, in MIST.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GasCostSummary {
    #[serde(with = "string_u64")]
    pub computation_cost: u64,
    #[serde(with = "string_u64")]
    pub storage_cost: u64,
    #[serde(with = "string_u64")]
    pub storage_rebate: u64,
    #[serde(default, with = "string_u64")]
    pub non_refundable_storage_fee: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionEffects {
    pub status: ExecutionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<GasCostSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transaction_digest: Option<TransactionDigest>,
    #[serde(default)]
    pub created: Vec<OwnedObjectRef>,
    #[serde(default)]
    pub mutated: Vec<OwnedObjectRef>,
    #[serde(default)]
    pub wrapped: Vec<ObjectRef>,
    #[serde(default)]
    pub deleted: Vec<ObjectRef>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ObjectChange {
    #[serde(rename_all = "camelCase")]
    Published {
        package_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
        digest: ObjectDigest,
        #[serde(default)]
        modules: Vec<String>,
    },
    #[serde(rename_all = "camelCase")]
    Transferred {
        sender: AccountAddress,
        recipient: Owner,
        object_type: String,
        object_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
        digest: ObjectDigest,
    },
    #[serde(rename_all = "camelCase")]
    Mutated {
        sender: AccountAddress,
        owner: Owner,
        object_type: String,
        object_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
        #[serde(with = "string_u64")]
        previous_version: u64,
        digest: ObjectDigest,
    },
    #[serde(rename_all = "camelCase")]
    Deleted {
        sender: AccountAddress,
        object_type: String,
        object_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
    },
    #[serde(rename_all = "camelCase")]
    Wrapped {
        sender: AccountAddress,
        object_type: String,
        object_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
    },
    #[serde(rename_all = "camelCase")]
    Created {
        sender: AccountAddress,
        owner: Owner,
        object_type: String,
        object_id: ObjectId,
        #[serde(with = "string_u64")]
        version: u64,
        digest: ObjectDigest,
    },
}

impl ObjectChange {
    pub fn object_id(&self) -> ObjectId {
        match self {
            ObjectChange::Published { package_id, .. } => *package_id,
            ObjectChange::Transferred { object_id, .. }
            | ObjectChange::Mutated { object_id, .. }
            | ObjectChange::Deleted { object_id, .. }
            | ObjectChange::Wrapped { object_id, .. }
            | ObjectChange::Created { object_id, .. } => *object_id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
    pub digest: TransactionDigest,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub effects: Option<TransactionEffects>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_changes: Option<Vec<ObjectChange>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_local_execution: Option<bool>,
}

impl TransactionResponse {
    /// The failure reported in the effects, if any.
    pub fn failure(&self) -> Option<ExecutionFailure> {
        match self.effects.as_ref().map(|effects| &effects.status) {
            Some(ExecutionStatus::Failure { error, abort }) => Some(ExecutionFailure {
                command: failed_command(error),
                error: error.clone(),
                abort: abort.clone(),
            }),
            _ => None,
        }
    }

    /// Id of the package published by this transaction.
    pub fn published_package(&self) -> Option<ObjectId> {
        self.object_changes.iter().flatten().find_map(|change| match change {
            ObjectChange::Published { package_id, .. } => Some(*package_id),
            _ => None,
        })
    }

    /// Ids of created objects whose type satisfies `is_type`.
    pub fn created_of_type(&self, is_type: impl Fn(&str) -> bool) -> Vec<ObjectId> {
        self.object_changes
            .iter()
            .flatten()
            .filter_map(|change| match change {
                ObjectChange::Created {
                    object_id,
                    object_type,
                    ..
                } if is_type(object_type) => Some(*object_id),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
pub trait ExecutionLayer: Send + Sync {
    /// Submits one signed transaction. A transaction that executed and
    /// aborted is still `Ok`; its effects carry the failure.
    async fn execute_transaction(
        &self,
        transaction: SignedTransaction,
        options: ResponseOptions,
    ) -> Result<TransactionResponse, SdkError>;

    /// Latest version of an object, to pass it as an owned input.
    async fn object_ref(&self, id: ObjectId) -> Result<ObjectRef, SdkError>;

    /// Gas price, in MIST per unit, that the network currently charges.
    async fn reference_gas_price(&self) -> Result<u64, SdkError>;

    /// Coins of `owner` that together cover `budget`.
    async fn select_gas(
        &self,
        owner: AccountAddress,
        budget: u64,
    ) -> Result<Vec<ObjectRef>, SdkError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_index_comes_from_the_error_text() {
        assert_eq!(
            failed_command("MoveAbort(MoveLocation { function: 1 }, 1) in command 0"),
            Some(0)
        );
        assert_eq!(failed_command("InsufficientGas"), None);
        assert_eq!(failed_command("in command twelve"), None);

        let status =
            ExecutionStatus::failure(Some(2), UpgradeError::ObjectNotFound(ObjectId::ZERO));
        let effects = TransactionEffects {
            status,
            ..Default::default()
        };
        let response = TransactionResponse {
            digest: TransactionDigest::default(),
            effects: Some(effects),
            object_changes: None,
            confirmed_local_execution: None,
        };
        let failure = response.failure().unwrap();
        assert_eq!(failure.command, Some(2));
        assert!(failure.error.ends_with(" in command 2"));
        assert_eq!(failure.abort, Some(UpgradeError::ObjectNotFound(ObjectId::ZERO)));
    }

    #[test]
    fn owners_in_node_json() {
        let owners: Vec<Owner> = serde_json::from_str(
            r#"[
                {"AddressOwner":"0x7"},
                {"ObjectOwner":"0x8"},
                {"Shared":{"initial_shared_version":5}},
                "Immutable"
            ]"#,
        )
        .unwrap();
        assert_eq!(
            owners[0].address(),
            Some(AccountAddress::from_hex_literal("0x7").unwrap())
        );
        assert_eq!(owners[1].address(), None);
        assert_eq!(owners[2], Owner::Shared {
            initial_shared_version: 5
        });
        assert_eq!(owners[3], Owner::Immutable);
    }
}
