// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use policy_upgrade_types::{AccountAddress, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("No key in the keystore for address {address}")]
    KeyNotFound { address: AccountAddress },
    #[error("Invalid keystore: {0}")]
    InvalidKeystore(String),
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),
    #[error("Object {id} not found: {reason}")]
    ObjectNotFound { id: ObjectId, reason: String },
    #[error("Gas coins of {owner} hold {available} MIST, the budget is {budget}")]
    InsufficientGas {
        owner: AccountAddress,
        available: u64,
        budget: u64,
    },
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl From<bcs::Error> for SdkError {
    fn from(e: bcs::Error) -> Self {
        SdkError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for SdkError {
    fn from(e: serde_json::Error) -> Self {
        SdkError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for SdkError {
    fn from(e: url::ParseError) -> Self {
        SdkError::Serialization(e.to_string())
    }
}
