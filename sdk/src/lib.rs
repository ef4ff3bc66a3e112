// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Building, signing and executing the transactions that publish a package
//! under a custom upgrade policy and later upgrade it through that policy.

#![forbid(unsafe_code)]

pub mod crypto;
pub mod digests;
pub mod error;
pub mod execution;
pub mod keystore;
pub mod policy_calls;
pub mod serde_helpers;
pub mod transaction_builder;

pub use error::SdkError;

/// Re-export of the protocol types, so SDK users need a single dependency.
pub use policy_upgrade_types as types;
