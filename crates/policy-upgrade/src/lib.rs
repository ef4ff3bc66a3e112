// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Publishes Move packages behind a custom upgrade policy and upgrades them
//! through it

#![forbid(unsafe_code)]

pub mod common;
pub mod config;
pub mod move_tool;
pub mod policy_tool;
#[cfg(test)]
mod test;

use crate::common::types::{CliCommand, CliResult};
use clap::Parser;

/// Command Line Interface (CLI) for policy gated package upgrades
#[derive(Parser)]
#[clap(name = "policy-upgrade", author, version, propagate_version = true)]
pub enum Tool {
    /// Build a Move package and show its digest
    Build(move_tool::BuildPackage),
    #[clap(subcommand)]
    Config(config::ConfigTool),
    /// Create or update a profile
    Init(common::init::InitTool),
    /// Publish a package and wrap its upgrade capability in a policy
    Publish(policy_tool::PublishPackage),
    /// Upgrade a package through its policy
    Upgrade(policy_tool::UpgradePackage),
}

impl Tool {
    pub async fn execute(self) -> CliResult {
        use Tool::*;
        match self {
            Build(tool) => tool.execute_serialized().await,
            Config(tool) => tool.execute().await,
            Init(tool) => tool.execute_serialized().await,
            Publish(tool) => tool.execute_serialized().await,
            Upgrade(tool) => tool.execute_serialized().await,
        }
    }
}
