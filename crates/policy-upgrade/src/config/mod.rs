// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::common::types::{
    CliCommand, CliConfig, CliError, CliResult, CliTypedResult, KeystoreOptions, ProfileConfig,
    ProfileOptions,
};
use async_trait::async_trait;
use clap::Parser;
use policy_upgrade_sdk::keystore::Keystore;
use policy_upgrade_types::AccountAddress;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Tool for interacting with configuration of the CLI tool
///
/// Profiles hold the RPC endpoint, the keystore and the ids of deployed
/// packages and policies.
#[derive(Parser)]
pub enum ConfigTool {
    ShowProfiles(ShowProfiles),
    DeleteProfile(DeleteProfile),
    ShowKeys(ShowKeys),
}

impl ConfigTool {
    pub async fn execute(self) -> CliResult {
        match self {
            ConfigTool::ShowProfiles(tool) => tool.execute_serialized().await,
            ConfigTool::DeleteProfile(tool) => tool.execute_serialized_success().await,
            ConfigTool::ShowKeys(tool) => tool.execute_serialized().await,
        }
    }
}

/// Shows the current profiles available
#[derive(Parser, Debug)]
pub struct ShowProfiles {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
    /// Show every profile instead of only the selected one
    #[clap(long)]
    pub(crate) all: bool,
}

#[async_trait]
impl CliCommand<BTreeMap<String, ProfileConfig>> for ShowProfiles {
    fn command_name(&self) -> &'static str {
        "ShowProfiles"
    }

    async fn execute(self) -> CliTypedResult<BTreeMap<String, ProfileConfig>> {
        let config = CliConfig::load_from(&self.profile_options.config_dir()?)?;
        Ok(config
            .profiles
            .unwrap_or_default()
            .into_iter()
            .filter(|(key, _)| self.all || key == &self.profile_options.profile)
            .collect())
    }
}

/// Delete the selected profile
#[derive(Parser, Debug)]
pub struct DeleteProfile {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
}

#[async_trait]
impl CliCommand<()> for DeleteProfile {
    fn command_name(&self) -> &'static str {
        "DeleteProfile"
    }

    async fn execute(self) -> CliTypedResult<()> {
        let dir = self.profile_options.config_dir()?;
        let name = &self.profile_options.profile;
        let mut config = CliConfig::load_from(&dir)?;
        let removed = config
            .profiles
            .as_mut()
            .and_then(|profiles| profiles.remove(name));
        if removed.is_none() {
            return Err(CliError::CommandArgumentError(format!(
                "Profile {} does not exist",
                name
            )));
        }
        config.save_to(&dir)?;
        info!(profile = %name, "Deleted profile");
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct KeySummary {
    pub address: AccountAddress,
    pub public_key: String,
}

/// Lists the addresses the keystore can sign for
///
/// Only Ed25519 keys are listed; private keys are never shown.
#[derive(Parser, Debug)]
pub struct ShowKeys {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
    #[clap(flatten)]
    pub(crate) keystore_options: KeystoreOptions,
}

#[async_trait]
impl CliCommand<Vec<KeySummary>> for ShowKeys {
    fn command_name(&self) -> &'static str {
        "ShowKeys"
    }

    async fn execute(self) -> CliTypedResult<Vec<KeySummary>> {
        let profile = self.profile_options.profile()?;
        let keystore = Keystore::load(&self.keystore_options.keystore_path(&profile)?)?;
        keystore
            .addresses()
            .map(|address| -> CliTypedResult<KeySummary> {
                let keypair = keystore.keypair(address)?;
                Ok(KeySummary {
                    address: *address,
                    public_key: format!("0x{}", hex::encode(keypair.public_key_bytes())),
                })
            })
            .collect()
    }
}
