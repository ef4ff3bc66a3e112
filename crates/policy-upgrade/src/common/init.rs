// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::common::types::{
    ChainCliOptions, CliCommand, CliTypedResult, GasOptions, KeystoreOptions, PolicyPackageOptions,
    PolicyRuleOptions, ProfileConfig, ProfileOptions, RpcOptions,
};
use async_trait::async_trait;
use clap::Parser;
use tracing::info;

/// Tool to initialize a profile for the CLI
///
/// Flags that are not given keep the profile's current value, or fall back to
/// the defaults (devnet, the chain CLI's keystore, a Saturday-only policy).
/// Deployed package and policy ids are left alone.
#[derive(Debug, Parser)]
pub struct InitTool {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
    #[clap(flatten)]
    pub(crate) rpc_options: RpcOptions,
    #[clap(flatten)]
    pub(crate) keystore_options: KeystoreOptions,
    #[clap(flatten)]
    pub(crate) chain_cli_options: ChainCliOptions,
    #[clap(flatten)]
    pub(crate) policy_package_options: PolicyPackageOptions,
    #[clap(flatten)]
    pub(crate) rule_options: PolicyRuleOptions,
    #[clap(flatten)]
    pub(crate) gas_options: GasOptions,
}

impl InitTool {
    pub fn init_profile(&self, existing: ProfileConfig) -> CliTypedResult<ProfileConfig> {
        Ok(ProfileConfig {
            rpc_url: Some(self.rpc_options.url(&existing)?),
            keystore_path: Some(self.keystore_options.keystore_path(&existing)?),
            active_address: self.keystore_options.sender.or(existing.active_address),
            chain_cli: Some(self.chain_cli_options.chain_cli(&existing)),
            policy_package_id: Some(self.policy_package_options.policy_package(&existing)?),
            policy_rule: Some(self.rule_options.rule(&existing)?),
            package_id: existing.package_id,
            policy_object_id: existing.policy_object_id,
            gas_budget: Some(self.gas_options.gas_budget(&existing)),
            gas_price: self.gas_options.gas_price.or(existing.gas_price),
        })
    }
}

#[async_trait]
impl CliCommand<ProfileConfig> for InitTool {
    fn command_name(&self) -> &'static str {
        "Init"
    }

    async fn execute(self) -> CliTypedResult<ProfileConfig> {
        let existing = self.profile_options.profile()?;
        let profile = self.init_profile(existing)?;
        self.profile_options.save_profile(profile.clone())?;
        info!(profile = %self.profile_options.profile, "Profile saved");
        Ok(profile)
    }
}
