// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Publishing a package behind an upgrade policy, and upgrading it through
//! that policy.
//!
//! Both flows build one programmable transaction, pay for it with the
//! sender's gas coins, sign it with the sender's key from the keystore,
//! submit it, and print the node's response. A transaction the chain
//! rejected is reported as an error.

use crate::{
    common::{
        types::{
            ChainCliOptions, CliCommand, CliError, CliTypedResult, GasConfig, GasOptions,
            KeystoreOptions, MovePackageDir, PolicyPackageOptions, PolicyRuleOptions,
            ProfileConfig, ProfileOptions, RpcOptions,
        },
        utils::chain_cli_active_address,
    },
    move_tool::{CompiledPackage, ExternalCompiler, PackageCompiler},
};
use async_trait::async_trait;
use clap::Parser;
use policy_upgrade_sdk::{
    crypto::SignedTransaction,
    digests::ObjectRef,
    execution::{ExecutionLayer, ResponseOptions, RpcClient, TransactionResponse},
    keystore::Keystore,
    policy_calls::{PolicyModule, POLICY_MODULES},
    transaction_builder::{
        ProgrammableTransaction, ProgrammableTransactionBuilder, TransactionData,
    },
};
use policy_upgrade_types::{
    AccountAddress, Digest, ObjectId, PolicyRule, UpgradeLevel, UpgradePredicate,
};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

/// Options shared by every command that submits a transaction
#[derive(Clone, Debug, Default, Parser)]
pub struct TransactionOptions {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
    #[clap(flatten)]
    pub(crate) rpc_options: RpcOptions,
    #[clap(flatten)]
    pub(crate) keystore_options: KeystoreOptions,
    #[clap(flatten)]
    pub(crate) chain_cli_options: ChainCliOptions,
    #[clap(flatten)]
    pub(crate) move_options: MovePackageDir,
    #[clap(flatten)]
    pub(crate) policy_package_options: PolicyPackageOptions,
    #[clap(flatten)]
    pub(crate) gas_options: GasOptions,
}

impl TransactionOptions {
    /// The flag, then the profile, then whatever the chain CLI is using
    pub fn sender(&self, profile: &ProfileConfig) -> CliTypedResult<AccountAddress> {
        if let Some(sender) = self.keystore_options.sender {
            Ok(sender)
        } else if let Some(sender) = profile.active_address {
            Ok(sender)
        } else {
            chain_cli_active_address(&self.chain_cli_options.chain_cli(profile))
        }
    }

    pub fn keystore(&self, profile: &ProfileConfig) -> CliTypedResult<Keystore> {
        let path = self.keystore_options.keystore_path(profile)?;
        Ok(Keystore::load(&path)?)
    }

    pub fn rpc_client(&self, profile: &ProfileConfig) -> CliTypedResult<RpcClient> {
        Ok(RpcClient::new(self.rpc_options.url(profile)?)?)
    }

    pub fn compiler(&self, profile: &ProfileConfig) -> ExternalCompiler {
        ExternalCompiler::new(self.chain_cli_options.chain_cli(profile))
    }
}

/// Publish, wrap the new `UpgradeCap` into a policy, hand the policy to the sender
///
/// A rule the policy module would refuse is reported before anything is built.
pub fn build_publish_transaction(
    sender: AccountAddress,
    module: &PolicyModule,
    rule: &PolicyRule,
    package: &CompiledPackage,
) -> CliTypedResult<ProgrammableTransaction> {
    rule.check_config()
        .map_err(|err| CliError::CommandArgumentError(err.to_string()))?;
    let mut builder = ProgrammableTransactionBuilder::new();
    let cap = builder.publish(package.modules.clone(), package.dependencies.clone())?;
    let policy = module.new_policy(&mut builder, cap, rule)?;
    builder.transfer_objects(vec![policy], sender)?;
    Ok(builder.finish())
}

/// Authorize, upgrade and commit, in that order, in one transaction
pub fn build_upgrade_transaction(
    module: &PolicyModule,
    policy: ObjectRef,
    package_id: ObjectId,
    level: UpgradeLevel,
    package: &CompiledPackage,
) -> CliTypedResult<ProgrammableTransaction> {
    let mut builder = ProgrammableTransactionBuilder::new();
    let policy = builder.object(policy)?;
    let ticket = module.authorize_upgrade(&mut builder, policy, level, &package.digest)?;
    let receipt = builder.upgrade(
        package.modules.clone(),
        package.dependencies.clone(),
        package_id,
        ticket,
    )?;
    module.commit_upgrade(&mut builder, policy, receipt)?;
    Ok(builder.finish())
}

/// Picks the gas price and the sender's coins to pay for `transaction`
pub async fn prepare_transaction(
    layer: &dyn ExecutionLayer,
    sender: AccountAddress,
    transaction: ProgrammableTransaction,
    gas: GasConfig,
) -> CliTypedResult<TransactionData> {
    let price = match gas.price {
        Some(price) => price,
        None => layer.reference_gas_price().await?,
    };
    let payment = layer.select_gas(sender, gas.budget).await?;
    debug!(
        %sender,
        coins = payment.len(),
        budget = gas.budget,
        price,
        "Selected gas payment"
    );
    Ok(TransactionData::new_programmable(
        sender,
        payment,
        transaction,
        gas.budget,
        price,
    ))
}

/// Signs with the sender and every co-signer, submits, and turns a rejected
/// transaction into [`CliError::TransactionFailed`]
pub async fn sign_and_execute(
    layer: &dyn ExecutionLayer,
    keystore: &Keystore,
    data: TransactionData,
    co_signers: &[AccountAddress],
) -> CliTypedResult<TransactionResponse> {
    let sender = keystore.keypair(&data.sender())?;
    let mut transaction = SignedTransaction::sign(data, sender)?;
    for co_signer in co_signers {
        transaction.add_signature(keystore.keypair(co_signer)?)?;
    }
    debug!(
        signatures = transaction.signatures.len(),
        "Submitting transaction"
    );

    let response = layer
        .execute_transaction(transaction, ResponseOptions::full())
        .await?;
    if let Some(failure) = response.failure() {
        let location = match failure.command {
            Some(command) => format!("command {}", command),
            None => "transaction inputs".to_string(),
        };
        return Err(CliError::TransactionFailed(format!(
            "{} aborted at {}: {}",
            response.digest, location, failure.error
        )));
    }
    info!(digest = %response.digest, "Transaction executed");
    Ok(response)
}

/// What a publish needs once the profile and flags are resolved
#[derive(Clone, Debug)]
pub struct PublishRequest {
    pub sender: AccountAddress,
    pub policy_package: ObjectId,
    pub rule: PolicyRule,
    pub co_signers: Vec<AccountAddress>,
    pub gas: GasConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublishSummary {
    pub package_id: ObjectId,
    pub policy_object_id: ObjectId,
    pub policy_type: String,
    pub rule: PolicyRule,
    pub transaction: TransactionResponse,
}

pub async fn publish_with_policy(
    layer: &dyn ExecutionLayer,
    compiler: &dyn PackageCompiler,
    keystore: &Keystore,
    package_dir: &Path,
    request: PublishRequest,
) -> CliTypedResult<PublishSummary> {
    let package = compiler.build(package_dir)?;
    let module = PolicyModule::for_rule(request.policy_package, &request.rule);
    let transaction = build_publish_transaction(request.sender, &module, &request.rule, &package)?;
    let data = prepare_transaction(layer, request.sender, transaction, request.gas).await?;
    let transaction = sign_and_execute(layer, keystore, data, &request.co_signers).await?;

    let package_id = transaction.published_package().ok_or_else(|| {
        CliError::UnexpectedError("Response does not list the published package".to_string())
    })?;
    let policies = transaction.created_of_type(|object_type| module.is_policy_type(object_type));
    let policy_object_id = match policies.as_slice() {
        [id] => *id,
        ids => {
            return Err(CliError::UnexpectedError(format!(
                "Expected one new policy object, response lists {}",
                ids.len()
            )))
        },
    };
    info!(%package_id, %policy_object_id, rule = %request.rule, "Published package behind policy");
    Ok(PublishSummary {
        package_id,
        policy_object_id,
        policy_type: module.policy_type(),
        rule: request.rule,
        transaction,
    })
}

/// What an upgrade needs once the profile and flags are resolved
#[derive(Clone, Debug)]
pub struct UpgradeRequest {
    pub sender: AccountAddress,
    pub policy_package: ObjectId,
    pub policy_module: String,
    pub policy_object_id: ObjectId,
    pub package_id: ObjectId,
    pub level: UpgradeLevel,
    pub co_signers: Vec<AccountAddress>,
    pub gas: GasConfig,
}

#[derive(Clone, Debug, Serialize)]
pub struct UpgradeSummary {
    pub previous_package_id: ObjectId,
    pub package_id: ObjectId,
    pub policy_object_id: ObjectId,
    pub digest: Digest,
    pub transaction: TransactionResponse,
}

pub async fn upgrade_through_policy(
    layer: &dyn ExecutionLayer,
    compiler: &dyn PackageCompiler,
    keystore: &Keystore,
    package_dir: &Path,
    request: UpgradeRequest,
) -> CliTypedResult<UpgradeSummary> {
    if !POLICY_MODULES.contains(&request.policy_module.as_str()) {
        return Err(CliError::CommandArgumentError(format!(
            "Unknown policy module '{}', expected one of {:?}",
            request.policy_module, POLICY_MODULES
        )));
    }
    let package = compiler.build(package_dir)?;
    let module = PolicyModule::new(request.policy_package, &request.policy_module);
    let policy = layer.object_ref(request.policy_object_id).await?;
    let transaction = build_upgrade_transaction(
        &module,
        policy,
        request.package_id,
        request.level,
        &package,
    )?;
    let data = prepare_transaction(layer, request.sender, transaction, request.gas).await?;
    let transaction = sign_and_execute(layer, keystore, data, &request.co_signers).await?;

    let package_id = transaction.published_package().ok_or_else(|| {
        CliError::UnexpectedError("Response does not list the upgraded package".to_string())
    })?;
    info!(
        previous = %request.package_id,
        %package_id,
        digest = %package.digest,
        "Upgraded package through policy"
    );
    Ok(UpgradeSummary {
        previous_package_id: request.package_id,
        package_id,
        policy_object_id: request.policy_object_id,
        digest: package.digest,
        transaction,
    })
}

/// Publishes a Move package and wraps its upgrade capability in a policy
///
/// The new package id and policy object id are recorded in the profile for
/// later upgrades.
#[derive(Debug, Parser)]
pub struct PublishPackage {
    #[clap(flatten)]
    pub(crate) txn_options: TransactionOptions,
    #[clap(flatten)]
    pub(crate) rule_options: PolicyRuleOptions,
    /// Additional keystore accounts that sign the transaction
    #[clap(long, value_delimiter = ',')]
    pub(crate) co_signers: Vec<AccountAddress>,
}

#[async_trait]
impl CliCommand<PublishSummary> for PublishPackage {
    fn command_name(&self) -> &'static str {
        "PublishPackage"
    }

    async fn execute(self) -> CliTypedResult<PublishSummary> {
        let options = &self.txn_options;
        let mut profile = options.profile_options.profile()?;
        let request = PublishRequest {
            sender: options.sender(&profile)?,
            policy_package: options.policy_package_options.policy_package(&profile)?,
            rule: self.rule_options.rule(&profile)?,
            co_signers: self.co_signers.clone(),
            gas: options.gas_options.gas_config(&profile),
        };
        let keystore = options.keystore(&profile)?;
        let client = options.rpc_client(&profile)?;
        let compiler = options.compiler(&profile);

        let summary = publish_with_policy(
            &client,
            &compiler,
            &keystore,
            &options.move_options.get_package_dir()?,
            request.clone(),
        )
        .await?;

        profile.policy_package_id = Some(request.policy_package);
        profile.policy_rule = Some(summary.rule.clone());
        profile.package_id = Some(summary.package_id);
        profile.policy_object_id = Some(summary.policy_object_id);
        options.profile_options.save_profile(profile)?;
        Ok(summary)
    }
}

/// Upgrades a package through its policy object
///
/// Authorizes the upgrade with the policy, upgrades the package with the
/// ticket, and commits the receipt back into the policy, in one transaction.
#[derive(Debug, Parser)]
pub struct UpgradePackage {
    #[clap(flatten)]
    pub(crate) txn_options: TransactionOptions,
    /// Package to upgrade, defaults to the profile's latest package
    #[clap(long)]
    pub(crate) package_id: Option<ObjectId>,
    /// Policy object holding the upgrade capability, defaults to the profile's
    #[clap(long)]
    pub(crate) policy_id: Option<ObjectId>,
    /// Policy module the policy object belongs to
    ///
    /// Defaults to the module of the profile's rule
    #[clap(long)]
    pub(crate) policy_module: Option<String>,
    /// Upgrade level to request: compatible, additive or dep_only
    #[clap(long, default_value_t = UpgradeLevel::Compatible)]
    pub(crate) upgrade_level: UpgradeLevel,
    /// Additional keystore accounts that sign the transaction
    #[clap(long, value_delimiter = ',')]
    pub(crate) co_signers: Vec<AccountAddress>,
}

impl UpgradePackage {
    pub(crate) fn request(
        &self,
        profile: &ProfileConfig,
        sender: AccountAddress,
    ) -> CliTypedResult<UpgradeRequest> {
        let options = &self.txn_options;
        let package_id = self.package_id.or(profile.package_id).ok_or_else(|| {
            CliError::CommandArgumentError(
                "No --package-id given and none recorded in the profile".to_string(),
            )
        })?;
        let policy_object_id = self.policy_id.or(profile.policy_object_id).ok_or_else(|| {
            CliError::CommandArgumentError(
                "No --policy-id given and none recorded in the profile".to_string(),
            )
        })?;
        let policy_module = match (&self.policy_module, &profile.policy_rule) {
            (Some(module), _) => module.clone(),
            (None, Some(rule)) => rule.name().to_string(),
            (None, None) => POLICY_MODULES[0].to_string(),
        };
        Ok(UpgradeRequest {
            sender,
            policy_package: options.policy_package_options.policy_package(profile)?,
            policy_module,
            policy_object_id,
            package_id,
            level: self.upgrade_level,
            co_signers: self.co_signers.clone(),
            gas: options.gas_options.gas_config(profile),
        })
    }
}

#[async_trait]
impl CliCommand<UpgradeSummary> for UpgradePackage {
    fn command_name(&self) -> &'static str {
        "UpgradePackage"
    }

    async fn execute(self) -> CliTypedResult<UpgradeSummary> {
        let options = &self.txn_options;
        let mut profile = options.profile_options.profile()?;
        let request = self.request(&profile, options.sender(&profile)?)?;
        let keystore = options.keystore(&profile)?;
        let client = options.rpc_client(&profile)?;
        let compiler = options.compiler(&profile);

        let summary = upgrade_through_policy(
            &client,
            &compiler,
            &keystore,
            &options.move_options.get_package_dir()?,
            request,
        )
        .await?;

        profile.package_id = Some(summary.package_id);
        profile.policy_object_id = Some(summary.policy_object_id);
        options.profile_options.save_profile(profile)?;
        Ok(summary)
    }
}
