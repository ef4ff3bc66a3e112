// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::{
    common::{
        init::InitTool,
        types::{
            CliConfig, CliError, CliTypedResult, GasConfig, GasOptions, PolicyRuleOptions,
            ProfileConfig, DEFAULT_GAS_BUDGET, DEFAULT_POLICY_PACKAGE_ID, DEFAULT_RPC_URL,
        },
    },
    move_tool::{CompiledPackage, PackageCompiler},
    policy_tool::{
        build_publish_transaction, build_upgrade_transaction, prepare_transaction,
        publish_with_policy, upgrade_through_policy, PublishPackage, PublishRequest,
        PublishSummary, UpgradePackage, UpgradeRequest,
    },
    Tool,
};
use claims::{assert_matches, assert_ok};
use clap::Parser;
use policy_upgrade_sdk::{
    crypto::Ed25519KeyPair,
    digests::{ObjectDigest, ObjectRef},
    execution::{LocalLedger, LOCAL_GAS_PRICE},
    keystore::{encode_ed25519_entry, Keystore},
    policy_calls::PolicyModule,
    transaction_builder::{CallArg, Command, ObjectArg},
};
use policy_upgrade_types::{
    policy::{DayOfWeek, MultiSigner, TimeWindow, Weekday},
    AccountAddress, ObjectId, PolicyRule, UpgradeLevel, UpgradePredicate,
};
use std::{
    path::Path,
    str::FromStr,
    sync::atomic::{AtomicUsize, Ordering},
};

const MS_IN_DAY: u64 = 24 * 60 * 60 * 1000;
const SATURDAY_MS: u64 = 1_685_750_400_000;
const FRIDAY_MS: u64 = SATURDAY_MS - MS_IN_DAY;

/// Hands out queued packages instead of running the toolchain
struct FakeCompiler {
    packages: Vec<CompiledPackage>,
    builds: AtomicUsize,
}

impl FakeCompiler {
    fn new(packages: Vec<CompiledPackage>) -> Self {
        Self {
            packages,
            builds: AtomicUsize::new(0),
        }
    }
}

impl PackageCompiler for FakeCompiler {
    fn build(&self, _package_dir: &Path) -> CliTypedResult<CompiledPackage> {
        let build = self.builds.fetch_add(1, Ordering::SeqCst);
        self.packages.get(build).cloned().ok_or_else(|| {
            CliError::BuildFailure("error[E01002]: unexpected token".to_string())
        })
    }
}

fn policy_package() -> ObjectId {
    ObjectId::from_str("0x5eed").unwrap()
}

fn v1() -> CompiledPackage {
    CompiledPackage::new(vec![b"module example::counter v1".to_vec()], vec![
        ObjectId::from_str("0x1").unwrap(),
        ObjectId::from_str("0x2").unwrap(),
    ])
}

fn v2() -> CompiledPackage {
    CompiledPackage::new(
        vec![
            b"module example::counter v2".to_vec(),
            b"module example::events".to_vec(),
        ],
        vec![
            ObjectId::from_str("0x1").unwrap(),
            ObjectId::from_str("0x2").unwrap(),
        ],
    )
}

fn keystore(seeds: &[u8]) -> Keystore {
    let entries: Vec<String> = seeds
        .iter()
        .map(|seed| encode_ed25519_entry(&[*seed; 32]))
        .collect();
    Keystore::from_json(&serde_json::to_string(&entries).unwrap()).unwrap()
}

fn address(seed: u8) -> AccountAddress {
    Ed25519KeyPair::from_secret_bytes(&[seed; 32])
        .unwrap()
        .address()
}

fn ledger(time_ms: u64) -> LocalLedger {
    let ledger = LocalLedger::new();
    ledger.register_policy_package(policy_package());
    ledger.set_time_ms(time_ms);
    ledger
}

fn saturday() -> PolicyRule {
    DayOfWeek::from(Weekday::Saturday).into()
}

async fn publish(
    ledger: &LocalLedger,
    keystore: &Keystore,
    sender: AccountAddress,
    rule: PolicyRule,
) -> CliTypedResult<PublishSummary> {
    let compiler = FakeCompiler::new(vec![v1()]);
    publish_with_policy(ledger, &compiler, keystore, Path::new("example"), PublishRequest {
        sender,
        policy_package: policy_package(),
        rule,
        co_signers: vec![],
        gas: GasConfig::default(),
    })
    .await
}

fn upgrade_request(published: &PublishSummary, sender: AccountAddress) -> UpgradeRequest {
    UpgradeRequest {
        sender,
        policy_package: policy_package(),
        policy_module: published.rule.name().to_string(),
        policy_object_id: published.policy_object_id,
        package_id: published.package_id,
        level: UpgradeLevel::Compatible,
        co_signers: vec![],
        gas: GasConfig::default(),
    }
}

#[tokio::test]
async fn publish_then_upgrade_on_saturday() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1]);
    let sender = address(1);

    let published = publish(&ledger, &keystore, sender, saturday()).await.unwrap();
    assert_eq!(
        published.policy_type,
        format!("{}::day_of_week::UpgradeCap", policy_package())
    );
    assert_eq!(ledger.owner(published.policy_object_id), Some(sender));
    assert_eq!(ledger.package_digest(published.package_id), Some(v1().digest));

    let compiler = FakeCompiler::new(vec![v2()]);
    let upgraded = upgrade_through_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("example"),
        upgrade_request(&published, sender),
    )
    .await
    .unwrap();

    assert_eq!(upgraded.previous_package_id, published.package_id);
    assert_ne!(upgraded.package_id, published.package_id);
    assert_eq!(upgraded.digest, v2().digest);
    assert_eq!(ledger.package_version(upgraded.package_id), Some(2));

    let policy = ledger.policy(published.policy_object_id).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.package(), upgraded.package_id);
}

#[tokio::test]
async fn upgrade_on_friday_is_rejected() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1]);
    let sender = address(1);
    let published = publish(&ledger, &keystore, sender, saturday()).await.unwrap();

    ledger.set_time_ms(FRIDAY_MS);
    let objects = ledger.object_count();
    let compiler = FakeCompiler::new(vec![v2()]);
    let err = upgrade_through_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("example"),
        upgrade_request(&published, sender),
    )
    .await
    .unwrap_err();

    assert_matches!(&err, CliError::TransactionFailed(msg) if msg.contains("command 0"));
    assert_eq!(ledger.object_count(), objects);
    let policy = ledger.policy(published.policy_object_id).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.package(), published.package_id);
}

#[tokio::test]
async fn sender_without_a_key_is_refused() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1, 2]);
    let objects = ledger.object_count();

    let err = publish(&ledger, &keystore, address(3), saturday())
        .await
        .unwrap_err();
    assert_matches!(err, CliError::KeyNotFound(missing) if missing == address(3).to_string());
    assert_eq!(ledger.object_count(), objects);
}

#[tokio::test]
async fn build_failure_submits_nothing() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1]);
    let compiler = FakeCompiler::new(vec![]);
    let objects = ledger.object_count();

    let err = publish_with_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("broken"),
        PublishRequest {
            sender: address(1),
            policy_package: policy_package(),
            rule: saturday(),
            co_signers: vec![],
            gas: GasConfig::default(),
        },
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_str(), "BuildFailure");
    assert_eq!(ledger.object_count(), objects);
}

#[tokio::test]
async fn multi_signer_upgrade_needs_co_signers() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1, 2, 3]);
    let sender = address(1);
    let rule: PolicyRule = MultiSigner::new([address(2), address(3)], 2).into();
    let published = publish(&ledger, &keystore, sender, rule).await.unwrap();

    let mut request = upgrade_request(&published, sender);
    assert_eq!(request.policy_module, "multi_signer");
    request.co_signers = vec![address(2)];
    let compiler = FakeCompiler::new(vec![v2(), v2()]);
    let err = upgrade_through_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("example"),
        request.clone(),
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_str(), "TransactionFailed");

    request.co_signers = vec![address(2), address(3)];
    let upgraded = upgrade_through_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("example"),
        request,
    )
    .await
    .unwrap();
    assert_eq!(ledger.package_version(upgraded.package_id), Some(2));
}

#[tokio::test]
async fn unknown_policy_module_is_an_argument_error() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1]);
    let published = publish(&ledger, &keystore, address(1), saturday())
        .await
        .unwrap();

    let mut request = upgrade_request(&published, address(1));
    request.policy_module = "weekend_only".to_string();
    let compiler = FakeCompiler::new(vec![v2()]);
    let err = upgrade_through_policy(
        &ledger,
        &compiler,
        &keystore,
        Path::new("example"),
        request,
    )
    .await
    .unwrap_err();
    assert_eq!(err.to_str(), "CommandArgumentError");
}

#[tokio::test]
async fn invalid_rule_is_refused_before_submission() {
    let ledger = ledger(SATURDAY_MS);
    let keystore = keystore(&[1]);
    let objects = ledger.object_count();

    let no_approvers: PolicyRule = MultiSigner::new(Vec::new(), 2).into();
    let err = publish(&ledger, &keystore, address(1), no_approvers.clone())
        .await
        .unwrap_err();
    assert_matches!(&err, CliError::CommandArgumentError(msg) if msg.contains("threshold 2"));
    assert_eq!(ledger.object_count(), objects);

    let module = PolicyModule::for_rule(policy_package(), &no_approvers);
    assert_matches!(
        build_publish_transaction(address(1), &module, &no_approvers, &v1()),
        Err(CliError::CommandArgumentError(_))
    );
}

#[test]
fn upgrade_transaction_orders_authorize_upgrade_commit() {
    let module = PolicyModule::new(policy_package(), "day_of_week");
    let package_id = ObjectId::from_str("0xbeef").unwrap();
    let policy = ObjectRef::new(
        ObjectId::from_str("0xcafe").unwrap(),
        7,
        ObjectDigest::default(),
    );
    let transaction = build_upgrade_transaction(
        &module,
        policy,
        package_id,
        UpgradeLevel::Compatible,
        &v2(),
    )
    .unwrap();

    assert_eq!(
        transaction.inputs[0],
        CallArg::Object(ObjectArg::ImmOrOwnedObject(policy))
    );
    let commands = &transaction.commands;
    assert_eq!(commands.len(), 3);
    assert_matches!(
        &commands[0],
        Command::MoveCall(call)
            if call.target().to_string().ends_with("::day_of_week::authorize_upgrade")
    );
    assert_matches!(
        &commands[1],
        Command::Upgrade(modules, _, package, _)
            if *package == package_id && modules == &v2().modules
    );
    assert_matches!(
        &commands[2],
        Command::MoveCall(call)
            if call.target().to_string().ends_with("::day_of_week::commit_upgrade")
    );
}

#[tokio::test]
async fn gas_comes_from_flags_then_profile_then_network() {
    let ledger = ledger(SATURDAY_MS);
    let module = PolicyModule::for_rule(policy_package(), &saturday());
    let transaction = build_publish_transaction(address(1), &module, &saturday(), &v1()).unwrap();

    let profile = ProfileConfig {
        gas_budget: Some(5_000_000),
        ..Default::default()
    };
    let gas = GasOptions::default().gas_config(&profile);
    assert_eq!(gas, GasConfig {
        budget: 5_000_000,
        price: None
    });
    let data = prepare_transaction(&ledger, address(1), transaction.clone(), gas)
        .await
        .unwrap();
    assert_eq!(data.sender(), address(1));
    assert_eq!(data.gas_data().owner, address(1));
    assert_eq!(data.gas_data().budget, 5_000_000);
    assert_eq!(data.gas_data().price, LOCAL_GAS_PRICE);
    assert_eq!(data.programmable(), &transaction);

    let flags = GasOptions {
        gas_budget: Some(9_000_000),
        gas_price: Some(750),
    };
    let data = prepare_transaction(&ledger, address(1), transaction, flags.gas_config(&profile))
        .await
        .unwrap();
    assert_eq!(data.gas_data().budget, 9_000_000);
    assert_eq!(data.gas_data().price, 750);

    assert_eq!(
        GasOptions::default().gas_config(&ProfileConfig::default()),
        GasConfig::default()
    );
    assert_eq!(GasConfig::default().budget, DEFAULT_GAS_BUDGET);
}

#[test]
fn profile_round_trips_through_yaml() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!CliConfig::config_exists(dir.path()));
    assert_matches!(
        CliConfig::load_from(dir.path()),
        Err(CliError::ConfigNotFoundError(_))
    );

    let profile = ProfileConfig {
        rpc_url: Some(DEFAULT_RPC_URL.parse().unwrap()),
        active_address: Some(address(1)),
        policy_package_id: Some(policy_package()),
        policy_rule: Some(TimeWindow::new(10, 20).into()),
        package_id: Some(ObjectId::from_str("0xbeef").unwrap()),
        policy_object_id: Some(ObjectId::from_str("0xcafe").unwrap()),
        ..Default::default()
    };
    assert_ok!(CliConfig::save_profile(dir.path(), "devnet", profile.clone()));
    assert_ok!(CliConfig::save_profile(dir.path(), "other", ProfileConfig::default()));
    assert!(CliConfig::config_exists(dir.path()));

    assert_eq!(
        CliConfig::load_profile(dir.path(), "devnet").unwrap(),
        Some(profile)
    );
    assert_eq!(CliConfig::load_profile(dir.path(), "missing").unwrap(), None);
    let config = CliConfig::load_from(dir.path()).unwrap();
    assert_eq!(config.profiles.unwrap().len(), 2);
}

#[test]
fn rule_options_pick_one_rule() {
    let profile = ProfileConfig::default();
    assert_eq!(PolicyRuleOptions::default().rule(&profile).unwrap(), saturday());

    let from_profile = ProfileConfig {
        policy_rule: Some(TimeWindow::new(1, 2).into()),
        ..Default::default()
    };
    assert_eq!(
        PolicyRuleOptions::default().rule(&from_profile).unwrap(),
        PolicyRule::from(TimeWindow::new(1, 2))
    );

    let weekday = PolicyRuleOptions {
        weekday: Some(Weekday::Tuesday),
        ..Default::default()
    };
    assert_eq!(
        weekday.rule(&from_profile).unwrap(),
        PolicyRule::from(DayOfWeek::from(Weekday::Tuesday))
    );

    let both = PolicyRuleOptions {
        weekday: Some(Weekday::Tuesday),
        threshold: Some(1),
        approvers: vec![address(1)],
        ..Default::default()
    };
    assert_matches!(both.rule(&profile), Err(CliError::CommandArgumentError(_)));
}

#[test]
fn init_fills_defaults_and_keeps_deployments() {
    let tool = InitTool::try_parse_from(["init", "--weekday", "friday"]).unwrap();
    let existing = ProfileConfig {
        package_id: Some(ObjectId::from_str("0xbeef").unwrap()),
        ..Default::default()
    };
    let profile = tool.init_profile(existing).unwrap();

    assert_eq!(profile.rpc_url.unwrap().as_str(), "https://fullnode.devnet.sui.io/");
    assert_eq!(profile.chain_cli.as_deref(), Some("sui"));
    assert_eq!(
        profile.policy_package_id,
        Some(ObjectId::from_str(DEFAULT_POLICY_PACKAGE_ID).unwrap())
    );
    assert_eq!(profile.policy_rule, Some(PolicyRule::from(DayOfWeek::new(4))));
    assert!(profile
        .keystore_path
        .unwrap()
        .ends_with(".sui/sui_config/sui.keystore"));
    assert_eq!(profile.package_id, Some(ObjectId::from_str("0xbeef").unwrap()));
    assert_eq!(profile.policy_object_id, None);
    assert_eq!(profile.gas_budget, Some(DEFAULT_GAS_BUDGET));
    assert_eq!(profile.gas_price, None);

    let tool = InitTool::try_parse_from(["init", "--gas-budget", "20000000", "--gas-price", "990"])
        .unwrap();
    let profile = tool.init_profile(ProfileConfig::default()).unwrap();
    assert_eq!(profile.gas_budget, Some(20_000_000));
    assert_eq!(profile.gas_price, Some(990));
}

#[test]
fn upgrade_ids_come_from_the_profile() {
    let tool = UpgradePackage::try_parse_from(["upgrade", "--upgrade-level", "additive"]).unwrap();
    let profile = ProfileConfig {
        policy_package_id: Some(policy_package()),
        policy_rule: Some(TimeWindow::new(1, 2).into()),
        package_id: Some(ObjectId::from_str("0xbeef").unwrap()),
        policy_object_id: Some(ObjectId::from_str("0xcafe").unwrap()),
        ..Default::default()
    };

    let request = tool.request(&profile, address(1)).unwrap();
    assert_eq!(request.package_id, ObjectId::from_str("0xbeef").unwrap());
    assert_eq!(request.policy_object_id, ObjectId::from_str("0xcafe").unwrap());
    assert_eq!(request.policy_package, policy_package());
    assert_eq!(request.policy_module, "time_window");
    assert_eq!(request.level, UpgradeLevel::Additive);

    assert_matches!(
        tool.request(&ProfileConfig::default(), address(1)),
        Err(CliError::CommandArgumentError(_))
    );
}

#[test]
fn cli_parses_subcommands() {
    assert_ok!(Tool::try_parse_from([
        "policy-upgrade",
        "publish",
        "--package-dir",
        "example",
        "--weekday",
        "5",
        "--profile",
        "devnet",
    ]));
    assert_ok!(Tool::try_parse_from([
        "policy-upgrade",
        "upgrade",
        "--policy-id",
        "0xcafe",
        "--co-signers",
        "0x1,0x2",
    ]));
    assert_ok!(Tool::try_parse_from(["policy-upgrade", "config", "show-keys"]));
    let publish = PublishPackage::try_parse_from([
        "publish",
        "--gas-budget",
        "50000000",
        "--gas-price",
        "1000",
    ])
    .unwrap();
    assert_eq!(publish.txn_options.gas_options, GasOptions {
        gas_budget: Some(50_000_000),
        gas_price: Some(1000),
    });
    // A time window needs both ends.
    assert!(Tool::try_parse_from([
        "policy-upgrade",
        "publish",
        "--window-start-ms",
        "10"
    ])
    .is_err());
}

#[tokio::test]
async fn delete_profile_reports_success() {
    let dir = tempfile::tempdir().unwrap();
    let config_dir = dir.path().to_str().unwrap();
    assert_ok!(CliConfig::save_profile(dir.path(), "devnet", ProfileConfig::default()));

    let delete = |profile: &'static str| {
        Tool::try_parse_from([
            "policy-upgrade",
            "config",
            "delete-profile",
            "--profile",
            profile,
            "--config-dir",
            config_dir,
        ])
        .unwrap()
    };
    let output = delete("devnet").execute().await.unwrap();
    let output: serde_json::Value = serde_json::from_str(&output).unwrap();
    assert_eq!(output, serde_json::json!({ "Result": "Success" }));
    assert_eq!(CliConfig::load_profile(dir.path(), "devnet").unwrap(), None);

    let output = delete("devnet").execute().await.unwrap_err();
    assert!(output.contains("Profile devnet does not exist"));
}
