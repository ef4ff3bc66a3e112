// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use claims::{assert_matches, assert_none, assert_some};
use policy_upgrade_sdk::{
    crypto::{Ed25519KeyPair, SignedTransaction},
    digests::ObjectRef,
    execution::{ExecutionLayer, LocalLedger, ResponseOptions, TransactionResponse},
    keystore::{encode_ed25519_entry, Keystore},
    policy_calls::PolicyModule,
    transaction_builder::{
        Argument, MoveCallTarget, ProgrammableTransaction, ProgrammableTransactionBuilder,
        TransactionData,
    },
    types::{
        policy::{DayOfWeek, MultiSigner, Weekday},
        AccountAddress, Digest, ObjectId, PolicyRule, UpgradeError, UpgradeLevel,
    },
    SdkError,
};

const MS_IN_DAY: u64 = 24 * 60 * 60 * 1000;
const SATURDAY_MS: u64 = 1_685_750_400_000;
const FRIDAY_MS: u64 = SATURDAY_MS - MS_IN_DAY;
const GAS_BUDGET: u64 = 50_000_000;
const GAS_PRICE: u64 = 1_000;

fn policy_package() -> ObjectId {
    ObjectId::from_hex_literal("0xa11ce").unwrap()
}

fn key(seed: u8) -> Ed25519KeyPair {
    Ed25519KeyPair::from_secret_bytes(&[seed; 32]).unwrap()
}

fn ledger() -> LocalLedger {
    let ledger = LocalLedger::new();
    ledger.register_policy_package(policy_package());
    ledger.set_time_ms(SATURDAY_MS);
    ledger
}

fn v1() -> Vec<Vec<u8>> {
    vec![b"module counter v1".to_vec()]
}

fn v2() -> Vec<Vec<u8>> {
    vec![b"module counter v2".to_vec(), b"module helpers".to_vec()]
}

fn transaction_data(
    sender: &Ed25519KeyPair,
    transaction: ProgrammableTransaction,
) -> TransactionData {
    TransactionData::new_programmable(sender.address(), vec![], transaction, GAS_BUDGET, GAS_PRICE)
}

/// The abort reported by the ledger, with the index of the failing command.
fn abort(response: &TransactionResponse) -> Option<(Option<u16>, UpgradeError)> {
    let failure = response.failure()?;
    Some((failure.command, failure.abort?))
}

async fn submit(
    ledger: &LocalLedger,
    sender: &Ed25519KeyPair,
    builder: ProgrammableTransactionBuilder,
) -> TransactionResponse {
    let data = transaction_data(sender, builder.finish());
    let signed = SignedTransaction::sign(data, sender).unwrap();
    ledger
        .execute_transaction(signed, ResponseOptions::full())
        .await
        .unwrap()
}

struct Deployment {
    package: ObjectId,
    policy: ObjectId,
    module: PolicyModule,
}

async fn publish(ledger: &LocalLedger, sender: &Ed25519KeyPair, rule: PolicyRule) -> Deployment {
    let module = PolicyModule::for_rule(policy_package(), &rule);
    let mut builder = ProgrammableTransactionBuilder::new();
    let cap = builder.publish(v1(), vec![]).unwrap();
    let policy = module.new_policy(&mut builder, cap, &rule).unwrap();
    builder.transfer_objects(vec![policy], sender.address()).unwrap();

    let response = submit(ledger, sender, builder).await;
    assert_none!(response.failure());
    let policies = response.created_of_type(|object_type| module.is_policy_type(object_type));
    assert_eq!(policies.len(), 1);
    Deployment {
        package: assert_some!(response.published_package()),
        policy: policies[0],
        module,
    }
}

fn policy_ref(ledger: &LocalLedger, deployment: &Deployment) -> ObjectRef {
    assert_some!(ledger.object_ref(deployment.policy))
}

/// Starts a transaction taking the policy at its current version.
fn policy_input(
    ledger: &LocalLedger,
    deployment: &Deployment,
) -> (ProgrammableTransactionBuilder, Argument) {
    let mut builder = ProgrammableTransactionBuilder::new();
    let policy = builder.object(policy_ref(ledger, deployment)).unwrap();
    (builder, policy)
}

fn upgrade_builder(
    ledger: &LocalLedger,
    deployment: &Deployment,
    level: UpgradeLevel,
    authorized: &Digest,
    modules: Vec<Vec<u8>>,
) -> ProgrammableTransactionBuilder {
    let (mut builder, policy) = policy_input(ledger, deployment);
    let ticket = deployment
        .module
        .authorize_upgrade(&mut builder, policy, level, authorized)
        .unwrap();
    let receipt = builder
        .upgrade(modules, vec![], deployment.package, ticket)
        .unwrap();
    deployment
        .module
        .commit_upgrade(&mut builder, policy, receipt)
        .unwrap();
    builder
}

fn saturday() -> PolicyRule {
    DayOfWeek::from(Weekday::Saturday).into()
}

#[tokio::test]
async fn publish_wraps_the_capability() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;

    let policy = ledger.policy(deployment.policy).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.package(), deployment.package);
    assert_eq!(policy.version(), 1);
    assert_eq!(policy.rule(), &saturday());
    assert_eq!(ledger.owner(deployment.policy), Some(sender.address()));
    // The capability lives inside the policy, not as a standalone object.
    assert_none!(ledger.upgrade_cap(policy.cap().id()));
}

#[tokio::test]
async fn upgrade_on_saturday_commits() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;

    let digest = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &digest, v2());
    let response = submit(&ledger, &sender, builder).await;
    assert_none!(response.failure());

    let new_package = assert_some!(response.published_package());
    assert_ne!(new_package, deployment.package);
    assert_eq!(ledger.package_digest(new_package), Some(digest));
    assert_eq!(ledger.package_version(new_package), Some(2));

    let policy = ledger.policy(deployment.policy).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.package(), new_package);
    assert_eq!(policy.version(), 2);
    let effects = response.effects.unwrap();
    let mutated = effects
        .mutated
        .iter()
        .find(|mutated| mutated.reference.object_id == deployment.policy)
        .unwrap();
    assert_eq!(mutated.owner.address(), Some(sender.address()));
    assert_eq!(Some(mutated.reference), ledger.object_ref(deployment.policy));
}

#[tokio::test]
async fn upgrade_on_friday_is_rejected() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    ledger.set_time_ms(FRIDAY_MS);

    let digest = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &digest, v2());
    let response = submit(&ledger, &sender, builder).await;

    assert_matches!(
        abort(&response),
        Some((Some(0), UpgradeError::PolicyRejected { .. }))
    );
    let policy = ledger.policy(deployment.policy).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.package(), deployment.package);
}

#[tokio::test]
async fn digest_mismatch_aborts_everything() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let objects = ledger.object_count();

    let authorized = Digest::compute_package_digest(&v2(), &[]);
    let submitted = vec![b"module counter v2 with a backdoor".to_vec()];
    let builder = upgrade_builder(
        &ledger,
        &deployment,
        UpgradeLevel::Compatible,
        &authorized,
        submitted,
    );
    let response = submit(&ledger, &sender, builder).await;

    assert_matches!(
        abort(&response),
        Some((Some(1), UpgradeError::DigestMismatch { expected, .. })) if expected == authorized
    );
    // The authorization of command 0 is rolled back with the rest.
    assert!(ledger.policy(deployment.policy).unwrap().is_idle());
    assert_eq!(ledger.object_count(), objects);
}

#[tokio::test]
async fn second_ticket_in_flight_is_refused() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let digest = Digest::compute_package_digest(&v2(), &[]);

    let (mut builder, policy) = policy_input(&ledger, &deployment);
    let module = &deployment.module;
    let first = module
        .authorize_upgrade(&mut builder, policy, UpgradeLevel::Compatible, &digest)
        .unwrap();
    module
        .authorize_upgrade(&mut builder, policy, UpgradeLevel::Compatible, &digest)
        .unwrap();
    module.discard_ticket(&mut builder, policy, first).unwrap();
    let response = submit(&ledger, &sender, builder).await;

    assert_matches!(
        abort(&response),
        Some((Some(1), UpgradeError::AlreadyAuthorized { .. }))
    );
}

#[tokio::test]
async fn uncommitted_receipt_aborts() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let digest = Digest::compute_package_digest(&v2(), &[]);

    let (mut builder, policy) = policy_input(&ledger, &deployment);
    let ticket = deployment
        .module
        .authorize_upgrade(&mut builder, policy, UpgradeLevel::Compatible, &digest)
        .unwrap();
    builder
        .upgrade(v2(), vec![], deployment.package, ticket)
        .unwrap();
    let response = submit(&ledger, &sender, builder).await;

    assert_matches!(
        abort(&response),
        Some((Some(1), UpgradeError::UnusedValue { command: 1, .. }))
    );
    assert_eq!(
        ledger.policy(deployment.policy).unwrap().package(),
        deployment.package
    );
}

#[tokio::test]
async fn discarded_ticket_leaves_package_alone() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let digest = Digest::compute_package_digest(&v2(), &[]);

    let (mut builder, policy) = policy_input(&ledger, &deployment);
    let ticket = deployment
        .module
        .authorize_upgrade(&mut builder, policy, UpgradeLevel::Compatible, &digest)
        .unwrap();
    deployment
        .module
        .discard_ticket(&mut builder, policy, ticket)
        .unwrap();
    let response = submit(&ledger, &sender, builder).await;

    assert_none!(response.failure());
    let policy = ledger.policy(deployment.policy).unwrap();
    assert!(policy.is_idle());
    assert_eq!(policy.version(), 1);
}

#[tokio::test]
async fn dependency_only_upgrade_keeps_module_bytes() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;

    let (mut builder, policy) = policy_input(&ledger, &deployment);
    deployment
        .module
        .restrict(&mut builder, policy, UpgradeLevel::DepOnly)
        .unwrap();
    assert_none!(submit(&ledger, &sender, builder).await.failure());

    let changed = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::DepOnly, &changed, v2());
    assert_matches!(
        abort(&submit(&ledger, &sender, builder).await),
        Some((Some(1), UpgradeError::MalformedPackage(_)))
    );

    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &changed, v2());
    assert_matches!(
        abort(&submit(&ledger, &sender, builder).await),
        Some((Some(0), UpgradeError::TooPermissive { .. }))
    );

    let framework = ObjectId::from_hex_literal("0x2").unwrap();
    let same = Digest::compute_package_digest(&v1(), &[framework]);
    let (mut builder, policy) = policy_input(&ledger, &deployment);
    let ticket = deployment
        .module
        .authorize_upgrade(&mut builder, policy, UpgradeLevel::DepOnly, &same)
        .unwrap();
    let receipt = builder
        .upgrade(v1(), vec![framework], deployment.package, ticket)
        .unwrap();
    deployment
        .module
        .commit_upgrade(&mut builder, policy, receipt)
        .unwrap();
    let response = submit(&ledger, &sender, builder).await;
    assert_none!(response.failure());
    let new_package = assert_some!(response.published_package());
    assert_eq!(ledger.package_dependencies(new_package), Some(vec![framework]));
}

#[tokio::test]
async fn immutable_package_cannot_be_upgraded() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;

    let (mut builder, policy) = policy_input(&ledger, &deployment);
    deployment
        .module
        .make_immutable(&mut builder, policy)
        .unwrap();
    assert_none!(submit(&ledger, &sender, builder).await.failure());

    let digest = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &digest, v2());
    assert_matches!(
        abort(&submit(&ledger, &sender, builder).await),
        Some((Some(0), UpgradeError::InvalidCapability { .. }))
    );
}

#[tokio::test]
async fn multi_signer_policy_counts_signatures() {
    let ledger = ledger();
    let sender = key(1);
    let (alice, bob, carol) = (key(2), key(3), key(4));
    let rule: PolicyRule =
        MultiSigner::new([alice.address(), bob.address(), carol.address()], 2).into();
    let deployment = publish(&ledger, &sender, rule).await;
    let digest = Digest::compute_package_digest(&v2(), &[]);

    let data = transaction_data(
        &sender,
        upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &digest, v2()).finish(),
    );
    let mut signed = SignedTransaction::sign(data.clone(), &sender).unwrap();
    signed.add_signature(&alice).unwrap();
    let response = ledger
        .execute_transaction(signed, ResponseOptions::full())
        .await
        .unwrap();
    assert_matches!(
        abort(&response),
        Some((Some(0), UpgradeError::PolicyRejected { .. }))
    );

    let mut signed = SignedTransaction::sign(data, &sender).unwrap();
    signed.add_signature(&alice).unwrap();
    signed.add_signature(&carol).unwrap();
    let response = ledger
        .execute_transaction(signed, ResponseOptions::full())
        .await
        .unwrap();
    assert_none!(response.failure());
    assert_eq!(ledger.policy(deployment.policy).unwrap().version(), 2);
}

#[tokio::test]
async fn policy_module_must_match_the_policy() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let wrong = Deployment {
        module: PolicyModule::new(policy_package(), "time_window"),
        ..deployment
    };

    let digest = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &wrong, UpgradeLevel::Compatible, &digest, v2());
    assert_matches!(
        abort(&submit(&ledger, &sender, builder).await),
        Some((Some(0), UpgradeError::InvalidArgument(_)))
    );
}

#[tokio::test]
async fn failed_publish_leaves_no_objects() {
    let ledger = ledger();
    let sender = key(1);
    let objects = ledger.object_count();

    let rule = saturday();
    let module = PolicyModule::for_rule(policy_package(), &rule);
    let mut builder = ProgrammableTransactionBuilder::new();
    let cap = builder.publish(v1(), vec![]).unwrap();
    let policy = module.new_policy(&mut builder, cap, &rule).unwrap();
    builder.transfer_objects(vec![policy], sender.address()).unwrap();
    builder
        .move_call(
            MoveCallTarget::new(policy_package(), "day_of_week", "launch_rockets"),
            vec![],
        )
        .unwrap();
    let response = submit(&ledger, &sender, builder).await;

    assert_matches!(
        abort(&response),
        Some((Some(3), UpgradeError::UnknownFunction(_)))
    );
    assert_eq!(ledger.object_count(), objects);
}

#[tokio::test]
async fn policy_reference_from_before_an_upgrade_is_stale() {
    let ledger = ledger();
    let sender = key(1);
    let deployment = publish(&ledger, &sender, saturday()).await;
    let before = policy_ref(&ledger, &deployment);

    let digest = Digest::compute_package_digest(&v2(), &[]);
    let builder = upgrade_builder(&ledger, &deployment, UpgradeLevel::Compatible, &digest, v2());
    assert_none!(submit(&ledger, &sender, builder).await.failure());
    assert!(policy_ref(&ledger, &deployment).version > before.version);

    let mut builder = ProgrammableTransactionBuilder::new();
    let policy = builder.object(before).unwrap();
    deployment
        .module
        .restrict(&mut builder, policy, UpgradeLevel::DepOnly)
        .unwrap();
    let response = submit(&ledger, &sender, builder).await;
    assert_matches!(
        abort(&response),
        Some((None, UpgradeError::StaleObject { id, .. })) if id == deployment.policy
    );
    assert_eq!(
        ledger.policy(deployment.policy).unwrap().cap().policy(),
        UpgradeLevel::Compatible
    );
}

#[tokio::test]
async fn forged_signature_is_rejected_before_execution() {
    let ledger = ledger();
    let (sender, impostor) = (key(1), key(2));
    let data = transaction_data(&sender, ProgrammableTransactionBuilder::new().finish());
    let signed = SignedTransaction {
        signatures: vec![impostor.sign_transaction(&data).unwrap()],
        data,
    };
    assert_matches!(
        ledger
            .execute_transaction(signed, ResponseOptions::full())
            .await,
        Err(SdkError::InvalidSignature(_))
    );
}

#[test]
fn absent_active_address_is_key_not_found() {
    let (a, b, c) = (key(1), key(2), key(3));
    let json = serde_json::to_string(&[
        encode_ed25519_entry(&[1; 32]),
        encode_ed25519_entry(&[2; 32]),
    ])
    .unwrap();
    let keystore = Keystore::from_json(&json).unwrap();

    assert_eq!(keystore.keypair(&a.address()).unwrap().address(), a.address());
    assert_eq!(keystore.keypair(&b.address()).unwrap().address(), b.address());
    let active: AccountAddress = c.address();
    assert_matches!(
        keystore.keypair(&active),
        Err(SdkError::KeyNotFound { address }) if address == active
    );
}
