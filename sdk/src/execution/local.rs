// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{
    ExecutionLayer, ExecutionStatus, GasCostSummary, ObjectChange, OwnedObjectRef, Owner,
    ResponseOptions, TransactionEffects, TransactionResponse,
};
use crate::{
    crypto::SignedTransaction,
    digests::{ObjectDigest, ObjectRef, TransactionDigest},
    error::SdkError,
    policy_calls::{
        self, PolicyModule, AUTHORIZE_UPGRADE, COMMIT_UPGRADE, DISCARD_TICKET, MAKE_IMMUTABLE,
        NEW_POLICY, POLICY_MODULES, RESTRICT,
    },
    transaction_builder::{
        Argument, CallArg, Command, MoveCallTarget, ObjectArg, ProgrammableTransaction,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use policy_upgrade_types::{
    AccountAddress, Digest, ObjectId, PolicyContext, PolicyObject, UpgradeCap, UpgradeError,
    UpgradeLevel, UpgradeReceipt, UpgradeResult, UpgradeTicket,
};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

pub const UPGRADE_CAP_TYPE: &str = "0x2::package::UpgradeCap";
pub const PACKAGE_TYPE: &str = "package";
/// Gas is not charged locally; this is only reported as the network price.
pub const LOCAL_GAS_PRICE: u64 = 1_000;

const WRAPPED_DIGEST: ObjectDigest = ObjectDigest::new(Digest::new([88; 32]));
const MAX_ARGUMENTS: usize = u16::MAX as usize + 1;

/// Framework packages every ledger starts with, usable as dependencies.
pub fn framework_packages() -> [ObjectId; 2] {
    let mut move_stdlib = [0u8; ObjectId::LENGTH];
    move_stdlib[ObjectId::LENGTH - 1] = 1;
    let mut framework = [0u8; ObjectId::LENGTH];
    framework[ObjectId::LENGTH - 1] = 2;
    [ObjectId::new(move_stdlib), ObjectId::new(framework)]
}

fn object_digest(id: ObjectId, version: u64) -> ObjectDigest {
    ObjectDigest::new(Digest::hash_all([
        id.as_bytes().as_slice(),
        version.to_le_bytes().as_slice(),
    ]))
}

#[derive(Clone, Debug)]
struct Package {
    version: u64,
    modules: Vec<Vec<u8>>,
    dependencies: Vec<ObjectId>,
    digest: Digest,
}

impl Package {
    fn new(version: u64, modules: Vec<Vec<u8>>, dependencies: Vec<ObjectId>) -> Self {
        let digest = Digest::compute_package_digest(&modules, &dependencies);
        Self {
            version,
            modules,
            dependencies,
            digest,
        }
    }
}

#[derive(Clone, Debug)]
enum ObjectData {
    Package(Package),
    UpgradeCap(UpgradeCap),
    Policy {
        policy: PolicyObject,
        module: PolicyModule,
    },
}

impl ObjectData {
    fn type_name(&self) -> String {
        match self {
            ObjectData::Package(_) => PACKAGE_TYPE.to_string(),
            ObjectData::UpgradeCap(_) => UPGRADE_CAP_TYPE.to_string(),
            ObjectData::Policy { module, .. } => module.policy_type(),
        }
    }
}

#[derive(Clone, Debug)]
struct StoredObject {
    owner: Owner,
    version: u64,
    data: ObjectData,
}

impl StoredObject {
    fn package(package: Package) -> Self {
        Self {
            owner: Owner::Immutable,
            version: package.version,
            data: ObjectData::Package(package),
        }
    }
}

#[derive(Clone, Debug, Default)]
struct Store {
    objects: BTreeMap<ObjectId, StoredObject>,
    policy_packages: BTreeSet<ObjectId>,
    /// Number of transactions executed, successful or not.
    transactions: u64,
}

/// An in-memory ledger executing programmable transactions.
///
/// Every transaction runs against a copy of the store which replaces the
/// store only if all commands succeed, so an aborted transaction leaves no
/// trace besides its failed effects.
///
/// Objects are versioned the way a network versions them: everything a
/// transaction writes takes one version above the highest input version.
#[derive(Debug)]
pub struct LocalLedger {
    store: Mutex<Store>,
    /// Fixed chain time, or the system clock when unset.
    time_ms: Mutex<Option<u64>>,
}

impl Default for LocalLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalLedger {
    pub fn new() -> Self {
        let mut store = Store::default();
        for id in framework_packages() {
            store.objects.insert(
                id,
                StoredObject::package(Package::new(1, vec![id.as_bytes().to_vec()], vec![])),
            );
        }
        Self {
            store: Mutex::new(store),
            time_ms: Mutex::new(None),
        }
    }

    /// Installs a package hosting the policy modules at `id`.
    pub fn register_policy_package(&self, id: ObjectId) {
        let modules = POLICY_MODULES
            .iter()
            .map(|module| module.as_bytes().to_vec())
            .collect();
        let mut store = self.store.lock();
        store.objects.insert(
            id,
            StoredObject::package(Package::new(1, modules, framework_packages().to_vec())),
        );
        store.policy_packages.insert(id);
        debug!(package = %id, "Registered policy package");
    }

    /// Pins the chain clock.
    pub fn set_time_ms(&self, timestamp_ms: u64) {
        *self.time_ms.lock() = Some(timestamp_ms);
    }

    pub fn now_ms(&self) -> u64 {
        let fixed = *self.time_ms.lock();
        fixed.unwrap_or_else(|| u64::try_from(Utc::now().timestamp_millis()).unwrap_or_default())
    }

    /// Reference to the current version of `id`.
    pub fn object_ref(&self, id: ObjectId) -> Option<ObjectRef> {
        let version = self.store.lock().objects.get(&id)?.version;
        Some(ObjectRef::new(id, version, object_digest(id, version)))
    }

    pub fn policy(&self, id: ObjectId) -> Option<PolicyObject> {
        match &self.store.lock().objects.get(&id)?.data {
            ObjectData::Policy { policy, .. } => Some(policy.clone()),
            _ => None,
        }
    }

    pub fn upgrade_cap(&self, id: ObjectId) -> Option<UpgradeCap> {
        match &self.store.lock().objects.get(&id)?.data {
            ObjectData::UpgradeCap(cap) => Some(cap.clone()),
            _ => None,
        }
    }

    pub fn package_digest(&self, id: ObjectId) -> Option<Digest> {
        match &self.store.lock().objects.get(&id)?.data {
            ObjectData::Package(package) => Some(package.digest),
            _ => None,
        }
    }

    pub fn package_version(&self, id: ObjectId) -> Option<u64> {
        match &self.store.lock().objects.get(&id)?.data {
            ObjectData::Package(package) => Some(package.version),
            _ => None,
        }
    }

    pub fn package_dependencies(&self, id: ObjectId) -> Option<Vec<ObjectId>> {
        match &self.store.lock().objects.get(&id)?.data {
            ObjectData::Package(package) => Some(package.dependencies.clone()),
            _ => None,
        }
    }

    /// Address owning `id`, `None` for immutable or missing objects.
    pub fn owner(&self, id: ObjectId) -> Option<AccountAddress> {
        self.store.lock().objects.get(&id)?.owner.address()
    }

    pub fn object_count(&self) -> usize {
        self.store.lock().objects.len()
    }

    fn execute(
        &self,
        transaction: SignedTransaction,
        options: ResponseOptions,
    ) -> Result<TransactionResponse, SdkError> {
        let signers = transaction.verify()?;
        let digest = transaction.digest()?;
        let context = PolicyContext::new(self.now_ms()).with_signers(signers);

        let mut store = self.store.lock();
        let mut scratch = store.clone();
        let mut session = Session::new(
            &mut scratch,
            transaction.data.sender(),
            context,
            digest,
            store.transactions,
        );
        let outcome = session.run(transaction.data.programmable());
        let changes = session.changes;

        let (status, changes) = match outcome {
            Ok(()) => {
                *store = scratch;
                info!(%digest, changes = changes.len(), "Transaction executed");
                (ExecutionStatus::Success, changes)
            },
            Err((command, error)) => {
                warn!(%digest, ?command, %error, "Transaction aborted");
                (ExecutionStatus::failure(command, error), vec![])
            },
        };
        store.transactions += 1;

        let effects = effects_of(status, digest, &changes);
        Ok(TransactionResponse {
            digest,
            effects: options.show_effects.then_some(effects),
            object_changes: options.show_object_changes.then_some(changes),
            confirmed_local_execution: Some(true),
        })
    }
}

fn effects_of(
    status: ExecutionStatus,
    digest: TransactionDigest,
    changes: &[ObjectChange],
) -> TransactionEffects {
    let mut effects = TransactionEffects {
        status,
        gas_used: Some(GasCostSummary::default()),
        transaction_digest: Some(digest),
        ..Default::default()
    };
    for change in changes {
        match change {
            ObjectChange::Published {
                package_id,
                version,
                digest,
                ..
            } => effects.created.push(OwnedObjectRef {
                owner: Owner::Immutable,
                reference: ObjectRef::new(*package_id, *version, *digest),
            }),
            ObjectChange::Created {
                owner,
                object_id,
                version,
                digest,
                ..
            } => effects.created.push(OwnedObjectRef {
                owner: *owner,
                reference: ObjectRef::new(*object_id, *version, *digest),
            }),
            ObjectChange::Mutated {
                owner,
                object_id,
                version,
                digest,
                ..
            }
            | ObjectChange::Transferred {
                recipient: owner,
                object_id,
                version,
                digest,
                ..
            } => effects.mutated.push(OwnedObjectRef {
                owner: *owner,
                reference: ObjectRef::new(*object_id, *version, *digest),
            }),
            ObjectChange::Wrapped {
                object_id, version, ..
            } => effects
                .wrapped
                .push(ObjectRef::new(*object_id, *version, WRAPPED_DIGEST)),
            ObjectChange::Deleted {
                object_id, version, ..
            } => effects
                .deleted
                .push(ObjectRef::new(*object_id, *version, ObjectDigest::default())),
        }
    }
    effects
}

#[async_trait]
impl ExecutionLayer for LocalLedger {
    async fn execute_transaction(
        &self,
        transaction: SignedTransaction,
        options: ResponseOptions,
    ) -> Result<TransactionResponse, SdkError> {
        self.execute(transaction, options)
    }

    async fn object_ref(&self, id: ObjectId) -> Result<ObjectRef, SdkError> {
        LocalLedger::object_ref(self, id).ok_or_else(|| SdkError::ObjectNotFound {
            id,
            reason: "not in the local ledger".to_string(),
        })
    }

    async fn reference_gas_price(&self) -> Result<u64, SdkError> {
        Ok(LOCAL_GAS_PRICE)
    }

    /// The local ledger holds no coins, so transactions go unpaid.
    async fn select_gas(
        &self,
        _owner: AccountAddress,
        _budget: u64,
    ) -> Result<Vec<ObjectRef>, SdkError> {
        Ok(vec![])
    }
}

/// A value flowing between commands.
#[derive(Debug)]
enum Value {
    Pure(Vec<u8>),
    Object(ObjectId),
    Cap(UpgradeCap),
    Policy {
        policy: PolicyObject,
        module: PolicyModule,
    },
    Ticket(UpgradeTicket),
    Receipt(UpgradeReceipt),
}

impl Value {
    /// Values that must be consumed before the transaction ends.
    fn is_linear(&self) -> bool {
        !matches!(self, Value::Pure(_) | Value::Object(_))
    }

    fn describe(&self) -> String {
        match self {
            Value::Pure(_) => "pure value".to_string(),
            Value::Object(id) => format!("object {}", id),
            Value::Cap(cap) => format!("upgrade capability {}", cap.id()),
            Value::Policy { policy, .. } => format!("policy {}", policy.id()),
            Value::Ticket(ticket) => format!("upgrade ticket of policy {}", ticket.policy()),
            Value::Receipt(receipt) => format!("upgrade receipt of policy {}", receipt.policy()),
        }
    }
}

type CommandFailure = (Option<u16>, UpgradeError);

fn command_index(index: usize) -> u16 {
    u16::try_from(index).unwrap_or(u16::MAX)
}

struct Session<'a> {
    store: &'a mut Store,
    sender: AccountAddress,
    context: PolicyContext,
    tx_digest: TransactionDigest,
    tx_sequence: u64,
    /// Version everything written by this transaction takes.
    lamport_version: u64,
    ids_created: u64,
    inputs: Vec<CallArg>,
    results: Vec<Option<Value>>,
    changes: Vec<ObjectChange>,
}

impl<'a> Session<'a> {
    fn new(
        store: &'a mut Store,
        sender: AccountAddress,
        context: PolicyContext,
        tx_digest: TransactionDigest,
        tx_sequence: u64,
    ) -> Self {
        Self {
            store,
            sender,
            context,
            tx_digest,
            tx_sequence,
            lamport_version: 1,
            ids_created: 0,
            inputs: vec![],
            results: vec![],
            changes: vec![],
        }
    }

    fn run(&mut self, transaction: &ProgrammableTransaction) -> Result<(), CommandFailure> {
        if transaction.inputs.len() > MAX_ARGUMENTS || transaction.commands.len() > MAX_ARGUMENTS
        {
            return Err((
                None,
                UpgradeError::InvalidArgument(format!(
                    "a transaction takes at most {} inputs and {} commands",
                    MAX_ARGUMENTS, MAX_ARGUMENTS
                )),
            ));
        }
        let mut max_version = 0;
        for input in &transaction.inputs {
            if let CallArg::Object(arg) = input {
                let version = self.check_input_object(arg).map_err(|error| (None, error))?;
                max_version = max_version.max(version);
            }
        }
        self.lamport_version = max_version + 1;
        self.inputs = transaction.inputs.clone();

        for (index, command) in transaction.commands.iter().enumerate() {
            let index = command_index(index);
            debug!(index, ?command, "Executing command");
            let result = self
                .execute_command(command)
                .map_err(|error| (Some(index), error))?;
            self.results.push(result);
        }

        for (index, result) in self.results.iter().enumerate() {
            if let Some(value) = result.as_ref().filter(|value| value.is_linear()) {
                let command = command_index(index);
                return Err((Some(command), UpgradeError::UnusedValue {
                    command,
                    value: value.describe(),
                }));
            }
        }
        Ok(())
    }

    /// Returns the version of the object the input refers to.
    fn check_input_object(&self, arg: &ObjectArg) -> UpgradeResult<u64> {
        let ObjectArg::ImmOrOwnedObject(object_ref) = arg else {
            return Err(UpgradeError::InvalidArgument(format!(
                "shared object {} cannot be used here, only owned or immutable objects",
                arg.id()
            )));
        };
        let id = object_ref.object_id;
        let object = self
            .store
            .objects
            .get(&id)
            .ok_or(UpgradeError::ObjectNotFound(id))?;
        if object_ref.version != object.version
            || object_ref.digest != object_digest(id, object.version)
        {
            return Err(UpgradeError::StaleObject {
                id,
                given: object_ref.version,
                current: object.version,
            });
        }
        match object.owner.address() {
            Some(owner) if owner != self.sender => Err(UpgradeError::ObjectNotOwned(id)),
            None if object.owner != Owner::Immutable => Err(UpgradeError::ObjectNotOwned(id)),
            _ => Ok(object.version),
        }
    }

    fn execute_command(&mut self, command: &Command) -> UpgradeResult<Option<Value>> {
        match command {
            Command::Publish(modules, dependencies) => {
                self.publish(modules, dependencies).map(Some)
            },
            Command::Upgrade(modules, dependencies, package, ticket) => self
                .upgrade(modules, dependencies, *package, *ticket)
                .map(Some),
            Command::MoveCall(call) => {
                if !call.type_arguments.is_empty() {
                    return Err(UpgradeError::InvalidArgument(format!(
                        "{} takes no type arguments",
                        call.target()
                    )));
                }
                self.move_call(&call.target(), &call.arguments)
            },
            Command::TransferObjects(objects, recipient) => {
                self.transfer_objects(objects, *recipient)?;
                Ok(None)
            },
            Command::SplitCoins(..) | Command::MergeCoins(..) | Command::MakeMoveVec(..) => Err(
                UpgradeError::InvalidArgument("coin and vector commands are not supported".into()),
            ),
        }
    }

    fn fresh_id(&mut self) -> ObjectId {
        let digest = Digest::hash_all([
            self.tx_digest.inner().as_bytes().as_slice(),
            self.tx_sequence.to_le_bytes().as_slice(),
            self.ids_created.to_le_bytes().as_slice(),
        ]);
        self.ids_created += 1;
        ObjectId::new(*digest.as_bytes())
    }

    fn take(&mut self, argument: Argument) -> UpgradeResult<Value> {
        match argument {
            Argument::Input(index) => match self.inputs.get(index as usize) {
                Some(CallArg::Pure(bytes)) => Ok(Value::Pure(bytes.clone())),
                Some(CallArg::Object(arg)) => Ok(Value::Object(arg.id())),
                None => Err(UpgradeError::InvalidArgument(format!(
                    "input {} does not exist",
                    index
                ))),
            },
            Argument::Result(index) => self
                .results
                .get_mut(index as usize)
                .and_then(Option::take)
                .ok_or_else(|| {
                    UpgradeError::InvalidArgument(format!(
                        "result of command {} is not available",
                        index
                    ))
                }),
            Argument::GasCoin | Argument::NestedResult(..) => Err(UpgradeError::InvalidArgument(
                format!("{:?} is not supported as an argument", argument),
            )),
        }
    }

    fn take_pure(&mut self, argument: Argument) -> UpgradeResult<Vec<u8>> {
        match self.take(argument)? {
            Value::Pure(bytes) => Ok(bytes),
            other => Err(UpgradeError::InvalidArgument(format!(
                "expected a pure value, got {}",
                other.describe()
            ))),
        }
    }

    /// Keeps the first change recorded for an object, except that a wrapped
    /// object may come back. A later owner change still updates the record.
    fn record(&mut self, change: ObjectChange) {
        let id = change.object_id();
        let known = self.changes.iter_mut().find(|existing| {
            existing.object_id() == id && !matches!(existing, ObjectChange::Wrapped { .. })
        });
        match (known, change) {
            (None, change) => self.changes.push(change),
            (
                Some(ObjectChange::Created { owner, .. } | ObjectChange::Mutated { owner, .. }),
                ObjectChange::Mutated {
                    owner: new_owner, ..
                },
            ) => *owner = new_owner,
            (
                Some(ObjectChange::Created { owner, .. } | ObjectChange::Mutated { owner, .. }),
                ObjectChange::Transferred { recipient, .. },
            ) => *owner = recipient,
            _ => {},
        }
    }

    fn check_dependencies(&self, dependencies: &[ObjectId]) -> UpgradeResult<()> {
        for dependency in dependencies {
            match self.store.objects.get(dependency) {
                Some(StoredObject {
                    data: ObjectData::Package(_),
                    ..
                }) => {},
                Some(_) => {
                    return Err(UpgradeError::MalformedPackage(format!(
                        "dependency {} is not a package",
                        dependency
                    )))
                },
                None => return Err(UpgradeError::ObjectNotFound(*dependency)),
            }
        }
        Ok(())
    }

    fn store_package(&mut self, package_id: ObjectId, package: Package) {
        self.record(ObjectChange::Published {
            package_id,
            version: package.version,
            digest: object_digest(package_id, package.version),
            modules: vec![],
        });
        self.store
            .objects
            .insert(package_id, StoredObject::package(package));
    }

    fn publish(&mut self, modules: &[Vec<u8>], dependencies: &[ObjectId]) -> UpgradeResult<Value> {
        if modules.is_empty() {
            return Err(UpgradeError::MalformedPackage(
                "a package needs at least one module".to_string(),
            ));
        }
        self.check_dependencies(dependencies)?;

        let package_id = self.fresh_id();
        self.store_package(
            package_id,
            Package::new(1, modules.to_vec(), dependencies.to_vec()),
        );

        let cap_id = self.fresh_id();
        debug!(package = %package_id, cap = %cap_id, "Published package");
        Ok(Value::Cap(UpgradeCap::new(cap_id, package_id)))
    }

    fn upgrade(
        &mut self,
        modules: &[Vec<u8>],
        dependencies: &[ObjectId],
        package_id: ObjectId,
        ticket: Argument,
    ) -> UpgradeResult<Value> {
        let ticket = match self.take(ticket)? {
            Value::Ticket(ticket) => ticket,
            other => {
                return Err(UpgradeError::InvalidArgument(format!(
                    "upgrade needs a ticket, got {}",
                    other.describe()
                )))
            },
        };
        if modules.is_empty() {
            return Err(UpgradeError::MalformedPackage(
                "a package needs at least one module".to_string(),
            ));
        }
        let current = match self.store.objects.get(&package_id) {
            Some(StoredObject {
                data: ObjectData::Package(package),
                ..
            }) => package.clone(),
            Some(_) => {
                return Err(UpgradeError::InvalidArgument(format!(
                    "{} is not a package",
                    package_id
                )))
            },
            None => return Err(UpgradeError::ObjectNotFound(package_id)),
        };
        self.check_dependencies(dependencies)?;
        if ticket.level() == UpgradeLevel::DepOnly && current.modules != modules {
            return Err(UpgradeError::MalformedPackage(
                "a dependency-only upgrade cannot change module bytes".to_string(),
            ));
        }

        let package = Package::new(current.version + 1, modules.to_vec(), dependencies.to_vec());
        let new_id = self.fresh_id();
        let receipt = ticket.redeem(package_id, package.digest, new_id)?;

        debug!(from = %package_id, to = %new_id, version = package.version, "Upgraded package");
        self.store_package(new_id, package);
        Ok(Value::Receipt(receipt))
    }

    fn transfer_objects(&mut self, objects: &[Argument], recipient: Argument) -> UpgradeResult<()> {
        let recipient: AccountAddress =
            policy_calls::decode_pure(&self.take_pure(recipient)?, "recipient")?;
        let new_owner = Owner::AddressOwner(recipient);
        for object in objects {
            let (id, data) = match self.take(*object)? {
                Value::Cap(cap) => (cap.id(), ObjectData::UpgradeCap(cap)),
                Value::Policy { policy, module } => {
                    (policy.id(), ObjectData::Policy { policy, module })
                },
                Value::Object(id) => {
                    let version = self.lamport_version;
                    let sender = self.sender;
                    let stored = self
                        .store
                        .objects
                        .get_mut(&id)
                        .ok_or(UpgradeError::ObjectNotFound(id))?;
                    if stored.owner == Owner::Immutable {
                        return Err(UpgradeError::InvalidArgument(format!(
                            "immutable object {} cannot be transferred",
                            id
                        )));
                    }
                    let previous_owner = stored.owner;
                    let previous_version = stored.version;
                    stored.owner = new_owner;
                    stored.version = version;
                    let object_type = stored.data.type_name();
                    let digest = object_digest(id, version);
                    self.record(if previous_owner == new_owner {
                        ObjectChange::Mutated {
                            sender,
                            owner: new_owner,
                            object_type,
                            object_id: id,
                            version,
                            previous_version,
                            digest,
                        }
                    } else {
                        ObjectChange::Transferred {
                            sender,
                            recipient: new_owner,
                            object_type,
                            object_id: id,
                            version,
                            digest,
                        }
                    });
                    continue;
                },
                other => {
                    return Err(UpgradeError::InvalidArgument(format!(
                        "{} cannot be transferred",
                        other.describe()
                    )))
                },
            };
            self.record(ObjectChange::Created {
                sender: self.sender,
                owner: new_owner,
                object_type: data.type_name(),
                object_id: id,
                version: self.lamport_version,
                digest: object_digest(id, self.lamport_version),
            });
            self.store.objects.insert(id, StoredObject {
                owner: new_owner,
                version: self.lamport_version,
                data,
            });
        }
        Ok(())
    }

    fn move_call(
        &mut self,
        target: &MoveCallTarget,
        arguments: &[Argument],
    ) -> UpgradeResult<Option<Value>> {
        if !self.store.policy_packages.contains(&target.package) {
            if !self.store.objects.contains_key(&target.package) {
                return Err(UpgradeError::ObjectNotFound(target.package));
            }
            return Err(UpgradeError::UnknownFunction(target.to_string()));
        }
        if !POLICY_MODULES.contains(&target.module.as_str()) {
            return Err(UpgradeError::UnknownFunction(target.to_string()));
        }

        let arity = match target.function.as_str() {
            NEW_POLICY => None,
            AUTHORIZE_UPGRADE => Some(3),
            COMMIT_UPGRADE | DISCARD_TICKET | RESTRICT => Some(2),
            MAKE_IMMUTABLE => Some(1),
            _ => return Err(UpgradeError::UnknownFunction(target.to_string())),
        };
        if let Some(arity) = arity {
            if arguments.len() != arity {
                return Err(UpgradeError::InvalidArgument(format!(
                    "{} takes {} arguments, got {}",
                    target,
                    arity,
                    arguments.len()
                )));
            }
        }

        match target.function.as_str() {
            NEW_POLICY => self.new_policy(target, arguments).map(Some),
            AUTHORIZE_UPGRADE => {
                let level = self.take_pure(arguments[1])?;
                let level = policy_calls::decode_pure::<u8>(&level, "level")?;
                let level = UpgradeLevel::try_from(level)?;
                let digest: Vec<u8> =
                    policy_calls::decode_pure(&self.take_pure(arguments[2])?, "digest")?;
                let digest = Digest::from_slice(&digest)
                    .map_err(|err| UpgradeError::InvalidArgument(err.to_string()))?;
                let ticket = self.with_policy(target, arguments[0], |policy, context| {
                    policy.authorize_upgrade(level, digest, context)
                })?;
                Ok(Some(Value::Ticket(ticket)))
            },
            COMMIT_UPGRADE => {
                let receipt = match self.take(arguments[1])? {
                    Value::Receipt(receipt) => receipt,
                    other => {
                        return Err(UpgradeError::InvalidArgument(format!(
                            "commit needs a receipt, got {}",
                            other.describe()
                        )))
                    },
                };
                self.with_policy(target, arguments[0], |policy, _| {
                    policy.commit_upgrade(receipt)
                })?;
                Ok(None)
            },
            DISCARD_TICKET => {
                let ticket = match self.take(arguments[1])? {
                    Value::Ticket(ticket) => ticket,
                    other => {
                        return Err(UpgradeError::InvalidArgument(format!(
                            "discard needs a ticket, got {}",
                            other.describe()
                        )))
                    },
                };
                self.with_policy(target, arguments[0], |policy, _| {
                    policy.discard_ticket(ticket)
                })?;
                Ok(None)
            },
            RESTRICT => {
                let level = self.take_pure(arguments[1])?;
                let level = policy_calls::decode_pure::<u8>(&level, "level")?;
                let level = UpgradeLevel::try_from(level)?;
                self.with_policy(target, arguments[0], |policy, _| policy.restrict(level))?;
                Ok(None)
            },
            _ => {
                self.with_policy(target, arguments[0], |policy, _| policy.make_immutable())?;
                Ok(None)
            },
        }
    }

    fn new_policy(
        &mut self,
        target: &MoveCallTarget,
        arguments: &[Argument],
    ) -> UpgradeResult<Value> {
        let Some((cap, config)) = arguments.split_first() else {
            return Err(UpgradeError::InvalidArgument(format!(
                "{} needs an upgrade capability",
                target
            )));
        };
        let config = config
            .iter()
            .map(|argument| self.take_pure(*argument))
            .collect::<UpgradeResult<Vec<_>>>()?;
        let config: Vec<&[u8]> = config.iter().map(Vec::as_slice).collect();
        let rule = policy_calls::decode_rule(&target.module, &config)?;

        let cap = match self.take(*cap)? {
            Value::Cap(cap) => cap,
            Value::Object(id) => {
                let object = self
                    .store
                    .objects
                    .remove(&id)
                    .ok_or(UpgradeError::ObjectNotFound(id))?;
                let ObjectData::UpgradeCap(cap) = object.data else {
                    return Err(UpgradeError::InvalidArgument(format!(
                        "{} is not an upgrade capability",
                        id
                    )));
                };
                self.record(ObjectChange::Wrapped {
                    sender: self.sender,
                    object_type: UPGRADE_CAP_TYPE.to_string(),
                    object_id: id,
                    version: self.lamport_version,
                });
                cap
            },
            other => {
                return Err(UpgradeError::InvalidArgument(format!(
                    "{} needs an upgrade capability, got {}",
                    target,
                    other.describe()
                )))
            },
        };

        let id = self.fresh_id();
        let policy = PolicyObject::wrap_capability(id, cap, rule)?;
        Ok(Value::Policy {
            policy,
            module: PolicyModule::new(target.package, &target.module),
        })
    }

    /// Runs `operation` on the policy object passed as `argument`.
    fn with_policy<T>(
        &mut self,
        target: &MoveCallTarget,
        argument: Argument,
        operation: impl FnOnce(&mut PolicyObject, &PolicyContext) -> UpgradeResult<T>,
    ) -> UpgradeResult<T> {
        let id = match self.take(argument)? {
            Value::Object(id) => id,
            other => {
                return Err(UpgradeError::InvalidArgument(format!(
                    "{} needs a policy object input, got {}",
                    target,
                    other.describe()
                )))
            },
        };
        let version = self.lamport_version;
        let stored = self
            .store
            .objects
            .get_mut(&id)
            .ok_or(UpgradeError::ObjectNotFound(id))?;
        if stored.owner == Owner::Immutable {
            return Err(UpgradeError::InvalidArgument(format!(
                "{} is immutable",
                id
            )));
        }
        let owner = stored.owner;
        let previous_version = stored.version;
        let ObjectData::Policy { policy, module } = &mut stored.data else {
            return Err(UpgradeError::InvalidArgument(format!(
                "{} is not a policy object",
                id
            )));
        };
        if module.package() != target.package || module.module() != target.module {
            return Err(UpgradeError::InvalidArgument(format!(
                "policy {} is a {}, not managed by {}::{}",
                id,
                module.policy_type(),
                target.package,
                target.module
            )));
        }
        let object_type = module.policy_type();
        let output = operation(policy, &self.context)?;
        stored.version = version;
        self.record(ObjectChange::Mutated {
            sender: self.sender,
            owner,
            object_type,
            object_id: id,
            version,
            previous_version,
            digest: object_digest(id, version),
        });
        Ok(output)
    }
}
