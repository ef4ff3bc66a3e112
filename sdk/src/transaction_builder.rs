// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Programmable transactions: a list of inputs plus a list of commands whose
//! results can feed later commands. The whole list executes atomically.
//!
//! Every type here serializes with BCS in the layout full nodes decode, so
//! variant order matters and must not change.

use crate::{
    digests::{ObjectRef, TransactionDigest},
    error::SdkError,
};
use policy_upgrade_types::{AccountAddress, Digest, ObjectId};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Reference to a transaction input or to the result of an earlier command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Argument {
    GasCoin,
    Input(u16),
    Result(u16),
    NestedResult(u16, u16),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectArg {
    ImmOrOwnedObject(ObjectRef),
    SharedObject {
        id: ObjectId,
        initial_shared_version: u64,
        mutable: bool,
    },
}

impl ObjectArg {
    pub fn id(&self) -> ObjectId {
        match self {
            ObjectArg::ImmOrOwnedObject(object_ref) => object_ref.object_id,
            ObjectArg::SharedObject { id, .. } => *id,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// A BCS encoded value.
    Pure(Vec<u8>),
    Object(ObjectArg),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeTag {
    Bool,
    U8,
    U64,
    U128,
    Address,
    Signer,
    Vector(Box<TypeTag>),
    Struct(Box<StructTag>),
    U16,
    U32,
    U256,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructTag {
    pub address: AccountAddress,
    pub module: String,
    pub name: String,
    pub type_params: Vec<TypeTag>,
}

/// `<package>::<module>::<function>`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveCallTarget {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
}

impl MoveCallTarget {
    pub fn new(package: ObjectId, module: &str, function: &str) -> Self {
        Self {
            package,
            module: module.to_string(),
            function: function.to_string(),
        }
    }
}

impl fmt::Display for MoveCallTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}::{}", self.package, self.module, self.function)
    }
}

impl FromStr for MoveCallTarget {
    type Err = SdkError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let ids: Vec<&str> = s.split_terminator("::").collect();
        let [package, module, function] = ids.as_slice() else {
            return Err(SdkError::InvalidTransaction(format!(
                "Call target '{}' is not well formed. Must be of the form <package>::<module>::<function>",
                s
            )));
        };
        if !is_identifier(module) || !is_identifier(function) {
            return Err(SdkError::InvalidTransaction(format!(
                "Call target '{}' has an invalid module or function name",
                s
            )));
        }
        let package = ObjectId::from_hex_literal(package)
            .map_err(|err| SdkError::InvalidTransaction(err.to_string()))?;
        Ok(Self::new(package, module, function))
    }
}

fn is_identifier(name: &str) -> bool {
    name.chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableMoveCall {
    pub package: ObjectId,
    pub module: String,
    pub function: String,
    pub type_arguments: Vec<TypeTag>,
    pub arguments: Vec<Argument>,
}

impl ProgrammableMoveCall {
    pub fn target(&self) -> MoveCallTarget {
        MoveCallTarget::new(self.package, &self.module, &self.function)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Command {
    MoveCall(Box<ProgrammableMoveCall>),
    /// Objects, then the recipient address.
    TransferObjects(Vec<Argument>, Argument),
    SplitCoins(Argument, Vec<Argument>),
    MergeCoins(Argument, Vec<Argument>),
    /// Modules and dependencies. Returns the new package's `UpgradeCap`.
    Publish(Vec<Vec<u8>>, Vec<ObjectId>),
    MakeMoveVec(Option<TypeTag>, Vec<Argument>),
    /// Modules, dependencies, the package being replaced and the ticket.
    /// Returns the `UpgradeReceipt`.
    Upgrade(Vec<Vec<u8>>, Vec<ObjectId>, ObjectId, Argument),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgrammableTransaction {
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionKind {
    ProgrammableTransaction(ProgrammableTransaction),
}

/// Coins paying for the transaction, and the price and budget in MIST.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    pub payment: Vec<ObjectRef>,
    pub owner: AccountAddress,
    pub price: u64,
    pub budget: u64,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExpiration {
    #[default]
    None,
    Epoch(u64),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionDataV1 {
    pub kind: TransactionKind,
    pub sender: AccountAddress,
    pub gas_data: GasData,
    pub expiration: TransactionExpiration,
}

/// What gets signed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionData {
    V1(TransactionDataV1),
}

impl TransactionData {
    /// A programmable transaction paid for by the sender's own coins.
    pub fn new_programmable(
        sender: AccountAddress,
        gas_payment: Vec<ObjectRef>,
        transaction: ProgrammableTransaction,
        gas_budget: u64,
        gas_price: u64,
    ) -> Self {
        TransactionData::V1(TransactionDataV1 {
            kind: TransactionKind::ProgrammableTransaction(transaction),
            sender,
            gas_data: GasData {
                payment: gas_payment,
                owner: sender,
                price: gas_price,
                budget: gas_budget,
            },
            expiration: TransactionExpiration::None,
        })
    }

    pub fn sender(&self) -> AccountAddress {
        let TransactionData::V1(data) = self;
        data.sender
    }

    pub fn gas_data(&self) -> &GasData {
        let TransactionData::V1(data) = self;
        &data.gas_data
    }

    pub fn programmable(&self) -> &ProgrammableTransaction {
        let TransactionData::V1(data) = self;
        let TransactionKind::ProgrammableTransaction(transaction) = &data.kind;
        transaction
    }

    pub fn programmable_mut(&mut self) -> &mut ProgrammableTransaction {
        let TransactionData::V1(data) = self;
        let TransactionKind::ProgrammableTransaction(transaction) = &mut data.kind;
        transaction
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SdkError> {
        Ok(bcs::to_bytes(self)?)
    }

    /// Digest of the data, independent of any signature.
    pub fn digest(&self) -> Result<TransactionDigest, SdkError> {
        let bytes = self.to_bytes()?;
        Ok(TransactionDigest::new(Digest::hash_all([
            b"TransactionData::".as_slice(),
            bytes.as_slice(),
        ])))
    }
}

#[derive(Debug, Default)]
pub struct ProgrammableTransactionBuilder {
    inputs: Vec<CallArg>,
    commands: Vec<Command>,
}

impl ProgrammableTransactionBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a BCS encoded input value.
    pub fn pure<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<Argument, SdkError> {
        let bytes = bcs::to_bytes(value)?;
        self.input(CallArg::Pure(bytes))
    }

    /// Adds an owned or immutable object input. The same object always maps
    /// to the same input.
    pub fn object(&mut self, object_ref: ObjectRef) -> Result<Argument, SdkError> {
        self.object_arg(ObjectArg::ImmOrOwnedObject(object_ref))
    }

    pub fn shared_object(
        &mut self,
        id: ObjectId,
        initial_shared_version: u64,
        mutable: bool,
    ) -> Result<Argument, SdkError> {
        self.object_arg(ObjectArg::SharedObject {
            id,
            initial_shared_version,
            mutable,
        })
    }

    fn object_arg(&mut self, arg: ObjectArg) -> Result<Argument, SdkError> {
        let existing = self.inputs.iter().position(|input| match input {
            CallArg::Object(object) => object.id() == arg.id(),
            CallArg::Pure(_) => false,
        });
        match existing {
            Some(index) => Ok(Argument::Input(Self::index(index, "input")?)),
            None => self.input(CallArg::Object(arg)),
        }
    }

    pub fn publish(
        &mut self,
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
    ) -> Result<Argument, SdkError> {
        self.command(Command::Publish(modules, dependencies))
    }

    pub fn upgrade(
        &mut self,
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
        package: ObjectId,
        ticket: Argument,
    ) -> Result<Argument, SdkError> {
        self.command(Command::Upgrade(modules, dependencies, package, ticket))
    }

    pub fn move_call(
        &mut self,
        target: MoveCallTarget,
        arguments: Vec<Argument>,
    ) -> Result<Argument, SdkError> {
        self.command(Command::MoveCall(Box::new(ProgrammableMoveCall {
            package: target.package,
            module: target.module,
            function: target.function,
            type_arguments: vec![],
            arguments,
        })))
    }

    pub fn transfer_objects(
        &mut self,
        objects: Vec<Argument>,
        recipient: AccountAddress,
    ) -> Result<(), SdkError> {
        let recipient = self.pure(&recipient)?;
        self.command(Command::TransferObjects(objects, recipient))?;
        Ok(())
    }

    pub fn finish(self) -> ProgrammableTransaction {
        ProgrammableTransaction {
            inputs: self.inputs,
            commands: self.commands,
        }
    }

    fn index(index: usize, what: &str) -> Result<u16, SdkError> {
        u16::try_from(index).map_err(|_| {
            SdkError::InvalidTransaction(format!(
                "a transaction cannot have more than {} {}s",
                u16::MAX as usize + 1,
                what
            ))
        })
    }

    fn input(&mut self, arg: CallArg) -> Result<Argument, SdkError> {
        let index = Self::index(self.inputs.len(), "input")?;
        self.inputs.push(arg);
        Ok(Argument::Input(index))
    }

    fn command(&mut self, command: Command) -> Result<Argument, SdkError> {
        let index = Self::index(self.commands.len(), "command")?;
        self.commands.push(command);
        Ok(Argument::Result(index))
    }
}
