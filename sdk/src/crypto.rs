// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Ed25519 keys, account addresses and transaction signatures.
//!
//! A serialized signature is `flag || signature || public key`, so a verifier
//! recovers the signer's address from the signature alone.

use crate::{digests::TransactionDigest, error::SdkError, transaction_builder::TransactionData};
use ed25519_dalek::{Keypair, PublicKey, SecretKey, Signature, Signer, Verifier};
use policy_upgrade_types::{AccountAddress, Digest};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Intent prefix of transaction data: scope, version and app id, all zero.
const TRANSACTION_INTENT: [u8; 3] = [0, 0, 0];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SignatureScheme {
    Ed25519,
}

impl SignatureScheme {
    pub const fn flag(self) -> u8 {
        match self {
            SignatureScheme::Ed25519 => 0x00,
        }
    }
}

impl TryFrom<u8> for SignatureScheme {
    type Error = SdkError;

    fn try_from(flag: u8) -> Result<Self, Self::Error> {
        match flag {
            0x00 => Ok(SignatureScheme::Ed25519),
            other => Err(SdkError::InvalidSignature(format!(
                "unsupported signature scheme flag {:#04x}",
                other
            ))),
        }
    }
}

/// `Blake2b-256(flag || public key)`
pub fn derive_address(scheme: SignatureScheme, public_key: &[u8]) -> AccountAddress {
    let digest = Digest::hash_all([[scheme.flag()].as_slice(), public_key]);
    AccountAddress::new(*digest.as_bytes())
}

/// The message a transaction signer actually signs.
pub fn signing_digest(data: &TransactionData) -> Result<Digest, SdkError> {
    let bytes = data.to_bytes()?;
    Ok(Digest::hash_all([TRANSACTION_INTENT.as_slice(), bytes.as_slice()]))
}

pub struct Ed25519KeyPair {
    keypair: Keypair,
}

impl Ed25519KeyPair {
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SdkError> {
        let secret = SecretKey::from_bytes(bytes)
            .map_err(|err| SdkError::InvalidKeystore(err.to_string()))?;
        let public = PublicKey::from(&secret);
        Ok(Self {
            keypair: Keypair { secret, public },
        })
    }

    pub fn public_key_bytes(&self) -> [u8; 32] {
        self.keypair.public.to_bytes()
    }

    pub fn address(&self) -> AccountAddress {
        derive_address(SignatureScheme::Ed25519, self.keypair.public.as_bytes())
    }

    pub fn sign_transaction(&self, data: &TransactionData) -> Result<GenericSignature, SdkError> {
        let digest = signing_digest(data)?;
        let signature = self.keypair.sign(digest.as_bytes());

        let mut bytes = Vec::with_capacity(1 + 64 + 32);
        bytes.push(SignatureScheme::Ed25519.flag());
        bytes.extend_from_slice(&signature.to_bytes());
        bytes.extend_from_slice(self.keypair.public.as_bytes());
        Ok(GenericSignature(bytes))
    }
}

impl fmt::Debug for Ed25519KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ed25519KeyPair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// `flag || signature || public key`
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenericSignature(Vec<u8>);

impl GenericSignature {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_base64(&self) -> String {
        base64::encode(&self.0)
    }

    /// Verifies the signature over `digest` and returns the signer's address.
    pub fn verify(&self, digest: &Digest) -> Result<AccountAddress, SdkError> {
        let (flag, rest) = self
            .0
            .split_first()
            .ok_or_else(|| SdkError::InvalidSignature("empty signature".to_string()))?;
        let scheme = SignatureScheme::try_from(*flag)?;
        if rest.len() != 64 + 32 {
            return Err(SdkError::InvalidSignature(format!(
                "expected 96 bytes after the scheme flag, got {}",
                rest.len()
            )));
        }
        let (signature, public_key) = rest.split_at(64);
        let invalid =
            |err: ed25519_dalek::SignatureError| SdkError::InvalidSignature(err.to_string());
        let signature = Signature::try_from(signature).map_err(invalid)?;
        let public = PublicKey::from_bytes(public_key).map_err(invalid)?;
        public
            .verify(digest.as_bytes(), &signature)
            .map_err(invalid)?;
        Ok(derive_address(scheme, public_key))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub data: TransactionData,
    pub signatures: Vec<GenericSignature>,
}

impl SignedTransaction {
    /// Signs `data` with the sender's key.
    pub fn sign(data: TransactionData, sender: &Ed25519KeyPair) -> Result<Self, SdkError> {
        if sender.address() != data.sender() {
            return Err(SdkError::InvalidSignature(format!(
                "key of {} cannot sign for sender {}",
                sender.address(),
                data.sender()
            )));
        }
        let signature = sender.sign_transaction(&data)?;
        Ok(Self {
            data,
            signatures: vec![signature],
        })
    }

    /// Adds the signature of another account, e.g. an approver of a
    /// multi-signer policy.
    pub fn add_signature(&mut self, signer: &Ed25519KeyPair) -> Result<(), SdkError> {
        let signature = signer.sign_transaction(&self.data)?;
        self.signatures.push(signature);
        Ok(())
    }

    /// Checks every signature and that the sender is among the signers.
    /// Returns all verified signers.
    pub fn verify(&self) -> Result<BTreeSet<AccountAddress>, SdkError> {
        let digest = signing_digest(&self.data)?;
        let signers = self
            .signatures
            .iter()
            .map(|signature| signature.verify(&digest))
            .collect::<Result<BTreeSet<_>, _>>()?;
        if !signers.contains(&self.data.sender()) {
            return Err(SdkError::InvalidSignature(format!(
                "transaction is not signed by its sender {}",
                self.data.sender()
            )));
        }
        Ok(signers)
    }

    /// Transaction digest, independent of the signatures.
    pub fn digest(&self) -> Result<TransactionDigest, SdkError> {
        self.data.digest()
    }
}
