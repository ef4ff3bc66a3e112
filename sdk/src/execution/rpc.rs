// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use super::{ExecutionLayer, ResponseOptions, TransactionResponse};
use crate::{
    crypto::SignedTransaction,
    digests::{ObjectDigest, ObjectRef},
    error::SdkError,
    serde_helpers::{lenient_u64, string_u64},
};
use async_trait::async_trait;
use policy_upgrade_types::{AccountAddress, ObjectId};
use reqwest::{header::CONTENT_TYPE, Client as ReqwestClient};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};
use tracing::debug;
use url::Url;

pub const EXECUTE_TRANSACTION_METHOD: &str = "sui_executeTransactionBlock";
pub const GET_OBJECT_METHOD: &str = "sui_getObject";
pub const GET_COINS_METHOD: &str = "suix_getCoins";
pub const REFERENCE_GAS_PRICE_METHOD: &str = "suix_getReferenceGasPrice";
pub const SUI_COIN_TYPE: &str = "0x2::sui::SUI";
const WAIT_FOR_LOCAL_EXECUTION: &str = "WaitForLocalExecution";
const JSON: &str = "application/json";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const COIN_PAGE_SIZE: u64 = 50;
/// Most coins a transaction may pay gas with.
const MAX_GAS_COINS: usize = 256;

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
struct ObjectResponse {
    data: Option<ObjectRef>,
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct GasPrice(#[serde(with = "string_u64")] u64);

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Coin {
    coin_object_id: ObjectId,
    #[serde(with = "lenient_u64")]
    version: u64,
    digest: ObjectDigest,
    #[serde(with = "string_u64")]
    balance: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CoinPage {
    data: Vec<Coin>,
    next_cursor: Option<String>,
    #[serde(default)]
    has_next_page: bool,
}

/// Coins picked in the order the node lists them until the budget is covered.
#[derive(Debug, Default)]
struct GasSelection {
    coins: Vec<ObjectRef>,
    available: u64,
}

impl GasSelection {
    /// Returns true once the selection covers `budget`.
    fn add(&mut self, coin: &Coin, budget: u64) -> bool {
        if self.coins.len() < MAX_GAS_COINS {
            self.coins
                .push(ObjectRef::new(coin.coin_object_id, coin.version, coin.digest));
            self.available = self.available.saturating_add(coin.balance);
        }
        self.is_covered(budget)
    }

    fn is_covered(&self, budget: u64) -> bool {
        !self.coins.is_empty() && self.available >= budget
    }

    fn is_full(&self) -> bool {
        self.coins.len() >= MAX_GAS_COINS
    }
}

/// Submits transactions to a full node over JSON-RPC 2.0.
#[derive(Debug)]
pub struct RpcClient {
    url: Url,
    inner: ReqwestClient,
    next_id: AtomicU64,
}

impl RpcClient {
    pub fn new(url: Url) -> Result<Self, SdkError> {
        let inner = ReqwestClient::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            url,
            inner,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Positional parameters of the execute call.
    pub fn execute_params(
        transaction: &SignedTransaction,
        options: ResponseOptions,
    ) -> Result<Value, SdkError> {
        let tx_bytes = base64::encode(transaction.data.to_bytes()?);
        let signatures: Vec<String> = transaction
            .signatures
            .iter()
            .map(|signature| signature.to_base64())
            .collect();
        Ok(json!([
            tx_bytes,
            signatures,
            options,
            WAIT_FOR_LOCAL_EXECUTION
        ]))
    }

    async fn call<O: DeserializeOwned>(&self, method: &str, params: Value) -> Result<O, SdkError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };
        debug!(url = %self.url, method, id = request.id, "Sending JSON-RPC request");
        let response = self
            .inner
            .post(self.url.clone())
            .header(CONTENT_TYPE, JSON)
            .body(serde_json::to_string(&request)?)
            .send()
            .await?
            .error_for_status()?;

        let response: JsonRpcResponse<O> = response.json().await?;
        if let Some(error) = response.error {
            return Err(SdkError::Rpc {
                code: error.code,
                message: error.message,
            });
        }
        response.result.ok_or_else(|| SdkError::Rpc {
            code: 0,
            message: "response has neither a result nor an error".to_string(),
        })
    }
}

#[async_trait]
impl ExecutionLayer for RpcClient {
    async fn execute_transaction(
        &self,
        transaction: SignedTransaction,
        options: ResponseOptions,
    ) -> Result<TransactionResponse, SdkError> {
        let params = Self::execute_params(&transaction, options)?;
        self.call(EXECUTE_TRANSACTION_METHOD, params).await
    }

    async fn object_ref(&self, id: ObjectId) -> Result<ObjectRef, SdkError> {
        let response: ObjectResponse = self.call(GET_OBJECT_METHOD, json!([id, {}])).await?;
        match response {
            ObjectResponse {
                data: Some(object_ref),
                ..
            } => Ok(object_ref),
            ObjectResponse { error, .. } => Err(SdkError::ObjectNotFound {
                id,
                reason: error
                    .map(|error| error.to_string())
                    .unwrap_or_else(|| "no data returned".to_string()),
            }),
        }
    }

    async fn reference_gas_price(&self) -> Result<u64, SdkError> {
        let GasPrice(price) = self.call(REFERENCE_GAS_PRICE_METHOD, json!([])).await?;
        Ok(price)
    }

    async fn select_gas(
        &self,
        owner: AccountAddress,
        budget: u64,
    ) -> Result<Vec<ObjectRef>, SdkError> {
        let mut selection = GasSelection::default();
        let mut cursor: Option<String> = None;
        loop {
            let page: CoinPage = self
                .call(
                    GET_COINS_METHOD,
                    json!([owner, SUI_COIN_TYPE, cursor, COIN_PAGE_SIZE]),
                )
                .await?;
            for coin in &page.data {
                if selection.add(coin, budget) {
                    debug!(%owner, coins = selection.coins.len(), budget, "Selected gas coins");
                    return Ok(selection.coins);
                }
            }
            match page.next_cursor {
                Some(next) if page.has_next_page && !selection.is_full() => cursor = Some(next),
                _ => break,
            }
        }
        Err(SdkError::InsufficientGas {
            owner,
            available: selection.available,
            budget,
        })
    }
}
