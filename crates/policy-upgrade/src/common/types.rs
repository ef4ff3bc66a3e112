// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::common::utils::{
    create_dir_if_not_exist, current_dir, from_yaml, read_from_file, to_common_result,
    to_common_success_result, to_yaml, write_to_file,
};
use async_trait::async_trait;
use clap::Parser;
use policy_upgrade_sdk::SdkError;
use policy_upgrade_types::{
    policy::{DayOfWeek, MultiSigner, TimeWindow, Weekday},
    AccountAddress, ObjectId, PolicyRule,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::Debug,
    path::{Path, PathBuf},
    str::FromStr,
    time::Instant,
};
use thiserror::Error;
use url::Url;

pub const CONFIG_FOLDER: &str = ".policy-upgrade";
const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_PROFILE: &str = "default";

/// Chain CLI used to build packages and to look up the active address.
pub const DEFAULT_CHAIN_CLI: &str = "sui";
pub const DEFAULT_RPC_URL: &str = "https://fullnode.devnet.sui.io:443";
pub const DEFAULT_POLICY_PACKAGE_ID: &str =
    "0x911a11d99dfe9dc4bec24bfb669636445a68c2763f67b902dee03cfa1557a8c1";
/// 0.1 SUI, in MIST
pub const DEFAULT_GAS_BUDGET: u64 = 100_000_000;

/// A common result to be returned to users
pub type CliResult = Result<String, String>;

/// A common result to remove need for typing `Result<T, CliError>`
pub type CliTypedResult<T> = Result<T, CliError>;

/// CLI Errors for reporting through telemetry and outputs
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Package build failed: {0}")]
    BuildFailure(String),
    #[error("Invalid arguments: {0}")]
    CommandArgumentError(String),
    #[error("Unable to load config: {0} {1}")]
    ConfigLoadError(String, String),
    #[error("Unable to find config {0}, have you run `policy-upgrade init`?")]
    ConfigNotFoundError(String),
    #[error("Error accessing '{0}': {1}")]
    IO(String, #[source] std::io::Error),
    #[error("No key for address {0} in the keystore")]
    KeyNotFound(String),
    #[error("Network request failed: {0}")]
    NetworkFailure(String),
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),
    #[error("Unable to parse '{0}': error: {1}")]
    UnableToParse(&'static str, String),
    #[error("Unable to read file '{0}', error: {1}")]
    UnableToReadFile(String, String),
    #[error("Unexpected error: {0}")]
    UnexpectedError(String),
}

impl CliError {
    pub fn to_str(&self) -> &'static str {
        match self {
            CliError::BuildFailure(_) => "BuildFailure",
            CliError::CommandArgumentError(_) => "CommandArgumentError",
            CliError::ConfigLoadError(_, _) => "ConfigLoadError",
            CliError::ConfigNotFoundError(_) => "ConfigNotFoundError",
            CliError::IO(_, _) => "IO",
            CliError::KeyNotFound(_) => "KeyNotFound",
            CliError::NetworkFailure(_) => "NetworkFailure",
            CliError::TransactionFailed(_) => "TransactionFailed",
            CliError::UnableToParse(_, _) => "UnableToParse",
            CliError::UnableToReadFile(_, _) => "UnableToReadFile",
            CliError::UnexpectedError(_) => "UnexpectedError",
        }
    }
}

impl From<SdkError> for CliError {
    fn from(e: SdkError) -> Self {
        match e {
            SdkError::KeyNotFound { address } => CliError::KeyNotFound(address.to_string()),
            SdkError::InvalidKeystore(msg) => CliError::UnableToParse("keystore", msg),
            SdkError::InvalidSignature(msg) | SdkError::InvalidTransaction(msg) => {
                CliError::CommandArgumentError(msg)
            },
            err @ (SdkError::ObjectNotFound { .. } | SdkError::InsufficientGas { .. }) => {
                CliError::CommandArgumentError(err.to_string())
            },
            SdkError::Network(err) => CliError::NetworkFailure(err.to_string()),
            SdkError::Rpc { code, message } => {
                CliError::NetworkFailure(format!("RPC error {}: {}", code, message))
            },
            SdkError::Serialization(msg) => CliError::UnexpectedError(msg),
            SdkError::IO(err) => CliError::IO("sdk".to_string(), err),
        }
    }
}

/// A common trait for all CLI commands to have consistent outputs
#[async_trait]
pub trait CliCommand<T: Serialize + Send>: Sized + Send {
    /// Returns a name for logging purposes
    fn command_name(&self) -> &'static str;

    /// Executes the command, returning a command specific type
    async fn execute(self) -> CliTypedResult<T>;

    /// Executes the command, and serializes it to the common JSON output type
    async fn execute_serialized(self) -> CliResult {
        let command_name = self.command_name();
        let start_time = Instant::now();
        to_common_result(command_name, start_time, self.execute().await)
    }

    /// Executes the command, and throws away Ok(result) for the string Success
    async fn execute_serialized_success(self) -> CliResult {
        let command_name = self.command_name();
        let start_time = Instant::now();
        to_common_success_result(command_name, start_time, self.execute().await)
    }
}

/// Config saved to `.policy-upgrade/config.yaml`
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CliConfig {
    /// Map of profile configs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profiles: Option<BTreeMap<String, ProfileConfig>>,
}

/// An individual profile
///
/// Everything the publish and upgrade flows would otherwise hard-code lives
/// here. A successful publish writes the ids it created back into the
/// profile, so the next upgrade finds them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rpc_url: Option<Url>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keystore_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_address: Option<AccountAddress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain_cli: Option<String>,
    /// Package that hosts the policy modules
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_package_id: Option<ObjectId>,
    /// Rule that new policies are created with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_rule: Option<PolicyRule>,
    /// Latest published version of the governed package
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub package_id: Option<ObjectId>,
    /// Policy object wrapping the package's upgrade capability
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_object_id: Option<ObjectId>,
    /// Gas budget of each transaction, in MIST
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_budget: Option<u64>,
    /// Gas price to bid, in MIST; the network's reference price when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<u64>,
}

impl CliConfig {
    pub fn load_from(dir: &Path) -> CliTypedResult<Self> {
        let file = Self::config_path(dir);
        if !file.exists() {
            return Err(CliError::ConfigNotFoundError(file.display().to_string()));
        }
        from_yaml(&String::from_utf8(read_from_file(&file)?).map_err(|err| {
            CliError::ConfigLoadError(file.display().to_string(), err.to_string())
        })?)
    }

    /// Loads the config, starting from an empty one if none was saved yet
    pub fn load_or_default(dir: &Path) -> CliTypedResult<Self> {
        match Self::load_from(dir) {
            Err(CliError::ConfigNotFoundError(_)) => Ok(Self::default()),
            result => result,
        }
    }

    pub fn config_exists(dir: &Path) -> bool {
        Self::config_path(dir).exists()
    }

    pub fn load_profile(dir: &Path, profile: &str) -> CliTypedResult<Option<ProfileConfig>> {
        let mut config = Self::load_or_default(dir)?;
        Ok(config
            .profiles
            .as_mut()
            .and_then(|profiles| profiles.remove(profile)))
    }

    pub fn save_profile(dir: &Path, name: &str, profile: ProfileConfig) -> CliTypedResult<()> {
        let mut config = Self::load_or_default(dir)?;
        config
            .profiles
            .get_or_insert_with(BTreeMap::new)
            .insert(name.to_string(), profile);
        config.save_to(dir)
    }

    pub fn save_to(&self, dir: &Path) -> CliTypedResult<()> {
        let folder = dir.join(CONFIG_FOLDER);
        create_dir_if_not_exist(&folder)?;
        let config_bytes = to_yaml(self)?;
        write_to_file(
            &folder.join(CONFIG_FILE),
            CONFIG_FILE,
            config_bytes.as_bytes(),
        )
    }

    fn config_path(dir: &Path) -> PathBuf {
        dir.join(CONFIG_FOLDER).join(CONFIG_FILE)
    }
}

/// Selects a profile from the config
#[derive(Clone, Debug, Default, Parser)]
pub struct ProfileOptions {
    /// Profile to use from the CLI config
    ///
    /// This will be used to override associated settings such as
    /// the RPC URL, the keystore and the deployed ids
    #[clap(long, default_value = DEFAULT_PROFILE)]
    pub profile: String,

    /// Directory that holds the `.policy-upgrade` config folder
    ///
    /// Defaults to the current directory
    #[clap(long, value_parser)]
    pub config_dir: Option<PathBuf>,
}

impl ProfileOptions {
    pub fn config_dir(&self) -> CliTypedResult<PathBuf> {
        match &self.config_dir {
            Some(dir) => Ok(dir.clone()),
            None => current_dir(),
        }
    }

    /// The selected profile, or an empty one when the config has none
    pub fn profile(&self) -> CliTypedResult<ProfileConfig> {
        Ok(CliConfig::load_profile(&self.config_dir()?, &self.profile)?.unwrap_or_default())
    }

    pub fn save_profile(&self, profile: ProfileConfig) -> CliTypedResult<()> {
        CliConfig::save_profile(&self.config_dir()?, &self.profile, profile)
    }
}

/// Options for the full node RPC endpoint
#[derive(Clone, Debug, Default, Parser)]
pub struct RpcOptions {
    /// URL of a full node's JSON-RPC endpoint
    ///
    /// Defaults to the URL in the profile, or the devnet full node
    #[clap(long)]
    pub url: Option<Url>,
}

impl RpcOptions {
    pub fn url(&self, profile: &ProfileConfig) -> CliTypedResult<Url> {
        if let Some(ref url) = self.url {
            Ok(url.clone())
        } else if let Some(ref url) = profile.rpc_url {
            Ok(url.clone())
        } else {
            Url::parse(DEFAULT_RPC_URL).map_err(|err| {
                CliError::UnexpectedError(format!("Failed to parse default RPC URL {}", err))
            })
        }
    }
}

/// Gas to pay a transaction with, once flags and the profile are resolved
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct GasConfig {
    /// Maximum MIST the transaction may spend
    pub budget: u64,
    /// MIST per gas unit; `None` asks the network for its reference price
    pub price: Option<u64>,
}

impl Default for GasConfig {
    fn default() -> Self {
        GasConfig {
            budget: DEFAULT_GAS_BUDGET,
            price: None,
        }
    }
}

/// Gas options for paying a transaction
#[derive(Clone, Debug, Default, Eq, Parser, PartialEq)]
pub struct GasOptions {
    /// Maximum amount of MIST the transaction may spend on gas
    ///
    /// Defaults to the profile's budget, then 0.1 SUI
    #[clap(long)]
    pub gas_budget: Option<u64>,
    /// Price to bid per gas unit, in MIST
    ///
    /// Defaults to the profile's price, then the network's reference gas price
    #[clap(long)]
    pub gas_price: Option<u64>,
}

impl GasOptions {
    pub fn gas_budget(&self, profile: &ProfileConfig) -> u64 {
        self.gas_budget
            .or(profile.gas_budget)
            .unwrap_or(DEFAULT_GAS_BUDGET)
    }

    pub fn gas_config(&self, profile: &ProfileConfig) -> GasConfig {
        GasConfig {
            budget: self.gas_budget(profile),
            price: self.gas_price.or(profile.gas_price),
        }
    }
}

/// Options for the signing key
#[derive(Clone, Debug, Default, Parser)]
pub struct KeystoreOptions {
    /// Path to the keystore file
    ///
    /// Defaults to the profile's keystore, then `~/.sui/sui_config/sui.keystore`
    #[clap(long, value_parser)]
    pub keystore: Option<PathBuf>,

    /// Address to send the transaction from
    ///
    /// Defaults to the profile's active address, then to the chain CLI's
    /// active address
    #[clap(long)]
    pub sender: Option<AccountAddress>,
}

impl KeystoreOptions {
    pub fn keystore_path(&self, profile: &ProfileConfig) -> CliTypedResult<PathBuf> {
        if let Some(ref path) = self.keystore {
            Ok(path.clone())
        } else if let Some(ref path) = profile.keystore_path {
            Ok(path.clone())
        } else {
            default_keystore_path()
        }
    }
}

pub fn default_keystore_path() -> CliTypedResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".sui").join("sui_config").join("sui.keystore"))
        .ok_or_else(|| {
            CliError::UnexpectedError("Unable to determine the home directory".to_string())
        })
}

/// Options for the external chain CLI
#[derive(Clone, Debug, Default, Parser)]
pub struct ChainCliOptions {
    /// Chain CLI executable used for builds and the active address
    #[clap(long)]
    pub chain_cli: Option<String>,
}

impl ChainCliOptions {
    pub fn chain_cli(&self, profile: &ProfileConfig) -> String {
        self.chain_cli
            .clone()
            .or_else(|| profile.chain_cli.clone())
            .unwrap_or_else(|| DEFAULT_CHAIN_CLI.to_string())
    }
}

/// Options for a Move package dir
#[derive(Clone, Debug, Default, Parser)]
pub struct MovePackageDir {
    /// Path to a move package (the folder with a Move.toml file)
    #[clap(long, value_parser)]
    pub package_dir: Option<PathBuf>,
}

impl MovePackageDir {
    pub fn get_package_dir(&self) -> CliTypedResult<PathBuf> {
        match &self.package_dir {
            Some(dir) => Ok(dir.clone()),
            None => current_dir(),
        }
    }
}

/// Options for the policy module that gates upgrades
#[derive(Clone, Debug, Default, Parser)]
pub struct PolicyPackageOptions {
    /// Package that hosts the `day_of_week`, `time_window` and `multi_signer` modules
    #[clap(long)]
    pub policy_package: Option<ObjectId>,
}

impl PolicyPackageOptions {
    pub fn policy_package(&self, profile: &ProfileConfig) -> CliTypedResult<ObjectId> {
        if let Some(id) = self.policy_package {
            Ok(id)
        } else if let Some(id) = profile.policy_package_id {
            Ok(id)
        } else {
            ObjectId::from_str(DEFAULT_POLICY_PACKAGE_ID)
                .map_err(|err| CliError::UnableToParse("policy package", err.to_string()))
        }
    }
}

/// Rule for a new policy
///
/// At most one rule may be given; with none, the profile's rule is used,
/// then a Saturday-only day of week rule.
#[derive(Clone, Debug, Default, Parser)]
pub struct PolicyRuleOptions {
    /// Only allow upgrades on this weekday (0 = Monday .. 6 = Sunday, or a name)
    #[clap(long)]
    pub weekday: Option<Weekday>,

    /// Start of an upgrade window, in milliseconds since the Unix epoch
    #[clap(long, requires = "window_end_ms")]
    pub window_start_ms: Option<u64>,

    /// End (exclusive) of an upgrade window, in milliseconds since the Unix epoch
    #[clap(long, requires = "window_start_ms")]
    pub window_end_ms: Option<u64>,

    /// Accounts allowed to approve upgrades, comma separated
    #[clap(long, value_delimiter = ',', requires = "threshold")]
    pub approvers: Vec<AccountAddress>,

    /// Number of approvers that must sign an upgrade
    #[clap(long)]
    pub threshold: Option<u64>,
}

impl PolicyRuleOptions {
    pub fn rule(&self, profile: &ProfileConfig) -> CliTypedResult<PolicyRule> {
        let mut rules: Vec<PolicyRule> = vec![];
        if let Some(weekday) = self.weekday {
            rules.push(DayOfWeek::from(weekday).into());
        }
        if let (Some(start_ms), Some(end_ms)) = (self.window_start_ms, self.window_end_ms) {
            rules.push(TimeWindow::new(start_ms, end_ms).into());
        }
        if let Some(threshold) = self.threshold {
            rules.push(MultiSigner::new(self.approvers.iter().copied(), threshold).into());
        }

        match rules.len() {
            0 => Ok(profile
                .policy_rule
                .clone()
                .unwrap_or_else(|| DayOfWeek::from(Weekday::Saturday).into())),
            1 => Ok(rules.remove(0)),
            _ => Err(CliError::CommandArgumentError(
                "Only one of --weekday, --window-*-ms or --threshold may be given".to_string(),
            )),
        }
    }
}
