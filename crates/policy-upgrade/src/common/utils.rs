// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

use crate::common::types::{CliError, CliResult, CliTypedResult};
use policy_upgrade_types::AccountAddress;
use serde::{de::DeserializeOwned, Serialize};
use std::{
    env,
    fs::OpenOptions,
    io::Write,
    path::{Path, PathBuf},
    process::Command,
    str::FromStr,
    time::Instant,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// A result wrapper for displaying either a correct execution result or an error.
///
/// The purpose of this is to have a pretty easy to recognize JSON output format e.g.
///
/// {
///   "Result":{
///     "digest": "..."
///   }
/// }
///
/// {
///   "Error":"Failed to run command"
/// }
///
#[derive(Debug, Serialize)]
enum ResultWrapper<T> {
    Result(T),
    Error(String),
}

impl<T> From<CliTypedResult<T>> for ResultWrapper<T> {
    fn from(result: CliTypedResult<T>) -> Self {
        match result {
            Ok(inner) => ResultWrapper::Result(inner),
            Err(inner) => ResultWrapper::Error(inner.to_string()),
        }
    }
}

/// For pretty printing outputs in JSON
pub fn to_common_result<T: Serialize>(
    command: &str,
    start_time: Instant,
    result: CliTypedResult<T>,
) -> CliResult {
    let latency = start_time.elapsed();
    match &result {
        Ok(_) => info!(command, latency_ms = latency.as_millis() as u64, "Command succeeded"),
        Err(err) => warn!(
            command,
            latency_ms = latency.as_millis() as u64,
            error = err.to_str(),
            "Command failed"
        ),
    }

    let is_err = result.is_err();
    let result = ResultWrapper::<T>::from(result);
    let string = serde_json::to_string_pretty(&result)
        .unwrap_or_else(|err| format!("{{\"Error\":\"Unable to serialize output: {}\"}}", err));
    if is_err {
        Err(string)
    } else {
        Ok(string)
    }
}

/// Convert any successful response to Success
pub fn to_common_success_result<T>(
    command: &str,
    start_time: Instant,
    result: CliTypedResult<T>,
) -> CliResult {
    to_common_result(command, start_time, result.map(|_| "Success"))
}

/// Logs to stderr, filtered by `RUST_LOG` and defaulting to `default_level`
pub fn start_logger(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    // A second logger in the same process keeps the first one.
    let _ = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Write a `&[u8]` to a file
pub fn write_to_file(path: &Path, name: &str, bytes: &[u8]) -> CliTypedResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(path)
        .map_err(|e| CliError::IO(name.to_string(), e))?;
    file.write_all(bytes)
        .map_err(|e| CliError::IO(name.to_string(), e))
}

pub fn read_from_file(path: &Path) -> CliTypedResult<Vec<u8>> {
    std::fs::read(path)
        .map_err(|e| CliError::UnableToReadFile(format!("{}", path.display()), e.to_string()))
}

pub fn create_dir_if_not_exist(dir: &Path) -> CliTypedResult<()> {
    // Check if the directory exists, if it's not a dir, it will also fail here
    if !dir.exists() || !dir.is_dir() {
        std::fs::create_dir_all(dir).map_err(|e| CliError::IO(dir.display().to_string(), e))?;
        debug!("Created {} folder", dir.display());
    } else {
        debug!("{} folder already exists", dir.display());
    }
    Ok(())
}

pub fn current_dir() -> CliTypedResult<PathBuf> {
    env::current_dir().map_err(|err| {
        CliError::UnexpectedError(format!("Failed to get current directory {}", err))
    })
}

pub fn to_yaml<T: Serialize + ?Sized>(input: &T) -> CliTypedResult<String> {
    serde_yaml::to_string(input).map_err(|err| CliError::UnexpectedError(err.to_string()))
}

pub fn from_yaml<T: DeserializeOwned>(input: &str) -> CliTypedResult<T> {
    serde_yaml::from_str(input).map_err(|err| CliError::UnableToParse("config", err.to_string()))
}

/// Runs `program args..` and returns its stdout, failing on a non-zero exit status
pub fn run_command(program: &str, args: &[&str]) -> CliTypedResult<Vec<u8>> {
    debug!(program, ?args, "Running external command");
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| CliError::IO(program.to_string(), err))?;
    if !output.status.success() {
        return Err(CliError::UnexpectedError(format!(
            "`{} {}` exited with {}: {}",
            program,
            args.join(" "),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(output.stdout)
}

/// Asks the chain CLI which address it currently signs with
pub fn chain_cli_active_address(chain_cli: &str) -> CliTypedResult<AccountAddress> {
    let stdout = run_command(chain_cli, &["client", "active-address"])?;
    let address = String::from_utf8_lossy(&stdout);
    AccountAddress::from_str(address.trim())
        .map_err(|err| CliError::UnableToParse("active address", err.to_string()))
}
