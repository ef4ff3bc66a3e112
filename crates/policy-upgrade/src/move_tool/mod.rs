// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

//! Building Move packages through the chain CLI

use crate::common::{
    types::{
        ChainCliOptions, CliCommand, CliError, CliTypedResult, MovePackageDir, ProfileOptions,
    },
    utils::run_command,
};
use anyhow::Context;
use async_trait::async_trait;
use clap::Parser;
use policy_upgrade_types::{Digest, ObjectId};
use serde::{Deserialize, Serialize};
use std::{path::Path, str::FromStr};
use tracing::{debug, warn};

/// Bytecode and dependency ids of a built package
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompiledPackage {
    pub modules: Vec<Vec<u8>>,
    pub dependencies: Vec<ObjectId>,
    pub digest: Digest,
}

impl CompiledPackage {
    /// Builds the package description from modules and dependencies alone
    pub fn new(modules: Vec<Vec<u8>>, dependencies: Vec<ObjectId>) -> Self {
        let digest = Digest::compute_package_digest(&modules, &dependencies);
        Self {
            modules,
            dependencies,
            digest,
        }
    }
}

/// Anything that can turn a package directory into bytecode
pub trait PackageCompiler: Send + Sync {
    fn build(&self, package_dir: &Path) -> CliTypedResult<CompiledPackage>;
}

/// Shells out to `<chain-cli> move build --dump-bytecode-as-base64`
#[derive(Clone, Debug)]
pub struct ExternalCompiler {
    chain_cli: String,
}

impl ExternalCompiler {
    pub fn new(chain_cli: impl Into<String>) -> Self {
        Self {
            chain_cli: chain_cli.into(),
        }
    }
}

impl PackageCompiler for ExternalCompiler {
    fn build(&self, package_dir: &Path) -> CliTypedResult<CompiledPackage> {
        let path = package_dir.display().to_string();
        let stdout = run_command(&self.chain_cli, &[
            "move",
            "build",
            "--dump-bytecode-as-base64",
            "--path",
            &path,
        ])
        .map_err(|err| CliError::BuildFailure(err.to_string()))?;
        parse_build_output(&stdout).map_err(|err| CliError::BuildFailure(format!("{:#}", err)))
    }
}

#[derive(Debug, Deserialize)]
struct BuildOutput {
    modules: Vec<String>,
    dependencies: Vec<String>,
    digest: Vec<u8>,
}

/// Parses the JSON the chain CLI prints for a bytecode dump
pub fn parse_build_output(bytes: &[u8]) -> anyhow::Result<CompiledPackage> {
    let output: BuildOutput =
        serde_json::from_slice(bytes).context("build output is not the expected JSON")?;

    let modules = output
        .modules
        .iter()
        .enumerate()
        .map(|(index, module)| {
            base64::decode(module).with_context(|| format!("module {} is not base64", index))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    let dependencies = output
        .dependencies
        .iter()
        .map(|id| ObjectId::from_str(id).with_context(|| format!("dependency {}", id)))
        .collect::<anyhow::Result<Vec<_>>>()?;
    let digest = Digest::from_slice(&output.digest).context("digest")?;

    let package = CompiledPackage::new(modules, dependencies);
    if package.digest != digest {
        // The node checks the reported digest against the modules, so use ours.
        warn!(
            reported = %digest,
            computed = %package.digest,
            "Build reported a different package digest"
        );
    }
    debug!(
        modules = package.modules.len(),
        dependencies = package.dependencies.len(),
        digest = %package.digest,
        "Parsed build output"
    );
    Ok(package)
}

/// Summary of a built package
#[derive(Debug, Serialize)]
pub struct BuildSummary {
    pub modules: usize,
    pub dependencies: Vec<ObjectId>,
    pub digest: Digest,
}

impl From<&CompiledPackage> for BuildSummary {
    fn from(package: &CompiledPackage) -> Self {
        Self {
            modules: package.modules.len(),
            dependencies: package.dependencies.clone(),
            digest: package.digest,
        }
    }
}

/// Builds a Move package and prints its digest
#[derive(Debug, Parser)]
pub struct BuildPackage {
    #[clap(flatten)]
    pub(crate) profile_options: ProfileOptions,
    #[clap(flatten)]
    pub(crate) chain_cli_options: ChainCliOptions,
    #[clap(flatten)]
    pub(crate) move_options: MovePackageDir,
}

#[async_trait]
impl CliCommand<BuildSummary> for BuildPackage {
    fn command_name(&self) -> &'static str {
        "BuildPackage"
    }

    async fn execute(self) -> CliTypedResult<BuildSummary> {
        let profile = self.profile_options.profile()?;
        let compiler = ExternalCompiler::new(self.chain_cli_options.chain_cli(&profile));
        let package = compiler.build(&self.move_options.get_package_dir()?)?;
        Ok(BuildSummary::from(&package))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claims::assert_err;
    use serde_json::json;

    #[test]
    fn parses_bytecode_dump() {
        let modules = vec![b"module a".to_vec(), b"module b".to_vec()];
        let dependencies = vec![
            ObjectId::from_str("0x1").unwrap(),
            ObjectId::from_str("0x2").unwrap(),
        ];
        let digest = Digest::compute_package_digest(&modules, &dependencies);
        let output = json!({
            "modules": modules.iter().map(base64::encode).collect::<Vec<_>>(),
            "dependencies": ["0x1", "0x0000000000000000000000000000000000000000000000000000000000000002"],
            "digest": digest.as_bytes().to_vec(),
        });

        let package = parse_build_output(output.to_string().as_bytes()).unwrap();
        assert_eq!(package.modules, modules);
        assert_eq!(package.dependencies, dependencies);
        assert_eq!(package.digest, digest);
    }

    #[test]
    fn rejects_malformed_output() {
        assert_err!(parse_build_output(b"BUILDING example"));
        let bad_module = json!({ "modules": ["%%"], "dependencies": [], "digest": vec![0u8; 32] });
        assert_err!(parse_build_output(bad_module.to_string().as_bytes()));
        let short_digest = json!({ "modules": [], "dependencies": [], "digest": [1, 2, 3] });
        assert_err!(parse_build_output(short_digest.to_string().as_bytes()));
    }

    #[test]
    fn missing_chain_cli_is_a_build_failure() {
        let compiler = ExternalCompiler::new("policy-upgrade-no-such-binary");
        let dir = tempfile::tempdir().unwrap();
        let err = compiler.build(dir.path()).unwrap_err();
        assert_eq!(err.to_str(), "BuildFailure");
    }
}
