// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Command line options and the topology file.
//!
//! Values are taken from, in order of precedence: command line flags,
//! `VAULT_FLEET_*` environment variables, the YAML configuration file, and
//! built-in defaults.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{ArgAction, Parser, Subcommand};
use serde::Deserialize;
use validator::Validate;

use crate::client::{ClientSettings, EnvOverrides};
use crate::constants::{CONFIG_FILE_NAME, DEFAULT_PROTOCOL};
use crate::errors::FleetError;
use crate::executors::Operation;
use crate::models::{Datacenter, RekeyInitRequest};
use crate::orchestrator::SweepConfig;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about = "Easily unseal, rekey and inspect Vault servers across datacenters", long_about = None)]
pub struct FleetOptions {
    /// Configuration file (default is $HOME/.vault-fleet.yaml, then ./.vault-fleet.yaml)
    #[arg(long, global = true, env("VAULT_FLEET_CONFIG"))]
    pub config: Option<PathBuf>,
    /// Datacenter to operate on (default is all of them)
    #[arg(short, long, global = true, env("VAULT_FLEET_DATACENTER"))]
    pub datacenter: Option<String>,
    /// PEM file or directory of PEM files to trust
    #[arg(long, global = true, env("VAULT_FLEET_CAPATH"))]
    pub ca_path: Option<String>,
    /// URL scheme used to reach the hosts
    #[arg(long, global = true, env("VAULT_FLEET_PROTOCOL"))]
    pub protocol: Option<String>,
    /// Configured keys are base64 encoded GPG ciphertext
    #[arg(long, global = true, env("VAULT_FLEET_GPG"), action = ArgAction::SetTrue)]
    pub gpg: bool,
    /// Per-request timeout in seconds (default is no timeout)
    #[arg(long, global = true, env("VAULT_FLEET_REQUEST_TIMEOUT"))]
    pub request_timeout: Option<u64>,
    /// Emit JSON log lines
    #[arg(long, global = true, env("VAULT_FLEET_LOG_JSON"), action = ArgAction::SetTrue)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum Command {
    /// Get the seal status of every vault
    Status,
    /// Unseal every vault using the configured keys
    Unseal,
    /// Run rekey operations against the cluster leaders
    #[command(subcommand)]
    Rekey(RekeyCommand),
}

#[derive(Debug, Clone, Subcommand, PartialEq, Eq)]
pub enum RekeyCommand {
    /// Start a rekey and print the nonce needed by the other key holders
    Init {
        /// The number of secret shares to init the rekey with
        #[arg(short, long, default_value_t = 0)]
        shares: u32,
        /// The secret threshold to init the rekey with
        #[arg(short, long, default_value_t = 0)]
        threshold: u32,
    },
    /// Show the current rekey progress
    Status,
    /// Submit the configured keys to the running rekey
    Submit,
}

impl Command {
    /// Maps the command to an operation, validating its flags first.
    pub fn operation(&self) -> Result<Operation, FleetError> {
        let operation = match self {
            Self::Status => Operation::Status,
            Self::Unseal => Operation::Unseal,
            Self::Rekey(RekeyCommand::Init { shares, threshold }) => {
                let request = RekeyInitRequest {
                    shares: *shares,
                    threshold: *threshold,
                };
                request.validate()?;
                Operation::RekeyInit(request)
            }
            Self::Rekey(RekeyCommand::Status) => Operation::RekeyStatus,
            Self::Rekey(RekeyCommand::Submit) => Operation::RekeySubmit,
        };
        Ok(operation)
    }
}

/// Contents of the YAML configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub gpg: bool,
    #[serde(default)]
    pub capath: Option<String>,
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub datacenter: Option<String>,
    #[serde(default)]
    pub datacenters: Vec<Datacenter>,
}

impl FileConfig {
    pub fn parse(contents: &str) -> Result<Self, FleetError> {
        let config: FileConfig = serde_yaml::from_str(contents)?;

        let mut names = HashSet::new();
        for datacenter in &config.datacenters {
            if !names.insert(datacenter.name.as_str()) {
                return Err(FleetError::ConfigError(format!(
                    "datacenter {} is defined more than once",
                    datacenter.name
                )));
            }
        }

        Ok(config)
    }

    pub fn read(path: &Path) -> Result<Self, FleetError> {
        let contents = std::fs::read_to_string(path).map_err(|err| {
            FleetError::ConfigError(format!("unable to read {}: {err}", path.display()))
        })?;
        tracing::debug!(path = %path.display(), "using config file");
        Self::parse(&contents)
    }

    /// Reads the explicit `path`, or the first configuration file found in
    /// the search path.
    pub fn load(path: Option<&Path>) -> Result<Self, FleetError> {
        if let Some(path) = path {
            return Self::read(path);
        }

        let candidates = search_path(std::env::var_os("HOME").map(PathBuf::from));
        match candidates.iter().find(|candidate| candidate.is_file()) {
            Some(path) => Self::read(path),
            None => Err(FleetError::ConfigError(format!(
                "no {CONFIG_FILE_NAME} found in $HOME or the current directory, see --config"
            ))),
        }
    }
}

fn search_path(home: Option<PathBuf>) -> Vec<PathBuf> {
    let mut candidates = Vec::with_capacity(2);
    if let Some(home) = home {
        candidates.push(home.join(CONFIG_FILE_NAME));
    }
    candidates.push(PathBuf::from(".").join(CONFIG_FILE_NAME));
    candidates
}

/// Fully resolved settings for one invocation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub topology: Vec<Datacenter>,
    pub sweep: SweepConfig,
    pub client: ClientSettings,
}

impl Settings {
    pub fn resolve(options: &FleetOptions, file: FileConfig, overrides: EnvOverrides) -> Self {
        let protocol = options
            .protocol
            .clone()
            .or(file.protocol)
            .filter(|protocol| !protocol.is_empty())
            .unwrap_or_else(|| DEFAULT_PROTOCOL.to_string());

        Self {
            sweep: SweepConfig {
                datacenter: options.datacenter.clone().or(file.datacenter),
                encryption_enabled: options.gpg || file.gpg,
            },
            client: ClientSettings {
                protocol,
                ca_path: options.ca_path.clone().or(file.capath).unwrap_or_default(),
                overrides,
                request_timeout: options.request_timeout.map(Duration::from_secs),
            },
            topology: file.datacenters,
        }
    }
}
