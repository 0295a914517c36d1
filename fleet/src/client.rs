// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Vault node client adapter.
//!
//! [`VaultClient`] wraps a single node's `protocol://host:port` target (plus
//! optional CA trust) and exposes the handful of `sys/*` calls the fleet
//! operations need through the [`NodeClient`] trait. The orchestrator only
//! ever sees [`NodeClient`] and [`ClientFactory`], so tests can substitute
//! deterministic fakes.
//!
//! The underlying HTTP client connects lazily on the first call and never
//! retries.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Certificate, Client, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::constants::{
    ENV_VAULT_ADDR, ENV_VAULT_SKIP_VERIFY, PATH_INIT, PATH_LEADER, PATH_REKEY_INIT,
    PATH_REKEY_UPDATE, PATH_SEAL_STATUS, PATH_UNSEAL,
};
use crate::errors::FleetError;
use crate::models::{
    Host, InitStatus, LeaderInfo, RekeyInitRequest, RekeySession, RekeyUpdate,
    RekeyUpdateRequest, SealStatus, ShareKey, UnsealRequest,
};

/// Remote capabilities of a single Vault node.
#[async_trait]
pub trait NodeClient: Send + Sync {
    /// Address the client talks to, for log context.
    fn address(&self) -> &str;
    async fn init_status(&self) -> Result<bool, FleetError>;
    async fn seal_status(&self) -> Result<SealStatus, FleetError>;
    async fn leader(&self) -> Result<LeaderInfo, FleetError>;
    async fn unseal(&self, key: &ShareKey) -> Result<SealStatus, FleetError>;
    async fn rekey_init(&self, request: RekeyInitRequest) -> Result<RekeySession, FleetError>;
    async fn rekey_status(&self) -> Result<RekeySession, FleetError>;
    async fn rekey_update(&self, key: &ShareKey, nonce: &str) -> Result<RekeyUpdate, FleetError>;
}

/// Builds one [`NodeClient`] per host.
pub trait ClientFactory: Send + Sync {
    fn connect(&self, host: &Host) -> Result<Box<dyn NodeClient>, FleetError>;
}

/// Client settings taken from the environment, read once at process start.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvOverrides {
    /// Replaces the configured `protocol://host:port` of every host.
    pub address: Option<String>,
    pub skip_verify: bool,
}

impl EnvOverrides {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let address = lookup(ENV_VAULT_ADDR).filter(|value| !value.trim().is_empty());
        let skip_verify = lookup(ENV_VAULT_SKIP_VERIFY)
            .map(|value| matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true"))
            .unwrap_or(false);

        Self {
            address,
            skip_verify,
        }
    }

    /// Logs the surprising overrides. Call once, before any dispatch.
    pub fn warn(&self) {
        if let Some(address) = &self.address {
            tracing::warn!(
                address = %address,
                "{ENV_VAULT_ADDR} environment variable is set. This will override the hostname in your config file, it's probably not what you want"
            );
        }
        if self.skip_verify {
            tracing::warn!("{ENV_VAULT_SKIP_VERIFY} is set, TLS certificates will not be verified");
        }
    }
}

/// Everything needed to build a client, shared by all hosts of a sweep.
#[derive(Debug, Clone, Default)]
pub struct ClientSettings {
    pub protocol: String,
    /// PEM file or directory of PEM files. Empty means system roots.
    pub ca_path: String,
    pub overrides: EnvOverrides,
    pub request_timeout: Option<Duration>,
}

impl ClientSettings {
    pub fn target(&self, host: &Host) -> String {
        match &self.overrides.address {
            Some(address) => address.trim_end_matches('/').to_string(),
            None if host.name.contains(':') && !host.name.starts_with('[') => {
                format!("{}://[{}]:{}", self.protocol, host.name, host.port)
            }
            None => format!("{}://{}:{}", self.protocol, host.name, host.port),
        }
    }
}

pub struct VaultClient {
    address: String,
    http: Client,
}

impl VaultClient {
    /// Creates a client for one host, reading the configured CA roots.
    ///
    /// No connection is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ConnectionError`] if the CA path cannot be read
    /// or holds no certificate, or if the HTTP client cannot be built.
    pub fn new(host: &Host, settings: &ClientSettings) -> Result<Self, FleetError> {
        let roots = load_roots(settings)
            .map_err(|message| FleetError::connection(&host.name, host.port, message))?;
        Self::with_roots(host, settings, &roots)
    }

    /// Creates a client for one host trusting the already loaded `roots` in
    /// addition to the system roots.
    pub fn with_roots(
        host: &Host,
        settings: &ClientSettings,
        roots: &[Certificate],
    ) -> Result<Self, FleetError> {
        let address = settings.target(host);

        let mut builder = Client::builder();
        for certificate in roots {
            builder = builder.add_root_certificate(certificate.clone());
        }
        if settings.overrides.skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }
        if let Some(timeout) = settings.request_timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|err| FleetError::connection(&host.name, host.port, err))?;

        Ok(Self { address, http })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        call: &'static str,
        path: &str,
    ) -> Result<T, FleetError> {
        let response = self
            .http
            .get(format!("{}{}", self.address, path))
            .send()
            .await
            .map_err(|err| FleetError::remote(call, err))?;
        decode(call, response).await
    }

    async fn put<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        call: &'static str,
        path: &str,
        body: &B,
    ) -> Result<T, FleetError> {
        let response = self
            .http
            .put(format!("{}{}", self.address, path))
            .json(body)
            .send()
            .await
            .map_err(|err| FleetError::remote(call, err))?;
        decode(call, response).await
    }
}

async fn decode<T: DeserializeOwned>(
    call: &'static str,
    response: Response,
) -> Result<T, FleetError> {
    let status = response.status();
    let body = response
        .bytes()
        .await
        .map_err(|err| FleetError::remote(call, err))?;

    if !status.is_success() {
        let detail = serde_json::from_slice::<serde_json::Value>(&body)
            .ok()
            .and_then(|value| value.get("errors").cloned())
            .and_then(|errors| serde_json::from_value::<Vec<String>>(errors).ok())
            .filter(|errors| !errors.is_empty())
            .map(|errors| errors.join("; "))
            .unwrap_or_else(|| String::from_utf8_lossy(&body).trim().to_string());
        return Err(FleetError::remote(call, format!("{status}: {detail}")));
    }

    serde_json::from_slice(&body)
        .map_err(|err| FleetError::remote(call, format!("unable to decode response: {err}")))
}

fn load_roots(settings: &ClientSettings) -> Result<Vec<Certificate>, String> {
    if settings.ca_path.is_empty() {
        return Ok(Vec::new());
    }
    load_certificates(Path::new(&settings.ca_path))
}

/// Loads trusted roots from a PEM file, or from every file in a directory.
fn load_certificates(path: &Path) -> Result<Vec<Certificate>, String> {
    let files = if path.is_dir() {
        let mut files = std::fs::read_dir(path)
            .map_err(|err| format!("unable to read CA path {}: {err}", path.display()))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|file| file.is_file())
            .collect::<Vec<_>>();
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut certificates = Vec::new();
    for file in files {
        let pem = std::fs::read(&file)
            .map_err(|err| format!("unable to read CA file {}: {err}", file.display()))?;
        let bundle = Certificate::from_pem_bundle(&pem)
            .map_err(|err| format!("invalid CA file {}: {err}", file.display()))?;
        certificates.extend(bundle);
    }

    if certificates.is_empty() {
        return Err(format!("no certificates found in {}", path.display()));
    }

    Ok(certificates)
}

#[async_trait]
impl NodeClient for VaultClient {
    fn address(&self) -> &str {
        &self.address
    }

    async fn init_status(&self) -> Result<bool, FleetError> {
        let status: InitStatus = self.get("init-status", PATH_INIT).await?;
        Ok(status.initialized)
    }

    async fn seal_status(&self) -> Result<SealStatus, FleetError> {
        self.get("seal-status", PATH_SEAL_STATUS).await
    }

    async fn leader(&self) -> Result<LeaderInfo, FleetError> {
        self.get("leader", PATH_LEADER).await
    }

    async fn unseal(&self, key: &ShareKey) -> Result<SealStatus, FleetError> {
        let request = UnsealRequest { key: key.expose() };
        self.put("unseal", PATH_UNSEAL, &request).await
    }

    async fn rekey_init(&self, request: RekeyInitRequest) -> Result<RekeySession, FleetError> {
        self.put("rekey-init", PATH_REKEY_INIT, &request).await
    }

    async fn rekey_status(&self) -> Result<RekeySession, FleetError> {
        self.get("rekey-status", PATH_REKEY_INIT).await
    }

    async fn rekey_update(&self, key: &ShareKey, nonce: &str) -> Result<RekeyUpdate, FleetError> {
        let request = RekeyUpdateRequest {
            key: key.expose(),
            nonce,
        };
        self.put("rekey-update", PATH_REKEY_UPDATE, &request).await
    }
}

/// Builds [`VaultClient`]s from shared [`ClientSettings`].
#[derive(Clone)]
pub struct VaultClientFactory {
    settings: ClientSettings,
    roots: Vec<Certificate>,
}

impl VaultClientFactory {
    /// Reads the CA roots once for every client the factory will build.
    ///
    /// # Errors
    ///
    /// Returns [`FleetError::ConfigError`] if the CA path cannot be read or
    /// holds no certificate.
    pub fn new(settings: ClientSettings) -> Result<Self, FleetError> {
        let roots = load_roots(&settings).map_err(FleetError::ConfigError)?;
        tracing::debug!(roots = roots.len(), "loaded CA certificates");
        Ok(Self { settings, roots })
    }
}

impl ClientFactory for VaultClientFactory {
    fn connect(&self, host: &Host) -> Result<Box<dyn NodeClient>, FleetError> {
        Ok(Box::new(VaultClient::with_roots(
            host,
            &self.settings,
            &self.roots,
        )?))
    }
}
