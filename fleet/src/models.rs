// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{Validate, ValidationError};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::errors::FleetError;

/// A named cluster of Vault hosts sharing one set of unseal keys.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Datacenter {
    pub name: String,
    #[serde(default)]
    pub hosts: Vec<Host>,
    #[serde(default)]
    pub keys: Vec<Key>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Host {
    pub name: String,
    #[serde(deserialize_with = "deserialize_port")]
    pub port: u16,
}

impl Host {
    pub fn new(name: impl Into<String>, port: u16) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

/// A configured key share, either plaintext or base64 encoded ciphertext.
#[derive(Clone, Serialize, Deserialize, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct Key {
    pub key: String,
}

// Custom Debug implementation to prevent accidental logging of key material
impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Key").field("key", &"[REDACTED]").finish()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PortValue {
    Number(u16),
    Text(String),
}

fn deserialize_port<'de, D>(deserializer: D) -> Result<u16, D::Error>
where
    D: Deserializer<'de>,
{
    match PortValue::deserialize(deserializer)? {
        PortValue::Number(port) => Ok(port),
        PortValue::Text(text) => text
            .trim()
            .parse::<u16>()
            .map_err(|err| serde::de::Error::custom(format!("invalid port {text:?}: {err}"))),
    }
}

/// A resolved, plaintext key share. Zeroized when dropped.
#[derive(Clone, PartialEq, Zeroize, ZeroizeOnDrop)]
pub struct ShareKey(String);

impl ShareKey {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ShareKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ShareKey([REDACTED])")
    }
}

/// Seal and initialization state of a single node.
///
/// `sealed` and `initialized` hold fail-safe values when a read failed; the
/// first failure is kept in `read_error` so callers can report it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStatus {
    pub sealed: bool,
    pub initialized: bool,
    pub read_error: Option<FleetError>,
}

impl NodeStatus {
    /// Extended view used by the rekey gate: a node is ready when it is
    /// initialized and unsealed.
    pub fn readiness(&self) -> (bool, &'static str) {
        if !self.initialized {
            (false, "vault is not initialized")
        } else if self.sealed {
            (false, "vault is sealed")
        } else {
            (true, "vault is initialized and unsealed")
        }
    }
}

/// Response of `GET /v1/sys/seal-status` and `PUT /v1/sys/unseal`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SealStatus {
    pub sealed: bool,
    #[serde(default)]
    pub initialized: bool,
    #[serde(default, rename = "t")]
    pub threshold: u32,
    #[serde(default, rename = "n")]
    pub shares: u32,
    #[serde(default)]
    pub progress: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
}

/// Response of `GET /v1/sys/leader`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct LeaderInfo {
    pub is_self: bool,
    #[serde(default)]
    pub ha_enabled: bool,
    #[serde(default)]
    pub leader_address: String,
}

/// Server side rekey session, read through `GET /v1/sys/rekey/init`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RekeySession {
    #[serde(default)]
    pub started: bool,
    #[serde(default, rename = "n")]
    pub shares: u32,
    #[serde(default, rename = "t")]
    pub threshold: u32,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub required: u32,
}

/// Response of `PUT /v1/sys/rekey/update`.
///
/// `keys` and `keys_base64` are only present once the rekey completes and are
/// never shown again by the server.
#[derive(Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RekeyUpdate {
    #[serde(default)]
    pub complete: bool,
    #[serde(default)]
    pub nonce: String,
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    #[serde(default)]
    pub pgp_fingerprints: Vec<String>,
    #[serde(default)]
    pub progress: u32,
    #[serde(default)]
    pub required: u32,
}

impl fmt::Debug for RekeyUpdate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RekeyUpdate")
            .field("complete", &self.complete)
            .field("nonce", &self.nonce)
            .field("keys", &format_args!("[{} REDACTED]", self.keys.len()))
            .field("pgp_fingerprints", &self.pgp_fingerprints)
            .field("progress", &self.progress)
            .field("required", &self.required)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsealRequest<'a> {
    pub key: &'a str,
}

#[derive(Debug, Clone, Serialize)]
pub struct RekeyUpdateRequest<'a> {
    pub key: &'a str,
    pub nonce: &'a str,
}

/// Parameters for starting a rekey, validated before any dispatch.
#[derive(Debug, Clone, Copy, Serialize, Validate, PartialEq, Eq)]
#[validate(schema(function = "validate_threshold_within_shares"))]
pub struct RekeyInitRequest {
    #[serde(rename = "secret_shares")]
    #[validate(range(min = 1, message = "please specify the secret shares"))]
    pub shares: u32,
    #[serde(rename = "secret_threshold")]
    #[validate(range(min = 1, message = "please specify the secret threshold"))]
    pub threshold: u32,
}

fn validate_threshold_within_shares(request: &RekeyInitRequest) -> Result<(), ValidationError> {
    if request.shares > 0 && request.threshold > request.shares {
        return Err(ValidationError::new("threshold_exceeds_shares"));
    }
    Ok(())
}

/// What a per-host executor observed or achieved.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOutcome {
    Status(SealStatus),
    Unseal {
        sealed: bool,
        progress: u32,
        threshold: u32,
        /// Shares the node accepted. Rejected shares are not counted.
        applied: usize,
    },
    AlreadyUnsealed,
    RekeyStarted {
        nonce: String,
        shares: u32,
        threshold: u32,
    },
    RekeyStatus(RekeySession),
    RekeyNotStarted,
    RekeyProgress {
        progress: u32,
        required: u32,
        submitted: usize,
    },
    RekeyComplete {
        keys: Vec<String>,
        pgp_fingerprints: Vec<String>,
    },
}
