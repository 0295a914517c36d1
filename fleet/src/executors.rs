// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Per-host lifecycle operations.
//!
//! Each executor performs one lifecycle action against a single node and
//! reports what it observed as a [`HostOutcome`]. Executors log at the point
//! of occurrence and never retry; the orchestrator only collects results.
//!
//! | Operation | Leader gated | Uses keys |
//! |-----------|--------------|-----------|
//! | [`Operation::Status`] | no | no |
//! | [`Operation::Unseal`] | no | yes |
//! | [`Operation::RekeyInit`] | yes | no |
//! | [`Operation::RekeyStatus`] | yes | no |
//! | [`Operation::RekeySubmit`] | yes | yes |

use crate::client::NodeClient;
use crate::errors::FleetError;
use crate::leader::check_rekey_gate;
use crate::models::{HostOutcome, RekeyInitRequest, RekeyUpdate, ShareKey};
use crate::status::get_status;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Status,
    Unseal,
    RekeyInit(RekeyInitRequest),
    RekeyStatus,
    RekeySubmit,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Status => "status",
            Self::Unseal => "unseal",
            Self::RekeyInit(_) => "rekey-init",
            Self::RekeyStatus => "rekey-status",
            Self::RekeySubmit => "rekey-submit",
        }
    }

    /// Whether the datacenter's keys must be resolved before dispatch.
    pub fn needs_keys(&self) -> bool {
        matches!(self, Self::Unseal | Self::RekeySubmit)
    }

    /// Runs the operation against one node. `keys` is owned by the call and
    /// every share is dropped, and so zeroized, as soon as it has been used.
    pub async fn execute(
        &self,
        client: &dyn NodeClient,
        keys: Vec<ShareKey>,
    ) -> Result<HostOutcome, FleetError> {
        match self {
            Self::Status => status_check(client).await,
            Self::Unseal => unseal(client, keys).await,
            Self::RekeyInit(request) => rekey_init(client, *request).await,
            Self::RekeyStatus => rekey_status(client).await,
            Self::RekeySubmit => rekey_submit(client, keys).await,
        }
    }
}

/// Reads and logs the seal state of one node.
///
/// # Errors
///
/// Returns [`FleetError::RemoteCallError`] when the seal status cannot be read.
pub async fn status_check(client: &dyn NodeClient) -> Result<HostOutcome, FleetError> {
    let status = client.seal_status().await?;

    if status.sealed {
        tracing::warn!(
            host = %client.address(),
            progress = status.progress,
            threshold = status.threshold,
            "vault is sealed!"
        );
    } else {
        tracing::info!(
            host = %client.address(),
            progress = status.progress,
            threshold = status.threshold,
            "vault is unsealed!"
        );
    }

    Ok(HostOutcome::Status(status))
}

/// Submits the datacenter's shares, in order, until the node reports unsealed
/// or the shares run out. A rejected share is logged and the next one is tried.
///
/// # Arguments
///
/// * `keys` - Resolved shares, each dropped right after its call returns
///
/// # Errors
///
/// Returns an error if:
/// - The node could not be asked for its initialization state
/// - The node is not initialized ([`FleetError::NotReady`])
/// - No keys are configured for the datacenter ([`FleetError::NoKeyProvided`])
/// - Every unseal call failed
pub async fn unseal(
    client: &dyn NodeClient,
    keys: Vec<ShareKey>,
) -> Result<HostOutcome, FleetError> {
    let status = get_status(client).await;
    if !status.initialized {
        return Err(status.read_error.unwrap_or_else(|| {
            FleetError::NotReady("vault is not ready to be unsealed".to_string())
        }));
    }

    if keys.is_empty() {
        return Err(FleetError::NoKeyProvided);
    }

    if !status.sealed {
        tracing::info!(host = %client.address(), "vault is already unsealed");
        return Ok(HostOutcome::AlreadyUnsealed);
    }

    let mut last = None;
    let mut applied = 0;

    for key in keys {
        let result = client.unseal(&key).await;
        drop(key);

        match result {
            Ok(seal) => {
                applied += 1;
                tracing::info!(
                    host = %client.address(),
                    progress = seal.progress,
                    threshold = seal.threshold,
                    "unseal operation performed"
                );
                let unsealed = !seal.sealed;
                last = Some(seal);
                if unsealed {
                    break;
                }
            }
            Err(err) => {
                tracing::error!(host = %client.address(), error = %err, "error running unseal operation");
            }
        }
    }

    let seal = last.ok_or_else(|| FleetError::remote("unseal", "every unseal call failed"))?;

    if seal.sealed {
        tracing::info!(
            host = %client.address(),
            progress = seal.progress,
            threshold = seal.threshold,
            "vault is still sealed, more keys are required"
        );
    } else {
        tracing::info!(host = %client.address(), "vault is unsealed!");
    }

    Ok(HostOutcome::Unseal {
        sealed: seal.sealed,
        progress: seal.progress,
        threshold: seal.threshold,
        applied,
    })
}

/// Starts a rekey on the cluster leader and logs the nonce the other key
/// holders need.
pub async fn rekey_init(
    client: &dyn NodeClient,
    request: RekeyInitRequest,
) -> Result<HostOutcome, FleetError> {
    check_rekey_gate(client).await?;

    let session = client.rekey_init(request).await?;
    if !session.started {
        return Err(FleetError::remote("rekey-init", "rekey was not started"));
    }

    tracing::info!(
        host = %client.address(),
        shares = session.shares,
        threshold = session.threshold,
        nonce = %session.nonce,
        "rekey started. please supply your keys."
    );

    Ok(HostOutcome::RekeyStarted {
        nonce: session.nonce,
        shares: session.shares,
        threshold: session.threshold,
    })
}

/// Reports the leader's current rekey session, if any.
pub async fn rekey_status(client: &dyn NodeClient) -> Result<HostOutcome, FleetError> {
    check_rekey_gate(client).await?;

    let session = client.rekey_status().await?;
    if !session.started {
        tracing::info!(host = %client.address(), "rekey not started");
        return Ok(HostOutcome::RekeyNotStarted);
    }

    tracing::info!(
        host = %client.address(),
        shares = session.shares,
        threshold = session.threshold,
        nonce = %session.nonce,
        progress = session.progress,
        required = session.required,
        "rekey has been started"
    );

    Ok(HostOutcome::RekeyStatus(session))
}

/// Feeds the datacenter's shares into the running rekey on the leader.
///
/// Stops at the first update reporting completion and surfaces the new keys.
/// Otherwise every share is submitted and the last known progress is returned.
///
/// # Errors
///
/// Returns an error if:
/// - The leader gate rejects the node
/// - The session status cannot be read before the first submission
/// - No keys are configured for the datacenter ([`FleetError::NoKeyProvided`])
pub async fn rekey_submit(
    client: &dyn NodeClient,
    keys: Vec<ShareKey>,
) -> Result<HostOutcome, FleetError> {
    check_rekey_gate(client).await?;

    let mut session = client.rekey_status().await?;
    if !session.started {
        tracing::info!(host = %client.address(), "rekey not started");
        return Ok(HostOutcome::RekeyNotStarted);
    }

    if keys.is_empty() {
        return Err(FleetError::NoKeyProvided);
    }

    let nonce = session.nonce.clone();
    let mut submitted = 0;

    // Shares are applied strictly in order: each update depends on the
    // session state left by the previous one.
    for key in keys {
        let result = client.rekey_update(&key, &nonce).await;
        drop(key);

        match result {
            Ok(update) if update.complete => {
                return Ok(surface_rotated_keys(client, update));
            }
            Ok(update) => {
                submitted += 1;
                tracing::info!(
                    host = %client.address(),
                    progress = update.progress,
                    required = update.required,
                    "rekey key accepted"
                );
            }
            Err(err) => {
                tracing::error!(host = %client.address(), error = %err, "error submitting rekey key");
            }
        }

        match client.rekey_status().await {
            Ok(current) if !current.started => {
                tracing::warn!(host = %client.address(), "rekey session is no longer active");
                return Ok(HostOutcome::RekeyNotStarted);
            }
            Ok(current) => {
                tracing::info!(
                    host = %client.address(),
                    progress = current.progress,
                    required = current.required,
                    "rekey progress"
                );
                session = current;
            }
            Err(err) => {
                tracing::error!(host = %client.address(), error = %err, "unable to read rekey status");
            }
        }
    }

    Ok(HostOutcome::RekeyProgress {
        progress: session.progress,
        required: session.required,
        submitted,
    })
}

/// The new shares are only ever returned once by the server, so every one of
/// them is logged here before anything else can fail.
fn surface_rotated_keys(client: &dyn NodeClient, mut update: RekeyUpdate) -> HostOutcome {
    let keys = if update.keys.is_empty() {
        std::mem::take(&mut update.keys_base64)
    } else {
        std::mem::take(&mut update.keys)
    };
    let pgp_fingerprints = std::mem::take(&mut update.pgp_fingerprints);

    tracing::info!(
        host = %client.address(),
        keys = keys.len(),
        "rekey complete, new unseal keys follow"
    );
    for (index, key) in keys.iter().enumerate() {
        let fingerprint = pgp_fingerprints.get(index).map(String::as_str).unwrap_or("");
        tracing::info!(
            host = %client.address(),
            index = index + 1,
            key = %key,
            pgp_fingerprint = %fingerprint,
            "new unseal key"
        );
    }

    HostOutcome::RekeyComplete {
        keys,
        pgp_fingerprints,
    }
}
