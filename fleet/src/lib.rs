// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! # Vault Fleet
//!
//! Runs Vault lifecycle operations (status, unseal, rekey) against every node
//! of every datacenter in a topology, concurrently, from one control point.
//!
//! ## Architecture
//!
//! ```text
//! Topology -> Fleet::sweep -> datacenter task -> resolve keys (gpg)
//!                                   |
//!                                   +-> host task -> VaultClient -> Vault node
//!                                   +-> host task -> VaultClient -> Vault node
//! ```
//!
//! ## Modules
//!
//! - [`client`]: Vault HTTP client adapter and the [`client::NodeClient`] trait
//! - [`configuration`]: CLI argument parsing with clap and the YAML topology file
//! - [`constants`]: Defaults and Vault API paths
//! - [`decrypt`]: GPG decryption of at-rest key material
//! - [`errors`]: Error taxonomy shared by every operation
//! - [`executors`]: Per-host operations (status, unseal, rekey init/status/submit)
//! - [`keys`]: Per-datacenter key resolution
//! - [`leader`]: Leader gate for rekey operations
//! - [`models`]: Topology records and Vault API types
//! - [`orchestrator`]: Two-level concurrent fan-out and result aggregation
//! - [`status`]: Seal/initialization status query
//!
//! ## Usage
//!
//! ```bash
//! vault-fleet status
//! vault-fleet --datacenter dc1 unseal
//! vault-fleet rekey init --shares 5 --threshold 3
//! vault-fleet rekey submit
//! ```
//!
//! ## Security Considerations
//!
//! - Resolved key shares are zeroized as soon as each remote call returns
//! - Key material is redacted from `Debug` output
//! - Rekey operations only ever run against the cluster leader
//! - Rotated keys returned by a completed rekey are logged exactly once

pub mod client;
pub mod configuration;
pub mod constants;
pub mod decrypt;
pub mod errors;
pub mod executors;
pub mod keys;
pub mod leader;
pub mod models;
pub mod orchestrator;
pub mod status;

#[cfg(test)]
pub(crate) mod fakes;
