// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Fan-out of one operation over the whole topology.
//!
//! # Scheduling
//!
//! A sweep spawns one task per matching datacenter and, inside each, one task
//! per host. Tasks share nothing mutable:
//!
//! 1. **Datacenter task**: resolves the datacenter's keys once (only for
//!    operations that need them), then spawns its host tasks
//! 2. **Host task**: owns its identity, its client and its own copy of the
//!    resolved keys, and runs the [`Operation`] against one node
//! 3. **Barrier**: [`Fleet::sweep`] returns only after every datacenter task
//!    and every host task has been joined
//!
//! Failures are logged where they happen and recorded in the
//! [`SweepReport`]; they never cancel sibling tasks.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::client::ClientFactory;
use crate::decrypt::Decrypter;
use crate::errors::FleetError;
use crate::executors::Operation;
use crate::keys::resolve_keys;
use crate::models::{Datacenter, Host, HostOutcome, ShareKey};

/// Immutable per-invocation settings handed to every task at spawn time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepConfig {
    /// Restricts the sweep to one datacenter. `None` or empty means all.
    pub datacenter: Option<String>,
    /// Configured keys are base64 encoded ciphertext.
    pub encryption_enabled: bool,
}

impl SweepConfig {
    pub fn matches(&self, datacenter: &str) -> bool {
        match self.datacenter.as_deref() {
            None | Some("") => true,
            Some(name) => name == datacenter,
        }
    }
}

#[derive(Debug)]
pub struct HostReport {
    pub host: Host,
    pub result: Result<HostOutcome, FleetError>,
}

#[derive(Debug)]
pub struct DatacenterReport {
    pub name: String,
    /// Set when the datacenter could not be dispatched at all.
    pub error: Option<FleetError>,
    pub hosts: Vec<HostReport>,
}

#[derive(Debug, Default)]
pub struct SweepReport {
    pub datacenters: Vec<DatacenterReport>,
}

impl SweepReport {
    pub fn hosts(&self) -> impl Iterator<Item = (&str, &HostReport)> {
        self.datacenters
            .iter()
            .flat_map(|dc| dc.hosts.iter().map(move |host| (dc.name.as_str(), host)))
    }

    pub fn host(&self, datacenter: &str, host: &str) -> Option<&HostReport> {
        self.hosts()
            .find(|(dc, report)| *dc == datacenter && report.host.name == host)
            .map(|(_, report)| report)
    }

    /// Hosts whose operation returned an outcome.
    pub fn succeeded(&self) -> usize {
        self.hosts()
            .filter(|(_, report)| report.result.is_ok())
            .count()
    }

    /// Hosts left alone because of their cluster role or state, such as a
    /// follower during a rekey.
    pub fn skipped(&self) -> usize {
        self.hosts()
            .filter(|(_, report)| matches!(&report.result, Err(err) if err.is_expected()))
            .count()
    }

    /// Hosts that could not be reached or whose operation failed.
    pub fn failed(&self) -> usize {
        self.hosts()
            .filter(|(_, report)| matches!(&report.result, Err(err) if !err.is_expected()))
            .count()
    }

    pub fn log_summary(&self, operation: Operation) {
        let aborted = self
            .datacenters
            .iter()
            .filter(|dc| dc.error.is_some())
            .count();

        tracing::info!(
            operation = operation.name(),
            datacenters = self.datacenters.len(),
            datacenters_aborted = aborted,
            hosts = self.hosts().count(),
            succeeded = self.succeeded(),
            skipped = self.skipped(),
            failed = self.failed(),
            "sweep complete"
        );
    }
}

/// Runs operations across the fleet.
pub struct Fleet {
    factory: Arc<dyn ClientFactory>,
    decrypter: Arc<dyn Decrypter>,
    config: SweepConfig,
}

impl Fleet {
    /// Creates a fleet runner.
    ///
    /// # Arguments
    ///
    /// * `factory` - Builds one client per host, inside that host's task
    /// * `decrypter` - Used once per datacenter when encryption is enabled
    /// * `config` - Datacenter filter and encryption flag for every sweep
    pub fn new(
        factory: Arc<dyn ClientFactory>,
        decrypter: Arc<dyn Decrypter>,
        config: SweepConfig,
    ) -> Self {
        Self {
            factory,
            decrypter,
            config,
        }
    }

    /// Dispatches `operation` to every host of every matching datacenter and
    /// waits for all of them.
    #[tracing::instrument(skip_all, fields(operation = operation.name()))]
    pub async fn sweep(&self, topology: &[Datacenter], operation: Operation) -> SweepReport {
        let mut handles: Vec<(String, JoinHandle<DatacenterReport>)> = Vec::new();

        for datacenter in topology {
            if !self.config.matches(&datacenter.name) {
                continue;
            }

            tracing::info!(
                datacenter = %datacenter.name,
                hosts = datacenter.hosts.len(),
                "start vault {}",
                operation.name()
            );

            let handle = tokio::spawn(process_datacenter(
                datacenter.clone(),
                self.factory.clone(),
                self.decrypter.clone(),
                self.config.encryption_enabled,
                operation,
            ));
            handles.push((datacenter.name.clone(), handle));
        }

        if handles.is_empty() {
            if let Some(name) = self.config.datacenter.as_deref().filter(|name| !name.is_empty()) {
                tracing::warn!(datacenter = %name, "no configured datacenter matches the filter");
            }
        }

        let mut report = SweepReport::default();
        for (name, handle) in handles {
            let datacenter = match handle.await {
                Ok(datacenter) => datacenter,
                Err(err) => {
                    tracing::error!(datacenter = %name, error = %err, "datacenter task failed");
                    DatacenterReport {
                        name,
                        error: Some(FleetError::TaskFailed(err.to_string())),
                        hosts: Vec::new(),
                    }
                }
            };
            report.datacenters.push(datacenter);
        }

        report
    }
}

#[tracing::instrument(skip_all, fields(datacenter = %datacenter.name))]
async fn process_datacenter(
    datacenter: Datacenter,
    factory: Arc<dyn ClientFactory>,
    decrypter: Arc<dyn Decrypter>,
    encryption_enabled: bool,
    operation: Operation,
) -> DatacenterReport {
    // Keys are resolved before any host of this datacenter is touched.
    let keys = if operation.needs_keys() {
        match resolve_keys(&datacenter, decrypter.as_ref(), encryption_enabled).await {
            Ok(keys) => keys,
            Err(err) => {
                tracing::error!(
                    datacenter = %datacenter.name,
                    error = %err,
                    "unable to resolve keys, skipping datacenter"
                );
                return DatacenterReport {
                    name: datacenter.name.clone(),
                    error: Some(err),
                    hosts: Vec::new(),
                };
            }
        }
    } else {
        Vec::new()
    };

    let handles: Vec<(Host, JoinHandle<Result<HostOutcome, FleetError>>)> = datacenter
        .hosts
        .iter()
        .map(|host| {
            let handle = tokio::spawn(process_host(
                datacenter.name.clone(),
                host.clone(),
                factory.clone(),
                keys.clone(),
                operation,
            ));
            (host.clone(), handle)
        })
        .collect();
    drop(keys);

    let mut hosts = Vec::with_capacity(handles.len());
    for (host, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                tracing::error!(host = %host, error = %err, "host task failed");
                Err(FleetError::TaskFailed(err.to_string()))
            }
        };
        hosts.push(HostReport { host, result });
    }

    DatacenterReport {
        name: datacenter.name.clone(),
        error: None,
        hosts,
    }
}

#[tracing::instrument(skip_all, fields(datacenter = %datacenter, host = %host))]
async fn process_host(
    datacenter: String,
    host: Host,
    factory: Arc<dyn ClientFactory>,
    keys: Vec<ShareKey>,
    operation: Operation,
) -> Result<HostOutcome, FleetError> {
    let client = match factory.connect(&host) {
        Ok(client) => client,
        Err(err) => {
            tracing::error!(error = %err, "error creating vault client");
            return Err(err);
        }
    };

    let result = operation.execute(client.as_ref(), keys).await;

    match &result {
        Err(err) if err.is_expected() => {
            tracing::info!(reason = %err, "skipping host");
        }
        Err(err) => {
            tracing::error!(error = %err, "{} failed", operation.name());
        }
        Ok(_) => {}
    }

    result
}
